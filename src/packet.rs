//! Packets received from the server after the handshake.

use tracing::info;

use crate::block::Block;
use crate::column::Value;
use crate::error::ServerException;
use crate::io::BufferedReader;
use crate::query::{
    Profile,
    Progress,
    ServerInfo,
};
use crate::{
    Error,
    Result,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Hello(ServerInfo),
    Data(Block),
    Exception(ServerException),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(Profile),
    Totals(Block),
    Extremes(Block),
    Log(Block),
    /// External table name and its column description.
    TableColumns { table_name: String, description: String },
    PartUUIDs(Block),
    ReadTaskRequest(Block),
    ProfileEvents(Block),
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Hello(_) => "Hello",
            Packet::Data(_) => "Data",
            Packet::Exception(_) => "Exception",
            Packet::Progress(_) => "Progress",
            Packet::Pong => "Pong",
            Packet::EndOfStream => "EndOfStream",
            Packet::ProfileInfo(_) => "ProfileInfo",
            Packet::Totals(_) => "Totals",
            Packet::Extremes(_) => "Extremes",
            Packet::Log(_) => "Log",
            Packet::TableColumns { .. } => "TableColumns",
            Packet::PartUUIDs(_) => "PartUUIDs",
            Packet::ReadTaskRequest(_) => "ReadTaskRequest",
            Packet::ProfileEvents(_) => "ProfileEvents",
        }
    }
}

/// Read an exception and its nested causes. The chain is read front to
/// back and linked afterwards, outermost exception first.
pub async fn read_exception(
    reader: &mut BufferedReader<'_>,
) -> Result<ServerException> {
    let mut chain = Vec::new();
    loop {
        let code = reader.read_i32_le().await?;
        let name = reader.read_string().await?;
        let message = reader.read_string().await?;
        let stack_trace = reader.read_string().await?;
        let has_nested = reader.read_u8().await? != 0;
        chain.push(ServerException {
            code,
            name,
            message,
            stack_trace,
            nested: None,
        });
        if !has_nested {
            break;
        }
    }

    let mut exception: Option<ServerException> = None;
    while let Some(mut outer) = chain.pop() {
        outer.nested = exception.map(Box::new);
        exception = Some(outer);
    }
    exception.ok_or_else(|| Error::Protocol("empty exception chain".into()))
}

const LOG_PRIORITIES: [&str; 9] = [
    "Unknown",
    "Fatal",
    "Critical",
    "Error",
    "Warning",
    "Notice",
    "Information",
    "Debug",
    "Trace",
];

fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bytes(b)) => String::from_utf8_lossy(b).into_owned(),
        Some(Value::Null) | None => String::new(),
        Some(other) => match other.as_u128() {
            Some(n) => n.to_string(),
            None => format!("{:?}", other),
        },
    }
}

/// Format the rows of a server Log block as
/// `[ host ] [ thread ] {query_id} <Priority> source: text`.
pub fn format_log_block(block: &Block) -> Vec<String> {
    let column = |name: &str| block.column_by_name(name);
    let (host, thread, query_id, priority, source, text) = (
        column("host_name"),
        column("thread_id"),
        column("query_id"),
        column("priority"),
        column("source"),
        column("text"),
    );

    (0..block.row_count())
        .map(|row| {
            let at = |col: Option<&[Value]>| cell_text(col.and_then(|c| c.get(row)));
            let priority = priority
                .and_then(|c| c.get(row))
                .and_then(Value::as_i128)
                .and_then(|p| LOG_PRIORITIES.get(p as usize))
                .copied()
                .unwrap_or(LOG_PRIORITIES[0]);
            format!(
                "[ {} ] [ {} ] {{{}}} <{}> {}: {}",
                at(host),
                at(thread),
                at(query_id),
                priority,
                at(source),
                at(text)
            )
        })
        .collect()
}

/// Re-emit server log rows through `tracing`.
pub fn log_block(block: &Block) {
    for line in format_log_block(block) {
        info!("{}", line);
    }
}
