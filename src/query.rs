use crate::block::Block;
use crate::column::Value;
use crate::io::buffer_utils;
use crate::io::BufferedReader;
use crate::protocol::{
    revision,
    CLIENT_VERSION_MAJOR,
    CLIENT_VERSION_MINOR,
    CLIENT_VERSION_PATCH,
    DBMS_NAME,
};
use crate::settings::{
    SettingValue,
    Settings,
};
use crate::{
    Error,
    Result,
};
use bytes::{
    BufMut,
    BytesMut,
};
use std::sync::Arc;

/// OpenTelemetry tracing context (W3C Trace Context)
/// See: <https://www.w3.org/TR/trace-context/>
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TracingContext {
    /// Trace ID (128-bit identifier)
    pub trace_id: u128,
    /// Span ID (64-bit identifier)
    pub span_id: u64,
    /// Tracestate header value
    pub tracestate: String,
    /// Trace flags (8-bit flags)
    pub trace_flags: u8,
}

impl TracingContext {
    /// Create a tracing context with trace and span IDs
    pub fn with_ids(trace_id: u128, span_id: u64) -> Self {
        Self { trace_id, span_id, tracestate: String::new(), trace_flags: 0 }
    }

    /// Parse a `traceparent` header: `00-<trace id>-<span id>-<flags>`,
    /// all lowercase or uppercase hex.
    pub fn from_traceparent(
        traceparent: &str,
        tracestate: impl Into<String>,
    ) -> Result<Self> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "Malformed traceparent header: {}",
                traceparent
            ))
        };

        let parts: Vec<&str> = traceparent.trim().split('-').collect();
        let [version, trace_id, span_id, flags] = parts[..] else {
            return Err(invalid());
        };
        if version.len() != 2
            || trace_id.len() != 32
            || span_id.len() != 16
            || flags.len() != 2
        {
            return Err(invalid());
        }
        if version != "00" {
            return Err(Error::InvalidArgument(format!(
                "Unexpected traceparent version {}",
                version
            )));
        }

        Ok(Self {
            trace_id: u128::from_str_radix(trace_id, 16).map_err(|_| invalid())?,
            span_id: u64::from_str_radix(span_id, 16).map_err(|_| invalid())?,
            tracestate: tracestate.into(),
            trace_flags: u8::from_str_radix(flags, 16).map_err(|_| invalid())?,
        })
    }

    /// Set tracestate
    pub fn tracestate(mut self, tracestate: impl Into<String>) -> Self {
        self.tracestate = tracestate.into();
        self
    }

    /// Set trace flags
    pub fn trace_flags(mut self, flags: u8) -> Self {
        self.trace_flags = flags;
        self
    }

    /// Check if tracing is enabled (non-zero trace_id)
    pub fn is_enabled(&self) -> bool {
        self.trace_id != 0
    }
}

/// Temporary table shipped along with a query; the server exposes it to the
/// query under `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalTable {
    pub name: String,
    pub block: Block,
}

impl ExternalTable {
    pub fn new(name: impl Into<String>, block: Block) -> Self {
        Self { name: name.into(), block }
    }

    /// Build from a structure and rows.
    pub fn from_rows<N, T>(
        name: impl Into<String>,
        structure: &[(N, T)],
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self>
    where
        N: AsRef<str>,
        T: AsRef<str>,
    {
        Ok(Self::new(name, Block::from_rows(structure, rows)?))
    }
}

/// Callback invoked with the accumulated progress after every Progress
/// packet.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Query structure for building and executing queries
#[derive(Clone)]
pub struct Query {
    /// The SQL query string
    query_text: String,
    /// Query ID; empty lets the server pick one
    query_id: String,
    settings: Settings,
    /// Server-side parameters, referenced as `{name:Type}` in the text
    parameters: Vec<(String, Value)>,
    tracing_context: Option<TracingContext>,
    external_tables: Vec<ExternalTable>,
    on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("query_text", &self.query_text)
            .field("query_id", &self.query_id)
            .field("settings", &self.settings)
            .field("parameters", &self.parameters)
            .field("tracing_context", &self.tracing_context)
            .field("external_tables", &self.external_tables.len())
            .finish()
    }
}

impl Query {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            query_id: String::new(),
            settings: Settings::new(),
            parameters: Vec::new(),
            tracing_context: None,
            external_tables: Vec::new(),
            on_progress: None,
        }
    }

    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = query_id.into();
        self
    }

    /// Set a per-query setting, overriding the client-wide value.
    pub fn with_setting(
        mut self,
        name: impl Into<String>,
        value: impl Into<SettingValue>,
    ) -> Self {
        self.settings.set(name, value);
        self
    }

    /// Bind a server-side parameter.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let name = name.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some(item) => item.1 = value,
            None => self.parameters.push((name, value)),
        }
        self
    }

    pub fn with_tracing_context(mut self, context: TracingContext) -> Self {
        self.tracing_context = Some(context);
        self
    }

    pub fn with_external_table(mut self, table: ExternalTable) -> Self {
        self.external_tables.push(table);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn text(&self) -> &str {
        &self.query_text
    }

    pub fn id(&self) -> &str {
        &self.query_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    pub fn tracing_context(&self) -> Option<&TracingContext> {
        self.tracing_context.as_ref()
    }

    pub fn external_tables(&self) -> &[ExternalTable] {
        &self.external_tables
    }

    pub(crate) fn get_on_progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_ref()
    }

    /// Write the parameters section: `name`, flags, quoted value per
    /// parameter, then an empty name.
    pub(crate) fn write_parameters(&self, buffer: &mut BytesMut) {
        for (name, value) in &self.parameters {
            buffer_utils::write_string(buffer, name);
            buffer_utils::write_varint(
                buffer,
                crate::protocol::settings_flags::CUSTOM,
            );
            buffer_utils::write_string(buffer, &quote(&format_parameter(value)));
        }
        buffer_utils::write_string(buffer, "");
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Query::new(s)
    }
}

/// Quote a string as a single-quoted SQL literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escape a string the way the server's escaped text format expects.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

/// Text form of a parameter value. Top-level strings are escaped but not
/// quoted; strings nested in arrays, tuples and maps are quoted.
pub fn format_parameter(value: &Value) -> String {
    match value {
        Value::String(s) => escape(s),
        Value::Bytes(b) => escape(&String::from_utf8_lossy(b)),
        other => format_literal(other),
    }
}

fn format_literal(value: &Value) -> String {
    fn join<'a>(items: impl Iterator<Item = &'a Value>) -> String {
        items.map(format_literal).collect::<Vec<_>>().join(",")
    }

    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int8(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Int128(v) => v.to_string(),
        Value::Int256(v) => v.to_string(),
        Value::UInt8(v) => v.to_string(),
        Value::UInt16(v) => v.to_string(),
        Value::UInt32(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::UInt128(v) => v.to_string(),
        Value::UInt256(v) => v.to_string(),
        Value::Float32(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::String(s) => format!("'{}'", escape(s)),
        Value::Bytes(b) => format!("'{}'", escape(&String::from_utf8_lossy(b))),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) if dt.timestamp_subsec_nanos() == 0 => {
            format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S"))
        }
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.6f")),
        Value::Uuid(u) => format!("'{}'", u),
        Value::Ipv4(ip) => format!("'{}'", ip),
        Value::Ipv6(ip) => format!("'{}'", ip),
        Value::Array(items) => format!("[{}]", join(items.iter())),
        Value::Tuple(items) => format!("({})", join(items.iter())),
        Value::Map(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{}:{}", format_literal(k), format_literal(v)))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(k, v)| format!("'{}':{}", escape(k), format_literal(v)))
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

/// Description of the client attached to every query.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub initial_user: String,
    pub initial_query_id: String,
    pub os_user: String,
    pub client_hostname: String,
    pub client_name: String,
    pub quota_key: String,
    pub tracing_context: Option<TracingContext>,
}

const QUERY_KIND_INITIAL: u8 = 1;
const INTERFACE_TCP: u8 = 1;
const INITIAL_ADDRESS: &str = "0.0.0.0:0";

impl ClientInfo {
    pub fn new(client_name: impl Into<String>, quota_key: impl Into<String>) -> Self {
        Self {
            initial_user: String::new(),
            initial_query_id: String::new(),
            os_user: std::env::var("USER").unwrap_or_default(),
            client_hostname: std::env::var("HOSTNAME")
                .unwrap_or_else(|_| "localhost".to_string()),
            client_name: client_name.into(),
            quota_key: quota_key.into(),
            tracing_context: None,
        }
    }

    /// Serialize the fields known to a server at `revision`.
    pub fn write_to(&self, buffer: &mut BytesMut, revision: u64) {
        buffer.put_u8(QUERY_KIND_INITIAL);
        buffer_utils::write_string(buffer, &self.initial_user);
        buffer_utils::write_string(buffer, &self.initial_query_id);
        buffer_utils::write_string(buffer, INITIAL_ADDRESS);

        if revision >= revision::WITH_INITIAL_QUERY_START_TIME {
            buffer.put_u64_le(0);
        }

        buffer.put_u8(INTERFACE_TCP);
        buffer_utils::write_string(buffer, &self.os_user);
        buffer_utils::write_string(buffer, &self.client_hostname);
        buffer_utils::write_string(
            buffer,
            &format!("{} {}", DBMS_NAME, self.client_name),
        );
        buffer_utils::write_varint(buffer, CLIENT_VERSION_MAJOR);
        buffer_utils::write_varint(buffer, CLIENT_VERSION_MINOR);
        buffer_utils::write_varint(buffer, revision::CLIENT);

        if revision >= revision::WITH_QUOTA_KEY_IN_CLIENT_INFO {
            buffer_utils::write_string(buffer, &self.quota_key);
        }
        if revision >= revision::WITH_DISTRIBUTED_DEPTH {
            buffer_utils::write_varint(buffer, 0);
        }
        if revision >= revision::WITH_VERSION_PATCH {
            buffer_utils::write_varint(buffer, CLIENT_VERSION_PATCH);
        }
        if revision >= revision::WITH_OPENTELEMETRY {
            match &self.tracing_context {
                Some(ctx) if ctx.is_enabled() => {
                    buffer.put_u8(1);
                    buffer.put_u64_le((ctx.trace_id >> 64) as u64);
                    buffer.put_u64_le(ctx.trace_id as u64);
                    buffer.put_u64_le(ctx.span_id);
                    buffer_utils::write_string(buffer, &ctx.tracestate);
                    buffer.put_u8(ctx.trace_flags);
                }
                _ => buffer.put_u8(0),
            }
        }
        if revision >= revision::WITH_PARALLEL_REPLICAS {
            // collaborate_with_initiator, count_participating_replicas,
            // number_of_current_replica
            buffer_utils::write_varint(buffer, 0);
            buffer_utils::write_varint(buffer, 0);
            buffer_utils::write_varint(buffer, 0);
        }
    }
}

/// Server information received during handshake
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub version_patch: u64,
    /// Revision announced by the server.
    pub revision: u64,
    /// Negotiated revision, `min(client, server)`; drives every feature gate.
    pub used_revision: u64,
    pub timezone: Option<String>,
    pub display_name: String,
    /// Password complexity rules as `(pattern, message)` pairs.
    pub password_complexity_rules: Vec<(String, String)>,
    pub nonce: Option<u64>,
}

impl ServerInfo {
    /// Read the body of a Hello packet (the packet code is already consumed).
    pub async fn read_from(
        reader: &mut BufferedReader<'_>,
        client_revision: u64,
    ) -> Result<Self> {
        let name = reader.read_string().await?;
        let version_major = reader.read_varint().await?;
        let version_minor = reader.read_varint().await?;
        let server_revision = reader.read_varint().await?;
        let used = server_revision.min(client_revision);

        let timezone = if used >= revision::WITH_SERVER_TIMEZONE {
            Some(reader.read_string().await?)
        } else {
            None
        };

        let display_name = if used >= revision::WITH_SERVER_DISPLAY_NAME {
            reader.read_string().await?
        } else {
            String::new()
        };

        let version_patch = if used >= revision::WITH_VERSION_PATCH {
            reader.read_varint().await?
        } else {
            server_revision
        };

        let mut password_complexity_rules = Vec::new();
        if used >= revision::WITH_PASSWORD_COMPLEXITY_RULES {
            let count = reader.read_varint().await?;
            for _ in 0..count {
                let pattern = reader.read_string().await?;
                let message = reader.read_string().await?;
                password_complexity_rules.push((pattern, message));
            }
        }

        let nonce = if used >= revision::WITH_INTERSERVER_SECRET_V2 {
            Some(reader.read_u64_le().await?)
        } else {
            None
        };

        Ok(Self {
            name,
            version_major,
            version_minor,
            version_patch,
            revision: server_revision,
            used_revision: used,
            timezone,
            display_name,
            password_complexity_rules,
            nonce,
        })
    }

    pub fn version(&self) -> (u64, u64, u64) {
        (self.version_major, self.version_minor, self.version_patch)
    }
}

/// Progress information
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
    pub elapsed_ns: u64,
}

impl Progress {
    pub async fn read_from(
        reader: &mut BufferedReader<'_>,
        revision: u64,
    ) -> Result<Self> {
        let mut progress = Progress {
            rows: reader.read_varint().await?,
            bytes: reader.read_varint().await?,
            ..Default::default()
        };

        if revision >= revision::WITH_TOTAL_ROWS_IN_PROGRESS {
            progress.total_rows = reader.read_varint().await?;
        }
        if revision >= revision::WITH_TOTAL_BYTES_IN_PROGRESS {
            progress.total_bytes = reader.read_varint().await?;
        }
        if revision >= revision::WITH_CLIENT_WRITE_INFO {
            progress.written_rows = reader.read_varint().await?;
            progress.written_bytes = reader.read_varint().await?;
        }
        if revision >= revision::WITH_SERVER_QUERY_TIME_IN_PROGRESS {
            progress.elapsed_ns = reader.read_varint().await?;
        }
        Ok(progress)
    }

    /// Add a Progress packet, which carries deltas since the previous one.
    /// Elapsed time is absolute, so the latest value wins.
    pub fn increment(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows += other.total_rows;
        self.total_bytes += other.total_bytes;
        self.written_rows += other.written_rows;
        self.written_bytes += other.written_bytes;
        self.elapsed_ns = self.elapsed_ns.max(other.elapsed_ns);
    }
}

/// Profile information
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl Profile {
    pub async fn read_from(reader: &mut BufferedReader<'_>) -> Result<Self> {
        Ok(Self {
            rows: reader.read_varint().await?,
            blocks: reader.read_varint().await?,
            bytes: reader.read_varint().await?,
            applied_limit: reader.read_u8().await? != 0,
            rows_before_limit: reader.read_varint().await?,
            calculated_rows_before_limit: reader.read_u8().await? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::new("SELECT {x:UInt8}")
            .with_query_id("q1")
            .with_setting("max_threads", 2u64)
            .with_parameter("x", 1u8)
            .with_parameter("x", 2u8);
        assert_eq!(query.text(), "SELECT {x:UInt8}");
        assert_eq!(query.id(), "q1");
        assert_eq!(
            query.settings().get("max_threads"),
            Some(&SettingValue::UInt(2))
        );
        assert_eq!(query.parameters(), &[("x".to_string(), Value::UInt8(2))]);
    }

    #[test]
    fn test_traceparent() {
        let ctx = TracingContext::from_traceparent(
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "vendor=1",
        )
        .unwrap();
        assert_eq!(ctx.trace_id, 0x0af7651916cd43dd8448eb211c80319c);
        assert_eq!(ctx.span_id, 0xb7ad6b7169203331);
        assert_eq!(ctx.trace_flags, 1);
        assert_eq!(ctx.tracestate, "vendor=1");
    }

    #[test]
    fn test_traceparent_rejects_garbage() {
        for header in [
            "",
            "00-abc-def-01",
            "01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319z-b7ad6b7169203331-01",
        ] {
            assert!(
                matches!(
                    TracingContext::from_traceparent(header, ""),
                    Err(Error::InvalidArgument(_))
                ),
                "{}",
                header
            );
        }
    }

    fn client_info(tracing: Option<TracingContext>) -> ClientInfo {
        ClientInfo {
            initial_user: String::new(),
            initial_query_id: String::new(),
            os_user: "u".into(),
            client_hostname: "h".into(),
            client_name: "test".into(),
            quota_key: String::new(),
            tracing_context: tracing,
        }
    }

    #[test]
    fn test_client_info_without_opentelemetry() {
        let info = client_info(Some(TracingContext::with_ids(1, 2)));
        let mut buf = BytesMut::new();
        info.write_to(&mut buf, revision::WITH_OPENTELEMETRY - 1);

        let mut expected = BytesMut::new();
        expected.put_u8(1);
        buffer_utils::write_string(&mut expected, "");
        buffer_utils::write_string(&mut expected, "");
        buffer_utils::write_string(&mut expected, "0.0.0.0:0");
        expected.put_u8(1);
        buffer_utils::write_string(&mut expected, "u");
        buffer_utils::write_string(&mut expected, "h");
        buffer_utils::write_string(&mut expected, "ClickHouse test");
        buffer_utils::write_varint(&mut expected, CLIENT_VERSION_MAJOR);
        buffer_utils::write_varint(&mut expected, CLIENT_VERSION_MINOR);
        buffer_utils::write_varint(&mut expected, revision::CLIENT);
        buffer_utils::write_string(&mut expected, "");
        buffer_utils::write_varint(&mut expected, CLIENT_VERSION_PATCH);
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_client_info_with_opentelemetry() {
        let ctx = TracingContext::with_ids(
            0x0102030405060708_1112131415161718,
            0x2122232425262728,
        )
        .tracestate("s")
        .trace_flags(1);
        let mut with = BytesMut::new();
        client_info(Some(ctx)).write_to(&mut with, revision::WITH_OPENTELEMETRY);
        let mut without = BytesMut::new();
        client_info(None).write_to(&mut without, revision::WITH_OPENTELEMETRY);

        let prefix = without.len() - 1;
        assert_eq!(&with[..prefix], &without[..prefix]);
        assert_eq!(without[prefix], 0);

        let mut expected = BytesMut::new();
        expected.put_u8(1);
        expected.put_u64_le(0x0102030405060708);
        expected.put_u64_le(0x1112131415161718);
        expected.put_u64_le(0x2122232425262728);
        buffer_utils::write_string(&mut expected, "s");
        expected.put_u8(1);
        assert_eq!(&with[prefix..], &expected[..]);
    }

    #[test]
    fn test_client_info_parallel_replicas_tail() {
        let mut before = BytesMut::new();
        client_info(None).write_to(&mut before, revision::WITH_PARALLEL_REPLICAS - 1);
        let mut after = BytesMut::new();
        client_info(None).write_to(&mut after, revision::WITH_PARALLEL_REPLICAS);
        // start time (8 bytes) appears in both; three zero varints are new
        assert_eq!(after.len(), before.len() + 3);
        assert_eq!(&after[after.len() - 3..], &[0, 0, 0]);
    }

    fn hello_body(server_revision: u64) -> BytesMut {
        let mut buf = BytesMut::new();
        buffer_utils::write_string(&mut buf, "ClickHouse");
        buffer_utils::write_varint(&mut buf, 23);
        buffer_utils::write_varint(&mut buf, 8);
        buffer_utils::write_varint(&mut buf, server_revision);
        buf
    }

    #[tokio::test]
    async fn test_server_info_current() {
        let mut buf = hello_body(54470);
        buffer_utils::write_string(&mut buf, "UTC");
        buffer_utils::write_string(&mut buf, "node-1");
        buffer_utils::write_varint(&mut buf, 3);
        buffer_utils::write_varint(&mut buf, 1);
        buffer_utils::write_string(&mut buf, ".{8,}");
        buffer_utils::write_string(&mut buf, "at least 8 characters");
        buf.put_u64_le(42);

        let mut reader = BufferedReader::from_bytes(buf.freeze());
        let info = ServerInfo::read_from(&mut reader, revision::CLIENT).await.unwrap();
        assert_eq!(info.revision, 54470);
        assert_eq!(info.used_revision, revision::CLIENT);
        assert_eq!(info.timezone.as_deref(), Some("UTC"));
        assert_eq!(info.display_name, "node-1");
        assert_eq!(info.version(), (23, 8, 3));
        assert_eq!(info.password_complexity_rules.len(), 1);
        assert_eq!(info.nonce, Some(42));
        assert_eq!(reader.remaining_buffered(), 0);
    }

    #[tokio::test]
    async fn test_server_info_old_revision() {
        let mut buf = hello_body(54060);
        buffer_utils::write_string(&mut buf, "Europe/Berlin");

        let mut reader = BufferedReader::from_bytes(buf.freeze());
        let info = ServerInfo::read_from(&mut reader, revision::CLIENT).await.unwrap();
        assert_eq!(info.used_revision, 54060);
        assert_eq!(info.display_name, "");
        assert_eq!(info.version_patch, 54060);
        assert_eq!(info.nonce, None);
        assert_eq!(reader.remaining_buffered(), 0);
    }

    #[tokio::test]
    async fn test_progress_fields_by_revision() {
        let mut buf = BytesMut::new();
        for v in [10u64, 200, 1000, 5000, 3, 30, 99] {
            buffer_utils::write_varint(&mut buf, v);
        }
        let mut reader = BufferedReader::from_bytes(buf.freeze());
        let progress = Progress::read_from(&mut reader, revision::CLIENT).await.unwrap();
        assert_eq!(
            progress,
            Progress {
                rows: 10,
                bytes: 200,
                total_rows: 1000,
                total_bytes: 5000,
                written_rows: 3,
                written_bytes: 30,
                elapsed_ns: 99,
            }
        );

        let mut reader = BufferedReader::from_bytes(vec![1u8, 2, 3]);
        let old = Progress::read_from(&mut reader, 54000).await.unwrap();
        assert_eq!((old.rows, old.bytes, old.total_rows), (1, 2, 3));
        assert_eq!(old.written_rows, 0);
    }

    #[test]
    fn test_progress_increment() {
        let mut total = Progress::default();
        total.increment(&Progress { rows: 1, bytes: 8, elapsed_ns: 5, ..Default::default() });
        total.increment(&Progress { rows: 2, bytes: 16, elapsed_ns: 9, ..Default::default() });
        assert_eq!(total.rows, 3);
        assert_eq!(total.bytes, 24);
        assert_eq!(total.elapsed_ns, 9);
    }

    #[tokio::test]
    async fn test_profile_read() {
        let mut reader = BufferedReader::from_bytes(vec![5u8, 1, 40, 1, 7, 0]);
        let profile = Profile::read_from(&mut reader).await.unwrap();
        assert_eq!(profile.rows, 5);
        assert!(profile.applied_limit);
        assert_eq!(profile.rows_before_limit, 7);
        assert!(!profile.calculated_rows_before_limit);
    }

    #[test]
    fn test_parameter_formatting() {
        assert_eq!(quote(&format_parameter(&Value::from("it's"))), r"'it\\\'s'");
        assert_eq!(format_parameter(&Value::from("a\tb")), r"a\tb");
        assert_eq!(format_parameter(&Value::Int32(-5)), "-5");
        assert_eq!(
            format_parameter(&Value::Array(vec![Value::from("x"), Value::Null])),
            "['x',NULL]"
        );
        assert_eq!(
            format_parameter(&Value::Map(vec![(Value::from("k"), Value::UInt8(1))])),
            "{'k':1}"
        );
    }

    #[test]
    fn test_write_parameters() {
        let query = Query::new("SELECT {n:String}").with_parameter("n", "v");
        let mut buf = BytesMut::new();
        query.write_parameters(&mut buf);
        assert_eq!(&buf[..], &[1, b'n', 2, 3, b'\'', b'v', b'\'', 0]);
    }
}
