use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use crate::block::Block;
use crate::column::Value;
use crate::connection::{
    Connection,
    ConnectionOptions,
    ConnectionState,
    Endpoint,
};
use crate::packet::{
    log_block,
    Packet,
};
use crate::protocol::{
    revision,
    CompressionMethod,
    DEFAULT_INSERT_BLOCK_SIZE,
};
use crate::query::{
    Profile,
    Progress,
    ProgressCallback,
    Query,
    ServerInfo,
    TracingContext,
};
use crate::settings::{
    SettingValue,
    Settings,
};
#[cfg(feature = "tls")]
use crate::ssl::SSLOptions;
use crate::{
    Error,
    Result,
};

/// Server error code reported when a query stops because of a Cancel.
const QUERY_WAS_CANCELLED: i32 = 394;

/// Client options
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub connection: ConnectionOptions,
    /// Settings sent with every query; per-query settings override them.
    pub settings: Settings,
    /// Maximum rows per Data packet on insert.
    pub insert_block_size: usize,
    /// Mark settings as important, so servers that don't know one fail
    /// instead of ignoring it.
    pub settings_is_important: bool,
    /// OpenTelemetry context for queries that don't carry their own.
    pub tracing_context: Option<TracingContext>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionOptions::default(),
            settings: Settings::new(),
            insert_block_size: DEFAULT_INSERT_BLOCK_SIZE,
            settings_is_important: false,
            tracing_context: None,
        }
    }
}

impl ClientOptions {
    /// Create new client options with host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut options = Self::default();
        options.connection.endpoints = vec![Endpoint::new(host, port)];
        options
    }

    /// Add a fallback server, tried when the ones before it fail to connect
    pub fn add_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.connection.endpoints.push(Endpoint::new(host, port));
        self
    }

    /// Set the database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.connection.database = database.into();
        self
    }

    /// Set the username
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.connection.user = user.into();
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.connection.password = password.into();
        self
    }

    /// Set compression method
    pub fn compression(mut self, method: Option<CompressionMethod>) -> Self {
        self.connection.compression = method;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.connection.client_name = name.into();
        self
    }

    pub fn quota_key(mut self, key: impl Into<String>) -> Self {
        self.connection.quota_key = key.into();
        self
    }

    pub fn setting(
        mut self,
        name: impl Into<String>,
        value: impl Into<SettingValue>,
    ) -> Self {
        self.settings.set(name, value);
        self
    }

    pub fn settings_is_important(mut self, important: bool) -> Self {
        self.settings_is_important = important;
        self
    }

    pub fn insert_block_size(mut self, rows: usize) -> Self {
        self.insert_block_size = rows;
        self
    }

    /// Return String columns as raw bytes instead of decoding UTF-8
    pub fn strings_as_bytes(mut self, enabled: bool) -> Self {
        self.connection.column_options.strings_as_bytes = enabled;
        self
    }

    /// Write NULL into non-nullable columns as the column's default value
    pub fn input_null_as_default(mut self, enabled: bool) -> Self {
        self.connection.column_options.input_null_as_default = enabled;
        self
    }

    pub fn tracing_context(mut self, context: TracingContext) -> Self {
        self.tracing_context = Some(context);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connection.connect_timeout = timeout;
        self
    }

    pub fn send_receive_timeout(mut self, timeout: Duration) -> Self {
        self.connection.send_receive_timeout = timeout;
        self
    }

    pub fn sync_request_timeout(mut self, timeout: Duration) -> Self {
        self.connection.sync_request_timeout = timeout;
        self
    }

    pub fn tcp_keepalive(mut self, idle: Option<Duration>) -> Self {
        self.connection.tcp_keepalive = idle;
        self
    }

    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.connection.buffer_size = bytes;
        self
    }

    pub fn compress_block_size(mut self, bytes: usize) -> Self {
        self.connection.compress_block_size = bytes;
        self
    }

    /// Enable TLS. Endpoints still on the plain default port move to the
    /// secure one.
    #[cfg(feature = "tls")]
    pub fn ssl_options(mut self, options: SSLOptions) -> Self {
        for endpoint in &mut self.connection.endpoints {
            if endpoint.port == crate::protocol::DEFAULT_PORT {
                endpoint.port = crate::protocol::DEFAULT_SECURE_PORT;
            }
        }
        self.connection.ssl = Some(options);
        self
    }
}

/// ClickHouse client
///
/// Queries run one at a time; a result stream must be read to the end (or
/// cancelled) before the next query starts.
pub struct Client {
    connection: Connection,
    options: ClientOptions,
}

impl Client {
    /// Create a client that connects on first use.
    pub fn new(options: ClientOptions) -> Self {
        Self { connection: Connection::new(options.connection.clone()), options }
    }

    /// Connect to ClickHouse server
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let mut client = Self::new(options);
        client.connection.connect().await?;
        Ok(client)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.connection.server_info()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Server the client is connected to.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.connection.endpoint()
    }

    /// Ping the server; `false` means the connection is gone.
    pub async fn ping(&mut self) -> Result<bool> {
        self.connection.ping().await
    }

    /// Drop the connection, abandoning any unfinished result stream.
    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    async fn start_query(&mut self, query: &Query) -> Result<()> {
        self.connection.force_connect().await?;
        let settings = self.options.settings.merged(query.settings());
        let tracing_context =
            query.tracing_context().or(self.options.tracing_context.as_ref());
        self.connection
            .send_query(
                query,
                &settings,
                self.options.settings_is_important,
                tracing_context,
            )
            .await
    }

    /// Start a query and stream its result.
    pub async fn execute_iter(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryStream<'_>> {
        let query = query.into();
        self.start_query(&query).await?;
        Ok(QueryStream::new(
            &mut self.connection,
            query.get_on_progress().cloned(),
        ))
    }

    /// Execute a query and return results
    pub async fn query(&mut self, query: impl Into<Query>) -> Result<QueryResult> {
        self.execute_iter(query).await?.collect().await
    }

    /// Run a query and return its rows.
    pub async fn execute(&mut self, query: impl Into<Query>) -> Result<Vec<Vec<Value>>> {
        Ok(self.query(query).await?.into_rows())
    }

    /// Run a query and return its rows plus `(name, type)` of each column.
    pub async fn execute_with_types(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<(Vec<Vec<Value>>, Vec<(String, String)>)> {
        let result = self.query(query).await?;
        let columns = result.columns_with_types.clone();
        Ok((result.into_rows(), columns))
    }

    /// Insert rows. `query` is an `INSERT INTO ... VALUES` statement without
    /// data; rows are matched against the columns the server announces and
    /// sent in blocks of at most `insert_block_size` rows.
    pub async fn insert<I>(&mut self, query: impl Into<Query>, rows: I) -> Result<u64>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let sample = self.begin_insert(query.into()).await?;
        let structure = sample.columns_with_types();
        let block_size = self.options.insert_block_size.max(1);

        let result: Result<u64> = async {
            let mut inserted = 0;
            let mut batch = Vec::new();
            for row in rows {
                batch.push(row);
                if batch.len() == block_size {
                    let block = Block::from_rows(&structure, batch.drain(..))?;
                    inserted += self.send_insert_block(&block).await?;
                }
            }
            if !batch.is_empty() {
                let block = Block::from_rows(&structure, batch)?;
                inserted += self.send_insert_block(&block).await?;
            }
            Ok(inserted)
        }
        .await;
        self.finish_insert(result).await
    }

    /// Insert column-major data, one vector per column of the target.
    pub async fn insert_columns(
        &mut self,
        query: impl Into<Query>,
        columns: Vec<Vec<Value>>,
    ) -> Result<u64> {
        let sample = self.begin_insert(query.into()).await?;
        let block_size = self.options.insert_block_size.max(1);

        let result: Result<u64> = async {
            if columns.len() != sample.column_count() {
                return Err(Error::InvalidArgument(format!(
                    "Expected {} columns, got {}",
                    sample.column_count(),
                    columns.len()
                )));
            }
            let block = Block::from_columns(
                sample
                    .columns_with_types()
                    .into_iter()
                    .zip(columns)
                    .map(|((name, type_name), values)| (name, type_name, values)),
            )?;
            let mut inserted = 0;
            for chunk in block.chunks(block_size) {
                inserted += self.send_insert_block(&chunk).await?;
            }
            Ok(inserted)
        }
        .await;
        self.finish_insert(result).await
    }

    /// Send an insert query and wait for the block describing the target
    /// columns.
    async fn begin_insert(&mut self, query: Query) -> Result<Block> {
        self.start_query(&query).await?;
        loop {
            match self.connection.receive_packet().await? {
                Packet::Data(block) => return Ok(block),
                Packet::Exception(e) => return Err(Error::Server(e)),
                Packet::Log(block) => log_block(&block),
                Packet::TableColumns { .. } => {}
                other => return Err(self.unexpected(other, "Data")),
            }
        }
    }

    async fn send_insert_block(&mut self, block: &Block) -> Result<u64> {
        debug!(rows = block.row_count(), "Sending insert block");
        self.connection.send_data(block).await?;
        if self.connection.revision() >= revision::WITH_PROFILE_EVENTS_IN_INSERT {
            self.receive_profile_events().await?;
        }
        Ok(block.row_count() as u64)
    }

    async fn receive_profile_events(&mut self) -> Result<()> {
        loop {
            match self.connection.receive_packet().await? {
                Packet::ProfileEvents(_) => return Ok(()),
                Packet::Progress(_) | Packet::TableColumns { .. } => {}
                Packet::Log(block) => log_block(&block),
                Packet::Exception(e) => return Err(Error::Server(e)),
                other => return Err(self.unexpected(other, "ProfileEvents")),
            }
        }
    }

    /// Close the data stream with an empty block and read to EndOfStream.
    /// A failed data stream leaves the server mid-insert, so the connection
    /// is dropped instead.
    async fn finish_insert(&mut self, result: Result<u64>) -> Result<u64> {
        let inserted = match result {
            Ok(inserted) => inserted,
            Err(e) => {
                self.connection.disconnect();
                return Err(e);
            }
        };

        self.connection.send_data(&Block::new()).await?;
        loop {
            match self.connection.receive_packet().await? {
                Packet::EndOfStream => return Ok(inserted),
                Packet::Exception(e) => return Err(Error::Server(e)),
                Packet::Log(block) => log_block(&block),
                Packet::Progress(_)
                | Packet::ProfileEvents(_)
                | Packet::TableColumns { .. }
                | Packet::Data(_) => {}
                other => return Err(self.unexpected(other, "EndOfStream")),
            }
        }
    }

    fn unexpected(&mut self, packet: Packet, expected: &str) -> Error {
        self.connection.disconnect();
        Error::UnexpectedPacket(format!(
            "Unexpected packet from server (expected {}, got {})",
            expected,
            packet.name()
        ))
    }
}

/// Result stream of one query.
///
/// Dropping the stream before it is finished leaves unread packets on the
/// connection; the next query then fails with
/// [`Error::PartiallyConsumedQuery`] until the stream is cancelled or the
/// client disconnects.
pub struct QueryStream<'a> {
    connection: &'a mut Connection,
    on_progress: Option<ProgressCallback>,
    progress: Progress,
    profile: Option<Profile>,
    totals: Option<Block>,
    extremes: Option<Block>,
    columns_with_types: Option<Vec<(String, String)>>,
    pending_rows: VecDeque<Vec<Value>>,
    finished: bool,
}

impl<'a> QueryStream<'a> {
    fn new(connection: &'a mut Connection, on_progress: Option<ProgressCallback>) -> Self {
        Self {
            connection,
            on_progress,
            progress: Progress::default(),
            profile: None,
            totals: None,
            extremes: None,
            columns_with_types: None,
            pending_rows: VecDeque::new(),
            finished: false,
        }
    }

    /// Next block with rows, or `None` once the server sent EndOfStream.
    /// A server exception ends the stream and is returned as an error.
    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        while !self.finished {
            let packet = match self.connection.receive_packet().await {
                Ok(packet) => packet,
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };

            match packet {
                Packet::Data(block) => {
                    if self.columns_with_types.is_none() {
                        self.columns_with_types = Some(block.columns_with_types());
                    }
                    if !block.is_empty() {
                        return Ok(Some(block));
                    }
                }
                Packet::Totals(block) if !block.is_empty() => self.totals = Some(block),
                Packet::Extremes(block) if !block.is_empty() => {
                    self.extremes = Some(block)
                }
                Packet::Progress(progress) => {
                    self.progress.increment(&progress);
                    if let Some(callback) = &self.on_progress {
                        callback(&self.progress);
                    }
                }
                Packet::ProfileInfo(profile) => self.profile = Some(profile),
                Packet::Log(block) => log_block(&block),
                Packet::Totals(_)
                | Packet::Extremes(_)
                | Packet::ProfileEvents(_)
                | Packet::TableColumns { .. }
                | Packet::PartUUIDs(_)
                | Packet::ReadTaskRequest(_) => {}
                Packet::Exception(e) => {
                    self.finished = true;
                    return Err(Error::Server(e));
                }
                Packet::EndOfStream => self.finished = true,
                other @ (Packet::Hello(_) | Packet::Pong) => {
                    self.finished = true;
                    self.connection.disconnect();
                    return Err(Error::UnexpectedPacket(format!(
                        "Unexpected packet from server (expected query \
                         result, got {})",
                        other.name()
                    )));
                }
            }
        }
        Ok(None)
    }

    /// Next row, reading blocks as needed.
    pub async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        loop {
            if let Some(row) = self.pending_rows.pop_front() {
                return Ok(Some(row));
            }
            match self.next_block().await? {
                Some(block) => self.pending_rows.extend(block.into_rows()),
                None => return Ok(None),
            }
        }
    }

    /// Stop the query. Packets still in flight are read and discarded.
    pub async fn cancel(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.connection.send_cancel().await?;
        self.pending_rows.clear();
        loop {
            match self.next_block().await {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(()),
                Err(Error::Server(e)) if e.code == QUERY_WAS_CANCELLED => {
                    return Ok(())
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the rest of the stream.
    pub async fn collect(mut self) -> Result<QueryResult> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next_block().await? {
            blocks.push(block);
        }
        Ok(QueryResult {
            blocks,
            columns_with_types: self.columns_with_types.unwrap_or_default(),
            totals: self.totals,
            extremes: self.extremes,
            progress: self.progress,
            profile: self.profile,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Progress accumulated so far.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Known after the first Data packet.
    pub fn columns_with_types(&self) -> Option<&[(String, String)]> {
        self.columns_with_types.as_deref()
    }

    pub fn totals(&self) -> Option<&Block> {
        self.totals.as_ref()
    }

    pub fn extremes(&self) -> Option<&Block> {
        self.extremes.as_ref()
    }
}

/// Query result
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Result blocks with at least one row
    pub blocks: Vec<Block>,
    pub columns_with_types: Vec<(String, String)>,
    /// `WITH TOTALS` row
    pub totals: Option<Block>,
    /// Minimums and maximums when the `extremes` setting is on
    pub extremes: Option<Block>,
    pub progress: Progress,
    pub profile: Option<Profile>,
}

impl QueryResult {
    /// Get all blocks
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Get progress info
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Get total number of rows across all blocks
    pub fn total_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.row_count()).sum()
    }

    /// Rows of all blocks, in order.
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.blocks.into_iter().flat_map(Block::into_rows).collect()
    }
}
