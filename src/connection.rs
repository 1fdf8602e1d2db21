//! A single connection to a server and the packet-level protocol on it.
//!
//! The connection owns the socket, performs the handshake and tracks the
//! negotiated revision. It knows how to write the client packets and how to
//! decode any server packet, but not how packets combine into a query; that
//! lives in [`crate::client`].
//!
//! State transitions:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> AwaitingResponse -> Connected
//!       ^_______________________________________|  (fatal error)
//! ```

use std::fmt;
use std::time::Duration;

use bytes::BytesMut;
use socket2::{
    SockRef,
    TcpKeepalive,
};
use tokio::io::{
    AsyncRead,
    AsyncWrite,
    WriteHalf,
};
use tokio::net::TcpStream;
use tracing::{
    debug,
    info,
    trace,
    warn,
};

use crate::block::Block;
use crate::column::ColumnOptions;
use crate::compression::{
    compress,
    CompressedSource,
};
use crate::io::buffer_utils;
use crate::io::{
    BlockReader,
    BlockWriter,
    BufferedReader,
    BufferedWriter,
    SocketSource,
};
use crate::packet::{
    read_exception,
    Packet,
};
use crate::protocol::{
    revision,
    ClientCode,
    CompressionMethod,
    CompressionState,
    ServerCode,
    Stage,
    CLIENT_NAME,
    CLIENT_VERSION_MAJOR,
    CLIENT_VERSION_MINOR,
    DBMS_NAME,
    DEFAULT_BUFFER_SIZE,
    DEFAULT_COMPRESS_BLOCK_SIZE,
    DEFAULT_PORT,
};
use crate::query::{
    ClientInfo,
    Profile,
    Progress,
    Query,
    ServerInfo,
    TracingContext,
};
use crate::settings::Settings;
#[cfg(feature = "tls")]
use crate::ssl::SSLOptions;
use crate::{
    Error,
    Result,
};

/// Server address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection-level options
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// Servers to try in order; a failed connect moves on to the next one.
    pub endpoints: Vec<Endpoint>,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Announced as `ClickHouse <client_name>`.
    pub client_name: String,
    pub quota_key: String,
    /// `None` disables compression; `Some(CompressionMethod::None)` sends
    /// framed but uncompressed blocks.
    pub compression: Option<CompressionMethod>,
    pub connect_timeout: Duration,
    pub send_receive_timeout: Duration,
    /// Bound on ping round trips.
    pub sync_request_timeout: Duration,
    /// Idle time before TCP keepalive probes start, if enabled.
    pub tcp_keepalive: Option<Duration>,
    pub buffer_size: usize,
    pub compress_block_size: usize,
    pub column_options: ColumnOptions,
    #[cfg(feature = "tls")]
    pub ssl: Option<SSLOptions>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::new("localhost", DEFAULT_PORT)],
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            client_name: CLIENT_NAME.to_string(),
            quota_key: String::new(),
            compression: None,
            connect_timeout: Duration::from_secs(10),
            send_receive_timeout: Duration::from_secs(300),
            sync_request_timeout: Duration::from_secs(5),
            tcp_keepalive: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            compress_block_size: DEFAULT_COMPRESS_BLOCK_SIZE,
            column_options: ColumnOptions::default(),
            #[cfg(feature = "tls")]
            ssl: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A query was sent and its packet stream hasn't reached EndOfStream.
    AwaitingResponse,
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type BoxedStream = Box<dyn AsyncStream>;

struct Transport {
    reader: BufferedReader<'static>,
    writer: BufferedWriter<WriteHalf<BoxedStream>>,
}

pub struct Connection {
    options: ConnectionOptions,
    current_endpoint: usize,
    transport: Option<Transport>,
    server_info: Option<ServerInfo>,
    state: ConnectionState,
}

/// Attach the endpoint to transport errors raised while connecting.
fn connect_error(error: Error, endpoint: &Endpoint) -> Error {
    match error {
        Error::Io(e) => Error::Network(format!("{} ({})", e, endpoint)),
        Error::UnexpectedEof => Error::Network(format!(
            "Connection closed by server during handshake ({})",
            endpoint
        )),
        Error::SocketTimeout(msg) => {
            Error::SocketTimeout(format!("{} ({})", msg, endpoint))
        }
        other => other,
    }
}

async fn read_data(
    reader: &mut BufferedReader<'_>,
    revision: u64,
    columns: ColumnOptions,
    compressed: bool,
    buffer_size: usize,
) -> Result<Block> {
    if revision >= revision::WITH_TEMPORARY_TABLES {
        reader.read_string().await?;
    }
    let block_reader = BlockReader::new(revision, columns);
    if !compressed {
        return block_reader.read_block(reader).await;
    }

    let mut decompressed =
        BufferedReader::new(CompressedSource::new(reader), buffer_size);
    let block = block_reader.read_block(&mut decompressed).await?;
    let leftover = decompressed.remaining_buffered();
    if leftover > 0 {
        return Err(Error::Protocol(format!(
            "{} decompressed bytes left unread after block",
            leftover
        )));
    }
    Ok(block)
}

impl Connection {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            current_endpoint: 0,
            transport: None,
            server_info: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Negotiated revision, 0 while disconnected.
    pub fn revision(&self) -> u64 {
        self.server_info.as_ref().map_or(0, |info| info.used_revision)
    }

    /// Endpoint of the live connection.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.is_connected()
            .then(|| &self.options.endpoints[self.current_endpoint])
    }

    fn compression_enabled(&self) -> bool {
        self.options.compression.is_some()
    }

    fn transport_mut(&mut self) -> Result<&mut Transport> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Network("Not connected".to_string()))
    }

    /// Disconnect on errors that leave the stream in an unknown position.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.is_connected() {
                warn!(error = %e, "Closing connection after error");
                self.disconnect();
            }
        }
        result
    }

    /// Open a connection, trying every endpoint once starting with the last
    /// one that worked.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }
        let count = self.options.endpoints.len();
        if count == 0 {
            return Err(Error::InvalidArgument(
                "No endpoints configured".to_string(),
            ));
        }

        self.state = ConnectionState::Connecting;
        let mut last_error = None;
        for attempt in 0..count {
            let index = (self.current_endpoint + attempt) % count;
            let endpoint = self.options.endpoints[index].clone();
            debug!(%endpoint, "Connecting");

            match self.connect_to(&endpoint).await {
                Ok(()) => {
                    self.current_endpoint = index;
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(e) => {
                    self.transport = None;
                    self.server_info = None;
                    let e = connect_error(e, &endpoint);
                    if !matches!(e, Error::Network(_) | Error::SocketTimeout(_)) {
                        self.state = ConnectionState::Disconnected;
                        return Err(e);
                    }
                    warn!(%endpoint, error = %e, "Failed to connect");
                    last_error = Some(e);
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(last_error
            .unwrap_or_else(|| Error::Network("No endpoint reachable".into())))
    }

    async fn open_stream(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        let limit = self.options.connect_timeout;
        let stream = tokio::time::timeout(
            limit,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| {
            Error::SocketTimeout(format!("connect timed out after {:?}", limit))
        })??;

        stream.set_nodelay(true)?;
        if let Some(idle) = self.options.tcp_keepalive {
            SockRef::from(&stream)
                .set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        }

        #[cfg(feature = "tls")]
        if let Some(ssl) = &self.options.ssl {
            return Ok(Box::new(ssl.connect(&endpoint.host, stream).await?));
        }
        Ok(Box::new(stream))
    }

    async fn connect_to(&mut self, endpoint: &Endpoint) -> Result<()> {
        let stream = self.open_stream(endpoint).await?;
        let (read_half, write_half) = tokio::io::split(stream);
        let timeout = Some(self.options.send_receive_timeout);
        let buffer_size = self.options.buffer_size;
        self.transport = Some(Transport {
            reader: BufferedReader::new(
                SocketSource::new(read_half, timeout),
                buffer_size,
            ),
            writer: BufferedWriter::new(write_half, buffer_size, timeout),
        });

        self.send_hello().await?;
        let info = self.receive_hello(endpoint).await?;
        info!(
            %endpoint,
            server = %info.name,
            version = %format!("{}.{}.{}", info.version_major, info.version_minor, info.version_patch),
            revision = info.used_revision,
            "Connected"
        );
        let used_revision = info.used_revision;
        self.server_info = Some(info);

        if used_revision >= revision::WITH_ADDENDUM {
            let quota_key = self.options.quota_key.clone();
            let transport = self.transport_mut()?;
            transport.writer.write_string(&quota_key);
            transport.writer.flush().await?;
        }
        Ok(())
    }

    async fn send_hello(&mut self) -> Result<()> {
        let mut buf = BytesMut::new();
        buffer_utils::write_varint(&mut buf, ClientCode::Hello as u64);
        buffer_utils::write_string(
            &mut buf,
            &format!("{} {}", DBMS_NAME, self.options.client_name),
        );
        buffer_utils::write_varint(&mut buf, CLIENT_VERSION_MAJOR);
        buffer_utils::write_varint(&mut buf, CLIENT_VERSION_MINOR);
        buffer_utils::write_varint(&mut buf, revision::CLIENT);
        buffer_utils::write_string(&mut buf, &self.options.database);
        buffer_utils::write_string(&mut buf, &self.options.user);
        buffer_utils::write_string(&mut buf, &self.options.password);

        let transport = self.transport_mut()?;
        transport.writer.write_bytes(&buf);
        transport.writer.flush().await
    }

    async fn receive_hello(&mut self, endpoint: &Endpoint) -> Result<ServerInfo> {
        let transport = self.transport_mut()?;
        let code = transport.reader.read_varint().await?;
        match ServerCode::try_from(code)? {
            ServerCode::Hello => {
                ServerInfo::read_from(&mut transport.reader, revision::CLIENT).await
            }
            ServerCode::Exception => {
                Err(Error::Server(read_exception(&mut transport.reader).await?))
            }
            other => Err(Error::UnexpectedPacket(format!(
                "Unexpected packet from server {} (expected Hello or \
                 Exception, got {})",
                endpoint,
                other.name()
            ))),
        }
    }

    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            debug!("Disconnected");
        }
        self.server_info = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Make sure the connection is usable: connect when disconnected,
    /// reconnect when an idle connection fails its ping.
    pub async fn force_connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::AwaitingResponse {
            return Err(Error::PartiallyConsumedQuery);
        }
        if !self.is_connected() {
            return self.connect().await;
        }
        if !self.ping().await? {
            warn!("Connection was closed, reconnecting");
            self.connect().await?;
        }
        Ok(())
    }

    /// Round trip a Ping. Transport failures report `false` and drop the
    /// connection; protocol violations are errors.
    pub async fn ping(&mut self) -> Result<bool> {
        if self.state == ConnectionState::AwaitingResponse {
            return Err(Error::PartiallyConsumedQuery);
        }
        if !self.is_connected() {
            return Ok(false);
        }
        let limit = self.options.sync_request_timeout;
        let outcome = tokio::time::timeout(limit, self.ping_round_trip()).await;
        match outcome {
            Ok(Ok(())) => Ok(true),
            Ok(Err(
                e @ (Error::Io(_)
                | Error::UnexpectedEof
                | Error::Network(_)
                | Error::SocketTimeout(_)),
            )) => {
                warn!(error = %e, "Ping failed");
                self.disconnect();
                Ok(false)
            }
            Ok(Err(e)) => self.check(Err(e)),
            Err(_) => {
                warn!("Ping timed out after {:?}", limit);
                self.disconnect();
                Ok(false)
            }
        }
    }

    async fn ping_round_trip(&mut self) -> Result<()> {
        let revision = self.revision();
        let transport = self.transport_mut()?;
        transport.writer.write_varint(ClientCode::Ping as u64);
        transport.writer.flush().await?;

        loop {
            let code = transport.reader.read_varint().await?;
            match ServerCode::try_from(code)? {
                ServerCode::Pong => return Ok(()),
                ServerCode::Progress => {
                    Progress::read_from(&mut transport.reader, revision).await?;
                }
                other => {
                    return Err(Error::UnexpectedPacket(format!(
                        "Unexpected packet from server (expected Pong, got {})",
                        other.name()
                    )))
                }
            }
        }
    }

    /// Send a query, its external tables and the closing empty block.
    pub async fn send_query(
        &mut self,
        query: &Query,
        settings: &Settings,
        settings_important: bool,
        tracing_context: Option<&TracingContext>,
    ) -> Result<()> {
        if self.state == ConnectionState::AwaitingResponse {
            return Err(Error::PartiallyConsumedQuery);
        }
        let revision = self.revision();
        if !query.parameters().is_empty() && revision < revision::WITH_PARAMETERS {
            return Err(Error::InvalidArgument(format!(
                "Server revision {} does not support query parameters",
                revision
            )));
        }

        let mut buf = BytesMut::new();
        buffer_utils::write_varint(&mut buf, ClientCode::Query as u64);
        buffer_utils::write_string(&mut buf, query.id());

        if revision >= revision::WITH_CLIENT_INFO {
            let mut info = ClientInfo::new(
                self.options.client_name.clone(),
                self.options.quota_key.clone(),
            );
            info.tracing_context = tracing_context.cloned();
            info.write_to(&mut buf, revision);
        }

        settings.write_to(&mut buf, revision, settings_important);

        if revision >= revision::WITH_INTERSERVER_SECRET {
            buffer_utils::write_string(&mut buf, "");
        }

        let compression = if self.compression_enabled() {
            CompressionState::Enable
        } else {
            CompressionState::Disable
        };
        buffer_utils::write_varint(&mut buf, Stage::Complete as u64);
        buffer_utils::write_varint(&mut buf, compression as u64);
        buffer_utils::write_string(&mut buf, query.text());

        if revision >= revision::WITH_PARAMETERS {
            query.write_parameters(&mut buf);
        }

        for table in query.external_tables() {
            debug!(
                table = %table.name,
                rows = table.block.row_count(),
                "Sending external table"
            );
            buf.extend_from_slice(&self.encode_data(&table.block, &table.name)?);
        }
        buf.extend_from_slice(&self.encode_data(&Block::new(), "")?);

        debug!(query_id = query.id(), query = query.text(), "Sending query");
        let result: Result<()> = async {
            self.write_packet(&buf).await?;
            self.state = ConnectionState::AwaitingResponse;
            self.transport_mut()?.writer.flush().await
        }
        .await;
        self.check(result)
    }

    /// Encode a complete Data packet. With compression on, the block is one
    /// frame.
    fn encode_data(&self, block: &Block, table_name: &str) -> Result<BytesMut> {
        let revision = self.revision();
        let mut payload = BytesMut::new();
        BlockWriter::new(revision, self.options.column_options)
            .write_block(block, &mut payload)?;

        let mut packet = BytesMut::with_capacity(payload.len() + 32);
        buffer_utils::write_varint(&mut packet, ClientCode::Data as u64);
        if revision >= revision::WITH_TEMPORARY_TABLES {
            buffer_utils::write_string(&mut packet, table_name);
        }
        match self.options.compression {
            Some(method) => packet.extend_from_slice(&compress(method, &payload)?),
            None => packet.extend_from_slice(&payload),
        }
        Ok(packet)
    }

    /// Queue encoded bytes, handing them to the socket in
    /// `compress_block_size` pieces.
    async fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        let block_size = self.options.compress_block_size;
        self.transport_mut()?
            .writer
            .write_chunked(packet, block_size)
            .await
    }

    /// Send one Data packet and flush.
    pub async fn send_data(&mut self, block: &Block) -> Result<()> {
        trace!(
            columns = block.column_count(),
            rows = block.row_count(),
            "Sending block"
        );
        let packet = self.encode_data(block, "")?;
        let result: Result<()> = async {
            self.write_packet(&packet).await?;
            self.transport_mut()?.writer.flush().await
        }
        .await;
        self.check(result)
    }

    /// Ask the server to stop the running query. Packets keep arriving
    /// until EndOfStream.
    pub async fn send_cancel(&mut self) -> Result<()> {
        debug!("Cancelling query");
        let result: Result<()> = async {
            let transport = self.transport_mut()?;
            transport.writer.write_varint(ClientCode::Cancel as u64);
            transport.writer.flush().await
        }
        .await;
        self.check(result)
    }

    /// Read the next packet. EndOfStream and Exception end the current
    /// query. Any read error closes the connection, since the position in
    /// the stream is lost.
    pub async fn receive_packet(&mut self) -> Result<Packet> {
        let result = self.read_packet().await;
        match &result {
            Ok(Packet::EndOfStream) | Ok(Packet::Exception(_)) => {
                self.state = ConnectionState::Connected;
            }
            Ok(packet) => trace!(packet = packet.name(), "Received packet"),
            Err(e) if self.is_connected() => {
                warn!(error = %e, "Closing connection after read error");
                self.disconnect();
            }
            Err(_) => {}
        }
        result
    }

    async fn read_packet(&mut self) -> Result<Packet> {
        let revision = self.revision();
        let columns = self.options.column_options;
        let compressed = self.compression_enabled();
        let buffer_size = self.options.buffer_size;
        let reader = &mut self.transport_mut()?.reader;

        let code = reader.read_varint().await?;
        let packet = match ServerCode::try_from(code)? {
            ServerCode::Hello => {
                Packet::Hello(ServerInfo::read_from(reader, revision::CLIENT).await?)
            }
            ServerCode::Data => Packet::Data(
                read_data(reader, revision, columns, compressed, buffer_size).await?,
            ),
            ServerCode::Exception => Packet::Exception(read_exception(reader).await?),
            ServerCode::Progress => {
                Packet::Progress(Progress::read_from(reader, revision).await?)
            }
            ServerCode::Pong => Packet::Pong,
            ServerCode::EndOfStream => Packet::EndOfStream,
            ServerCode::ProfileInfo => {
                Packet::ProfileInfo(Profile::read_from(reader).await?)
            }
            ServerCode::Totals => Packet::Totals(
                read_data(reader, revision, columns, compressed, buffer_size).await?,
            ),
            ServerCode::Extremes => Packet::Extremes(
                read_data(reader, revision, columns, compressed, buffer_size).await?,
            ),
            ServerCode::Log => Packet::Log(
                read_data(reader, revision, columns, false, buffer_size).await?,
            ),
            ServerCode::TableColumns => Packet::TableColumns {
                table_name: reader.read_string().await?,
                description: reader.read_string().await?,
            },
            ServerCode::PartUUIDs => Packet::PartUUIDs(
                read_data(reader, revision, columns, compressed, buffer_size).await?,
            ),
            ServerCode::ReadTaskRequest => Packet::ReadTaskRequest(
                read_data(reader, revision, columns, compressed, buffer_size).await?,
            ),
            ServerCode::ProfileEvents => Packet::ProfileEvents(
                read_data(reader, revision, columns, false, buffer_size).await?,
            ),
            ServerCode::TablesStatusResponse => {
                return Err(Error::UnknownPacket { code })
            }
        };
        Ok(packet)
    }
}
