#![allow(dead_code)]
//! Scripted ClickHouse server for protocol tests.
//!
//! Each test drives the server side by hand: accept a connection, run the
//! handshake, read what the client sent and answer with raw packets.

use bytes::BytesMut;
use clickhouse_wire::{
    compression::{
        compress,
        read_frame,
        CompressedSource,
    },
    io::{
        buffer_utils,
        BlockReader,
        BlockWriter,
        BufferedReader,
        BufferedWriter,
        SocketSource,
    },
    protocol::{
        revision,
        ClientCode,
        ServerCode,
    },
    Block,
    ColumnOptions,
    CompressionMethod,
    Progress,
};
use tokio::net::{
    tcp::OwnedWriteHalf,
    TcpListener,
};

const BUFFER_SIZE: usize = 64 * 1024;

pub struct FakeServer {
    listener: TcpListener,
    revision: u64,
}

impl FakeServer {
    pub async fn bind(revision: u64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener, revision }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub async fn accept(&self) -> ServerConnection {
        let (stream, _) = self.listener.accept().await.unwrap();
        let (read_half, write_half) = stream.into_split();
        ServerConnection {
            reader: BufferedReader::new(
                SocketSource::new(read_half, None),
                BUFFER_SIZE,
            ),
            writer: BufferedWriter::new(write_half, BUFFER_SIZE, None),
            server_revision: self.revision,
            revision: self.revision.min(revision::CLIENT),
            compression: None,
        }
    }

    /// Accept a connection and complete the handshake.
    pub async fn accept_ready(&self) -> ServerConnection {
        let mut conn = self.accept().await;
        conn.handshake().await;
        conn
    }
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClientHello {
    pub client_name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub revision: u64,
    pub database: String,
    pub user: String,
    pub password: String,
    pub quota_key: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OpenTelemetry {
    pub trace_id: u128,
    pub span_id: u64,
    pub tracestate: String,
    pub trace_flags: u8,
}

#[derive(Debug, Default, Clone)]
pub struct ReceivedQuery {
    pub id: String,
    pub client_name: String,
    pub quota_key: Option<String>,
    /// `None` when the OpenTelemetry field is absent from ClientInfo.
    pub opentelemetry: Option<Option<OpenTelemetry>>,
    pub settings: Vec<(String, u64, String)>,
    pub stage: u64,
    pub compression: bool,
    pub text: String,
    pub parameters: Vec<(String, u64, String)>,
    pub external_tables: Vec<(String, Block)>,
}

pub struct ServerConnection {
    reader: BufferedReader<'static>,
    writer: BufferedWriter<OwnedWriteHalf>,
    server_revision: u64,
    revision: u64,
    compression: Option<CompressionMethod>,
}

impl ServerConnection {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Compress server Data packets with `method` once a query asks for it.
    pub fn set_compression(&mut self, method: CompressionMethod) {
        self.compression = Some(method);
    }

    pub async fn read_code(&mut self) -> u64 {
        self.reader.read_varint().await.unwrap()
    }

    pub async fn expect_code(&mut self, code: ClientCode) {
        assert_eq!(self.read_code().await, code as u64, "expected {:?}", code);
    }

    pub async fn handshake(&mut self) -> ClientHello {
        let hello = self.read_hello().await;
        self.write_hello();
        self.flush().await;
        let mut hello = hello;
        if self.revision >= revision::WITH_ADDENDUM {
            hello.quota_key = Some(self.reader.read_string().await.unwrap());
        }
        hello
    }

    pub async fn read_hello(&mut self) -> ClientHello {
        self.expect_code(ClientCode::Hello).await;
        let r = &mut self.reader;
        ClientHello {
            client_name: r.read_string().await.unwrap(),
            version_major: r.read_varint().await.unwrap(),
            version_minor: r.read_varint().await.unwrap(),
            revision: r.read_varint().await.unwrap(),
            database: r.read_string().await.unwrap(),
            user: r.read_string().await.unwrap(),
            password: r.read_string().await.unwrap(),
            quota_key: None,
        }
    }

    pub fn write_hello(&mut self) {
        let rev = self.revision;
        let w = &mut self.writer;
        w.write_varint(ServerCode::Hello as u64);
        w.write_string("ClickHouse");
        w.write_varint(23);
        w.write_varint(8);
        w.write_varint(self.server_revision);
        if rev >= revision::WITH_SERVER_TIMEZONE {
            w.write_string("UTC");
        }
        if rev >= revision::WITH_SERVER_DISPLAY_NAME {
            w.write_string("fake-node");
        }
        if rev >= revision::WITH_VERSION_PATCH {
            w.write_varint(5);
        }
        if rev >= revision::WITH_PASSWORD_COMPLEXITY_RULES {
            w.write_varint(1);
            w.write_string(".{8,}");
            w.write_string("at least 8 characters");
        }
        if rev >= revision::WITH_INTERSERVER_SECRET_V2 {
            w.write_u64_le(0x5eed);
        }
    }

    async fn read_string_list(&mut self) -> Vec<(String, u64, String)> {
        let mut items = Vec::new();
        loop {
            let name = self.reader.read_string().await.unwrap();
            if name.is_empty() {
                return items;
            }
            let flags = self.reader.read_varint().await.unwrap();
            let value = self.reader.read_string().await.unwrap();
            items.push((name, flags, value));
        }
    }

    /// Read a Query packet and the Data packets that follow it, up to the
    /// empty block closing the external tables. Pings sent ahead of the
    /// query are answered.
    pub async fn read_query(&mut self) -> ReceivedQuery {
        loop {
            let code = self.read_code().await;
            if code == ClientCode::Ping as u64 {
                self.write_pong();
                self.flush().await;
                continue;
            }
            assert_eq!(code, ClientCode::Query as u64, "expected Query");
            break;
        }
        let rev = self.revision;
        let mut query = ReceivedQuery {
            id: self.reader.read_string().await.unwrap(),
            ..Default::default()
        };

        if rev >= revision::WITH_CLIENT_INFO {
            let r = &mut self.reader;
            assert_eq!(r.read_u8().await.unwrap(), 1, "query kind");
            r.read_string().await.unwrap(); // initial user
            r.read_string().await.unwrap(); // initial query id
            r.read_string().await.unwrap(); // initial address
            if rev >= revision::WITH_INITIAL_QUERY_START_TIME {
                r.read_u64_le().await.unwrap();
            }
            assert_eq!(r.read_u8().await.unwrap(), 1, "interface");
            r.read_string().await.unwrap(); // os user
            r.read_string().await.unwrap(); // hostname
            query.client_name = r.read_string().await.unwrap();
            r.read_varint().await.unwrap();
            r.read_varint().await.unwrap();
            assert_eq!(r.read_varint().await.unwrap(), revision::CLIENT);
            if rev >= revision::WITH_QUOTA_KEY_IN_CLIENT_INFO {
                query.quota_key = Some(r.read_string().await.unwrap());
            }
            if rev >= revision::WITH_DISTRIBUTED_DEPTH {
                r.read_varint().await.unwrap();
            }
            if rev >= revision::WITH_VERSION_PATCH {
                r.read_varint().await.unwrap();
            }
            if rev >= revision::WITH_OPENTELEMETRY {
                query.opentelemetry = Some(if r.read_u8().await.unwrap() == 1 {
                    let hi = r.read_u64_le().await.unwrap() as u128;
                    let lo = r.read_u64_le().await.unwrap() as u128;
                    Some(OpenTelemetry {
                        trace_id: (hi << 64) | lo,
                        span_id: r.read_u64_le().await.unwrap(),
                        tracestate: r.read_string().await.unwrap(),
                        trace_flags: r.read_u8().await.unwrap(),
                    })
                } else {
                    None
                });
            }
            if rev >= revision::WITH_PARALLEL_REPLICAS {
                for _ in 0..3 {
                    r.read_varint().await.unwrap();
                }
            }
        }

        assert!(rev >= revision::WITH_SETTINGS_SERIALIZED_AS_STRINGS);
        query.settings = self.read_string_list().await;
        if rev >= revision::WITH_INTERSERVER_SECRET {
            assert_eq!(self.reader.read_string().await.unwrap(), "");
        }
        query.stage = self.reader.read_varint().await.unwrap();
        query.compression = self.reader.read_varint().await.unwrap() == 1;
        query.text = self.reader.read_string().await.unwrap();
        if rev >= revision::WITH_PARAMETERS {
            query.parameters = self.read_string_list().await;
        }

        loop {
            let (name, block) = self.read_data(query.compression).await;
            if block.column_count() == 0 {
                break;
            }
            query.external_tables.push((name, block));
        }
        query
    }

    /// Read one client Data packet.
    pub async fn read_data(&mut self, compressed: bool) -> (String, Block) {
        self.expect_code(ClientCode::Data).await;
        let name = self.reader.read_string().await.unwrap();
        let blocks = BlockReader::new(self.revision, ColumnOptions::default());
        let block = if compressed {
            let mut reader =
                BufferedReader::new(CompressedSource::new(&mut self.reader), BUFFER_SIZE);
            blocks.read_block(&mut reader).await.unwrap()
        } else {
            blocks.read_block(&mut self.reader).await.unwrap()
        };
        (name, block)
    }

    /// Read a compressed Data packet whose block must arrive as exactly
    /// one frame.
    pub async fn read_data_single_frame(&mut self) -> (String, Block) {
        self.expect_code(ClientCode::Data).await;
        let name = self.reader.read_string().await.unwrap();
        let raw = read_frame(&mut self.reader).await.unwrap();
        let mut reader = BufferedReader::from_bytes(raw);
        let block = BlockReader::new(self.revision, ColumnOptions::default())
            .read_block(&mut reader)
            .await
            .unwrap();
        assert_eq!(reader.remaining_buffered(), 0, "block spans several frames");
        (name, block)
    }

    fn write_block_packet(&mut self, code: ServerCode, block: &Block, compress_it: bool) {
        let mut payload = BytesMut::new();
        BlockWriter::new(self.revision, ColumnOptions::default())
            .write_block(block, &mut payload)
            .unwrap();
        self.writer.write_varint(code as u64);
        self.writer.write_string("");
        match self.compression.filter(|_| compress_it) {
            Some(method) => self.writer.write_bytes(&compress(method, &payload).unwrap()),
            None => self.writer.write_bytes(&payload),
        }
    }

    pub fn write_data(&mut self, block: &Block) {
        self.write_block_packet(ServerCode::Data, block, true);
    }

    pub fn write_totals(&mut self, block: &Block) {
        self.write_block_packet(ServerCode::Totals, block, true);
    }

    pub fn write_log(&mut self, block: &Block) {
        self.write_block_packet(ServerCode::Log, block, false);
    }

    pub fn write_profile_events(&mut self) {
        let block = Block::with_structure(&[("name", "String"), ("value", "Int64")]);
        self.write_block_packet(ServerCode::ProfileEvents, &block, false);
    }

    pub fn write_table_columns(&mut self, description: &str) {
        self.writer.write_varint(ServerCode::TableColumns as u64);
        self.writer.write_string("");
        self.writer.write_string(description);
    }

    pub fn write_progress(&mut self, progress: &Progress) {
        let rev = self.revision;
        let w = &mut self.writer;
        w.write_varint(ServerCode::Progress as u64);
        w.write_varint(progress.rows);
        w.write_varint(progress.bytes);
        if rev >= revision::WITH_TOTAL_ROWS_IN_PROGRESS {
            w.write_varint(progress.total_rows);
        }
        if rev >= revision::WITH_TOTAL_BYTES_IN_PROGRESS {
            w.write_varint(progress.total_bytes);
        }
        if rev >= revision::WITH_CLIENT_WRITE_INFO {
            w.write_varint(progress.written_rows);
            w.write_varint(progress.written_bytes);
        }
        if rev >= revision::WITH_SERVER_QUERY_TIME_IN_PROGRESS {
            w.write_varint(progress.elapsed_ns);
        }
    }

    pub fn write_profile_info(&mut self, rows: u64) {
        let w = &mut self.writer;
        w.write_varint(ServerCode::ProfileInfo as u64);
        w.write_varint(rows);
        w.write_varint(1);
        w.write_varint(rows * 8);
        w.write_u8(0);
        w.write_varint(0);
        w.write_u8(0);
    }

    /// Write an exception chain, outermost first.
    pub fn write_exception(&mut self, chain: &[(i32, &str)]) {
        self.writer.write_varint(ServerCode::Exception as u64);
        let mut buf = BytesMut::new();
        for (index, (code, message)) in chain.iter().enumerate() {
            buf.extend_from_slice(&code.to_le_bytes());
            buffer_utils::write_string(&mut buf, "DB::Exception");
            buffer_utils::write_string(&mut buf, message);
            buffer_utils::write_string(&mut buf, "");
            buf.extend_from_slice(&[(index + 1 < chain.len()) as u8]);
        }
        self.writer.write_bytes(&buf);
    }

    pub fn write_pong(&mut self) {
        self.writer.write_varint(ServerCode::Pong as u64);
    }

    pub fn write_end_of_stream(&mut self) {
        self.writer.write_varint(ServerCode::EndOfStream as u64);
    }

    pub async fn flush(&mut self) {
        self.writer.flush().await.unwrap();
    }

    /// Answer a Ping.
    pub async fn serve_ping(&mut self) {
        self.expect_code(ClientCode::Ping).await;
        self.write_pong();
        self.flush().await;
    }

    /// Answer the next query with `block` followed by EndOfStream.
    pub async fn serve_select(&mut self, block: &Block) -> ReceivedQuery {
        let query = self.read_query().await;
        if query.compression {
            self.compression.get_or_insert(CompressionMethod::LZ4);
        }
        self.write_data(&Block::with_structure(&block.columns_with_types()));
        self.write_data(block);
        self.write_end_of_stream();
        self.flush().await;
        query
    }
}

/// ClickHouse host for the ignored live-server tests.
pub fn get_clickhouse_host() -> String {
    std::env::var("CLICKHOUSE_HOST").unwrap_or_else(|_| "localhost".to_string())
}

/// Connect to the live server and create a database only this test uses.
pub async fn create_isolated_test_client(
    test_name: &str,
) -> Result<(clickhouse_wire::Client, String), clickhouse_wire::Error> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let db_name = format!("test_{}_{}", test_name.replace(['-', ' '], "_"), nanos);

    let options =
        clickhouse_wire::ClientOptions::new(get_clickhouse_host(), 9000);
    let mut client = clickhouse_wire::Client::connect(options.clone()).await?;
    client.execute(format!("CREATE DATABASE {}", db_name)).await?;
    drop(client);

    let client =
        clickhouse_wire::Client::connect(options.database(db_name.clone())).await?;
    Ok((client, db_name))
}

pub async fn cleanup_test_database(db_name: &str) {
    let options =
        clickhouse_wire::ClientOptions::new(get_clickhouse_host(), 9000);
    if let Ok(mut client) = clickhouse_wire::Client::connect(options).await {
        let _ = client.execute(format!("DROP DATABASE IF EXISTS {}", db_name)).await;
    }
}
