/// Types of packets received from server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ServerCode {
    Hello = 0,                // Name, version, revision
    Data = 1,                 // Block of data, may be compressed
    Exception = 2,            // Exception during query execution
    Progress = 3,             // Rows and bytes read so far
    Pong = 4,                 // Response to Ping
    EndOfStream = 5,          // All packets were sent
    ProfileInfo = 6,          // Profiling data
    Totals = 7,               // Block of totals, may be compressed
    Extremes = 8,             // Block of mins and maxs, may be compressed
    TablesStatusResponse = 9, // Response to TablesStatusRequest
    Log = 10,                 // Query execution log, never compressed
    TableColumns = 11,        // Columns' description for default values
    PartUUIDs = 12,           // List of unique parts ids
    ReadTaskRequest = 13,     // UUID describes a request for next task
    ProfileEvents = 14,       // Packet with profile events from server
}

impl TryFrom<u64> for ServerCode {
    type Error = crate::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerCode::Hello),
            1 => Ok(ServerCode::Data),
            2 => Ok(ServerCode::Exception),
            3 => Ok(ServerCode::Progress),
            4 => Ok(ServerCode::Pong),
            5 => Ok(ServerCode::EndOfStream),
            6 => Ok(ServerCode::ProfileInfo),
            7 => Ok(ServerCode::Totals),
            8 => Ok(ServerCode::Extremes),
            9 => Ok(ServerCode::TablesStatusResponse),
            10 => Ok(ServerCode::Log),
            11 => Ok(ServerCode::TableColumns),
            12 => Ok(ServerCode::PartUUIDs),
            13 => Ok(ServerCode::ReadTaskRequest),
            14 => Ok(ServerCode::ProfileEvents),
            code => Err(crate::Error::UnknownPacket { code }),
        }
    }
}

impl ServerCode {
    pub fn name(self) -> &'static str {
        match self {
            ServerCode::Hello => "Hello",
            ServerCode::Data => "Data",
            ServerCode::Exception => "Exception",
            ServerCode::Progress => "Progress",
            ServerCode::Pong => "Pong",
            ServerCode::EndOfStream => "EndOfStream",
            ServerCode::ProfileInfo => "ProfileInfo",
            ServerCode::Totals => "Totals",
            ServerCode::Extremes => "Extremes",
            ServerCode::TablesStatusResponse => "TablesStatusResponse",
            ServerCode::Log => "Log",
            ServerCode::TableColumns => "TableColumns",
            ServerCode::PartUUIDs => "PartUUIDs",
            ServerCode::ReadTaskRequest => "ReadTaskRequest",
            ServerCode::ProfileEvents => "ProfileEvents",
        }
    }
}

/// Types of packets sent by client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ClientCode {
    Hello = 0,  // Name, version, default database name
    Query = 1,  // Query id, settings, stage, compression, and query text
    Data = 2,   // Data Block (e.g. INSERT data), may be compressed
    Cancel = 3, // Cancel query
    Ping = 4,   // Check server connection
    TablesStatusRequest = 5,
}

/// Should we compress Blocks of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CompressionState {
    Disable = 0,
    Enable = 1,
}

/// Query processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stage {
    FetchColumns = 0,
    WithMergeableState = 1,
    Complete = 2,
}

/// Methods of block compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    None,
    LZ4,
    LZ4HC,
    ZSTD,
}

impl CompressionMethod {
    /// Method byte written in the compressed frame header.
    pub fn method_byte(self) -> u8 {
        match self {
            CompressionMethod::None => method_byte::NONE,
            CompressionMethod::LZ4 | CompressionMethod::LZ4HC => {
                method_byte::LZ4
            }
            CompressionMethod::ZSTD => method_byte::ZSTD,
        }
    }
}

pub mod method_byte {
    pub const NONE: u8 = 0x02;
    pub const LZ4: u8 = 0x82;
    pub const ZSTD: u8 = 0x90;
}

/// Flags sent next to each setting when settings travel as strings.
pub mod settings_flags {
    pub const IMPORTANT: u64 = 0x01;
    pub const CUSTOM: u64 = 0x02;
}

/// Minimal server revisions that enable protocol features.
pub mod revision {
    pub const WITH_TEMPORARY_TABLES: u64 = 50264;
    pub const WITH_TOTAL_ROWS_IN_PROGRESS: u64 = 51554;
    pub const WITH_BLOCK_INFO: u64 = 51903;
    pub const WITH_CLIENT_INFO: u64 = 54032;
    pub const WITH_SERVER_TIMEZONE: u64 = 54058;
    pub const WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
    pub const WITH_SERVER_DISPLAY_NAME: u64 = 54372;
    pub const WITH_VERSION_PATCH: u64 = 54401;
    pub const WITH_CLIENT_WRITE_INFO: u64 = 54420;
    pub const WITH_SETTINGS_SERIALIZED_AS_STRINGS: u64 = 54429;
    pub const WITH_INTERSERVER_SECRET: u64 = 54441;
    pub const WITH_OPENTELEMETRY: u64 = 54442;
    pub const WITH_DISTRIBUTED_DEPTH: u64 = 54448;
    pub const WITH_INITIAL_QUERY_START_TIME: u64 = 54449;
    pub const WITH_PARALLEL_REPLICAS: u64 = 54453;
    pub const WITH_CUSTOM_SERIALIZATION: u64 = 54454;
    pub const WITH_PROFILE_EVENTS_IN_INSERT: u64 = 54456;
    pub const WITH_ADDENDUM: u64 = 54458;
    pub const WITH_QUOTA_KEY: u64 = 54458;
    pub const WITH_PARAMETERS: u64 = 54459;
    pub const WITH_SERVER_QUERY_TIME_IN_PROGRESS: u64 = 54460;
    pub const WITH_PASSWORD_COMPLEXITY_RULES: u64 = 54461;
    pub const WITH_INTERSERVER_SECRET_V2: u64 = 54462;
    pub const WITH_TOTAL_BYTES_IN_PROGRESS: u64 = 54463;

    /// Revision announced by this client.
    pub const CLIENT: u64 = WITH_TOTAL_BYTES_IN_PROGRESS;
}

pub const DBMS_NAME: &str = "ClickHouse";
pub const CLIENT_NAME: &str = "clickhouse-wire";
pub const CLIENT_VERSION_MAJOR: u64 = 23;
pub const CLIENT_VERSION_MINOR: u64 = 8;
pub const CLIENT_VERSION_PATCH: u64 = 0;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_SECURE_PORT: u16 = 9440;
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
pub const DEFAULT_COMPRESS_BLOCK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_INSERT_BLOCK_SIZE: usize = 1024 * 1024;
