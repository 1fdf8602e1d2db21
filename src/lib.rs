//! Client for the ClickHouse native TCP protocol.

pub mod block;
pub mod client;
pub mod column;
pub mod compression;
pub mod connection;
pub mod error;
pub mod io;
pub mod packet;
pub mod protocol;
pub mod query;
pub mod settings;
pub mod types;

#[cfg(feature = "tls")]
pub mod ssl;

pub use block::{
    Block,
    BlockInfo,
};
pub use client::{
    Client,
    ClientOptions,
    QueryResult,
    QueryStream,
};
pub use column::{
    ColumnOptions,
    Value,
};
pub use connection::{
    Connection,
    ConnectionOptions,
    ConnectionState,
    Endpoint,
};
pub use error::{
    Error,
    Result,
    ServerException,
};
pub use packet::Packet;
pub use protocol::CompressionMethod;
pub use query::{
    ExternalTable,
    Profile,
    Progress,
    ProgressCallback,
    Query,
    ServerInfo,
    TracingContext,
};
pub use settings::{
    SettingValue,
    Settings,
};
pub use types::Type;

#[cfg(feature = "tls")]
pub use ssl::SSLOptions;
