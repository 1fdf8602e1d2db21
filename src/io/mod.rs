//! I/O layer between the socket and the column codecs.
//!
//! - [`buffer_utils`]: varint and length-prefixed string primitives over
//!   in-memory buffers.
//! - [`buffered`]: read-ahead and write-behind buffers over async streams.
//! - [`block_stream`]: block encoding and decoding on top of the above.

pub mod block_stream;
pub mod buffer_utils;
pub mod buffered;

pub use block_stream::{
    BlockReader,
    BlockWriter,
};
pub use buffered::{
    BufferedReader,
    BufferedWriter,
    MemorySource,
    SocketSource,
    Source,
};
