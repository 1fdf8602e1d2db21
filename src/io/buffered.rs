//! Read-ahead and write-behind buffers over the connection's byte streams.
//!
//! [`BufferedReader`] keeps a fixed-size buffer plus a cursor and refills it
//! from a [`Source`] once the cursor reaches the filled length. The socket
//! and the decompressing frame reader are both sources, so column decoders
//! never know whether the bytes they consume were compressed on the wire.
//!
//! [`BufferedWriter`] accumulates outgoing bytes in memory; nothing reaches
//! the socket until [`BufferedWriter::flush`] is called at a message
//! boundary.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
};

use crate::column::Value;
use crate::io::buffer_utils;
use crate::{
    Error,
    Result,
};

/// Largest single read a length prefix may ask for (1 GiB).
pub const MAX_READ_SIZE: usize = 0x4000_0000;

/// Something the reader can pull more bytes from.
#[async_trait]
pub trait Source: Send {
    /// Fill `buf` with at least one byte and return how many were written.
    /// Returning 0 means the source is exhausted.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Bytes already pulled from the underlying stream but not yet handed
    /// out through `fill`.
    fn pending(&self) -> usize {
        0
    }
}

/// Socket (or any async stream) source with an optional per-read timeout.
pub struct SocketSource<R> {
    inner: R,
    timeout: Option<Duration>,
}

impl<R> SocketSource<R> {
    pub fn new(inner: R, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Source for SocketSource<R> {
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.read(buf))
                .await
                .map_err(|_| {
                    Error::SocketTimeout(format!(
                        "no data received within {:?}",
                        limit
                    ))
                })?
                .map_err(Error::from),
            None => Ok(self.inner.read(buf).await?),
        }
    }
}

/// In-memory source, used for decoding detached payloads.
pub struct MemorySource {
    data: Bytes,
}

#[async_trait]
impl Source for MemorySource {
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data.split_to(n));
        Ok(n)
    }

    fn pending(&self) -> usize {
        self.data.len()
    }
}

pub struct BufferedReader<'a> {
    source: Box<dyn Source + 'a>,
    buffer: Vec<u8>,
    position: usize,
    filled: usize,
}

impl<'a> BufferedReader<'a> {
    pub fn new(source: impl Source + 'a, capacity: usize) -> Self {
        Self {
            source: Box::new(source),
            buffer: vec![0; capacity.max(1)],
            position: 0,
            filled: 0,
        }
    }

    /// Reader over bytes that are already in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> BufferedReader<'static> {
        let data = data.into();
        let capacity = data.len().clamp(1, crate::protocol::DEFAULT_BUFFER_SIZE);
        BufferedReader::new(MemorySource { data }, capacity)
    }

    /// Bytes that were read from the source but not consumed yet.
    pub fn remaining_buffered(&self) -> usize {
        self.filled - self.position + self.source.pending()
    }

    async fn refill(&mut self) -> Result<()> {
        if self.position < self.filled {
            return Ok(());
        }
        self.position = 0;
        self.filled = 0;
        let n = self.source.fill(&mut self.buffer).await?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        self.filled = n;
        Ok(())
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        self.refill().await?;
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    /// Fill `out` completely, refilling the buffer as many times as needed.
    pub async fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let mut written = 0;
        while written < out.len() {
            self.refill().await?;
            let n = (self.filled - self.position).min(out.len() - written);
            out[written..written + n].copy_from_slice(
                &self.buffer[self.position..self.position + n],
            );
            self.position += n;
            written += n;
        }
        Ok(())
    }

    /// Return a view of the next `n` bytes. Borrowed from the buffer when
    /// they are already there, copied when they span a refill.
    pub async fn read(&mut self, n: usize) -> Result<Cow<'_, [u8]>> {
        if self.filled - self.position >= n {
            let start = self.position;
            self.position += n;
            return Ok(Cow::Borrowed(&self.buffer[start..start + n]));
        }
        if n > MAX_READ_SIZE {
            return Err(Error::Protocol(format!(
                "read of {} bytes exceeds the {} byte limit",
                n, MAX_READ_SIZE
            )));
        }
        // Grow with the data actually received, not the announced length.
        let mut out = Vec::with_capacity(n.min(self.buffer.len()));
        while out.len() < n {
            self.refill().await?;
            let take = (self.filled - self.position).min(n - out.len());
            out.extend_from_slice(&self.buffer[self.position..self.position + take]);
            self.position += take;
        }
        Ok(Cow::Owned(out))
    }

    pub async fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;

        loop {
            let byte = self.read_u8().await?;
            result |= ((byte & 0x7F) as u64) << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }

            shift += 7;
            if shift >= 64 {
                return Err(Error::Protocol("Varint overflow".to_string()));
            }
        }
    }

    pub async fn read_binary(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint().await? as usize;
        Ok(self.read(len).await?.into_owned())
    }

    /// Length-prefixed string; invalid UTF-8 is replaced rather than
    /// rejected since these are names and messages, not column data.
    pub async fn read_string(&mut self) -> Result<String> {
        let data = self.read_binary().await?;
        Ok(match String::from_utf8(data) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Read `n` length-prefixed strings. With `decode`, each item becomes a
    /// `Value::String` when it is valid UTF-8 and stays `Value::Bytes`
    /// otherwise.
    pub async fn read_strings(
        &mut self,
        n: usize,
        decode: bool,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            let data = self.read_binary().await?;
            let value = if decode {
                match String::from_utf8(data) {
                    Ok(s) => Value::String(s),
                    Err(e) => Value::Bytes(e.into_bytes()),
                }
            } else {
                Value::Bytes(data)
            };
            items.push(value);
        }
        Ok(items)
    }

    pub async fn read_i32_le(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        self.read_exact(&mut raw).await?;
        Ok(i32::from_le_bytes(raw))
    }

    pub async fn read_u32_le(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_exact(&mut raw).await?;
        Ok(u32::from_le_bytes(raw))
    }

    pub async fn read_u64_le(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.read_exact(&mut raw).await?;
        Ok(u64::from_le_bytes(raw))
    }

    pub async fn read_i64_le(&mut self) -> Result<i64> {
        let mut raw = [0u8; 8];
        self.read_exact(&mut raw).await?;
        Ok(i64::from_le_bytes(raw))
    }

    /// Two little-endian u64 halves, high half first.
    pub async fn read_u128_hi_lo(&mut self) -> Result<u128> {
        let hi = self.read_u64_le().await?;
        let lo = self.read_u64_le().await?;
        Ok(((hi as u128) << 64) | lo as u128)
    }
}

pub struct BufferedWriter<W> {
    inner: W,
    buffer: BytesMut,
    capacity: usize,
    timeout: Option<Duration>,
}

impl<W: AsyncWrite + Unpin + Send> BufferedWriter<W> {
    pub fn new(inner: W, capacity: usize, timeout: Option<Duration>) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(capacity.min(64 * 1024)),
            capacity: capacity.max(1),
            timeout,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Bytes written but not flushed yet.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_varint(&mut self, value: u64) {
        buffer_utils::write_varint(&mut self.buffer, value);
    }

    pub fn write_string(&mut self, value: &str) {
        buffer_utils::write_string(&mut self.buffer, value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.put_slice(data);
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buffer.put_i32_le(value);
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buffer.put_u64_le(value);
    }

    /// Two little-endian u64 halves, high half first.
    pub fn write_u128_hi_lo(&mut self, value: u128) {
        self.buffer.put_u64_le((value >> 64) as u64);
        self.buffer.put_u64_le(value as u64);
    }

    /// Append `data` in pieces of at most `chunk_size` bytes, handing full
    /// buffers to the socket as they fill up.
    pub async fn write_chunked(
        &mut self,
        data: &[u8],
        chunk_size: usize,
    ) -> Result<()> {
        for chunk in data.chunks(chunk_size.max(1)) {
            self.buffer.put_slice(chunk);
            if self.buffer.len() >= self.capacity {
                self.drain().await?;
            }
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = self.buffer.split().freeze();
        let write = self.inner.write_all(&data);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, write).await.map_err(
                |_| {
                    Error::SocketTimeout(format!(
                        "send did not complete within {:?}",
                        limit
                    ))
                },
            )??,
            None => write.await?,
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.drain().await?;
        self.inner.flush().await?;
        Ok(())
    }
}
