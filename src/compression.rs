//! Compressed frames.
//!
//! When compression is enabled, block payloads travel as a sequence of
//! frames:
//!
//! ```text
//! checksum: 16 bytes   CityHash128 (v1.0.2) of everything after it
//! method:   1 byte     0x02 none, 0x82 LZ4/LZ4HC, 0x90 ZSTD
//! size:     UInt32     compressed size including the 9-byte header
//! raw size: UInt32     decompressed size
//! payload
//! ```
//!
//! The client writes each block as a single frame. Readers treat the
//! decompressed frames as one continuous stream, so a block received from
//! the server may span several frames.

use async_trait::async_trait;
use bytes::{
    Buf,
    BufMut,
    Bytes,
    BytesMut,
};
use cityhash_rs::cityhash_102_128;
use lz4::block::CompressionMode;

use crate::io::buffered::Source;
use crate::io::BufferedReader;
use crate::protocol::{
    method_byte,
    CompressionMethod,
};
use crate::{
    Error,
    Result,
};

const CHECKSUM_SIZE: usize = 16;
const HEADER_SIZE: usize = 9;
/// Upper bound for either size field of a frame (1 GiB).
const MAX_FRAME_SIZE: usize = 0x4000_0000;
const LZ4HC_LEVEL: i32 = 9;
const ZSTD_LEVEL: i32 = 1;

fn checksum(data: &[u8]) -> u128 {
    cityhash_102_128(data)
}

fn compress_payload(method: CompressionMethod, data: &[u8]) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::LZ4 => Ok(lz4::block::compress(data, None, false)?),
        CompressionMethod::LZ4HC => Ok(lz4::block::compress(
            data,
            Some(CompressionMode::HIGHCOMPRESSION(LZ4HC_LEVEL)),
            false,
        )?),
        CompressionMethod::ZSTD => zstd::bulk::compress(data, ZSTD_LEVEL)
            .map_err(|e| {
                Error::Compression(format!("ZSTD compression failed: {}", e))
            }),
    }
}

/// Build one frame holding `data`.
pub fn compress(method: CompressionMethod, data: &[u8]) -> Result<Bytes> {
    let payload = compress_payload(method, data)?;

    let mut frame = BytesMut::with_capacity(CHECKSUM_SIZE + HEADER_SIZE + payload.len());
    frame.put_bytes(0, CHECKSUM_SIZE);
    frame.put_u8(method.method_byte());
    frame.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    frame.put_u32_le(data.len() as u32);
    frame.put_slice(&payload);

    let hash = checksum(&frame[CHECKSUM_SIZE..]);
    frame[..8].copy_from_slice(&((hash >> 64) as u64).to_le_bytes());
    frame[8..16].copy_from_slice(&(hash as u64).to_le_bytes());
    Ok(frame.freeze())
}

fn decompress_payload(
    method: u8,
    payload: &[u8],
    raw_size: usize,
) -> Result<Vec<u8>> {
    let data = match method {
        method_byte::NONE => payload.to_vec(),
        method_byte::LZ4 => {
            lz4::block::decompress(payload, Some(raw_size as i32))?
        }
        method_byte::ZSTD => zstd::bulk::decompress(payload, raw_size)
            .map_err(|e| {
                Error::Compression(format!("ZSTD decompression failed: {}", e))
            })?,
        other => return Err(Error::UnknownCompressionMethod(other)),
    };
    if data.len() != raw_size {
        return Err(Error::Compression(format!(
            "decompressed {} bytes, frame header says {}",
            data.len(),
            raw_size
        )));
    }
    Ok(data)
}

/// Parsed frame header.
struct FrameHeader {
    method: u8,
    payload_size: usize,
    raw_size: usize,
}

impl FrameHeader {
    fn parse(mut header: &[u8]) -> Result<Self> {
        let method = header.get_u8();
        let size = header.get_u32_le() as usize;
        let raw_size = header.get_u32_le() as usize;
        if size < HEADER_SIZE || size > MAX_FRAME_SIZE || raw_size > MAX_FRAME_SIZE {
            return Err(Error::Compression(format!(
                "invalid frame sizes: compressed {}, decompressed {}",
                size, raw_size
            )));
        }
        Ok(Self { method, payload_size: size - HEADER_SIZE, raw_size })
    }
}

fn verify(expected: u128, header_and_payload: &[u8]) -> Result<()> {
    let actual = checksum(header_and_payload);
    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

fn read_checksum(raw: &[u8]) -> u128 {
    let mut raw = raw;
    let hi = raw.get_u64_le();
    let lo = raw.get_u64_le();
    ((hi as u128) << 64) | lo as u128
}

/// Decode a complete frame held in memory.
pub fn decompress(frame: &[u8]) -> Result<Bytes> {
    if frame.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(Error::Compression("frame shorter than its header".into()));
    }
    let header = FrameHeader::parse(&frame[CHECKSUM_SIZE..])?;
    let body = &frame[CHECKSUM_SIZE..];
    if body.len() != HEADER_SIZE + header.payload_size {
        return Err(Error::Compression(format!(
            "frame has {} payload bytes, header says {}",
            body.len() - HEADER_SIZE,
            header.payload_size
        )));
    }
    verify(read_checksum(&frame[..CHECKSUM_SIZE]), body)?;
    let data =
        decompress_payload(header.method, &body[HEADER_SIZE..], header.raw_size)?;
    Ok(Bytes::from(data))
}

/// Read and decode the next frame from a stream.
pub async fn read_frame(reader: &mut BufferedReader<'_>) -> Result<Bytes> {
    let mut prefix = [0u8; CHECKSUM_SIZE + HEADER_SIZE];
    reader.read_exact(&mut prefix).await?;
    let header = FrameHeader::parse(&prefix[CHECKSUM_SIZE..])?;

    let mut body = vec![0u8; HEADER_SIZE + header.payload_size];
    body[..HEADER_SIZE].copy_from_slice(&prefix[CHECKSUM_SIZE..]);
    reader.read_exact(&mut body[HEADER_SIZE..]).await?;

    verify(read_checksum(&prefix[..CHECKSUM_SIZE]), &body)?;
    let data =
        decompress_payload(header.method, &body[HEADER_SIZE..], header.raw_size)?;
    Ok(Bytes::from(data))
}

/// Decompressing view over a stream of frames, so block decoders can read
/// compressed data through an ordinary [`BufferedReader`].
pub struct CompressedSource<'r, 'a> {
    reader: &'r mut BufferedReader<'a>,
    pending: Bytes,
}

impl<'r, 'a> CompressedSource<'r, 'a> {
    pub fn new(reader: &'r mut BufferedReader<'a>) -> Self {
        Self { reader, pending: Bytes::new() }
    }
}

#[async_trait]
impl<'r, 'a> Source for CompressedSource<'r, 'a> {
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.pending.is_empty() {
            self.pending = read_frame(self.reader).await?;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..10_000u32).flat_map(|i| (i % 97).to_le_bytes()).collect()
    }

    #[test]
    fn test_roundtrip_every_method() {
        let data = sample();
        for method in [
            CompressionMethod::None,
            CompressionMethod::LZ4,
            CompressionMethod::LZ4HC,
            CompressionMethod::ZSTD,
        ] {
            let frame = compress(method, &data).unwrap();
            assert_eq!(frame[16], method.method_byte());
            assert_eq!(&decompress(&frame).unwrap()[..], &data[..], "{:?}", method);
        }
    }

    #[test]
    fn test_header_fields() {
        let frame = compress(CompressionMethod::None, b"abc").unwrap();
        assert_eq!(frame.len(), 16 + 9 + 3);
        assert_eq!(&frame[16..25], &[0x02, 12, 0, 0, 0, 3, 0, 0, 0]);
        let hash = cityhash_102_128(&frame[16..]);
        assert_eq!(&frame[..8], &((hash >> 64) as u64).to_le_bytes());
        assert_eq!(&frame[8..16], &(hash as u64).to_le_bytes());
    }

    #[test]
    fn test_corrupted_byte_fails_checksum() {
        let mut frame = compress(CompressionMethod::LZ4, &sample()).unwrap().to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decompress(&frame),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_method() {
        let mut frame = compress(CompressionMethod::None, b"abc").unwrap().to_vec();
        frame[16] = 0x42;
        let hash = cityhash_102_128(&frame[16..]);
        frame[..8].copy_from_slice(&((hash >> 64) as u64).to_le_bytes());
        frame[8..16].copy_from_slice(&(hash as u64).to_le_bytes());
        assert!(matches!(
            decompress(&frame),
            Err(Error::UnknownCompressionMethod(0x42))
        ));
    }

    #[test]
    fn test_short_frame() {
        assert!(matches!(decompress(&[0u8; 10]), Err(Error::Compression(_))));
    }

    #[tokio::test]
    async fn test_stream_spans_frames() {
        let data = sample();
        let (head, tail) = data.split_at(data.len() / 3);
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&compress(CompressionMethod::ZSTD, head).unwrap());
        wire.extend_from_slice(&compress(CompressionMethod::LZ4, tail).unwrap());

        let mut socket = BufferedReader::from_bytes(wire.freeze());
        let mut reader = BufferedReader::new(CompressedSource::new(&mut socket), 1000);
        let mut out = vec![0u8; data.len()];
        reader.read_exact(&mut out).await.unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.remaining_buffered(), 0);
        drop(reader);
        assert_eq!(socket.remaining_buffered(), 0);
    }

    #[tokio::test]
    async fn test_stream_truncated_frame_is_eof() {
        let frame = compress(CompressionMethod::LZ4, &sample()).unwrap();
        let mut socket = BufferedReader::from_bytes(frame.slice(..frame.len() - 5));
        let mut reader = BufferedReader::new(CompressedSource::new(&mut socket), 64);
        let mut out = vec![0u8; 10];
        assert!(matches!(
            reader.read_exact(&mut out).await,
            Err(Error::UnexpectedEof)
        ));
    }
}
