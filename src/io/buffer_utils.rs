//! LEB128 varint and length-prefixed string codec over in-memory buffers.
//!
//! The socket-facing reader in [`super::buffered`] decodes the same format
//! incrementally; these helpers serve every encoder and the in-memory
//! decoders.

use crate::{
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

/// Read a varint-encoded u64 from a byte slice
pub fn read_varint(buffer: &mut &[u8]) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        if buffer.is_empty() {
            return Err(Error::UnexpectedEof);
        }

        let byte = buffer[0];
        buffer.advance(1);

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::Protocol("Varint overflow".to_string()));
        }
    }

    Ok(result)
}

/// Write a varint-encoded u64 to a byte buffer
pub fn write_varint(buffer: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buffer.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Zig-zag encode a signed integer, then write it as a varint
pub fn write_varint_signed(buffer: &mut BytesMut, value: i64) {
    write_varint(buffer, ((value << 1) ^ (value >> 63)) as u64);
}

/// Number of bytes `value` occupies once varint-encoded
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Read a length-prefixed byte string from a byte slice
pub fn read_binary<'a>(buffer: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = read_varint(buffer)? as usize;

    if buffer.len() < len {
        return Err(Error::UnexpectedEof);
    }

    let (data, rest) = buffer.split_at(len);
    *buffer = rest;
    Ok(data)
}

/// Read a length-prefixed UTF-8 string from a byte slice
pub fn read_string(buffer: &mut &[u8]) -> Result<String> {
    let data = read_binary(buffer)?;
    String::from_utf8(data.to_vec()).map_err(|e| {
        Error::Protocol(format!("Invalid UTF-8 in string: {}", e))
    })
}

/// Write a length-prefixed byte string to a byte buffer
pub fn write_binary(buffer: &mut BytesMut, data: &[u8]) {
    write_varint(buffer, data.len() as u64);
    buffer.put_slice(data);
}

/// Write a length-prefixed string to a byte buffer
pub fn write_string(buffer: &mut BytesMut, s: &str) {
    write_binary(buffer, s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_varint_roundtrip() {
        let test_cases = vec![
            0u64,
            1,
            127,
            128,
            (1 << 21) - 1,
            1 << 63,
            u64::MAX,
        ];

        for value in test_cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.len(), varint_len(value));

            let mut slice = &buf[..];
            let decoded = read_varint(&mut slice).unwrap();

            assert_eq!(
                value, decoded,
                "Varint roundtrip failed for {}",
                value
            );
            assert!(slice.is_empty(), "Buffer should be fully consumed");
        }
    }

    #[test]
    fn test_varint_known_encodings() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 300);
        assert_eq!(&buf[..], &[0xAC, 0x02]);

        let mut buf = BytesMut::new();
        write_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[9], 0x01);
    }

    #[test]
    fn test_varint_eof_mid_sequence() {
        let data = [0x80u8, 0x80];
        let mut slice = &data[..];
        assert!(matches!(read_varint(&mut slice), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn test_varint_overflow() {
        let data = [0xFFu8; 11];
        let mut slice = &data[..];
        assert!(matches!(read_varint(&mut slice), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_signed_varint() {
        let mut buf = BytesMut::new();
        write_varint_signed(&mut buf, -1);
        write_varint_signed(&mut buf, 1);
        write_varint_signed(&mut buf, -64);
        assert_eq!(&buf[..], &[0x01, 0x02, 0x7F]);
    }

    #[test]
    fn test_string_roundtrip() {
        let test_strings =
            vec!["", "hello", "мир", "🦀", "test\nwith\nnewlines"];

        for s in test_strings {
            let mut buf = BytesMut::new();
            write_string(&mut buf, s);

            let mut slice = &buf[..];
            let decoded = read_string(&mut slice).unwrap();

            assert_eq!(s, decoded, "String roundtrip failed for '{}'", s);
            assert!(slice.is_empty(), "Buffer should be fully consumed");
        }
    }

    #[test]
    fn test_string_truncated() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 100);
        buf.put_slice(b"only10");

        let mut slice = &buf[..];
        assert!(matches!(read_string(&mut slice), Err(Error::UnexpectedEof)));
    }

    proptest! {
        #[test]
        fn prop_varint_roundtrip(value in any::<u64>()) {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            let mut slice = &buf[..];
            prop_assert_eq!(read_varint(&mut slice).unwrap(), value);
            prop_assert!(slice.is_empty());
        }
    }
}
