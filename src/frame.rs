//! Fixed-capacity framed log blocks
//!
//! A `Frame` packs appended log bytes for exactly one stream identity into a
//! single block of bounded size. The header region is reserved up front and
//! patched with the frame id and identity fields when the frame is closed, so
//! capacity accounting always covers header plus payload. All integers are
//! big-endian on the wire.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use crate::error::{Error, Result};
use crate::stream::StreamId;

/// Bytes occupied by the id word and the remaining-length word
pub(crate) const FRAME_PREFIX_LEN: usize = 12;

/// A single fixed-capacity block of framed log bytes.
///
/// Frames start OPEN: typed appends either fit whole or leave the frame
/// untouched. `close` assigns the frame id, patches the header and freezes the
/// bytes; a closed frame accepts nothing and is closed at most once.
#[derive(Debug, Clone)]
pub struct Frame {
    stream: StreamId,
    protocol_version: u32,
    capacity: usize,
    header_len: usize,
    buf: Vec<u8>,
    id: Option<u64>,
}

impl Frame {
    /// Create an open frame for `stream` with a fixed byte capacity.
    ///
    /// The backing buffer is allocated with the header region reserved and no
    /// payload. Fails if an identity string cannot fit its 16-bit length
    /// prefix or if `capacity` cannot hold the header itself.
    pub fn new(capacity: usize, stream: StreamId, protocol_version: u32) -> Result<Self> {
        if !stream.is_encodable() {
            return Err(Error::config(format!(
                "stream identity field exceeds 65535 bytes for {}",
                stream
            )));
        }
        let header_len = FRAME_PREFIX_LEN + stream.encoded_len();
        if capacity < header_len {
            return Err(Error::config(format!(
                "capacity {} cannot hold the {}-byte frame header for {}",
                capacity, header_len, stream
            )));
        }

        let mut buf = Vec::with_capacity(capacity);
        buf.resize(header_len, 0);

        Ok(Self {
            stream,
            protocol_version,
            capacity,
            header_len,
            buf,
            id: None,
        })
    }

    /// Append a big-endian i32. Returns false and leaves the frame unchanged
    /// if it does not fit or the frame is closed.
    pub fn put_i32(&mut self, value: i32) -> bool {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Append a big-endian i64. Returns false and leaves the frame unchanged
    /// if it does not fit or the frame is closed.
    pub fn put_i64(&mut self, value: i64) -> bool {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Append raw bytes. Returns false and leaves the frame unchanged if they
    /// do not fit or the frame is closed.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.id.is_some() || bytes.len() > self.remaining() {
            return false;
        }
        self.buf.extend_from_slice(bytes);
        true
    }

    /// Append a length-prefixed UTF-8 string (2-byte big-endian prefix).
    ///
    /// Returns Ok(false) and leaves the frame unchanged if prefix plus bytes
    /// do not fit or the frame is closed. Strings longer than 65535 bytes can
    /// never be encoded and are an error.
    pub fn put_utf(&mut self, value: &str) -> Result<bool> {
        if value.len() > u16::MAX as usize {
            return Err(Error::frame(format!(
                "string of {} bytes exceeds the 16-bit length prefix",
                value.len()
            )));
        }
        if self.id.is_some() || 2 + value.len() > self.remaining() {
            return Ok(false);
        }
        self.buf
            .extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        Ok(true)
    }

    /// Close the frame under `id`, patching the reserved header region.
    ///
    /// After this the frame is immutable. Closing twice is an error.
    pub fn close(&mut self, id: u64) -> Result<()> {
        if let Some(existing) = self.id {
            return Err(Error::frame(format!(
                "frame for {} already closed with id {}",
                self.stream, existing
            )));
        }
        let remaining = self.buf.len() - FRAME_PREFIX_LEN;
        if remaining > u32::MAX as usize {
            return Err(Error::frame(format!(
                "frame of {} bytes exceeds the 32-bit remaining-length field",
                self.buf.len()
            )));
        }

        BigEndian::write_u64(&mut self.buf[0..8], id);
        BigEndian::write_u32(&mut self.buf[8..12], remaining as u32);

        let mut offset = FRAME_PREFIX_LEN;
        for field in [
            self.stream.host_name(),
            self.stream.file_path(),
            self.stream.log_type(),
        ] {
            BigEndian::write_u16(&mut self.buf[offset..offset + 2], field.len() as u16);
            offset += 2;
            self.buf[offset..offset + field.len()].copy_from_slice(field.as_bytes());
            offset += field.len();
        }
        BigEndian::write_u32(&mut self.buf[offset..offset + 4], self.stream.shard());
        offset += 4;
        BigEndian::write_u32(&mut self.buf[offset..offset + 4], self.protocol_version);
        offset += 4;
        debug_assert_eq!(offset, self.header_len);

        self.id = Some(id);
        Ok(())
    }

    /// Reconstruct a closed frame from its finalized bytes.
    ///
    /// Inverse of `close`; used when reloading persisted frames. Rejects
    /// inconsistent length fields and malformed header strings.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_PREFIX_LEN {
            return Err(Error::corruption(format!(
                "frame of {} bytes is shorter than its fixed prefix",
                bytes.len()
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let id = cursor
            .read_u64::<BigEndian>()
            .map_err(|_| Self::truncated())?;
        let remaining = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| Self::truncated())? as usize;
        if bytes.len() != FRAME_PREFIX_LEN + remaining {
            return Err(Error::corruption(format!(
                "frame length {} disagrees with remaining-length field {}",
                bytes.len(),
                remaining
            )));
        }

        let host_name = Self::read_utf(&mut cursor)?;
        let file_path = Self::read_utf(&mut cursor)?;
        let log_type = Self::read_utf(&mut cursor)?;
        let shard = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| Self::truncated())?;
        let version = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| Self::truncated())?;
        let header_len = cursor.position() as usize;

        let stream = StreamId::new(host_name, file_path, log_type, shard, version);
        Ok(Self {
            stream,
            protocol_version: version,
            capacity: bytes.len(),
            header_len,
            buf: bytes.to_vec(),
            id: Some(id),
        })
    }

    /// Identity of the stream this frame buffers
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Protocol discriminant written into the header at close
    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Fixed capacity in bytes, header included
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The frame id, assigned at close
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Whether the frame has been closed
    pub fn is_closed(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the frame holds no payload yet
    pub fn is_empty(&self) -> bool {
        self.buf.len() == self.header_len
    }

    /// Total bytes used, header included
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Bytes still available for appends
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// The frame bytes. Final once the frame is closed; before that the
    /// header region is still zeroed.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// The appended payload bytes, header excluded
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.header_len..]
    }

    fn read_utf(cursor: &mut Cursor<&[u8]>) -> Result<String> {
        let len = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| Self::truncated())? as usize;
        let mut raw = vec![0u8; len];
        cursor.read_exact(&mut raw).map_err(|_| Self::truncated())?;
        String::from_utf8(raw)
            .map_err(|err| Error::corruption(format!("header string is not valid UTF-8: {}", err)))
    }

    fn truncated() -> Error {
        Error::corruption("frame header truncated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stream() -> StreamId {
        StreamId::new("web-01", "/var/log/app.log", "app", 3, 2)
    }

    #[test]
    fn test_header_reserved_at_construction() {
        let header_len = FRAME_PREFIX_LEN + stream().encoded_len();
        let frame = Frame::new(1024, stream(), 2).unwrap();

        assert_eq!(frame.len(), header_len);
        assert!(frame.is_empty());
        assert!(!frame.is_closed());
        assert_eq!(frame.remaining(), 1024 - header_len);
    }

    #[test]
    fn test_capacity_must_hold_header() {
        let err = Frame::new(8, stream(), 2).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_close_patches_header() {
        let mut frame = Frame::new(1024, stream(), 2).unwrap();
        assert!(frame.put_i32(7));
        assert!(frame.put_i64(-9));
        assert!(frame.put_utf("hello").unwrap());
        assert!(frame.put_bytes(&[1, 2, 3]));
        frame.close(42).unwrap();

        let data = frame.data();
        assert_eq!(BigEndian::read_u64(&data[0..8]), 42);
        // Remaining-length counts every byte after the first 12
        assert_eq!(
            BigEndian::read_u32(&data[8..12]) as usize,
            data.len() - FRAME_PREFIX_LEN
        );

        let mut expected = Vec::new();
        expected.extend_from_slice(&7i32.to_be_bytes());
        expected.extend_from_slice(&(-9i64).to_be_bytes());
        expected.extend_from_slice(&5u16.to_be_bytes());
        expected.extend_from_slice(b"hello");
        expected.extend_from_slice(&[1, 2, 3]);
        assert_eq!(frame.payload(), expected.as_slice());
    }

    #[test]
    fn test_parse_round_trip() {
        let mut frame = Frame::new(1024, stream(), 2).unwrap();
        assert!(frame.put_utf("a log line").unwrap());
        assert!(frame.put_i32(1234));
        frame.close(7).unwrap();

        let parsed = Frame::parse(frame.data()).unwrap();
        assert_eq!(parsed.id(), Some(7));
        assert_eq!(parsed.stream(), &stream());
        assert_eq!(parsed.protocol_version(), 2);
        assert_eq!(parsed.payload(), frame.payload());
        assert_eq!(parsed.data(), frame.data());
    }

    #[test]
    fn test_no_partial_append() {
        let header_len = FRAME_PREFIX_LEN + stream().encoded_len();
        let mut frame = Frame::new(header_len + 4, stream(), 2).unwrap();

        assert!(frame.put_bytes(&[1, 2, 3]));
        let len_before = frame.len();

        // One byte of room left: none of these commit anything
        assert!(!frame.put_bytes(&[4, 5, 6]));
        assert!(!frame.put_i32(1));
        assert!(!frame.put_i64(1));
        assert!(!frame.put_utf("x").unwrap());
        assert_eq!(frame.len(), len_before);

        assert!(frame.put_bytes(&[4]));
        assert_eq!(frame.remaining(), 0);
    }

    #[test]
    fn test_close_only_once() {
        let mut frame = Frame::new(256, stream(), 2).unwrap();
        frame.put_i32(1);
        frame.close(1).unwrap();

        let err = frame.close(2).unwrap_err();
        assert!(matches!(err, Error::Frame(_)));
        assert_eq!(frame.id(), Some(1));
    }

    #[test]
    fn test_closed_frame_accepts_nothing() {
        let mut frame = Frame::new(256, stream(), 2).unwrap();
        frame.close(1).unwrap();

        assert!(!frame.put_bytes(&[1]));
        assert!(!frame.put_i32(1));
        assert!(!frame.put_i64(1));
        assert!(!frame.put_utf("x").unwrap());
    }

    #[test]
    fn test_oversized_string_is_an_error() {
        let mut frame = Frame::new(128, stream(), 2).unwrap();
        let huge = "x".repeat(70_000);
        assert!(frame.put_utf(&huge).is_err());
    }

    #[test]
    fn test_parse_rejects_inconsistent_length() {
        let mut frame = Frame::new(256, stream(), 2).unwrap();
        frame.put_bytes(&[1, 2, 3, 4]);
        frame.close(9).unwrap();

        let mut bytes = frame.data().to_vec();
        bytes.truncate(bytes.len() - 1);
        let err = Frame::parse(&bytes).unwrap_err();
        assert!(err.is_corruption_error());

        let err = Frame::parse(&[0u8; 4]).unwrap_err();
        assert!(err.is_corruption_error());
    }

    #[test]
    fn test_unencodable_stream_rejected() {
        let id = StreamId::new("h", "x".repeat(70_000), "t", 0, 1);
        assert!(Frame::new(1 << 20, id, 1).is_err());
    }

    proptest! {
        #[test]
        fn prop_framing_round_trip(
            host in "[a-z0-9-]{1,16}",
            path in "/[a-z0-9/._-]{1,48}",
            log_type in "[a-z]{1,8}",
            shard in 0u32..4096,
            version in 0u32..32,
            id in 1u64..u64::MAX,
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let stream = StreamId::new(host, path, log_type, shard, version);
            let mut frame = Frame::new(FRAME_PREFIX_LEN + stream.encoded_len() + payload.len(), stream.clone(), version).unwrap();
            prop_assert!(frame.put_bytes(&payload));
            frame.close(id).unwrap();

            let parsed = Frame::parse(frame.data()).unwrap();
            prop_assert_eq!(parsed.id(), Some(id));
            prop_assert_eq!(parsed.stream(), &stream);
            prop_assert_eq!(parsed.payload(), payload.as_slice());
        }
    }
}
