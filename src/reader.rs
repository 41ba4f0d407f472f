//! Buffered forward-reading cursor over classfile bytes.
//!
//! A classfile arrives either as a forward-only stream (a file opened from a
//! directory element) or as an in-memory slice (a jar entry already
//! decompressed, or a mapped region). `ClassfileReader` hides the difference
//! behind one interface: big-endian integer reads that advance the cursor,
//! offset-relative reads that peek at already-buffered bytes, and a decoder
//! for the JVM "modified UTF-8" string encoding.

use std::borrow::Cow;
use std::io::Read;

use thiserror::Error;

/// Initial buffer size, sized to cover a typical classfile header and
/// constant pool in one read.
const INITIAL_BUF_LEN: usize = 16_384;
/// Refill chunk size once the initial chunk is exhausted.
const SUBSEQUENT_BUF_LEN: usize = 4_096;
/// Classfiles larger than 2 GiB are rejected outright.
const MAX_CLASSFILE_LEN: usize = 0x7fff_ffff;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("premature end of classfile: needed {needed} bytes, had {available}")]
    PrematureEof { needed: usize, available: usize },
    #[error("classfile exceeds 2GiB limit while buffering {needed} bytes")]
    TooLarge { needed: usize },
    #[error("malformed modified-UTF-8 sequence at byte {offset}")]
    MalformedUtf8 { offset: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ClassfileReader<'a> {
    stream: Option<Box<dyn Read + 'a>>,
    buf: Cow<'a, [u8]>,
    cur: usize,
}

impl<'a> ClassfileReader<'a> {
    /// Reader over a forward-only stream. Bytes are buffered as the cursor
    /// advances; offset-relative reads may only look at buffered bytes.
    pub fn from_stream(stream: impl Read + 'a) -> Self {
        Self {
            stream: Some(Box::new(stream)),
            buf: Cow::Owned(Vec::with_capacity(INITIAL_BUF_LEN)),
            cur: 0,
        }
    }

    /// Zero-copy reader over bytes already in memory.
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self {
            stream: None,
            buf: Cow::Borrowed(bytes),
            cur: 0,
        }
    }

    /// Current cursor position from the start of the classfile.
    pub fn position(&self) -> usize {
        self.cur
    }

    /// Ensure at least `target` bytes are buffered from the start.
    fn buffer_to(&mut self, target: usize) -> Result<(), ReadError> {
        if target <= self.buf.len() {
            return Ok(());
        }
        if target > MAX_CLASSFILE_LEN {
            return Err(ReadError::TooLarge { needed: target });
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ReadError::PrematureEof {
                needed: target,
                available: self.buf.len(),
            });
        };
        let buf = self.buf.to_mut();
        while buf.len() < target {
            // Grow geometrically when a single logical read would overflow
            // the current capacity, guarding the doubling against the 2GiB
            // classfile limit.
            if buf.len() == buf.capacity() {
                let doubled = buf.capacity().saturating_mul(2).min(MAX_CLASSFILE_LEN);
                let new_cap = doubled.max(target).max(INITIAL_BUF_LEN);
                if new_cap > MAX_CLASSFILE_LEN {
                    return Err(ReadError::TooLarge { needed: new_cap });
                }
                buf.reserve(new_cap - buf.len());
            }
            let chunk = if buf.is_empty() {
                INITIAL_BUF_LEN
            } else {
                SUBSEQUENT_BUF_LEN.max(target - buf.len())
            };
            let old_len = buf.len();
            buf.resize(old_len + chunk, 0);
            let n = stream.read(&mut buf[old_len..])?;
            buf.truncate(old_len + n);
            if n == 0 {
                return Err(ReadError::PrematureEof {
                    needed: target,
                    available: buf.len(),
                });
            }
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadError> {
        self.buffer_to(self.cur + n)?;
        self.cur += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.buffer_to(self.cur + 1)?;
        let v = self.buf[self.cur];
        self.cur += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        self.buffer_to(self.cur + 2)?;
        let v = u16::from_be_bytes([self.buf[self.cur], self.buf[self.cur + 1]]);
        self.cur += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        self.buffer_to(self.cur + 4)?;
        let b = &self.buf[self.cur..self.cur + 4];
        let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        self.cur += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, ReadError> {
        self.buffer_to(self.cur + 8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[self.cur..self.cur + 8]);
        self.cur += 8;
        Ok(u64::from_be_bytes(b))
    }

    /// Re-read a buffered byte without moving the cursor.
    pub fn u8_at(&mut self, offset: usize) -> Result<u8, ReadError> {
        self.buffer_to(offset + 1)?;
        Ok(self.buf[offset])
    }

    pub fn u16_at(&mut self, offset: usize) -> Result<u16, ReadError> {
        self.buffer_to(offset + 2)?;
        Ok(u16::from_be_bytes([self.buf[offset], self.buf[offset + 1]]))
    }

    pub fn u32_at(&mut self, offset: usize) -> Result<u32, ReadError> {
        self.buffer_to(offset + 4)?;
        let b = &self.buf[offset..offset + 4];
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64_at(&mut self, offset: usize) -> Result<u64, ReadError> {
        self.buffer_to(offset + 8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[offset..offset + 8]);
        Ok(u64::from_be_bytes(b))
    }

    pub fn bytes_at(&mut self, offset: usize, len: usize) -> Result<&[u8], ReadError> {
        self.buffer_to(offset + len)?;
        Ok(&self.buf[offset..offset + len])
    }

    /// Decode a modified-UTF-8 string at `offset` (u16 length prefix, then
    /// 1/2/3-byte code points) without moving the cursor.
    ///
    /// `replace_slash_with_dot` converts internal path form to dotted
    /// package names; `strip_lsemicolon` unwraps an `L...;` object-type
    /// descriptor while decoding.
    pub fn utf8_at(
        &mut self,
        offset: usize,
        replace_slash_with_dot: bool,
        strip_lsemicolon: bool,
    ) -> Result<String, ReadError> {
        let len = self.u16_at(offset)? as usize;
        let bytes = self.bytes_at(offset + 2, len)?;

        let mut start = 0;
        let mut end = len;
        if strip_lsemicolon && len >= 2 && bytes[0] == b'L' && bytes[len - 1] == b';' {
            start = 1;
            end = len - 1;
        }

        let mut out = String::with_capacity(end - start);
        let mut i = start;
        while i < end {
            let b0 = bytes[i];
            let c = if b0 & 0x80 == 0 {
                i += 1;
                b0 as u32
            } else if b0 & 0xe0 == 0xc0 {
                if i + 1 >= end || bytes[i + 1] & 0xc0 != 0x80 {
                    return Err(ReadError::MalformedUtf8 { offset: offset + 2 + i });
                }
                let c = ((b0 as u32 & 0x1f) << 6) | (bytes[i + 1] as u32 & 0x3f);
                i += 2;
                c
            } else if b0 & 0xf0 == 0xe0 {
                if i + 2 >= end || bytes[i + 1] & 0xc0 != 0x80 || bytes[i + 2] & 0xc0 != 0x80 {
                    return Err(ReadError::MalformedUtf8 { offset: offset + 2 + i });
                }
                let c = ((b0 as u32 & 0x0f) << 12)
                    | ((bytes[i + 1] as u32 & 0x3f) << 6)
                    | (bytes[i + 2] as u32 & 0x3f);
                i += 3;
                c
            } else {
                return Err(ReadError::MalformedUtf8 { offset: offset + 2 + i });
            };
            let mut ch = char::from_u32(c).ok_or(ReadError::MalformedUtf8 {
                offset: offset + 2 + i,
            })?;
            if replace_slash_with_dot && ch == '/' {
                ch = '.';
            }
            out.push(ch);
        }
        Ok(out)
    }

    /// Read a length-prefixed modified-UTF-8 string at the cursor, advancing
    /// past it.
    pub fn read_utf8(&mut self) -> Result<String, ReadError> {
        let s = self.utf8_at(self.cur, false, false)?;
        let len = self.u16_at(self.cur)? as usize;
        self.cur += 2 + len;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_entry(s: &[u8]) -> Vec<u8> {
        let mut v = (s.len() as u16).to_be_bytes().to_vec();
        v.extend_from_slice(s);
        v
    }

    #[test]
    fn reads_big_endian_integers_from_bytes() {
        let data = [0xca, 0xfe, 0xba, 0xbe, 0x00, 0x01, 0x02];
        let mut r = ClassfileReader::from_bytes(&data);
        assert_eq!(r.read_u32().unwrap(), 0xcafe_babe);
        assert_eq!(r.read_u16().unwrap(), 0x0001);
        assert_eq!(r.read_u8().unwrap(), 0x02);
        assert!(matches!(
            r.read_u8(),
            Err(ReadError::PrematureEof { .. })
        ));
    }

    #[test]
    fn reads_from_stream_across_refills() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let mut r = ClassfileReader::from_stream(&data[..]);
        r.skip(30_000).unwrap();
        assert_eq!(r.read_u8().unwrap(), data[30_000]);
        // Offset-relative reads see earlier buffered bytes.
        assert_eq!(r.u8_at(0).unwrap(), data[0]);
        assert_eq!(
            r.u16_at(100).unwrap(),
            u16::from_be_bytes([data[100], data[101]])
        );
        assert_eq!(r.position(), 30_001);
    }

    #[test]
    fn stream_eof_is_premature_eof() {
        let data = [1u8, 2, 3];
        let mut r = ClassfileReader::from_stream(&data[..]);
        assert!(matches!(
            r.read_u32(),
            Err(ReadError::PrematureEof { .. })
        ));
    }

    #[test]
    fn decodes_modified_utf8() {
        // "Hi" + U+00E9 (2-byte) + U+20AC (3-byte)
        let mut bytes = vec![b'H', b'i', 0xc3, 0xa9, 0xe2, 0x82, 0xac];
        let entry = utf8_entry(&bytes);
        let mut r = ClassfileReader::from_bytes(&entry);
        assert_eq!(r.utf8_at(0, false, false).unwrap(), "Hi\u{e9}\u{20ac}");

        bytes = b"java/lang/String".to_vec();
        let entry = utf8_entry(&bytes);
        let mut r = ClassfileReader::from_bytes(&entry);
        assert_eq!(r.utf8_at(0, true, false).unwrap(), "java.lang.String");
    }

    #[test]
    fn strips_object_descriptor_wrapper() {
        let entry = utf8_entry(b"Ljava/lang/String;");
        let mut r = ClassfileReader::from_bytes(&entry);
        assert_eq!(r.utf8_at(0, true, true).unwrap(), "java.lang.String");
    }

    #[test]
    fn malformed_continuation_byte_is_an_error() {
        // 0xc3 announces a 2-byte sequence but 0x28 is not a continuation.
        let entry = utf8_entry(&[0xc3, 0x28]);
        let mut r = ClassfileReader::from_bytes(&entry);
        assert!(matches!(
            r.utf8_at(0, false, false),
            Err(ReadError::MalformedUtf8 { .. })
        ));
    }

    #[test]
    fn read_utf8_advances_cursor() {
        let mut data = utf8_entry(b"Code");
        data.extend_from_slice(&[0x12, 0x34]);
        let mut r = ClassfileReader::from_bytes(&data);
        assert_eq!(r.read_utf8().unwrap(), "Code");
        assert_eq!(r.read_u16().unwrap(), 0x1234);
    }
}
