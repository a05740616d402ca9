//! Primitive encodings.
//!
//! Writers append to a [`BytesMut`] so a complete message can be assembled
//! before anything reaches the channel. Readers pull exactly the bytes they
//! need from a blocking [`Read`] through a [`Source`].
//!
//! Layout is the host's native byte order and width:
//! ```text
//! int32 / uint32 / float32   4 bytes
//! usize (lengths, counts)    size_of::<usize>() bytes
//! string / bytes             usize length, then raw bytes (no terminator)
//! sequence<T>                usize count, then count encodings of T
//! ```

use std::io::{ErrorKind, Read};

use bytes::{BufMut, BytesMut};

use crate::config::WireConfig;
use crate::error::{Result, WireError};
use crate::value::TypeTag;

pub fn put_u8(dst: &mut BytesMut, v: u8) {
    dst.put_u8(v);
}

pub fn put_i32(dst: &mut BytesMut, v: i32) {
    dst.put_slice(&v.to_ne_bytes());
}

pub fn put_u32(dst: &mut BytesMut, v: u32) {
    dst.put_slice(&v.to_ne_bytes());
}

pub fn put_f32(dst: &mut BytesMut, v: f32) {
    dst.put_slice(&v.to_ne_bytes());
}

pub fn put_usize(dst: &mut BytesMut, v: usize) {
    dst.put_slice(&v.to_ne_bytes());
}

pub fn put_type_tag(dst: &mut BytesMut, tag: TypeTag) {
    put_i32(dst, tag.get());
}

pub fn put_bytes(dst: &mut BytesMut, bytes: &[u8]) {
    dst.reserve(std::mem::size_of::<usize>() + bytes.len());
    put_usize(dst, bytes.len());
    dst.put_slice(bytes);
}

pub fn put_str(dst: &mut BytesMut, s: &str) {
    put_bytes(dst, s.as_bytes());
}

pub fn put_i32_seq(dst: &mut BytesMut, values: &[i32]) {
    dst.reserve(std::mem::size_of::<usize>() + values.len() * 4);
    put_usize(dst, values.len());
    for v in values {
        put_i32(dst, *v);
    }
}

pub fn put_f32_seq(dst: &mut BytesMut, values: &[f32]) {
    dst.reserve(std::mem::size_of::<usize>() + values.len() * 4);
    put_usize(dst, values.len());
    for v in values {
        put_f32(dst, *v);
    }
}

/// Blocking reader for wire primitives.
///
/// Every read is all-or-nothing from the caller's point of view: either the
/// full encoding arrives or an error is returned. End of stream at any point
/// is [`WireError::ConnectionClosed`].
pub struct Source<'a> {
    reader: &'a mut dyn Read,
    config: &'a WireConfig,
}

impl<'a> Source<'a> {
    pub fn new(reader: &'a mut dyn Read, config: &'a WireConfig) -> Self {
        Self { reader, config }
    }

    pub fn config(&self) -> &WireConfig {
        self.config
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_ne_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_ne_bytes(self.read_array()?))
    }

    pub fn read_usize(&mut self) -> Result<usize> {
        Ok(usize::from_ne_bytes(self.read_array()?))
    }

    pub fn read_type_tag(&mut self) -> Result<TypeTag> {
        Ok(TypeTag(self.read_i32()?))
    }

    /// Read a count prefix and check it against `max`.
    pub fn read_len(&mut self, max: usize) -> Result<usize> {
        let len = self.read_usize()?;
        if len > max {
            return Err(WireError::LengthTooLarge { len, max });
        }
        Ok(len)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len(self.config.max_string_len)?;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_string(&mut self) -> Result<String> {
        String::from_utf8(self.read_bytes()?).map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_i32_seq(&mut self) -> Result<Vec<i32>> {
        let len = self.read_len(self.config.max_sequence_len)?;
        (0..len).map(|_| self.read_i32()).collect()
    }

    pub fn read_f32_seq(&mut self) -> Result<Vec<f32>> {
        let len = self.read_len(self.config.max_sequence_len)?;
        (0..len).map(|_| self.read_f32()).collect()
    }
}
