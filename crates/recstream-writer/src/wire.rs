//! Big-endian primitives shared by the record and signature file codecs.

use std::io::{self, Write};

use recstream_types::{DigestType, Hash};

use crate::error::{CodecError, CodecResult};

pub(crate) fn write_i32<W: Write + ?Sized>(w: &mut W, value: i32) -> io::Result<()> {
    w.write_all(&value.to_be_bytes())
}

pub(crate) fn write_i64<W: Write + ?Sized>(w: &mut W, value: i64) -> io::Result<()> {
    w.write_all(&value.to_be_bytes())
}

/// `[digestTypeId:i32][len:i32][bytes]`
pub(crate) fn write_hash<W: Write + ?Sized>(w: &mut W, hash: &Hash) -> io::Result<()> {
    write_i32(w, Hash::DIGEST_TYPE.id())?;
    write_i32(w, hash.as_bytes().len() as i32)?;
    w.write_all(hash.as_bytes())
}

fn wire_len(bytes: &[u8]) -> io::Result<i32> {
    i32::try_from(bytes.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "payload exceeds i32::MAX bytes")
    })
}

/// Length-prefixed byte string.
pub(crate) fn write_bytes<W: Write + ?Sized>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_i32(w, wire_len(bytes)?)?;
    w.write_all(bytes)
}

/// `[len:i32][checksum:i32][bytes]`
pub(crate) fn write_bytes_with_checksum<W: Write + ?Sized>(
    w: &mut W,
    bytes: &[u8],
    checksum: i32,
) -> io::Result<()> {
    write_i32(w, wire_len(bytes)?)?;
    write_i32(w, checksum)?;
    w.write_all(bytes)
}

/// Cursor over an in-memory file image.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub(crate) fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_raw(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.take(n)
    }

    /// Read a non-negative `i32` length.
    pub(crate) fn read_len(&mut self) -> CodecResult<usize> {
        let offset = self.pos;
        let length = self.read_i32()?;
        usize::try_from(length).map_err(|_| CodecError::NegativeLength { offset, length })
    }

    pub(crate) fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub(crate) fn read_hash(&mut self) -> CodecResult<Hash> {
        let digest = DigestType::from_id(self.read_i32()?)?;
        let offset = self.pos;
        let len = self.read_len()?;
        if len != digest.length() {
            return Err(CodecError::HashLength {
                offset,
                expected: digest.length(),
                actual: len,
            });
        }
        Ok(Hash::from_slice(self.take(len)?)?)
    }

    pub(crate) fn finish(self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(CodecError::TrailingBytes { remaining }),
        }
    }
}
