//! In-memory buffer reader/writer used to stage encoded bricks and frames
//! before they are appended to a file, and to read them back out.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// A cursor over a borrowed byte slice.
///
/// Every multi-byte read is little-endian, matching the container's wire
/// format throughout (§4.5).
pub struct BufferReader<'a> {
    buf: &'a [u8],
    read_pos: u64,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BufferReader { buf, read_pos: 0 }
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pos(&self) -> u64 {
        self.read_pos
    }

    /// Reads `size` bytes, advancing the cursor. Fails with
    /// [`Error::FileRead`] if that would run past the end of the buffer.
    pub fn read(&mut self, size: u64) -> Result<&'a [u8]> {
        let start = self.read_pos;
        let end = start
            .checked_add(size)
            .ok_or_else(|| Error::FileRead("read size overflow".into()))?;
        if end > self.len() {
            return Err(Error::FileRead("trying to read past end of buffer".into()));
        }

        self.read_pos = end;
        Ok(&self.buf[start as usize..end as usize])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read(4)?))
    }

    /// Repositions the cursor. Fails with [`Error::FileRead`] if `pos` is
    /// at or past the end of the buffer.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos >= self.len() {
            return Err(Error::FileRead("trying to seek past end of buffer".into()));
        }

        self.read_pos = pos;
        Ok(())
    }
}

/// An append-only, growable byte buffer.
///
/// Backed by a `Vec<u8>`, which already provides the doubling-growth
/// behavior the reference buffer writer implements by hand; this crate
/// leans on that instead of reimplementing realloc-doubling.
#[derive(Debug, Default, Clone)]
pub struct BufferWriter {
    buf: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        BufferWriter { buf: Vec::new() }
    }

    pub fn with_capacity(initial_len: u64) -> Self {
        BufferWriter {
            buf: Vec::with_capacity(initial_len as usize),
        }
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write(&mut self, src: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(src);
        Ok(())
    }

    pub fn put(&mut self, c: u8) -> Result<()> {
        self.buf.push(c);
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, v);
        self.write(&bytes)
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        let mut bytes = [0u8; 8];
        LittleEndian::write_u64(&mut bytes, v);
        self.write(&bytes)
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        let mut bytes = [0u8; 4];
        LittleEndian::write_f32(&mut bytes, v);
        self.write(&bytes)
    }

    /// Overwrites the 8 bytes at `pos` with `v`, little-endian. Used to
    /// backpatch a length or offset field once its final value is known
    /// (e.g. the range coder's total-size prefix, the file header's
    /// frame table pointer).
    pub fn patch_u64(&mut self, pos: u64, v: u64) -> Result<()> {
        let pos = pos as usize;
        if pos + 8 > self.buf.len() {
            return Err(Error::Internal("patch_u64 position out of range".into()));
        }
        LittleEndian::write_u64(&mut self.buf[pos..pos + 8], v);
        Ok(())
    }

    /// Truncates back to empty without releasing the underlying
    /// allocation, so the writer can be reused across frames.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_fails() {
        let data = [1u8, 2, 3];
        let mut reader = BufferReader::new(&data);
        assert!(reader.read(4).is_err());
    }

    #[test]
    fn read_then_seek_roundtrip() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut reader = BufferReader::new(&data);
        assert_eq!(reader.read_u32().unwrap(), u32::from_le_bytes([1, 2, 3, 4]));
        reader.seek(0).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 1);
    }

    #[test]
    fn seek_past_end_fails() {
        let data = [1u8, 2, 3];
        let mut reader = BufferReader::new(&data);
        assert!(reader.seek(3).is_err());
        assert!(reader.seek(2).is_ok());
    }

    #[test]
    fn writer_grows_and_resets() {
        let mut writer = BufferWriter::with_capacity(1);
        for i in 0..100u8 {
            writer.put(i).unwrap();
        }
        assert_eq!(writer.len(), 100);
        writer.reset();
        assert_eq!(writer.len(), 0);
    }
}
