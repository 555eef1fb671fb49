//! On-disk container format: the fixed file header and the trailing
//! frame offset table (§4.5).

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::constants::{make_version, MAGIC_WORD, VERSION};
use crate::error::{io_read, io_write, Error, Result};

/// Parameters controlling how a sequence of frames is encoded.
///
/// `max_brick_group_size` and `motion_vectors` are carried through
/// verbatim (read, stored, echoed back on re-encode) without being
/// interpreted anywhere in this crate — the reference encoder itself
/// only ever reads them back out, never acts on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingParams {
    pub gop_size: u32,
    pub max_brick_group_size: u32,
    pub motion_vectors: bool,
}

impl EncodingParams {
    pub fn new(gop_size: u32) -> Result<Self> {
        if gop_size == 0 {
            return Err(Error::InvalidArguments("gop size must be positive".into()));
        }

        Ok(EncodingParams {
            gop_size,
            max_brick_group_size: 0,
            motion_vectors: false,
        })
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let gop_size = r.read_u32::<LittleEndian>().map_err(io_read)?;
        let max_brick_group_size = r.read_u32::<LittleEndian>().map_err(io_read)?;
        let motion_vectors = r.read_u32::<LittleEndian>().map_err(io_read)? != 0;

        Ok(EncodingParams {
            gop_size,
            max_brick_group_size,
            motion_vectors,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.gop_size).map_err(io_write)?;
        w.write_u32::<LittleEndian>(self.max_brick_group_size)
            .map_err(io_write)?;
        w.write_u32::<LittleEndian>(self.motion_vectors as u32)
            .map_err(io_write)?;
        Ok(())
    }
}

/// The file header: everything needed to interpret an SPLV file without
/// decoding a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileHeader {
    pub version: u32,

    pub width: u32,
    pub height: u32,
    pub depth: u32,

    pub framerate: f32,
    pub frame_count: u32,
    pub duration: f32,

    pub encoding_params: EncodingParams,

    /// Byte offset of the frame table (§4.5), from the start of the file.
    pub frame_table_ptr: u64,
}

/// On-disk header size, in bytes. One reserved `u32` pads
/// `frame_table_ptr` to an 8-byte boundary, matching the reference
/// struct's natural alignment.
pub const HEADER_SIZE: u64 = 56;

impl FileHeader {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic_word = r.read_u32::<LittleEndian>().map_err(io_read)?;
        if magic_word != MAGIC_WORD {
            return Err(Error::InvalidInput("bad magic word".into()));
        }

        let version = r.read_u32::<LittleEndian>().map_err(io_read)?;

        let width = r.read_u32::<LittleEndian>().map_err(io_read)?;
        let height = r.read_u32::<LittleEndian>().map_err(io_read)?;
        let depth = r.read_u32::<LittleEndian>().map_err(io_read)?;

        let framerate = r.read_f32::<LittleEndian>().map_err(io_read)?;
        let frame_count = r.read_u32::<LittleEndian>().map_err(io_read)?;
        let duration = r.read_f32::<LittleEndian>().map_err(io_read)?;

        let encoding_params = EncodingParams::read_from(r)?;
        let _reserved = r.read_u32::<LittleEndian>().map_err(io_read)?;

        let frame_table_ptr = r.read_u64::<LittleEndian>().map_err(io_read)?;

        let header = FileHeader {
            version,
            width,
            height,
            depth,
            framerate,
            frame_count,
            duration,
            encoding_params,
            frame_table_ptr,
        };

        let expected_duration = frame_count as f32 / framerate;
        if (expected_duration - duration).abs() > 0.1 {
            log::warn!(
                "file duration ({duration}) does not match frame_count/framerate ({expected_duration}); file may be corrupted or produced by a mismatched encoder",
            );
        }

        Ok(header)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(MAGIC_WORD).map_err(io_write)?;
        w.write_u32::<LittleEndian>(self.version).map_err(io_write)?;

        w.write_u32::<LittleEndian>(self.width).map_err(io_write)?;
        w.write_u32::<LittleEndian>(self.height).map_err(io_write)?;
        w.write_u32::<LittleEndian>(self.depth).map_err(io_write)?;

        w.write_f32::<LittleEndian>(self.framerate).map_err(io_write)?;
        w.write_u32::<LittleEndian>(self.frame_count).map_err(io_write)?;
        w.write_f32::<LittleEndian>(self.duration).map_err(io_write)?;

        self.encoding_params.write_to(w)?;
        w.write_u32::<LittleEndian>(0).map_err(io_write)?; // reserved

        w.write_u64::<LittleEndian>(self.frame_table_ptr)
            .map_err(io_write)?;

        Ok(())
    }

    /// Writes a placeholder header (all-zero except the magic word and
    /// version) at the encoder's starting position; the real header
    /// overwrites it once `frame_count`/`frame_table_ptr` are known.
    pub fn write_placeholder<W: Write + Seek>(w: &mut W) -> Result<()> {
        let placeholder = FileHeader {
            version: VERSION,
            width: 0,
            height: 0,
            depth: 0,
            framerate: 0.0,
            frame_count: 0,
            duration: 0.0,
            encoding_params: EncodingParams {
                gop_size: 0,
                max_brick_group_size: 0,
                motion_vectors: false,
            },
            frame_table_ptr: 0,
        };
        placeholder.write_to(w)
    }

    /// Rewrites this header at the start of `w`, restoring the writer's
    /// previous position afterwards.
    pub fn rewrite_at_start<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        let cur_pos = w.stream_position().map_err(io_write)?;
        w.seek(SeekFrom::Start(0)).map_err(io_write)?;
        self.write_to(w)?;
        w.seek(SeekFrom::Start(cur_pos)).map_err(io_write)?;
        Ok(())
    }
}

pub fn current_version() -> u32 {
    make_version(0, 2, 1, 0)
}

/// Whether a frame was encoded as a self-contained intra block or
/// predicted from the single previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncodingType {
    I = 0,
    P = 1,
}

impl FrameEncodingType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(FrameEncodingType::I),
            1 => Ok(FrameEncodingType::P),
            other => Err(Error::InvalidInput(format!(
                "invalid frame encoding type {}",
                other
            ))),
        }
    }
}

/// A single entry of the trailing frame table: where a frame's encoded
/// bytes start, and whether it's an I- or P-frame.
///
/// Packed as `(type << 56) | offset`, exactly as the reference format
/// does, so `offset` is limited to 56 bits (far beyond any realistic
/// file size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTableEntry {
    pub encoding_type: FrameEncodingType,
    pub offset: u64,
}

impl FrameTableEntry {
    pub fn pack(self) -> u64 {
        ((self.encoding_type as u64) << 56) | (self.offset & 0x00FF_FFFF_FFFF_FFFF)
    }

    pub fn unpack(raw: u64) -> Result<Self> {
        let encoding_type = FrameEncodingType::from_u8((raw >> 56) as u8)?;
        let offset = raw & 0x00FF_FFFF_FFFF_FFFF;
        Ok(FrameTableEntry {
            encoding_type,
            offset,
        })
    }
}

/// Lightweight metadata read straight from a file's header, without
/// reading its frame table or decoding any frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub framerate: f32,
    pub frame_count: u32,
    pub duration: f32,
    pub encoding_params: EncodingParams,
}

impl From<FileHeader> for Metadata {
    fn from(header: FileHeader) -> Self {
        Metadata {
            width: header.width,
            height: header.height,
            depth: header.depth,
            framerate: header.framerate,
            frame_count: header.frame_count,
            duration: header.duration,
            encoding_params: header.encoding_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> FileHeader {
        FileHeader {
            version: VERSION,
            width: 16,
            height: 16,
            depth: 8,
            framerate: 30.0,
            frame_count: 90,
            duration: 3.0,
            encoding_params: EncodingParams {
                gop_size: 30,
                max_brick_group_size: 0,
                motion_vectors: false,
            },
            frame_table_ptr: 1234,
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_SIZE);

        let mut cursor = Cursor::new(buf);
        let decoded = FileHeader::read_from(&mut cursor).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_magic_word_rejected() {
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        let mut cursor = Cursor::new(&mut buf);
        assert!(FileHeader::read_from(&mut cursor).is_err());
    }

    #[test]
    fn frame_table_entry_roundtrip() {
        let entry = FrameTableEntry {
            encoding_type: FrameEncodingType::P,
            offset: HEADER_SIZE,
        };
        let packed = entry.pack();
        let unpacked = FrameTableEntry::unpack(packed).unwrap();
        assert_eq!(entry, unpacked);
    }

    #[test]
    fn i_frame_table_entry_roundtrip() {
        let entry = FrameTableEntry {
            encoding_type: FrameEncodingType::I,
            offset: 0,
        };
        assert_eq!(FrameTableEntry::unpack(entry.pack()).unwrap(), entry);
    }
}
