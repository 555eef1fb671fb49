//! Random-access SPLV decoder: header + frame-table parsing, dependency
//! queries, and per-frame brick reconstruction (§4.3, §4.5, §6).

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::brick::Brick;
use crate::buffer_io::BufferReader;
use crate::constants::{BRICK_SIZE, VERSION};
use crate::container::{EncodingParams, FileHeader, FrameEncodingType, FrameTableEntry, Metadata, HEADER_SIZE};
use crate::error::{io_read, Error, Result};
use crate::frame::Frame;
use crate::rangecoder;

/// Where a decoder's encoded bytes come from.
///
/// Modeled as a sum type dispatched by match (§9) rather than a trait
/// object: a decoder is backed by either a caller-supplied in-memory
/// buffer or a file handle, never both, and never switches between them.
enum Source {
    Memory(Vec<u8>),
    File(BufReader<File>),
}

impl Source {
    /// Reads `len` bytes starting at absolute offset `start`.
    fn read_range(&mut self, start: u64, len: u64) -> Result<Vec<u8>> {
        match self {
            Source::Memory(buf) => {
                let start = start as usize;
                let end = start
                    .checked_add(len as usize)
                    .ok_or_else(|| Error::FileRead("read range overflow".into()))?;
                if end > buf.len() {
                    return Err(Error::FileRead("trying to read past end of buffer".into()));
                }
                Ok(buf[start..end].to_vec())
            }
            Source::File(file) => {
                file.seek(SeekFrom::Start(start)).map_err(io_read)?;
                let mut out = vec![0u8; len as usize];
                file.read_exact(&mut out).map_err(io_read)?;
                Ok(out)
            }
        }
    }
}

/// A decoder bound to one SPLV file or in-memory buffer.
///
/// Holds the parsed header and frame table; decoding a frame re-reads its
/// bytes from `source` on every call rather than caching anything, since
/// random access is the whole point of the container format.
pub struct Decoder {
    source: Source,

    width: u32,
    height: u32,
    depth: u32,
    framerate: f32,
    frame_count: u32,
    duration: f32,
    encoding_params: EncodingParams,

    frame_table: Vec<FrameTableEntry>,
    frame_table_ptr: u64,

    map_width: u32,
    map_height: u32,
    map_depth: u32,
}

impl Decoder {
    /// Opens a decoder reading from an owned in-memory buffer.
    pub fn create_from_mem(buf: Vec<u8>) -> Result<Self> {
        Self::create(Source::Memory(buf))
    }

    /// Opens a decoder reading from a file at `path`.
    pub fn create_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::FileOpen(e.to_string()))?;
        Self::create(Source::File(BufReader::new(file)))
    }

    fn create(mut source: Source) -> Result<Self> {
        let header_bytes = source.read_range(0, HEADER_SIZE)?;
        let header = FileHeader::read_from(&mut &header_bytes[..])?;

        if header.version != VERSION {
            return Err(Error::InvalidInput(
                "invalid SPLV file - mismatched version".into(),
            ));
        }
        if header.width == 0 || header.height == 0 || header.depth == 0 {
            return Err(Error::InvalidInput(
                "invalid SPLV file - dimensions must be positive".into(),
            ));
        }
        if header.width % BRICK_SIZE != 0
            || header.height % BRICK_SIZE != 0
            || header.depth % BRICK_SIZE != 0
        {
            return Err(Error::InvalidInput(
                "invalid SPLV file - dimensions must be a multiple of BRICK_SIZE".into(),
            ));
        }
        if header.framerate <= 0.0 {
            return Err(Error::InvalidInput(
                "invalid SPLV file - framerate must be positive".into(),
            ));
        }
        if header.frame_count == 0 {
            return Err(Error::InvalidInput(
                "invalid SPLV file - frame count must be positive".into(),
            ));
        }

        let table_bytes =
            source.read_range(header.frame_table_ptr, header.frame_count as u64 * 8)?;
        let mut frame_table = Vec::with_capacity(header.frame_count as usize);
        for chunk in table_bytes.chunks_exact(8) {
            let raw = u64::from_le_bytes(chunk.try_into().unwrap());
            frame_table.push(FrameTableEntry::unpack(raw)?);
        }

        Ok(Decoder {
            source,
            width: header.width,
            height: header.height,
            depth: header.depth,
            framerate: header.framerate,
            frame_count: header.frame_count,
            duration: header.duration,
            encoding_params: header.encoding_params,
            frame_table,
            frame_table_ptr: header.frame_table_ptr,
            map_width: header.width / BRICK_SIZE,
            map_height: header.height / BRICK_SIZE,
            map_depth: header.depth / BRICK_SIZE,
        })
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            width: self.width,
            height: self.height,
            depth: self.depth,
            framerate: self.framerate,
            frame_count: self.frame_count,
            duration: self.duration,
            encoding_params: self.encoding_params,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn check_idx(&self, idx: u64) -> Result<()> {
        if idx >= self.frame_count as u64 {
            return Err(Error::InvalidArguments("frame index out of bounds".into()));
        }
        Ok(())
    }

    /// Frame indices that must be decoded (and kept live) before `idx` can
    /// be decoded. Empty for an I-frame; `[idx-1]` for a P-frame, or the
    /// full chain back to (and including) the enclosing I-frame if
    /// `recursive` is set (§4.3).
    pub fn dependencies(&self, idx: u64, recursive: bool) -> Result<Vec<u64>> {
        self.check_idx(idx)?;

        match self.frame_table[idx as usize].encoding_type {
            FrameEncodingType::I => Ok(Vec::new()),
            FrameEncodingType::P => {
                if idx == 0 {
                    return Err(Error::InvalidInput(
                        "invalid SPLV file - first frame cannot be a p-frame".into(),
                    ));
                }

                if recursive {
                    let prev_i = self.prev_i_frame_idx(idx).ok_or_else(|| {
                        Error::InvalidInput(
                            "invalid SPLV file - no preceding i-frame for p-frame".into(),
                        )
                    })?;
                    Ok((prev_i..idx).collect())
                } else {
                    Ok(vec![idx - 1])
                }
            }
        }
    }

    /// Index of the nearest I-frame at or before `idx`, if any.
    pub fn prev_i_frame_idx(&self, idx: u64) -> Option<u64> {
        if idx >= self.frame_count as u64 {
            return None;
        }

        let mut frame_idx = idx as i64;
        while frame_idx >= 0
            && self.frame_table[frame_idx as usize].encoding_type != FrameEncodingType::I
        {
            frame_idx -= 1;
        }

        if frame_idx < 0 {
            None
        } else {
            Some(frame_idx as u64)
        }
    }

    /// Index of the nearest I-frame at or after `idx`, if any.
    pub fn next_i_frame_idx(&self, idx: u64) -> Option<u64> {
        if idx >= self.frame_count as u64 {
            return None;
        }

        let mut frame_idx = idx as i64;
        while (frame_idx as u64) < self.frame_count as u64
            && self.frame_table[frame_idx as usize].encoding_type != FrameEncodingType::I
        {
            frame_idx += 1;
        }

        if frame_idx as u64 >= self.frame_count as u64 {
            None
        } else {
            Some(frame_idx as u64)
        }
    }

    /// Decodes frame `idx`. `deps` must contain an entry for every index
    /// returned by `dependencies(idx, false)` — in practice just `idx-1`
    /// for a P-frame, since this codec never looks back further than one
    /// frame.
    pub fn decode_frame(&mut self, idx: u64, deps: &[(u64, &Frame)]) -> Result<Frame> {
        self.check_idx(idx)?;

        let entry = self.frame_table[idx as usize];

        let last_frame = match entry.encoding_type {
            FrameEncodingType::I => None,
            FrameEncodingType::P => {
                if idx == 0 {
                    return Err(Error::InvalidInput(
                        "invalid SPLV file - first frame cannot be a p-frame".into(),
                    ));
                }

                let found = deps.iter().find(|(i, _)| *i == idx - 1).map(|(_, f)| *f);
                if found.is_none() {
                    return Err(Error::Runtime(
                        "necessary dependencies were not supplied for decoding frame".into(),
                    ));
                }
                found
            }
        };

        let start = entry.offset;
        let end = if (idx as usize + 1) < self.frame_table.len() {
            self.frame_table[idx as usize + 1].offset
        } else {
            self.frame_table_ptr
        };
        if end < start {
            return Err(Error::Internal("frame table entries out of order".into()));
        }

        let coded = self.source.read_range(start, end - start)?;
        let payload = rangecoder::decode(&coded)?;
        let mut reader = BufferReader::new(&payload);

        let num_bricks = reader.read_u32()?;

        let map_len = (self.map_width * self.map_height * self.map_depth) as usize;
        let bitmap_words = (map_len + 31) / 32;
        let mut bitmap = Vec::with_capacity(bitmap_words);
        for _ in 0..bitmap_words {
            bitmap.push(reader.read_u32()?);
        }

        // Walk the map in the same x-major, y, z order the encoder used
        // to set bitmap bits, so the ordered brick positions line up with
        // the brick payloads that follow in the stream.
        let mut positions = Vec::with_capacity(num_bricks as usize);
        for x in 0..self.map_width {
            for y in 0..self.map_height {
                for z in 0..self.map_depth {
                    let bit_idx = (x + self.map_width * (y + self.map_height * z)) as usize;
                    if (bitmap[bit_idx / 32] >> (bit_idx % 32)) & 1 != 0 {
                        positions.push((x, y, z));
                    }
                }
            }
        }

        if positions.len() as u32 != num_bricks {
            return Err(Error::InvalidInput(
                "frame map bitmap popcount does not match declared brick count".into(),
            ));
        }

        let empty_frame;
        let last_frame_ref = match last_frame {
            Some(f) => f,
            None => {
                empty_frame = Frame::new(self.map_width, self.map_height, self.map_depth)?;
                &empty_frame
            }
        };

        let mut frame = Frame::new(self.map_width, self.map_height, self.map_depth)?;
        for (x, y, z) in positions {
            let brick = Brick::decode(&mut reader, x, y, z, last_frame_ref)?;
            frame.set_brick(x, y, z, brick)?;
        }

        Ok(frame)
    }
}
