//! Sequential frame encoder: builds the per-frame bitstream (map bitmap
//! + brick payloads), range-codes it, and appends it to an output file,
//! tracking the frame table as it goes (§4.3, §4.5).

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::buffer_io::BufferWriter;
use crate::constants::BRICK_SIZE;
use crate::container::{EncodingParams, FileHeader, FrameEncodingType, FrameTableEntry};
use crate::error::{io_write, Error, Result};
use crate::frame::Frame;
use crate::rangecoder;

/// Encodes a sequence of [`Frame`]s into an SPLV file.
///
/// Frames must be encoded in order; the encoder keeps only the most
/// recently encoded frame around (for the next frame's P-prediction),
/// so the caller's own frame buffers can be freed once
/// [`Encoder::encode_frame`] reports it is safe to (i.e. at GOP
/// boundaries).
pub struct Encoder<W: Write + Seek> {
    out: W,

    width: u32,
    height: u32,
    depth: u32,

    framerate: f32,
    encoding_params: EncodingParams,

    frame_count: u32,
    frame_table: Vec<u64>,

    last_frame: Option<Frame>,

    frame_writer: BufferWriter,
    encoded_frame_writer: BufferWriter,
}

impl Encoder<BufWriter<File>> {
    /// Creates an encoder writing to a new file at `path`. `width`,
    /// `height` and `depth` are in voxels and must each be a multiple of
    /// [`crate::constants::BRICK_SIZE`].
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        depth: u32,
        framerate: f32,
        encoding_params: EncodingParams,
    ) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::FileOpen(e.to_string()))?;
        Encoder::create_with_writer(BufWriter::new(file), width, height, depth, framerate, encoding_params)
    }
}

impl<W: Write + Seek> Encoder<W> {
    /// As [`Encoder::create`], but writes to an arbitrary `Write + Seek`
    /// sink instead of opening a file.
    pub fn create_with_writer(
        mut out: W,
        width: u32,
        height: u32,
        depth: u32,
        framerate: f32,
        encoding_params: EncodingParams,
    ) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(Error::InvalidArguments("volume dimensions must be positive".into()));
        }
        if width % BRICK_SIZE != 0 || height % BRICK_SIZE != 0 || depth % BRICK_SIZE != 0 {
            return Err(Error::InvalidArguments(
                "volume dimensions must be a multiple of BRICK_SIZE".into(),
            ));
        }
        if framerate <= 0.0 {
            return Err(Error::InvalidArguments("framerate must be positive".into()));
        }
        if encoding_params.gop_size == 0 {
            return Err(Error::InvalidArguments("gop size must be positive".into()));
        }

        FileHeader::write_placeholder(&mut out)?;

        Ok(Encoder {
            out,
            width,
            height,
            depth,
            framerate,
            encoding_params,
            frame_count: 0,
            frame_table: Vec::new(),
            last_frame: None,
            frame_writer: BufferWriter::new(),
            encoded_frame_writer: BufferWriter::new(),
        })
    }

    /// Encodes one frame and appends it to the output. Returns whether
    /// the caller may now free frames older than this one (true exactly
    /// at GOP boundaries, since only the single previous frame is ever
    /// referenced for prediction).
    pub fn encode_frame(&mut self, frame: &Frame) -> Result<bool> {
        let width_map = self.width / BRICK_SIZE;
        let height_map = self.height / BRICK_SIZE;
        let depth_map = self.depth / BRICK_SIZE;

        if frame.width() != width_map || frame.height() != height_map || frame.depth() != depth_map {
            return Err(Error::InvalidArguments(
                "frame dimensions must match those specified in Encoder::create".into(),
            ));
        }

        let frame_type = if self.frame_count % self.encoding_params.gop_size == 0 {
            FrameEncodingType::I
        } else {
            FrameEncodingType::P
        };

        let map_len = (width_map * height_map * depth_map) as usize;
        let bitmap_words = (map_len + 31) / 32;
        let mut map_bitmap = vec![0u32; bitmap_words];

        // We write bricks in x-outer, y-mid, z-inner order; decoding
        // must walk the map bitmap in the same order to line them up.
        let mut ordered_positions = Vec::new();
        for x_map in 0..width_map {
            for y_map in 0..height_map {
                for z_map in 0..depth_map {
                    let write_idx = (x_map + width_map * (y_map + height_map * z_map)) as usize;
                    if frame.is_occupied(x_map, y_map, z_map) {
                        map_bitmap[write_idx / 32] |= 1 << (write_idx % 32);
                        ordered_positions.push((x_map, y_map, z_map));
                    }
                }
            }
        }

        self.frame_writer.reset();
        self.frame_writer.write_u32(ordered_positions.len() as u32)?;
        for word in &map_bitmap {
            self.frame_writer.write_u32(*word)?;
        }

        for &(x_map, y_map, z_map) in &ordered_positions {
            let brick = frame.brick_at(x_map, y_map, z_map).ok_or_else(|| {
                Error::Internal("brick vanished between occupancy scan and serialization".into())
            })?;

            match frame_type {
                FrameEncodingType::P => {
                    let last_frame = self.last_frame.as_ref().ok_or_else(|| {
                        Error::Internal("P-frame requested with no previous frame".into())
                    })?;
                    brick.encode_predictive(x_map, y_map, z_map, &mut self.frame_writer, last_frame)?;
                }
                FrameEncodingType::I => {
                    brick.encode_intra(&mut self.frame_writer)?;
                }
            }
        }

        let frame_ptr = self.out.stream_position().map_err(io_write)?;
        self.frame_table.push(
            (FrameTableEntry {
                encoding_type: frame_type,
                offset: frame_ptr,
            })
            .pack(),
        );

        self.encoded_frame_writer.reset();
        rangecoder::encode(self.frame_writer.as_slice(), &mut self.encoded_frame_writer)?;

        self.out
            .write_all(self.encoded_frame_writer.as_slice())
            .map_err(io_write)?;

        self.frame_count += 1;
        self.last_frame = Some(frame.clone());

        Ok(self.frame_count % self.encoding_params.gop_size == 0)
    }

    /// Writes the frame table, then the final header, and flushes the
    /// output. Consumes the encoder since no further frames can follow.
    pub fn finish(mut self) -> Result<()> {
        let frame_table_ptr = self.out.stream_position().map_err(io_write)?;

        for &entry in &self.frame_table {
            self.out
                .write_all(&entry.to_le_bytes())
                .map_err(io_write)?;
        }

        let header = FileHeader {
            version: crate::constants::VERSION,
            width: self.width,
            height: self.height,
            depth: self.depth,
            framerate: self.framerate,
            frame_count: self.frame_count,
            duration: self.frame_count as f32 / self.framerate,
            encoding_params: self.encoding_params,
            frame_table_ptr,
        };

        header.rewrite_at_start(&mut self.out)?;
        self.out.flush().map_err(io_write)?;

        Ok(())
    }

    /// Abandons the encode. Since the output is only valid once
    /// [`Encoder::finish`] has rewritten the header, simply dropping the
    /// encoder (or calling this) leaves behind an unreadable partial
    /// file, matching the reference encoder's abort semantics.
    pub fn abort(self) {}

    /// Unwraps the encoder, returning its underlying writer without
    /// finalizing the file. Used by other modules' tests to inspect
    /// encoded bytes directly instead of round-tripping through disk.
    #[cfg(test)]
    pub(crate) fn into_writer(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn small_frame(width_map: u32, height_map: u32, depth_map: u32) -> Frame {
        Frame::new(width_map, height_map, depth_map).unwrap()
    }

    #[test]
    fn rejects_non_brick_aligned_dimensions() {
        let out = Cursor::new(Vec::new());
        let params = EncodingParams::new(1).unwrap();
        let result = Encoder::create_with_writer(out, 5, 8, 8, 30.0, params);
        assert!(result.is_err());
    }

    #[test]
    fn encode_and_finish_empty_sequence() {
        let out = Cursor::new(Vec::new());
        let params = EncodingParams::new(1).unwrap();
        let mut encoder =
            Encoder::create_with_writer(out, 8, 8, 8, 30.0, params).unwrap();

        let frame = small_frame(1, 1, 1);
        let can_free = encoder.encode_frame(&frame).unwrap();
        assert!(can_free); // gop_size 1: every frame is a boundary

        encoder.finish().unwrap();
    }

    #[test]
    fn rejects_mismatched_frame_dimensions() {
        let out = Cursor::new(Vec::new());
        let params = EncodingParams::new(2).unwrap();
        let mut encoder =
            Encoder::create_with_writer(out, 16, 8, 8, 30.0, params).unwrap();

        let frame = small_frame(1, 1, 1); // should be 2x1x1 in bricks
        assert!(encoder.encode_frame(&frame).is_err());
    }
}
