//! The 8x8x8-voxel brick: occupancy bitmap, packed RGBA colors, and the
//! intra/predictive codecs described in §4.2.

use crate::buffer_io::{BufferReader, BufferWriter};
use crate::constants::{BRICK_LEN, BRICK_SIZE, BRICK_SIZE_2_LOG2, BRICK_SIZE_LOG2};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::morton::MORTON_TO_IDX;

const WORDS: usize = BRICK_LEN / 32;
const GEOM_DIFF_BITS: usize = 1 + 3 * BRICK_SIZE_LOG2 as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrickEncodingType {
    Intra = 0,
    Predictive = 1,
}

/// A fixed `BRICK_SIZE`^3 grid of voxels.
///
/// Colors are packed `0xRRGGBBAA`; alpha is always 255 for filled voxels
/// and meaningless for empty ones, matching the reference format (which
/// always writes 255 for alpha despite only ever storing RGB on disk).
#[derive(Debug, Clone)]
pub struct Brick {
    bitmap: [u32; WORDS],
    color: [u32; BRICK_LEN],
}

fn linear_idx(x: u32, y: u32, z: u32) -> usize {
    debug_assert!(x < BRICK_SIZE && y < BRICK_SIZE && z < BRICK_SIZE);
    (x | (y << BRICK_SIZE_LOG2) | (z << BRICK_SIZE_2_LOG2)) as usize
}

impl Default for Brick {
    fn default() -> Self {
        Brick {
            bitmap: [0; WORDS],
            color: [0; BRICK_LEN],
        }
    }
}

impl Brick {
    pub fn new() -> Self {
        Brick::default()
    }

    pub fn clear(&mut self) {
        self.bitmap = [0; WORDS];
    }

    pub fn set_voxel_filled(&mut self, x: u32, y: u32, z: u32, r: u8, g: u8, b: u8) {
        let idx = linear_idx(x, y, z);
        self.bitmap[idx >> 5] |= 1 << (idx & 31);
        self.color[idx] = ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | 255;
    }

    pub fn set_voxel_empty(&mut self, x: u32, y: u32, z: u32) {
        let idx = linear_idx(x, y, z);
        self.bitmap[idx >> 5] &= !(1 << (idx & 31));
    }

    pub fn get_voxel(&self, x: u32, y: u32, z: u32) -> bool {
        let idx = linear_idx(x, y, z);
        (self.bitmap[idx >> 5] & (1 << (idx & 31))) != 0
    }

    /// Returns whether the voxel is filled, plus its color if so.
    pub fn get_voxel_color(&self, x: u32, y: u32, z: u32) -> (bool, u8, u8, u8) {
        let idx = linear_idx(x, y, z);
        let filled = (self.bitmap[idx >> 5] & (1 << (idx & 31))) != 0;
        let color = self.color[idx];
        (
            filled,
            (color >> 24) as u8,
            ((color >> 16) & 0xFF) as u8,
            ((color >> 8) & 0xFF) as u8,
        )
    }

    pub fn num_voxels(&self) -> u32 {
        self.bitmap.iter().map(|w| w.count_ones()).sum()
    }

    /// Encodes the brick as a standalone intra block: a Morton-order RLE
    /// occupancy bitmap, a per-channel median color, and delta colors.
    pub fn encode_intra(&self, out: &mut BufferWriter) -> Result<()> {
        let mut bitmap_bytes = Vec::with_capacity(BRICK_LEN / 4);
        let mut color_bytes = Vec::with_capacity(BRICK_LEN * 3);

        let mut cur_bitmap_byte: u8 = if (self.bitmap[0] & 1) != 0 { 0x80 } else { 0x00 };

        let mut reds = Vec::new();
        let mut greens = Vec::new();
        let mut blues = Vec::new();

        for &morton_idx in MORTON_TO_IDX.iter() {
            let idx = morton_idx as usize;
            let filled = (self.bitmap[idx >> 5] & (1 << (idx & 31))) != 0;

            if filled != ((cur_bitmap_byte & 0x80) != 0) || (cur_bitmap_byte & 0x7F) == 127 {
                bitmap_bytes.push(cur_bitmap_byte);
                cur_bitmap_byte = if filled { 0x80 } else { 0x00 };
            }
            cur_bitmap_byte += 1;

            if filled {
                let color = self.color[idx];
                let r = (color >> 24) as u8;
                let g = ((color >> 16) & 0xFF) as u8;
                let b = ((color >> 8) & 0xFF) as u8;

                color_bytes.push(r);
                color_bytes.push(g);
                color_bytes.push(b);

                reds.push(r);
                greens.push(g);
                blues.push(b);
            }
        }
        bitmap_bytes.push(cur_bitmap_byte);

        let voxel_count = reds.len() as u32;

        reds.sort_unstable();
        greens.sort_unstable();
        blues.sort_unstable();

        let median = if voxel_count == 0 {
            [0u8, 0, 0]
        } else {
            [
                reds[reds.len() / 2],
                greens[greens.len() / 2],
                blues[blues.len() / 2],
            ]
        };

        for chunk in color_bytes.chunks_mut(3) {
            chunk[0] = chunk[0].wrapping_sub(median[0]);
            chunk[1] = chunk[1].wrapping_sub(median[1]);
            chunk[2] = chunk[2].wrapping_sub(median[2]);
        }

        out.put(BrickEncodingType::Intra as u8)?;
        out.write_u32(voxel_count)?;
        out.write(&bitmap_bytes)?;
        out.write(&median)?;
        out.write(&color_bytes)?;

        Ok(())
    }

    /// Encodes the brick relative to the brick occupying the same map
    /// cell in `last_frame`, falling back to [`Brick::encode_intra`] if
    /// there was no corresponding brick last frame or the geometry
    /// changed too much for prediction to be worthwhile.
    pub fn encode_predictive(
        &self,
        x_map: u32,
        y_map: u32,
        z_map: u32,
        out: &mut BufferWriter,
        last_frame: &Frame,
    ) -> Result<()> {
        let last_brick = match last_frame.brick_at(x_map, y_map, z_map) {
            Some(b) => b,
            None => return self.encode_intra(out),
        };

        let mut num_geom_diff = 0u32;
        let mut voxel_count = 0u32;
        for z in 0..BRICK_SIZE {
            for y in 0..BRICK_SIZE {
                for x in 0..BRICK_SIZE {
                    let filled = self.get_voxel(x, y, z);
                    let was_filled = last_brick.get_voxel(x, y, z);
                    if filled != was_filled {
                        num_geom_diff += 1;
                    }
                    if filled {
                        voxel_count += 1;
                    }
                }
            }
        }

        if num_geom_diff >= voxel_count / 2 {
            return self.encode_intra(out);
        }

        let mut geom_diff_bits = BitWriter::new((GEOM_DIFF_BITS * BRICK_LEN + 7) / 8);
        let mut color_bytes = Vec::with_capacity(BRICK_LEN * 3);

        for z in 0..BRICK_SIZE {
            for y in 0..BRICK_SIZE {
                for x in 0..BRICK_SIZE {
                    let filled = self.get_voxel(x, y, z);
                    let was_filled = last_brick.get_voxel(x, y, z);

                    if filled {
                        let (_, r, g, b) = self.get_voxel_color(x, y, z);

                        let (er, eg, eb) = if was_filled {
                            let (_, lr, lg, lb) = last_brick.get_voxel_color(x, y, z);
                            (r.wrapping_sub(lr), g.wrapping_sub(lg), b.wrapping_sub(lb))
                        } else {
                            geom_diff_bits.write_diff(true, x, y, z);
                            (r, g, b)
                        };

                        color_bytes.push(er);
                        color_bytes.push(eg);
                        color_bytes.push(eb);
                    } else if was_filled {
                        geom_diff_bits.write_diff(false, x, y, z);
                    }
                }
            }
        }

        out.put(BrickEncodingType::Predictive as u8)?;
        out.write_u32(num_geom_diff)?;
        out.write(geom_diff_bits.bytes())?;
        out.write(&color_bytes)?;

        Ok(())
    }

    /// Decodes a brick previously written by [`Brick::encode_intra`] or
    /// [`Brick::encode_predictive`].
    pub fn decode(
        reader: &mut BufferReader,
        x_map: u32,
        y_map: u32,
        z_map: u32,
        last_frame: &Frame,
    ) -> Result<Brick> {
        let encoding_type = reader.read_u8()?;
        match encoding_type {
            0 => Self::decode_intra(reader),
            1 => Self::decode_predictive(reader, x_map, y_map, z_map, last_frame),
            other => Err(Error::InvalidInput(format!(
                "invalid brick encoding type {}",
                other
            ))),
        }
    }

    fn decode_intra(reader: &mut BufferReader) -> Result<Brick> {
        let num_voxels = reader.read_u32()?;

        let mut brick = Brick::new();

        let mut i: usize = 0;
        while i < BRICK_LEN {
            let cur_byte = reader.read_u8()?;
            if (cur_byte & 0x80) != 0 {
                let mut run = cur_byte & 0x7F;
                while run > 0 {
                    let idx = MORTON_TO_IDX[i] as usize;
                    brick.bitmap[idx >> 5] |= 1 << (idx & 31);
                    i += 1;
                    run -= 1;
                }
            } else {
                i += cur_byte as usize;
            }
        }

        if i != BRICK_LEN {
            return Err(Error::InvalidInput(
                "brick bitmap decoding had incorrect number of voxels, possibly corrupted data"
                    .into(),
            ));
        }

        let median = reader.read(3)?;
        let (mr, mg, mb) = (median[0], median[1], median[2]);

        let mut read_voxels = 0u32;
        for &morton_idx in MORTON_TO_IDX.iter() {
            let idx = morton_idx as usize;
            if (brick.bitmap[idx >> 5] & (1 << (idx & 31))) != 0 {
                let rgb = reader.read(3)?;
                let r = rgb[0].wrapping_add(mr);
                let g = rgb[1].wrapping_add(mg);
                let b = rgb[2].wrapping_add(mb);
                brick.color[idx] = ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | 255;
                read_voxels += 1;
            }
        }

        if read_voxels != num_voxels {
            return Err(Error::InvalidInput(
                "brick had incorrect number of voxels, possibly corrupted data".into(),
            ));
        }

        Ok(brick)
    }

    fn decode_predictive(
        reader: &mut BufferReader,
        x_map: u32,
        y_map: u32,
        z_map: u32,
        last_frame: &Frame,
    ) -> Result<Brick> {
        let num_geom_diff = reader.read_u32()?;
        let geom_diff_bytes = reader.read(((GEOM_DIFF_BITS as u32 * num_geom_diff + 7) / 8) as u64)?;

        let last_brick = last_frame.brick_at(x_map, y_map, z_map).ok_or_else(|| {
            Error::InvalidInput("p-frame brick did not exist last frame".into())
        })?;

        let mut brick = last_brick.clone();

        let mut bit_reader = BitReader::new(geom_diff_bytes);
        for _ in 0..num_geom_diff {
            let add = bit_reader.read_bit();
            let x = bit_reader.read_bits(BRICK_SIZE_LOG2 as usize);
            let y = bit_reader.read_bits(BRICK_SIZE_LOG2 as usize);
            let z = bit_reader.read_bits(BRICK_SIZE_LOG2 as usize);

            if add {
                brick.set_voxel_filled(x, y, z, 0, 0, 0);
            } else {
                brick.set_voxel_empty(x, y, z);
            }
        }

        for z in 0..BRICK_SIZE {
            for y in 0..BRICK_SIZE {
                for x in 0..BRICK_SIZE {
                    let idx = linear_idx(x, y, z);
                    if (brick.bitmap[idx >> 5] & (1 << (idx & 31))) == 0 {
                        continue;
                    }

                    let rgb = reader.read(3)?;
                    let old_color = brick.color[idx];
                    let r = ((old_color >> 24) as u8).wrapping_add(rgb[0]);
                    let g = (((old_color >> 16) & 0xFF) as u8).wrapping_add(rgb[1]);
                    let b = (((old_color >> 8) & 0xFF) as u8).wrapping_add(rgb[2]);
                    brick.color[idx] = ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | 255;
                }
            }
        }

        Ok(brick)
    }
}

/// Packs geometry-diff records (1 flag bit + 3 coordinate fields) into a
/// big-endian-within-byte bitstream, matching the reference encoder.
struct BitWriter {
    bytes: Vec<u8>,
    bit_idx: usize,
}

impl BitWriter {
    fn new(cap: usize) -> Self {
        BitWriter {
            bytes: vec![0u8; cap],
            bit_idx: 0,
        }
    }

    fn write_bit(&mut self, bit: bool) {
        if bit {
            self.bytes[self.bit_idx / 8] |= 1 << (7 - (self.bit_idx % 8));
        }
        self.bit_idx += 1;
    }

    fn write_diff(&mut self, add: bool, x: u32, y: u32, z: u32) {
        self.write_bit(add);
        for i in 0..BRICK_SIZE_LOG2 {
            self.write_bit(((x >> i) & 1) != 0);
        }
        for i in 0..BRICK_SIZE_LOG2 {
            self.write_bit(((y >> i) & 1) != 0);
        }
        for i in 0..BRICK_SIZE_LOG2 {
            self.write_bit(((z >> i) & 1) != 0);
        }
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes[..(self.bit_idx + 7) / 8]
    }
}

struct BitReader<'a> {
    buf: &'a [u8],
    bit_idx: usize,
}

impl<'a> BitReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        BitReader { buf, bit_idx: 0 }
    }

    fn read_bit(&mut self) -> bool {
        let byte = self.buf[self.bit_idx / 8];
        let bit = (byte & (1 << (7 - (self.bit_idx % 8)))) != 0;
        self.bit_idx += 1;
        bit
    }

    fn read_bits(&mut self, count: usize) -> u32 {
        let mut value = 0u32;
        for i in 0..count {
            if self.read_bit() {
                value |= 1 << i;
            }
        }
        value
    }
}
