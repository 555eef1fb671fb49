//! Morton (Z-order) traversal of a brick's voxels.
//!
//! Bricks are serialized and deserialized in Morton order rather than
//! linear xyz order because runs of same-state voxels (for the RLE
//! occupancy bitmap, §4.2.1) compress better when nearby voxels stay
//! close together in the traversal. The mapping MUST be identical on
//! the encode and decode side.

use crate::constants::BRICK_LEN;

/// Deinterleaves a 9-bit Morton code into brick-local `(x, y, z)`,
/// where bit `3k` is x's k-th bit, `3k+1` is y's, `3k+2` is z's.
const fn decode(morton: u32) -> (u32, u32, u32) {
    let mut x = 0u32;
    let mut y = 0u32;
    let mut z = 0u32;

    let mut bit = 0;
    while bit < 3 {
        x |= ((morton >> (3 * bit)) & 1) << bit;
        y |= ((morton >> (3 * bit + 1)) & 1) << bit;
        z |= ((morton >> (3 * bit + 2)) & 1) << bit;
        bit += 1;
    }

    (x, y, z)
}

const fn build_morton_to_idx() -> [u32; BRICK_LEN] {
    let mut table = [0u32; BRICK_LEN];

    let mut i = 0;
    while i < BRICK_LEN {
        let (x, y, z) = decode(i as u32);
        table[i] = x | (y << crate::constants::BRICK_SIZE_LOG2) | (z << crate::constants::BRICK_SIZE_2_LOG2);
        i += 1;
    }

    table
}

/// Maps a Morton traversal index to the brick's linear voxel index
/// (`x | y<<3 | z<<6`). Used both when serializing a brick (write
/// order) and when deserializing one (read order); these must match
/// exactly, which is why both sides go through this single table.
pub const MORTON_TO_IDX: [u32; BRICK_LEN] = build_morton_to_idx();
