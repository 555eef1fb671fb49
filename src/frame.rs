//! A single frame: a sparse `width x height x depth` grid of bricks (in
//! brick units, not voxels), addressed through a dense map of brick
//! indices (§3, §4.2).

use crate::brick::Brick;
use crate::constants::{BRICK_IDX_EMPTY, BRICK_LEN};
use crate::error::{Error, Result};

/// A spatial frame: a dense map over brick-grid cells, each either empty
/// or pointing into a packed array of occupied [`Brick`]s.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    depth: u32,

    map: Vec<u32>,
    bricks: Vec<Brick>,
}

impl Frame {
    /// Creates an empty frame of the given brick-grid dimensions. All
    /// map cells start unoccupied.
    pub fn new(width: u32, height: u32, depth: u32) -> Result<Frame> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(Error::InvalidArguments(
                "frame dimensions must be positive".into(),
            ));
        }

        let map_len = (width as usize) * (height as usize) * (depth as usize);
        Ok(Frame {
            width,
            height,
            depth,
            map: vec![BRICK_IDX_EMPTY; map_len],
            bricks: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn map_idx(&self, x: u32, y: u32, z: u32) -> usize {
        (x + self.width * (y + self.height * z)) as usize
    }

    /// Returns the brick occupying map cell `(x, y, z)`, if any.
    pub fn brick_at(&self, x: u32, y: u32, z: u32) -> Option<&Brick> {
        let idx = self.map[self.map_idx(x, y, z)];
        if idx == BRICK_IDX_EMPTY {
            None
        } else {
            Some(&self.bricks[idx as usize])
        }
    }

    /// Places `brick` at map cell `(x, y, z)`, replacing anything already
    /// there.
    pub fn set_brick(&mut self, x: u32, y: u32, z: u32, brick: Brick) -> Result<()> {
        if x >= self.width || y >= self.height || z >= self.depth {
            return Err(Error::InvalidArguments("map coordinates out of bounds".into()));
        }

        let brick_idx = self.bricks.len() as u32;
        self.bricks.push(brick);

        let map_idx = self.map_idx(x, y, z);
        self.map[map_idx] = brick_idx;

        Ok(())
    }

    /// Clears the map cell `(x, y, z)`, if occupied. The underlying
    /// brick storage is left as-is; frames are write-once during
    /// encoding, so compacting it is unnecessary.
    pub fn clear_brick(&mut self, x: u32, y: u32, z: u32) {
        let map_idx = self.map_idx(x, y, z);
        self.map[map_idx] = BRICK_IDX_EMPTY;
    }

    pub fn is_occupied(&self, x: u32, y: u32, z: u32) -> bool {
        self.map[self.map_idx(x, y, z)] != BRICK_IDX_EMPTY
    }

    /// Iterates every occupied map cell along with its brick, in
    /// `x`-fastest, `z`-slowest order.
    pub fn occupied_bricks(&self) -> impl Iterator<Item = (u32, u32, u32, &Brick)> {
        FrameBrickIter {
            frame: self,
            x: 0,
            y: 0,
            z: 0,
        }
    }

    pub fn num_voxels(&self) -> u64 {
        self.occupied_bricks()
            .map(|(_, _, _, brick)| brick.num_voxels() as u64)
            .sum()
    }

    /// Approximate in-memory size, in bytes: the dense map plus the
    /// packed brick array.
    pub fn size_bytes(&self) -> u64 {
        let map_size = (self.map.len() * std::mem::size_of::<u64>()) as u64;
        let bricks_size = (self.bricks.len() * BRICK_LEN * (4 + 4)) as u64;
        map_size + bricks_size
    }

}

struct FrameBrickIter<'a> {
    frame: &'a Frame,
    x: u32,
    y: u32,
    z: u32,
}

impl<'a> Iterator for FrameBrickIter<'a> {
    type Item = (u32, u32, u32, &'a Brick);

    fn next(&mut self) -> Option<Self::Item> {
        while self.z < self.frame.depth {
            while self.y < self.frame.height {
                while self.x < self.frame.width {
                    let (x, y, z) = (self.x, self.y, self.z);
                    self.x += 1;

                    if let Some(brick) = self.frame.brick_at(x, y, z) {
                        return Some((x, y, z, brick));
                    }
                }
                self.x = 0;
                self.y += 1;
            }
            self.y = 0;
            self.z += 1;
        }
        None
    }
}
