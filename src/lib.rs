//! SPLV: a compressed file format for animated volumetric video.
//!
//! A sequence of frames, each a sparse grid of fixed-size "bricks" of
//! colored voxels, is encoded with intra/predictive per-brick coding and
//! a final range-coding pass, then packed into a file with a frame-offset
//! table for random access (see each module for the relevant section of
//! the format).

pub mod brick;
pub mod buffer_io;
pub mod constants;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod morton;
pub mod rangecoder;
pub mod sequential;

pub use brick::Brick;
pub use container::{EncodingParams, FrameEncodingType, Metadata};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use frame::Frame;
pub use sequential::{concat, file_metadata, split, upgrade, FrameSource};
