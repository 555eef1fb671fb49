//! Sequential, whole-file helpers built on top of [`Encoder`]/[`Decoder`]:
//! concatenation, time-based splitting, and upgrading from an external
//! frame producer (§4.5, §9).
//!
//! The reference implementation builds these with a hand-rolled
//! reference-counted frame cache, since in general a decoder may need to
//! retain more than one past frame for a dependency chain. This codec
//! only ever looks back a single frame (§1 Non-goals), so the cache
//! collapses to "keep the one most recently decoded frame" — exactly
//! what [`Encoder`] itself already does for encoding.

use std::fs::create_dir_all;
use std::path::Path;

use crate::container::{EncodingParams, Metadata};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// An external source of frames, playing the same out-of-scope-producer
/// role as a NanoVDB/`.vox` loader or a legacy-format reader (§1): this
/// crate only needs it to hand back frames of a declared size, in order.
pub trait FrameSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn depth(&self) -> u32;
    fn framerate(&self) -> f32;
    fn frame_count(&self) -> u32;
    fn encoding_params(&self) -> EncodingParams;

    /// Produces the next frame in sequence. Called exactly `frame_count()`
    /// times per upgrade.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Decodes a single SPLV file frame-by-frame, retaining only as much
/// state as this codec's single-frame lookback requires.
struct SequentialDecoder {
    decoder: Decoder,
    cur_frame: u64,
    last: Option<(u64, Frame)>,
}

impl SequentialDecoder {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(SequentialDecoder {
            decoder: Decoder::create_from_file(path)?,
            cur_frame: 0,
            last: None,
        })
    }

    fn metadata(&self) -> Metadata {
        self.decoder.metadata()
    }

    fn decode_next(&mut self) -> Result<Frame> {
        let idx = self.cur_frame;

        let deps: Vec<(u64, &Frame)> = match &self.last {
            Some((last_idx, frame)) if idx > 0 && *last_idx == idx - 1 => vec![(*last_idx, frame)],
            _ => Vec::new(),
        };

        let frame = self.decoder.decode_frame(idx, &deps)?;

        self.cur_frame += 1;
        self.last = Some((idx, frame.clone()));

        Ok(frame)
    }
}

/// Verifies all inputs share a volume size, decodes each in turn, and
/// re-encodes them back-to-back into a single output file.
///
/// Framerate mismatches beyond 0.1s/frame are a warning, not an error;
/// the output uses the first input's framerate (§4.5).
pub fn concat<P: AsRef<Path>, Q: AsRef<Path>>(paths: &[P], out_path: Q) -> Result<()> {
    if paths.is_empty() {
        return Err(Error::InvalidArguments("no input paths specified".into()));
    }

    let first_meta = Decoder::create_from_file(&paths[0])?.metadata();

    let mut encoder = Encoder::create(
        out_path,
        first_meta.width,
        first_meta.height,
        first_meta.depth,
        first_meta.framerate,
        first_meta.encoding_params,
    )?;

    for path in paths {
        let mut seq = SequentialDecoder::open(path)?;
        let meta = seq.metadata();

        if meta.width != first_meta.width
            || meta.height != first_meta.height
            || meta.depth != first_meta.depth
        {
            return Err(Error::InvalidInput(
                "input files have mismatched dimensions".into(),
            ));
        }

        if (meta.framerate - first_meta.framerate).abs() > 0.1 {
            log::warn!("framerate mismatch for concatenated spatials");
        }

        for _ in 0..meta.frame_count {
            let frame = seq.decode_next()?;
            encoder.encode_frame(&frame)?;
        }
    }

    encoder.finish()
}

/// Splits an SPLV file into back-to-back files of `split_length_secs`
/// seconds each (the last one getting the remainder), named
/// `split_0000.splv`, `split_0001.splv`, ... in `out_dir`. Returns the
/// number of files written.
pub fn split<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    split_length_secs: f32,
    out_dir: Q,
) -> Result<u32> {
    if split_length_secs <= 0.0 {
        return Err(Error::InvalidArguments(
            "split length must be positive".into(),
        ));
    }

    create_dir_all(&out_dir).map_err(|e| Error::FileOpen(e.to_string()))?;

    let mut seq = SequentialDecoder::open(path)?;
    let meta = seq.metadata();

    let frames_per_split = (split_length_secs * meta.framerate) as u32;
    if frames_per_split == 0 {
        return Err(Error::InvalidArguments(
            "split length too small, would lead to 0 frames per split".into(),
        ));
    }

    let num_splits = (meta.frame_count + frames_per_split - 1) / frames_per_split;

    for split_idx in 0..num_splits {
        let out_path = out_dir.as_ref().join(format!("split_{:04}.splv", split_idx));

        let mut encoder = Encoder::create(
            out_path,
            meta.width,
            meta.height,
            meta.depth,
            meta.framerate,
            meta.encoding_params,
        )?;

        let start_frame = split_idx * frames_per_split;
        let end_frame = ((split_idx + 1) * frames_per_split).min(meta.frame_count);

        for _ in start_frame..end_frame {
            let frame = seq.decode_next()?;
            encoder.encode_frame(&frame)?;
        }

        encoder.finish()?;
    }

    Ok(num_splits)
}

/// Re-encodes frames pulled from an arbitrary [`FrameSource`] (e.g. a
/// legacy-format reader) into a fresh SPLV file using the current
/// encoder.
pub fn upgrade<S: FrameSource, P: AsRef<Path>>(mut source: S, out_path: P) -> Result<()> {
    let params = source.encoding_params();

    let mut encoder = Encoder::create(
        out_path,
        source.width(),
        source.height(),
        source.depth(),
        source.framerate(),
        params,
    )?;

    for _ in 0..source.frame_count() {
        let frame = source.next_frame()?;
        encoder.encode_frame(&frame)?;
    }

    encoder.finish()
}

/// Reads just the header of an SPLV file, without its frame table or any
/// frame bytes.
pub fn file_metadata<P: AsRef<Path>>(path: P) -> Result<Metadata> {
    Ok(Decoder::create_from_file(path)?.metadata())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brick::Brick;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A throwaway directory under the system temp dir, removed on drop.
    /// The crate has no need for a `tempfile`-style dependency outside
    /// tests, so this stands in for one.
    struct ScratchDir(std::path::PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            static COUNTER: AtomicU32 = AtomicU32::new(0);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "splv_test_{}_{}_{}",
                std::process::id(),
                tag,
                n
            ));
            create_dir_all(&dir).unwrap();
            ScratchDir(dir)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn write_sample_file<P: AsRef<Path>>(path: P, frames: u32, gop: u32, fill: u8) {
        let params = EncodingParams::new(gop).unwrap();
        let mut encoder =
            Encoder::create(path, 8, 8, 8, 30.0, params).unwrap();

        for i in 0..frames {
            let mut frame = Frame::new(1, 1, 1).unwrap();
            let mut brick = Brick::new();
            brick.set_voxel_filled(0, 0, 0, fill.wrapping_add(i as u8), fill, fill);
            frame.set_brick(0, 0, 0, brick).unwrap();
            encoder.encode_frame(&frame).unwrap();
        }

        encoder.finish().unwrap();
    }

    #[test]
    fn concat_two_files_preserves_frame_count() {
        let dir = ScratchDir::new("concat");
        let a = dir.path().join("a.splv");
        let b = dir.path().join("b.splv");
        let out = dir.path().join("out.splv");

        write_sample_file(&a, 3, 2, 10);
        write_sample_file(&b, 2, 2, 50);

        concat(&[a, b], &out).unwrap();

        let meta = file_metadata(&out).unwrap();
        assert_eq!(meta.frame_count, 5);
    }

    #[test]
    fn concat_rejects_empty_input() {
        let dir = ScratchDir::new("concat_empty");
        let out = dir.path().join("out.splv");
        let paths: Vec<std::path::PathBuf> = Vec::new();
        assert!(concat(&paths, &out).is_err());
    }

    #[test]
    fn split_then_concat_recovers_frame_count() {
        let dir = ScratchDir::new("split");
        let src = dir.path().join("src.splv");
        write_sample_file(&src, 60, 30, 1);

        let num_splits = split(&src, 1.0, dir.path()).unwrap();
        assert_eq!(num_splits, 2);

        let split_paths: Vec<_> = (0..num_splits)
            .map(|i| dir.path().join(format!("split_{:04}.splv", i)))
            .collect();

        let recombined = dir.path().join("recombined.splv");
        concat(&split_paths, &recombined).unwrap();

        let meta = file_metadata(&recombined).unwrap();
        assert_eq!(meta.frame_count, 60);
    }
}
