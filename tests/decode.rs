//! End-to-end encode/decode scenarios exercising the container format as
//! a whole: GOP structure, P-frame prediction, random access, and the
//! split/concat round trip.

use splv::container::EncodingParams;
use splv::decoder::Decoder;
use splv::encoder::Encoder;
use splv::frame::Frame;
use splv::{concat, file_metadata, split};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn frame_with_voxel(x: u32, y: u32, z: u32, color: (u8, u8, u8)) -> Frame {
    let mut frame = Frame::new(1, 1, 1).unwrap();
    let mut brick = splv::Brick::new();
    brick.set_voxel_filled(x, y, z, color.0, color.1, color.2);
    frame.set_brick(0, 0, 0, brick).unwrap();
    frame
}

/// Scenario A: single-brick I-frame.
#[test]
fn single_brick_i_frame_scenario() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("splv_e2e_a_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("a.splv");

    let params = EncodingParams::new(1).unwrap();
    let mut encoder = Encoder::create(&path, 8, 8, 8, 30.0, params).unwrap();

    let frame = frame_with_voxel(0, 0, 0, (255, 0, 0));
    encoder.encode_frame(&frame).unwrap();
    encoder.finish().unwrap();

    let meta = file_metadata(&path).unwrap();
    assert_eq!(meta.frame_count, 1);

    let mut decoder = Decoder::create_from_file(&path).unwrap();
    assert!(decoder.dependencies(0, false).unwrap().is_empty());

    let decoded = decoder.decode_frame(0, &[]).unwrap();
    assert_eq!(decoded.num_voxels(), 1);
    let (filled, r, g, b) = decoded.brick_at(0, 0, 0).unwrap().get_voxel_color(0, 0, 0);
    assert!(filled);
    assert_eq!((r, g, b), (255, 0, 0));

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario B: P-frame delta, with can_free tracking across a GOP that
/// hasn't closed yet.
#[test]
fn p_frame_delta_scenario() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("splv_e2e_b_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("b.splv");

    let params = EncodingParams::new(10).unwrap();
    let mut encoder = Encoder::create(&path, 8, 8, 8, 30.0, params).unwrap();

    let frame0 = frame_with_voxel(0, 0, 0, (100, 100, 100));
    let can_free0 = encoder.encode_frame(&frame0).unwrap();
    assert!(!can_free0);

    let mut frame1 = Frame::new(1, 1, 1).unwrap();
    let mut brick1 = splv::Brick::new();
    brick1.set_voxel_filled(0, 0, 0, 110, 100, 100);
    brick1.set_voxel_filled(1, 0, 0, 50, 50, 50);
    frame1.set_brick(0, 0, 0, brick1).unwrap();

    let can_free1 = encoder.encode_frame(&frame1).unwrap();
    assert!(!can_free1);

    encoder.finish().unwrap();

    let mut decoder = Decoder::create_from_file(&path).unwrap();

    let decoded0 = decoder.decode_frame(0, &[]).unwrap();
    let decoded1 = decoder.decode_frame(1, &[(0, &decoded0)]).unwrap();

    let (filled, r, g, b) = decoded1.brick_at(0, 0, 0).unwrap().get_voxel_color(0, 0, 0);
    assert!(filled);
    assert_eq!((r, g, b), (110, 100, 100));
    let (filled1, r1, g1, b1) = decoded1.brick_at(0, 0, 0).unwrap().get_voxel_color(1, 0, 0);
    assert!(filled1);
    assert_eq!((r1, g1, b1), (50, 50, 50));

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario C: GOP boundary can_free semantics over three frames at
/// GOP = 2 (types I, P, I).
#[test]
fn gop_boundary_can_free_scenario() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("splv_e2e_c_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("c.splv");

    let params = EncodingParams::new(2).unwrap();
    let mut encoder = Encoder::create(&path, 8, 8, 8, 30.0, params).unwrap();

    let mut can_free = Vec::new();
    for i in 0..3u8 {
        let frame = frame_with_voxel(0, 0, 0, (i, i, i));
        can_free.push(encoder.encode_frame(&frame).unwrap());
    }
    encoder.finish().unwrap();

    assert_eq!(can_free, vec![false, true, false]);

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario D: dependency queries over a 5-frame file at GOP = 3
/// (types I, P, P, I, P).
#[test]
fn dependency_query_scenario() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("splv_e2e_d_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("d.splv");

    let params = EncodingParams::new(3).unwrap();
    let mut encoder = Encoder::create(&path, 8, 8, 8, 30.0, params).unwrap();
    for i in 0..5u8 {
        let frame = frame_with_voxel(0, 0, 0, (i, i, i));
        encoder.encode_frame(&frame).unwrap();
    }
    encoder.finish().unwrap();

    let decoder = Decoder::create_from_file(&path).unwrap();

    assert_eq!(decoder.dependencies(2, false).unwrap(), vec![1]);
    assert_eq!(decoder.dependencies(2, true).unwrap(), vec![0, 1]);
    assert!(decoder.dependencies(3, false).unwrap().is_empty());
    assert_eq!(decoder.dependencies(4, true).unwrap(), vec![3]);
    assert_eq!(decoder.prev_i_frame_idx(2), Some(0));
    assert_eq!(decoder.next_i_frame_idx(1), Some(3));

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario E: a file whose first four bytes aren't the magic word is
/// rejected.
#[test]
fn corrupted_header_scenario() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("splv_e2e_e_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("e.splv");

    std::fs::write(&path, vec![0u8; 64]).unwrap();
    assert!(Decoder::create_from_file(&path).is_err());

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario F: encode 60 frames at 30fps, split into 1-second chunks,
/// concat back together, and check the frame count and voxel-for-voxel
/// match survive the round trip.
#[test]
fn split_and_concat_are_inverses() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("splv_e2e_f_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let src_path = dir.join("src.splv");

    let params = EncodingParams::new(15).unwrap();
    let mut encoder = Encoder::create(&src_path, 8, 8, 8, 30.0, params).unwrap();
    for i in 0..60u32 {
        let frame = frame_with_voxel(0, 0, 0, ((i % 256) as u8, 0, 0));
        encoder.encode_frame(&frame).unwrap();
    }
    encoder.finish().unwrap();

    let num_splits = split(&src_path, 1.0, &dir).unwrap();
    assert_eq!(num_splits, 2);

    let split_paths = vec![
        dir.join("split_0000.splv"),
        dir.join("split_0001.splv"),
    ];
    for p in &split_paths {
        let meta = file_metadata(p).unwrap();
        assert_eq!(meta.frame_count, 30);
    }

    let recombined_path = dir.join("recombined.splv");
    concat(&split_paths, &recombined_path).unwrap();

    let meta = file_metadata(&recombined_path).unwrap();
    assert_eq!(meta.frame_count, 60);

    let mut original = Decoder::create_from_file(&src_path).unwrap();
    let mut recombined = Decoder::create_from_file(&recombined_path).unwrap();

    let mut orig_prev: Option<Frame> = None;
    let mut recomb_prev: Option<Frame> = None;
    for i in 0..60u64 {
        let orig_deps: Vec<(u64, &Frame)> = orig_prev
            .as_ref()
            .map(|f| vec![(i - 1, f)])
            .unwrap_or_default();
        let orig_frame = original.decode_frame(i, &orig_deps).unwrap();

        let recomb_deps: Vec<(u64, &Frame)> = recomb_prev
            .as_ref()
            .map(|f| vec![(i - 1, f)])
            .unwrap_or_default();
        let recomb_frame = recombined.decode_frame(i, &recomb_deps).unwrap();

        assert_eq!(
            orig_frame.brick_at(0, 0, 0).unwrap().get_voxel_color(0, 0, 0),
            recomb_frame
                .brick_at(0, 0, 0)
                .unwrap()
                .get_voxel_color(0, 0, 0)
        );

        orig_prev = Some(orig_frame);
        recomb_prev = Some(recomb_frame);
    }

    std::fs::remove_dir_all(&dir).ok();
}
