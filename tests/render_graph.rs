mod common;

use std::path::Path;

use ava::{
    AvaError, CancelFlag, FrameIndex, FrameRange, FrameStream as _, GraphDesc, NodeDesc,
    Operation, RenderOptions, build_graph, render_all, render_frame, render_frame_to,
};
use common::{RecordingBackend, files_with_prefix, read, source_frames};
use serde_json::json;

fn opts(out: &Path) -> RenderOptions {
    RenderOptions {
        output_dir: out.to_path_buf(),
        threads: Some(2),
        progress_every: 3,
        ..RenderOptions::default()
    }
}

fn labelled(dir: &Path, count: u64) -> GraphDesc {
    GraphDesc {
        nodes: vec![
            NodeDesc::new("a", "ImageSequence")
                .params(json!({"format": source_frames(dir, "a", count), "count": count})),
            NodeDesc::new("label", "AddLabel")
                .params(json!({"label": "A"}))
                .inputs(["a"]),
            NodeDesc::new("Output", "Output").inputs(["label"]),
        ],
    }
}

fn three_clip_reel(dir: &Path) -> GraphDesc {
    GraphDesc {
        nodes: vec![
            NodeDesc::new("a", "ImageSequence")
                .params(json!({"format": source_frames(dir, "a", 10), "count": 10})),
            NodeDesc::new("b", "ImageSequence")
                .params(json!({"format": source_frames(dir, "b", 10), "count": 10})),
            NodeDesc::new("c", "ImageSequence")
                .params(json!({"format": source_frames(dir, "c", 10), "count": 10})),
            NodeDesc::new("reel", "Concatenate")
                .params(json!({"crossBlendDuration": 4}))
                .inputs(["a", "b", "c"]),
            NodeDesc::new("Output", "Output").inputs(["reel"]),
        ],
    }
}

#[test]
fn renders_every_frame_and_sweeps_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let backend = RecordingBackend::new();

    let stats = render_all(&labelled(dir.path(), 10), &backend, &opts(&out)).unwrap();
    assert_eq!(stats.frames_total, 10);
    assert_eq!(stats.frames_rendered, 10);
    assert_eq!(stats.frames_skipped, 0);
    assert!(stats.scratch_removed >= 2);

    for i in 0..10 {
        let frame = read(out.join(format!("ani_{i:08}.png")));
        assert!(frame.starts_with("normalize"), "{frame}");
        assert!(frame.contains("annotate"), "{frame}");
        assert!(frame.contains(&format!("[a{i}]")), "{frame}");
    }
    assert_eq!(files_with_prefix(&out, "ani_").len(), 10);
    assert!(files_with_prefix(&out, "_tmp_ava_").is_empty());
    assert_eq!(backend.count("normalize"), 10);
    assert_eq!(backend.count("decode"), 10);
}

#[test]
fn concat_blends_across_segment_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let desc = three_clip_reel(dir.path());
    assert_eq!(build_graph(&desc).unwrap().len(), 22);

    let backend = RecordingBackend::new();
    let stats = render_all(&desc, &backend, &opts(&out)).unwrap();
    assert_eq!(stats.frames_rendered, 22);
    assert_eq!(backend.count("blend"), 8);

    let first = read(out.join("ani_00000000.png"));
    assert!(first.contains("[a0]") && !first.contains("blend"), "{first}");

    let zone_start = read(out.join("ani_00000006.png"));
    assert!(zone_start.contains("-blur 0x0 -blend 0%"), "{zone_start}");

    // Midpoint of the first zone: half way into `b`, tail of `a`, full blur.
    let mid = read(out.join("ani_00000008.png"));
    assert!(mid.contains("-blur 0x16 -blend 50%"), "{mid}");
    let incoming = mid.find("[b2]").expect("incoming frame b2");
    let outgoing = mid.find("[a8]").expect("outgoing frame a8");
    assert!(incoming < outgoing, "{mid}");

    let direct = read(out.join("ani_00000010.png"));
    assert!(direct.contains("[b4]") && !direct.contains("blend"), "{direct}");

    let second_zone = read(out.join("ani_00000013.png"));
    assert!(second_zone.contains("[c1]") && second_zone.contains("[b7]"));

    let last = read(out.join("ani_00000021.png"));
    assert!(last.contains("[c9]"), "{last}");
}

#[test]
fn unblurred_blend_passes_no_blur() {
    let dir = tempfile::tempdir().unwrap();
    let mut desc = three_clip_reel(dir.path());
    desc.nodes[3] = NodeDesc::new("reel", "Concatenate")
        .params(json!({"crossBlendDuration": 4, "blur": false}))
        .inputs(["a", "b", "c"]);

    let backend = RecordingBackend::new();
    let target = dir.path().join("f.png");
    render_frame_to(&desc, FrameIndex(8), &target, &backend, dir.path()).unwrap();

    let blend = backend
        .ops()
        .into_iter()
        .find(|op| op.name() == "blend")
        .expect("blend op");
    match blend {
        Operation::Blend { percent, blur, .. } => {
            assert_eq!(percent, 50);
            assert_eq!(blur, None);
        }
        other => panic!("expected blend, got {other:?}"),
    }
}

#[test]
fn subsequence_delegates_with_offset() {
    let dir = tempfile::tempdir().unwrap();
    let desc = GraphDesc {
        nodes: vec![
            NodeDesc::new("a", "ImageSequence")
                .params(json!({"format": source_frames(dir.path(), "a", 20), "count": 20})),
            NodeDesc::new("sub", "SubSequence")
                .params(json!({"first": 5, "last": 15}))
                .inputs(["a"]),
            NodeDesc::new("Output", "Output").inputs(["sub"]),
        ],
    };
    assert_eq!(build_graph(&desc).unwrap().len(), 10);

    let out = dir.path().join("out");
    let backend = RecordingBackend::new();
    let path = render_frame(&desc, FrameIndex(3), &backend, &opts(&out)).unwrap();
    assert_eq!(path, out.join("ani_00000003.png"));
    assert!(read(&path).contains("[a8]"));

    let err = render_frame(&desc, FrameIndex(10), &backend, &opts(&out)).unwrap_err();
    assert!(
        matches!(err, AvaError::OutOfRange { ref node, index: 10, len: 10 } if node == "Output"),
        "{err}"
    );
}

#[test]
fn same_frame_twice_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let desc = three_clip_reel(dir.path());
    let backend = RecordingBackend::new();

    let first = dir.path().join("one.png");
    let second = dir.path().join("two.png");
    render_frame_to(&desc, FrameIndex(7), &first, &backend, dir.path()).unwrap();
    render_frame_to(&desc, FrameIndex(7), &second, &backend, dir.path()).unwrap();

    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
    assert!(files_with_prefix(dir.path(), "_tmp_ava_").is_empty());
}

#[test]
fn forward_reference_fails_before_any_frame() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let desc = GraphDesc {
        nodes: vec![
            NodeDesc::new("Output", "Output").inputs(["a"]),
            NodeDesc::new("a", "ImageSequence")
                .params(json!({"format": source_frames(dir.path(), "a", 3), "count": 3})),
        ],
    };

    let backend = RecordingBackend::new();
    let err = render_all(&desc, &backend, &opts(&out)).unwrap_err();
    assert!(err.is_config(), "{err}");
    assert!(backend.ops().is_empty());
    assert!(!out.exists());
}

#[test]
fn backend_failure_names_node_and_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let backend = RecordingBackend::failing_on("annotate");

    let err = render_all(&labelled(dir.path(), 6), &backend, &opts(&out)).unwrap_err();
    match &err {
        AvaError::Backend { node, message, .. } => {
            assert_eq!(node, "label");
            assert!(message.contains("failed on purpose"), "{message}");
        }
        other => panic!("expected backend error, got {other}"),
    }
    assert!(files_with_prefix(&out, "_tmp_ava_").is_empty());
    assert!(files_with_prefix(&out, "ani_").is_empty());
}

#[test]
fn missing_source_frame_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = source_frames(dir.path(), "a", 3);
    let desc = GraphDesc {
        nodes: vec![
            NodeDesc::new("a", "ImageSequence").params(json!({"format": pattern, "count": 5})),
            NodeDesc::new("Output", "Output").inputs(["a"]),
        ],
    };

    let backend = RecordingBackend::new();
    let opts = RenderOptions {
        threads: Some(1),
        ..opts(&dir.path().join("out"))
    };
    let err = render_all(&desc, &backend, &opts).unwrap_err();
    match err {
        AvaError::Backend { node, frame, message } => {
            assert_eq!(node, "a");
            assert_eq!(frame, 3);
            assert!(message.contains("does not exist"), "{message}");
        }
        other => panic!("expected backend error, got {other}"),
    }
}

#[test]
fn range_renders_only_requested_frames() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let opts = RenderOptions {
        range: Some(FrameRange::new(FrameIndex(2), FrameIndex(5)).unwrap()),
        ..opts(&out)
    };

    let stats = render_all(&labelled(dir.path(), 10), &RecordingBackend::new(), &opts).unwrap();
    assert_eq!(stats.frames_rendered, 3);
    assert_eq!(stats.frames_skipped, 7);
    assert_eq!(
        files_with_prefix(&out, "ani_"),
        vec![
            out.join("ani_00000002.png"),
            out.join("ani_00000003.png"),
            out.join("ani_00000004.png"),
        ]
    );

    let too_far = RenderOptions {
        range: Some(FrameRange::new(FrameIndex(5), FrameIndex(11)).unwrap()),
        ..opts
    };
    assert!(
        render_all(&labelled(dir.path(), 10), &RecordingBackend::new(), &too_far)
            .unwrap_err()
            .is_config()
    );
}

#[test]
fn cancelled_run_dispatches_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let cancel = CancelFlag::new();
    cancel.cancel();
    let opts = RenderOptions {
        cancel: Some(cancel),
        ..opts(&out)
    };

    let backend = RecordingBackend::new();
    let err = render_all(&labelled(dir.path(), 10), &backend, &opts).unwrap_err();
    assert!(
        matches!(err, AvaError::Cancelled { rendered: 0, total: 10 }),
        "{err}"
    );
    assert!(backend.ops().is_empty());
}

#[test]
fn fixture_graph_builds() {
    let desc = GraphDesc::load(Path::new("tests/data/crossfade.json")).unwrap();
    let graph = build_graph(&desc).unwrap();
    assert_eq!(graph.root().name(), "Output");
    assert_eq!(graph.len(), 22);
    assert_eq!(graph.get("middle-fit").unwrap().stream_len(), 10);
}

#[test]
fn empty_root_stream_renders_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let still = dir.path().join("still.png");
    std::fs::write(&still, "still").unwrap();
    let desc = GraphDesc {
        nodes: vec![
            NodeDesc::new("still", "StillImage")
                .params(json!({"image": still.display().to_string(), "duration": 5})),
            NodeDesc::new("none", "SubSequence")
                .params(json!({"first": 2, "last": 2}))
                .inputs(["still"]),
            NodeDesc::new("Output", "Output").inputs(["none"]),
        ],
    };

    let backend = RecordingBackend::new();
    let stats = render_all(&desc, &backend, &opts(&dir.path().join("out"))).unwrap();
    assert_eq!(stats.frames_total, 0);
    assert_eq!(stats.frames_rendered, 0);
    assert!(backend.ops().is_empty());
}

#[test]
fn explicitly_empty_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let opts = RenderOptions {
        range: Some(FrameRange::new(FrameIndex(3), FrameIndex(3)).unwrap()),
        ..opts(&dir.path().join("out"))
    };
    let err = render_all(&labelled(dir.path(), 10), &RecordingBackend::new(), &opts).unwrap_err();
    assert!(err.is_config(), "{err}");
}
