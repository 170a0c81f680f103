use std::{path::PathBuf, process::Command};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_ava")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) { "ava.exe" } else { "ava" });
            p
        })
}

#[test]
fn cli_info_reports_stream_lengths() {
    let out = Command::new(exe())
        .args(["info", "--graph", "tests/data/crossfade.json"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("root:   Output"), "{stdout}");
    assert!(stdout.contains("frames: 22"), "{stdout}");
    assert!(stdout.contains("middle-crop"), "{stdout}");
}

#[test]
fn cli_dot_prints_edges() {
    let out = Command::new(exe())
        .args(["dot", "--graph", "tests/data/crossfade.json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("digraph G {"), "{stdout}");
    assert!(stdout.contains("\"reel-fade\" -> \"Output\";"), "{stdout}");
    assert!(stdout.contains("\"intro\" -> \"intro-label\";"), "{stdout}");
}

#[test]
fn cli_rejects_bad_graph() {
    let dir = tempfile::tempdir().unwrap();
    let graph = dir.path().join("bad.json");
    std::fs::write(
        &graph,
        r#"[{"name": "Output", "type": "Output", "inputs": ["missing"]}]"#,
    )
    .unwrap();

    let out = Command::new(exe())
        .arg("render")
        .arg("--graph")
        .arg(&graph)
        .arg("--out")
        .arg(dir.path().join("out"))
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("'missing'"), "{stderr}");
}
