#![allow(dead_code)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Mutex,
};

use ava::{ImageBackend, Operation, ToolPaths};

/// Writes a text "image" describing each operation and its inputs, and records every call.
///
/// Path arguments are left out of the written body, so the same frame produced through
/// different scratch namespaces yields identical bytes.
#[derive(Default)]
pub struct RecordingBackend {
    ops: Mutex<Vec<Operation>>,
    fail_on: Option<&'static str>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every operation with this name.
    pub fn failing_on(op: &'static str) -> Self {
        Self {
            ops: Mutex::default(),
            fail_on: Some(op),
        }
    }

    pub fn ops(&self) -> Vec<Operation> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.ops().iter().filter(|op| op.name() == name).count()
    }
}

impl ImageBackend for RecordingBackend {
    fn run(&self, op: &Operation) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push(op.clone());
        if self.fail_on == Some(op.name()) {
            anyhow::bail!("{} failed on purpose", op.name());
        }

        let paths: Vec<OsString> = op
            .inputs()
            .iter()
            .chain(std::iter::once(&op.output()))
            .map(|p| p.as_os_str().to_owned())
            .collect();
        let inv = op.invocation(&ToolPaths::default());

        let mut body = op.name().to_string();
        for arg in inv.args.iter().filter(|a| !paths.contains(a)) {
            body.push(' ');
            body.push_str(&arg.to_string_lossy());
        }
        for input in op.inputs() {
            let text = std::fs::read_to_string(input)?;
            body.push_str(" [");
            body.push_str(text.trim());
            body.push(']');
        }
        std::fs::write(op.output(), body)?;
        Ok(())
    }
}

/// Create `count` numbered source frames `<dir>/<name>/f0000.png ...` and return the pattern.
pub fn source_frames(dir: &Path, name: &str, count: u64) -> String {
    let seq = dir.join(name);
    std::fs::create_dir_all(&seq).unwrap();
    for i in 0..count {
        std::fs::write(seq.join(format!("f{i:04}.png")), format!("{name}{i}")).unwrap();
    }
    format!("{}/f{{:04}}.png", seq.display())
}

pub fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("read '{}': {e}", path.as_ref().display()))
}

pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(prefix))
        .collect();
    out.sort();
    out
}
