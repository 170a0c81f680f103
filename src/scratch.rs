use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context as _;
use sha2::Digest as _;

use crate::foundation::error::AvaResult;

const SCRATCH_PREFIX: &str = "_tmp_ava_";
const SCRATCH_EXT: &str = "tga";

/// Identifies one render run; every scratch file of the run carries it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl RunId {
    /// Derived from the process id and the wall clock at start-up.
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self((u64::from(std::process::id()) << 32) ^ nanos)
    }

    pub const fn from_raw(v: u64) -> Self {
        Self(v)
    }

    /// File-name prefix shared by every scratch artifact of this run.
    pub fn prefix(self) -> String {
        format!("{SCRATCH_PREFIX}{:016x}_", self.0)
    }
}

/// Hands out worker identities for a run; never reuses one.
#[derive(Debug, Default)]
pub struct WorkerIds(AtomicU64);

impl WorkerIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A worker's private scratch namespace.
///
/// Paths are injective over `(run, worker, node name, slot)`, so concurrent workers and
/// sibling input slots never share a file.
#[derive(Clone, Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    run: RunId,
    worker: u64,
}

impl ScratchSpace {
    pub fn new(dir: impl Into<PathBuf>, run: RunId, worker: u64) -> Self {
        Self {
            dir: dir.into(),
            run,
            worker,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn worker(&self) -> u64 {
        self.worker
    }

    /// Staging path for input `slot` of node `node`.
    pub fn slot(&self, node: &str, slot: usize) -> PathBuf {
        let mut h = sha2::Sha256::new();
        h.update(node.as_bytes());
        h.update([0u8]);
        h.update((slot as u64).to_le_bytes());
        let digest = h.finalize();

        let mut key = String::with_capacity(24);
        for b in &digest[..12] {
            key.push_str(&format!("{b:02x}"));
        }
        self.dir.join(format!(
            "{}w{}_{key}.{SCRATCH_EXT}",
            self.run.prefix(),
            self.worker
        ))
    }
}

/// Delete every scratch artifact left behind by `run` in `dir`.
///
/// Must only be called once no worker of the run is still evaluating frames.
pub fn sweep_scratch(dir: &Path, run: RunId) -> AvaResult<usize> {
    let prefix = run.prefix();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("list scratch dir '{}'", dir.display()))
                .into());
        }
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.with_context(|| format!("list scratch dir '{}'", dir.display()))?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("remove scratch file '{}'", path.display()))
                    .into());
            }
        }
    }
    Ok(removed)
}
