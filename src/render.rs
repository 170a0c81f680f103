use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::Context as _;
use rayon::prelude::*;

use crate::{
    backend::ImageBackend,
    foundation::{
        core::{FrameIndex, FrameRange},
        error::{AvaError, AvaResult},
    },
    graph::{
        build::{Graph, build_graph},
        node::{EvalCtx, FrameStream},
    },
    model::GraphDesc,
    scratch::{RunId, ScratchSpace, WorkerIds, sweep_scratch},
};

/// Shared stop request, checked before each frame is dispatched.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag on SIGINT or SIGTERM.
    ///
    /// Frames already being produced run to completion; nothing new is dispatched. A second
    /// signal while the flag is up terminates the process with exit code 1.
    pub fn install_signal_handlers(&self) -> AvaResult<()> {
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            // Registered first so it sees the flag as it was before this delivery.
            signal_hook::flag::register_conditional_shutdown(sig, 1, Arc::clone(&self.0))
                .with_context(|| format!("register shutdown for signal {sig}"))?;
            signal_hook::flag::register(sig, Arc::clone(&self.0))
                .with_context(|| format!("register handler for signal {sig}"))?;
        }
        Ok(())
    }
}

/// Where and how a run writes its frames.
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub output_dir: PathBuf,
    /// File-name prefix of every output frame.
    pub prefix: String,
    /// Zero-padded width of the frame number in output names.
    pub index_width: usize,
    pub extension: String,
    /// Scratch artifacts go here; the output directory when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Worker count; host concurrency when unset.
    pub threads: Option<usize>,
    /// Subset of the root stream to render; the whole stream when unset.
    pub range: Option<FrameRange>,
    /// Log progress after this many completed frames. `0` disables progress lines.
    pub progress_every: u64,
    pub cancel: Option<CancelFlag>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            prefix: "ani_".to_string(),
            index_width: 8,
            extension: "png".to_string(),
            scratch_dir: None,
            threads: None,
            range: None,
            progress_every: 100,
            cancel: None,
        }
    }
}

impl RenderOptions {
    pub fn scratch_dir(&self) -> &Path {
        self.scratch_dir.as_deref().unwrap_or(&self.output_dir)
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Stream length of the root.
    pub frames_total: u64,
    pub frames_rendered: u64,
    /// Frames of the root stream outside the requested range.
    pub frames_skipped: u64,
    pub scratch_removed: usize,
}

/// `<output_dir>/<prefix><index, zero-padded>.<extension>`.
pub fn output_path(opts: &RenderOptions, index: FrameIndex) -> PathBuf {
    let width = opts.index_width;
    opts.output_dir.join(format!(
        "{}{:0width$}.{}",
        opts.prefix, index.0, opts.extension
    ))
}

/// Render one frame of the root into its numbered output file.
pub fn render_frame(
    desc: &GraphDesc,
    index: FrameIndex,
    backend: &dyn ImageBackend,
    opts: &RenderOptions,
) -> AvaResult<PathBuf> {
    let target = output_path(opts, index);
    render_frame_to(desc, index, &target, backend, opts.scratch_dir())
}

/// Render one frame of the root into `target`, using a private scratch namespace that is
/// swept before returning.
#[tracing::instrument(
    level = "info",
    skip(desc, target, backend, scratch_dir),
    fields(out = %target.display())
)]
pub fn render_frame_to(
    desc: &GraphDesc,
    index: FrameIndex,
    target: &Path,
    backend: &dyn ImageBackend,
    scratch_dir: &Path,
) -> AvaResult<PathBuf> {
    let graph = build_graph(desc)?;
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir(parent)?;
    }
    create_dir(scratch_dir)?;

    let run = RunId::generate();
    let scratch = ScratchSpace::new(scratch_dir, run, 0);
    let ctx = EvalCtx {
        backend,
        scratch: &scratch,
    };
    let out = graph.root().produce(index, target, &ctx);
    sweep(scratch_dir, run);
    out
}

/// Render every frame of the root (or `opts.range`) across a worker pool.
///
/// The graph is built once up front so configuration errors surface before any frame work.
/// Each rayon worker then builds its own graph and scratch namespace. The first failing frame
/// stops further dispatch; frames already in flight finish. Scratch is swept after the pool has
/// joined, whatever the outcome, and the lowest-index failure is reported.
#[tracing::instrument(level = "info", skip_all, fields(output = %opts.output_dir.display()))]
pub fn render_all(
    desc: &GraphDesc,
    backend: &dyn ImageBackend,
    opts: &RenderOptions,
) -> AvaResult<RenderStats> {
    let graph = build_graph(desc)?;
    let total = graph.len();
    if let Some(r) = opts.range
        && r.is_empty()
    {
        return Err(AvaError::config("render range must be non-empty"));
    }
    let range = opts.range.unwrap_or(FrameRange::with_len(total));
    if range.end.0 > total {
        return Err(AvaError::config(format!(
            "render range {}..{} exceeds stream length {total} of '{}'",
            range.start,
            range.end,
            graph.root().name()
        )));
    }
    if range.is_empty() {
        tracing::info!(root = graph.root().name(), "root stream is empty, nothing to render");
        return Ok(RenderStats::default());
    }
    drop(graph);

    let scratch_dir = opts.scratch_dir();
    create_dir(&opts.output_dir)?;
    create_dir(scratch_dir)?;
    let pool = build_thread_pool(opts.threads)?;

    let run = RunId::generate();
    let workers = WorkerIds::default();
    let abort = AtomicBool::new(false);
    let completed = AtomicU64::new(0);
    let wanted = range.len_frames();

    tracing::info!(
        frames = wanted,
        threads = pool.current_num_threads(),
        run = %run.prefix(),
        "render started"
    );

    let indices: Vec<u64> = range.iter().collect();
    let results = pool.install(|| {
        indices
            .par_iter()
            .map_init(
                || Worker::new(desc, scratch_dir, run, workers.next()),
                |worker, &idx| -> AvaResult<bool> {
                    if abort.load(Ordering::Relaxed) || opts.cancelled() {
                        return Ok(false);
                    }
                    let produced = worker.produce(FrameIndex(idx), opts, backend);
                    match produced {
                        Ok(()) => {
                            let n = completed.fetch_add(1, Ordering::Relaxed) + 1;
                            if opts.progress_every > 0 && n % opts.progress_every == 0 {
                                tracing::info!(done = n, of = wanted, "progress");
                            }
                            Ok(true)
                        }
                        Err(e) => {
                            abort.store(true, Ordering::Relaxed);
                            tracing::error!(frame = idx, error = %e, "frame failed");
                            Err(e)
                        }
                    }
                },
            )
            .collect::<Vec<_>>()
    });

    let scratch_removed = sweep(scratch_dir, run);

    let mut rendered = 0u64;
    for r in results {
        if r? {
            rendered += 1;
        }
    }
    if rendered < wanted {
        tracing::warn!(rendered, of = wanted, "render cancelled");
        return Err(AvaError::Cancelled {
            rendered,
            total: wanted,
        });
    }

    let stats = RenderStats {
        frames_total: total,
        frames_rendered: rendered,
        frames_skipped: total - wanted,
        scratch_removed,
    };
    tracing::info!(
        rendered = stats.frames_rendered,
        scratch_removed = stats.scratch_removed,
        "render finished"
    );
    Ok(stats)
}

/// Per-worker state: a private graph and scratch namespace.
struct Worker {
    graph: Result<Graph, String>,
    scratch: ScratchSpace,
}

impl Worker {
    fn new(desc: &GraphDesc, scratch_dir: &Path, run: RunId, id: u64) -> Self {
        tracing::debug!(worker = id, "worker started");
        Self {
            graph: build_graph(desc).map_err(|e| e.to_string()),
            scratch: ScratchSpace::new(scratch_dir, run, id),
        }
    }

    fn produce(
        &self,
        index: FrameIndex,
        opts: &RenderOptions,
        backend: &dyn ImageBackend,
    ) -> AvaResult<()> {
        let graph = self
            .graph
            .as_ref()
            .map_err(|e| AvaError::config(e.clone()))?;
        let ctx = EvalCtx {
            backend,
            scratch: &self.scratch,
        };
        graph
            .root()
            .produce(index, &output_path(opts, index), &ctx)?;
        Ok(())
    }
}

fn build_thread_pool(threads: Option<usize>) -> AvaResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(AvaError::config("'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("ava-worker-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .context("failed to build rayon thread pool")
        .map_err(AvaError::from)
}

fn create_dir(dir: &Path) -> AvaResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create directory '{}'", dir.display()))?;
    Ok(())
}

fn sweep(dir: &Path, run: RunId) -> usize {
    match sweep_scratch(dir, run) {
        Ok(n) => {
            tracing::debug!(removed = n, dir = %dir.display(), "scratch swept");
            n
        }
        Err(e) => {
            tracing::warn!(error = %e, dir = %dir.display(), "scratch sweep failed");
            0
        }
    }
}
