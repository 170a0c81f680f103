#![forbid(unsafe_code)]
//! Ava renders numbered still frames from a declarative graph of image operations.
//!
//! A graph description (JSON) lists nodes in dependency order. Each node exposes a stream of
//! frames with a fixed length; leaf sources read image sequences or stills, and every other
//! node derives its frames from its inputs through an external ImageMagick invocation. The
//! dispatcher evaluates the root node for every index across a worker pool and writes one
//! output file per frame.

pub mod backend;
pub mod foundation;
pub mod graph;
pub mod model;
pub mod pattern;
pub mod render;
pub mod scratch;

pub use backend::{ImageBackend, Invocation, MagickBackend, Operation, ToolOverrides, ToolPaths};
pub use foundation::core::{FrameIndex, FrameRange};
pub use foundation::error::{AvaError, AvaResult};
pub use graph::build::{Graph, build_graph, to_dot};
pub use graph::node::{EvalCtx, FrameStream, Node, NodeKind};
pub use model::{Corner, GraphDesc, GraphDescBuilder, KindSpec, NodeDesc, parse_kind};
pub use pattern::FramePattern;
pub use render::{
    CancelFlag, RenderOptions, RenderStats, output_path, render_all, render_frame,
    render_frame_to,
};
pub use scratch::{RunId, ScratchSpace, sweep_scratch};
