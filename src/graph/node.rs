use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    backend::{ImageBackend, Operation},
    foundation::{
        core::FrameIndex,
        error::{AvaError, AvaResult},
    },
    graph::concat::{self, Segment},
    model::{CanvasParams, CropParams, KindSpec},
    pattern::FramePattern,
    scratch::ScratchSpace,
};

/// Something that can report a stream length and produce any frame of it into a file.
pub trait FrameStream {
    fn name(&self) -> &str;

    fn stream_len(&self) -> u64;

    /// Write frame `index` to `target` and return `target`.
    fn produce(&self, index: FrameIndex, target: &Path, ctx: &EvalCtx<'_>) -> AvaResult<PathBuf>;
}

/// Per-worker evaluation context threaded through the recursive walk.
pub struct EvalCtx<'a> {
    pub backend: &'a dyn ImageBackend,
    pub scratch: &'a ScratchSpace,
}

/// Node-specific state, validated and with derived values precomputed.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    ImageSequence {
        pattern: FramePattern,
        count: u64,
        offset: u64,
    },
    StillImage {
        image: PathBuf,
        duration: u64,
    },
    EvaluateFrame {
        frame: u64,
        duration: u64,
    },
    AddLabel {
        label: String,
        corner: crate::model::Corner,
    },
    Crop(CropParams),
    Resize {
        max_width: u32,
        max_height: u32,
    },
    ChangeCanvasSize(CanvasParams),
    Overlay {
        overlay: PathBuf,
    },
    Merge,
    MergeTiled {
        columns: u32,
        rows: u32,
    },
    FadeOut {
        duration: u64,
        blur: bool,
    },
    FadeIn {
        duration: u64,
        blur: bool,
    },
    SubSequence {
        first: u64,
        last: u64,
    },
    Concatenate {
        window: u64,
        blur: bool,
        boundaries: Vec<u64>,
    },
    Output,
}

/// One immutable step of the processing graph.
#[derive(Debug)]
pub struct Node {
    name: String,
    type_name: &'static str,
    inputs: Vec<Arc<Node>>,
    kind: NodeKind,
    len: u64,
}

impl Node {
    /// Validate arity and parameters against the inputs, and fix the stream length.
    pub fn new(name: impl Into<String>, spec: KindSpec, inputs: Vec<Arc<Node>>) -> AvaResult<Self> {
        let name = name.into();
        let type_name = spec.type_name();

        if let KindSpec::MergeTiled(p) = &spec
            && (p.columns == 0 || p.rows == 0)
        {
            return Err(cfg(&name, "columns and rows must be >= 1"));
        }

        let (min, max) = spec.arity();
        if inputs.len() < min {
            return Err(cfg(
                &name,
                format!("{type_name} needs at least {min} input(s), got {}", inputs.len()),
            ));
        }
        if let Some(max) = max
            && inputs.len() > max
        {
            return Err(cfg(
                &name,
                format!("{type_name} accepts at most {max} input(s), got {}", inputs.len()),
            ));
        }

        let shortest = inputs.iter().map(|n| n.len).min().unwrap_or(0);
        let first_len = inputs.first().map(|n| n.len).unwrap_or(0);

        let (kind, len) = match spec {
            KindSpec::ImageSequence(p) => {
                if p.count == 0 {
                    return Err(cfg(&name, "count must be >= 1"));
                }
                if p.offset.checked_add(p.count - 1).is_none() {
                    return Err(cfg(
                        &name,
                        format!(
                            "offset {} + count {} overflows the frame number",
                            p.offset, p.count
                        ),
                    ));
                }
                let pattern = FramePattern::parse(&p.format)?;
                (
                    NodeKind::ImageSequence {
                        pattern,
                        count: p.count,
                        offset: p.offset,
                    },
                    p.count,
                )
            }
            KindSpec::StillImage(p) => {
                if p.duration == 0 {
                    return Err(cfg(&name, "duration must be >= 1"));
                }
                if p.image.trim().is_empty() {
                    return Err(cfg(&name, "image path must be non-empty"));
                }
                (
                    NodeKind::StillImage {
                        image: PathBuf::from(p.image),
                        duration: p.duration,
                    },
                    p.duration,
                )
            }
            KindSpec::EvaluateFrame(p) => {
                if p.duration == 0 {
                    return Err(cfg(&name, "duration must be >= 1"));
                }
                if p.frame >= first_len {
                    return Err(cfg(
                        &name,
                        format!(
                            "pinned frame {} is outside input '{}' ({first_len} frames)",
                            p.frame, inputs[0].name
                        ),
                    ));
                }
                (
                    NodeKind::EvaluateFrame {
                        frame: p.frame,
                        duration: p.duration,
                    },
                    p.duration,
                )
            }
            KindSpec::AddLabel(p) => (
                NodeKind::AddLabel {
                    label: p.label,
                    corner: p.corner,
                },
                first_len,
            ),
            KindSpec::Crop(p) => {
                if !(1..=100).contains(&p.h_size) || !(1..=100).contains(&p.v_size) {
                    return Err(cfg(&name, "hSize and vSize are percentages in 1..=100"));
                }
                (NodeKind::Crop(p), first_len)
            }
            KindSpec::Resize(p) => {
                if p.maximum_width == 0 || p.maximum_height == 0 {
                    return Err(cfg(&name, "maximumWidth and maximumHeight must be >= 1"));
                }
                (
                    NodeKind::Resize {
                        max_width: p.maximum_width,
                        max_height: p.maximum_height,
                    },
                    first_len,
                )
            }
            KindSpec::ChangeCanvasSize(p) => {
                if p.width == 0 || p.height == 0 {
                    return Err(cfg(&name, "canvas width and height must be >= 1"));
                }
                (NodeKind::ChangeCanvasSize(p), first_len)
            }
            KindSpec::Overlay(p) => {
                if p.overlay.trim().is_empty() {
                    return Err(cfg(&name, "overlay path must be non-empty"));
                }
                (
                    NodeKind::Overlay {
                        overlay: PathBuf::from(p.overlay),
                    },
                    first_len,
                )
            }
            KindSpec::Merge => (NodeKind::Merge, shortest),
            KindSpec::MergeTiled(p) => (
                NodeKind::MergeTiled {
                    columns: p.columns,
                    rows: p.rows,
                },
                shortest,
            ),
            KindSpec::FadeOut(p) => {
                check_fade(&name, p.duration, &inputs[0])?;
                (
                    NodeKind::FadeOut {
                        duration: p.duration,
                        blur: p.blur,
                    },
                    first_len,
                )
            }
            KindSpec::FadeIn(p) => {
                check_fade(&name, p.duration, &inputs[0])?;
                (
                    NodeKind::FadeIn {
                        duration: p.duration,
                        blur: p.blur,
                    },
                    first_len,
                )
            }
            KindSpec::SubSequence(p) => {
                if p.first > p.last {
                    return Err(cfg(
                        &name,
                        format!("first ({}) must not exceed last ({})", p.first, p.last),
                    ));
                }
                if p.last > first_len {
                    return Err(cfg(
                        &name,
                        format!(
                            "last ({}) is past the end of input '{}' ({first_len} frames)",
                            p.last, inputs[0].name
                        ),
                    ));
                }
                (
                    NodeKind::SubSequence {
                        first: p.first,
                        last: p.last,
                    },
                    p.last - p.first,
                )
            }
            KindSpec::Concatenate(p) => {
                let lengths: Vec<u64> = inputs.iter().map(|n| n.len).collect();
                let boundaries =
                    concat::checked_boundaries(&name, &lengths, p.cross_blend_duration)?;
                let len = boundaries.last().copied().unwrap_or(0);
                (
                    NodeKind::Concatenate {
                        window: p.cross_blend_duration,
                        blur: p.blur,
                        boundaries,
                    },
                    len,
                )
            }
            KindSpec::Output => (NodeKind::Output, first_len),
        };

        Ok(Self {
            name,
            type_name,
            inputs,
            kind,
            len,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn inputs(&self) -> &[Arc<Node>] {
        &self.inputs
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Evaluate every input for the same index into this node's scratch slots.
    fn stage_inputs(&self, index: FrameIndex, ctx: &EvalCtx<'_>) -> AvaResult<Vec<PathBuf>> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(slot, input)| input.produce(index, &ctx.scratch.slot(&self.name, slot), ctx))
            .collect()
    }

    fn run(&self, index: FrameIndex, op: Operation, ctx: &EvalCtx<'_>) -> AvaResult<()> {
        ctx.backend
            .run(&op)
            .map_err(|e| AvaError::backend(&self.name, index.0, format!("{e:#}")))
    }

    fn produce_concat(
        &self,
        index: FrameIndex,
        target: &Path,
        ctx: &EvalCtx<'_>,
        window: u64,
        blur: bool,
        boundaries: &[u64],
    ) -> AvaResult<()> {
        let segment =
            concat::locate(boundaries, window, index.0).ok_or_else(|| AvaError::OutOfRange {
                node: self.name.clone(),
                index: index.0,
                len: self.len,
            })?;

        match segment {
            Segment::Direct { input, local } => {
                self.inputs[input].produce(FrameIndex(local), target, ctx)?;
            }
            Segment::Blend(step) => {
                let outgoing = self.inputs[step.outgoing].produce(
                    FrameIndex(step.outgoing_index),
                    &ctx.scratch.slot(&self.name, 0),
                    ctx,
                )?;
                let incoming = self.inputs[step.incoming].produce(
                    FrameIndex(step.incoming_index),
                    &ctx.scratch.slot(&self.name, 1),
                    ctx,
                )?;
                let op = Operation::Blend {
                    incoming,
                    outgoing,
                    dst: target.to_path_buf(),
                    percent: step.percent(),
                    blur: blur.then(|| step.blur_radius()),
                };
                self.run(index, op, ctx)?;
            }
        }
        Ok(())
    }

    /// Backend call for nodes that stage all inputs at the requested index.
    fn transform(&self, index: FrameIndex, mut staged: Vec<PathBuf>, dst: PathBuf) -> Operation {
        match &self.kind {
            NodeKind::AddLabel { label, corner } => Operation::Annotate {
                src: sole(&mut staged),
                dst,
                label: label.clone(),
                corner: *corner,
            },
            NodeKind::Crop(p) => Operation::Crop {
                src: sole(&mut staged),
                dst,
                h_percent: p.h_size,
                v_percent: p.v_size,
                h_offset: p.h_offset,
                v_offset: p.v_offset,
            },
            NodeKind::Resize {
                max_width,
                max_height,
            } => Operation::Resize {
                src: sole(&mut staged),
                dst,
                max_width: *max_width,
                max_height: *max_height,
            },
            NodeKind::ChangeCanvasSize(p) => Operation::Extent {
                src: sole(&mut staged),
                dst,
                width: p.width,
                height: p.height,
                h_shift: p.h_shift,
                v_shift: p.v_shift,
            },
            NodeKind::Overlay { overlay } => Operation::Overlay {
                overlay: overlay.clone(),
                src: sole(&mut staged),
                dst,
            },
            NodeKind::Merge => Operation::Append { srcs: staged, dst },
            NodeKind::MergeTiled { columns, rows } => Operation::Montage {
                srcs: staged,
                dst,
                columns: *columns,
                rows: *rows,
            },
            NodeKind::FadeOut { duration, blur } => {
                match fade_out_progress(index.0, self.len, *duration) {
                    Some(p) => Operation::Modulate {
                        src: sole(&mut staged),
                        dst,
                        brightness: 100 - p,
                        blur: blur.then(|| fade_blur(p)),
                    },
                    None => Operation::Copy { src: sole(&mut staged), dst },
                }
            }
            NodeKind::FadeIn { duration, blur } => match fade_in_progress(index.0, *duration) {
                Some(p) => Operation::Modulate {
                    src: sole(&mut staged),
                    dst,
                    brightness: p,
                    blur: blur.then(|| fade_blur(100 - p)),
                },
                None => Operation::Copy { src: sole(&mut staged), dst },
            },
            NodeKind::Output => Operation::Normalize { src: sole(&mut staged), dst },
            NodeKind::ImageSequence { .. }
            | NodeKind::StillImage { .. }
            | NodeKind::EvaluateFrame { .. }
            | NodeKind::SubSequence { .. }
            | NodeKind::Concatenate { .. } => {
                unreachable!("{} does not stage its inputs", self.type_name)
            }
        }
    }
}

impl FrameStream for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream_len(&self) -> u64 {
        self.len
    }

    #[tracing::instrument(level = "trace", skip(self, target, ctx), fields(node = %self.name))]
    fn produce(&self, index: FrameIndex, target: &Path, ctx: &EvalCtx<'_>) -> AvaResult<PathBuf> {
        if index.0 >= self.len {
            return Err(AvaError::OutOfRange {
                node: self.name.clone(),
                index: index.0,
                len: self.len,
            });
        }

        match &self.kind {
            NodeKind::ImageSequence {
                pattern, offset, ..
            } => {
                let number = index.0.checked_add(*offset).ok_or_else(|| {
                    AvaError::backend(&self.name, index.0, "source frame number overflows")
                })?;
                let src = PathBuf::from(pattern.render(number));
                if !src.is_file() {
                    return Err(AvaError::backend(
                        &self.name,
                        index.0,
                        format!("source frame '{}' does not exist", src.display()),
                    ));
                }
                let op = Operation::Decode {
                    src,
                    dst: target.to_path_buf(),
                };
                self.run(index, op, ctx)?;
            }
            NodeKind::StillImage { image, .. } => {
                let op = Operation::Decode {
                    src: image.clone(),
                    dst: target.to_path_buf(),
                };
                self.run(index, op, ctx)?;
            }
            NodeKind::EvaluateFrame { frame, .. } => {
                self.inputs[0].produce(FrameIndex(*frame), target, ctx)?;
            }
            NodeKind::SubSequence { first, .. } => {
                self.inputs[0].produce(FrameIndex(index.0 + first), target, ctx)?;
            }
            NodeKind::Concatenate {
                window,
                blur,
                boundaries,
            } => {
                self.produce_concat(index, target, ctx, *window, *blur, boundaries)?;
            }
            _ => {
                let staged = self.stage_inputs(index, ctx)?;
                let op = self.transform(index, staged, target.to_path_buf());
                self.run(index, op, ctx)?;
            }
        }

        Ok(target.to_path_buf())
    }
}

/// Percent progress through the trailing fade window, if `index` is inside it.
pub fn fade_out_progress(index: u64, len: u64, duration: u64) -> Option<u32> {
    let start = len.checked_sub(duration)?;
    if duration == 0 || index < start {
        return None;
    }
    Some(((index - start) * 100 / duration) as u32)
}

/// Percent progress through the leading fade window, if `index` is inside it.
pub fn fade_in_progress(index: u64, duration: u64) -> Option<u32> {
    if index >= duration {
        return None;
    }
    Some((index * 100 / duration) as u32)
}

fn sole(staged: &mut Vec<PathBuf>) -> PathBuf {
    staged.swap_remove(0)
}

fn fade_blur(percent: u32) -> u32 {
    percent * 16 / 100
}

fn check_fade(name: &str, duration: u64, input: &Node) -> AvaResult<()> {
    if duration > input.len {
        return Err(cfg(
            name,
            format!(
                "fade duration {duration} exceeds input '{}' ({} frames)",
                input.name, input.len
            ),
        ));
    }
    Ok(())
}

fn cfg(node: &str, msg: impl std::fmt::Display) -> AvaError {
    AvaError::config(format!("node '{node}': {msg}"))
}
