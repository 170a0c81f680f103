use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context as _;

use crate::{
    foundation::error::{AvaError, AvaResult},
    model::Corner,
};

/// One call into the external image-operation backend.
///
/// Every variant reads one or more existing image files and writes exactly one output
/// image at `dst`.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Decode any readable image into a true-color working copy.
    Decode { src: PathBuf, dst: PathBuf },
    /// Draw `label` on a translucent box at `corner`.
    Annotate {
        src: PathBuf,
        dst: PathBuf,
        label: String,
        corner: Corner,
    },
    /// Crop to a percentage rectangle with pixel offsets.
    Crop {
        src: PathBuf,
        dst: PathBuf,
        h_percent: u32,
        v_percent: u32,
        h_offset: u32,
        v_offset: u32,
    },
    /// Scale to fit inside `max_width` x `max_height`.
    Resize {
        src: PathBuf,
        dst: PathBuf,
        max_width: u32,
        max_height: u32,
    },
    /// Pad or crop onto a centered canvas, shifted by `(h_shift, v_shift)`.
    Extent {
        src: PathBuf,
        dst: PathBuf,
        width: u32,
        height: u32,
        h_shift: i32,
        v_shift: i32,
    },
    /// Composite `overlay` on top of `src`.
    Overlay {
        overlay: PathBuf,
        src: PathBuf,
        dst: PathBuf,
    },
    /// Horizontal concatenation, left to right.
    Append { srcs: Vec<PathBuf>, dst: PathBuf },
    /// Grid montage, row-major.
    Montage {
        srcs: Vec<PathBuf>,
        dst: PathBuf,
        columns: u32,
        rows: u32,
    },
    /// Scale brightness to `brightness` percent, optionally blurring.
    Modulate {
        src: PathBuf,
        dst: PathBuf,
        brightness: u32,
        blur: Option<u32>,
    },
    /// Plain re-encode.
    Copy { src: PathBuf, dst: PathBuf },
    /// Blend `incoming` over `outgoing` at `percent`, optionally blurring.
    Blend {
        incoming: PathBuf,
        outgoing: PathBuf,
        dst: PathBuf,
        percent: u32,
        blur: Option<u32>,
    },
    /// Re-encode as 8-bit true color for downstream consumers.
    Normalize { src: PathBuf, dst: PathBuf },
}

/// Locations of the ImageMagick tools. Passed explicitly to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub convert: PathBuf,
    pub composite: PathBuf,
    pub montage: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            convert: PathBuf::from("convert"),
            composite: PathBuf::from("composite"),
            montage: PathBuf::from("montage"),
        }
    }
}

/// Optional per-tool overrides, e.g. from the command line.
#[derive(Clone, Debug, Default)]
pub struct ToolOverrides {
    pub convert: Option<PathBuf>,
    pub composite: Option<PathBuf>,
    pub montage: Option<PathBuf>,
}

impl ToolPaths {
    /// Resolve every tool to an executable path, preferring overrides over `PATH`.
    pub fn resolve(overrides: &ToolOverrides) -> AvaResult<Self> {
        Ok(Self {
            convert: resolve_tool("convert", overrides.convert.as_deref())?,
            composite: resolve_tool("composite", overrides.composite.as_deref())?,
            montage: resolve_tool("montage", overrides.montage.as_deref())?,
        })
    }
}

fn resolve_tool(name: &str, custom: Option<&Path>) -> AvaResult<PathBuf> {
    match custom {
        Some(p) if p.is_file() => Ok(p.to_path_buf()),
        Some(p) => which::which(p).map_err(|e| {
            AvaError::config(format!(
                "{name} override '{}' is not an executable: {e}",
                p.display()
            ))
        }),
        None => which::which(name).map_err(|e| {
            AvaError::config(format!(
                "{name} was not found on PATH (is ImageMagick installed?): {e}"
            ))
        }),
    }
}

/// Program plus argument vector for one backend call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, a: impl Into<OsString>) -> Self {
        self.args.push(a.into());
        self
    }

    fn path(self, p: &Path) -> Self {
        self.arg(p.as_os_str())
    }

    fn blur(self, radius: Option<u32>) -> Self {
        match radius {
            Some(r) => self.arg("-blur").arg(format!("0x{r}")),
            None => self,
        }
    }

    /// Arguments as display strings, for logs and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl Operation {
    pub fn output(&self) -> &Path {
        match self {
            Operation::Decode { dst, .. }
            | Operation::Annotate { dst, .. }
            | Operation::Crop { dst, .. }
            | Operation::Resize { dst, .. }
            | Operation::Extent { dst, .. }
            | Operation::Overlay { dst, .. }
            | Operation::Append { dst, .. }
            | Operation::Montage { dst, .. }
            | Operation::Modulate { dst, .. }
            | Operation::Copy { dst, .. }
            | Operation::Blend { dst, .. }
            | Operation::Normalize { dst, .. } => dst,
        }
    }

    pub fn inputs(&self) -> Vec<&Path> {
        match self {
            Operation::Decode { src, .. }
            | Operation::Annotate { src, .. }
            | Operation::Crop { src, .. }
            | Operation::Resize { src, .. }
            | Operation::Extent { src, .. }
            | Operation::Modulate { src, .. }
            | Operation::Copy { src, .. }
            | Operation::Normalize { src, .. } => vec![src.as_path()],
            Operation::Overlay { overlay, src, .. } => vec![overlay.as_path(), src.as_path()],
            Operation::Append { srcs, .. } | Operation::Montage { srcs, .. } => {
                srcs.iter().map(PathBuf::as_path).collect()
            }
            Operation::Blend {
                incoming, outgoing, ..
            } => vec![incoming.as_path(), outgoing.as_path()],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Decode { .. } => "decode",
            Operation::Annotate { .. } => "annotate",
            Operation::Crop { .. } => "crop",
            Operation::Resize { .. } => "resize",
            Operation::Extent { .. } => "extent",
            Operation::Overlay { .. } => "overlay",
            Operation::Append { .. } => "append",
            Operation::Montage { .. } => "montage",
            Operation::Modulate { .. } => "modulate",
            Operation::Copy { .. } => "copy",
            Operation::Blend { .. } => "blend",
            Operation::Normalize { .. } => "normalize",
        }
    }

    /// ImageMagick command line for this operation.
    pub fn invocation(&self, tools: &ToolPaths) -> Invocation {
        match self {
            Operation::Decode { src, dst } => Invocation::new(&tools.convert)
                .arg("-type")
                .arg("TrueColor")
                .path(src)
                .path(dst),
            Operation::Annotate {
                src,
                dst,
                label,
                corner,
            } => Invocation::new(&tools.convert)
                .path(src)
                .arg("-fill")
                .arg("white")
                .arg("-undercolor")
                .arg("#00000080")
                .arg("-pointsize")
                .arg("24")
                .arg("-gravity")
                .arg(corner.as_str())
                .arg("-annotate")
                .arg("+0+5")
                .arg(format!(" {label} "))
                .path(dst),
            Operation::Crop {
                src,
                dst,
                h_percent,
                v_percent,
                h_offset,
                v_offset,
            } => Invocation::new(&tools.convert)
                .path(src)
                .arg("-crop")
                .arg(format!("{h_percent}%x{v_percent}%+{h_offset}+{v_offset}"))
                .path(dst),
            Operation::Resize {
                src,
                dst,
                max_width,
                max_height,
            } => Invocation::new(&tools.convert)
                .path(src)
                .arg("-resize")
                .arg(format!("{max_width}x{max_height}"))
                .path(dst),
            Operation::Extent {
                src,
                dst,
                width,
                height,
                h_shift,
                v_shift,
            } => Invocation::new(&tools.convert)
                .path(src)
                .arg("-gravity")
                .arg("center")
                .arg("-extent")
                .arg(format!("{width}x{height}{h_shift:+}{v_shift:+}"))
                .path(dst),
            Operation::Overlay { overlay, src, dst } => Invocation::new(&tools.composite)
                .path(overlay)
                .path(src)
                .path(dst),
            Operation::Append { srcs, dst } => srcs
                .iter()
                .fold(Invocation::new(&tools.convert), |inv, s| inv.path(s))
                .arg("+append")
                .path(dst),
            Operation::Montage {
                srcs,
                dst,
                columns,
                rows,
            } => srcs
                .iter()
                .fold(Invocation::new(&tools.montage), |inv, s| inv.path(s))
                .arg("-mode")
                .arg("Concatenate")
                .arg("-tile")
                .arg(format!("{columns}x{rows}"))
                .path(dst),
            Operation::Modulate {
                src,
                dst,
                brightness,
                blur,
            } => Invocation::new(&tools.convert)
                .path(src)
                .arg("-modulate")
                .arg(brightness.to_string())
                .blur(*blur)
                .path(dst),
            Operation::Copy { src, dst } => Invocation::new(&tools.convert).path(src).path(dst),
            Operation::Blend {
                incoming,
                outgoing,
                dst,
                percent,
                blur,
            } => Invocation::new(&tools.composite)
                .blur(*blur)
                .arg("-blend")
                .arg(format!("{percent}%"))
                .path(incoming)
                .path(outgoing)
                .path(dst),
            Operation::Normalize { src, dst } => Invocation::new(&tools.convert)
                .arg("-type")
                .arg("TrueColor")
                .arg("-depth")
                .arg("8")
                .path(src)
                .path(dst),
        }
    }
}

/// Performs pixel operations on behalf of graph nodes.
///
/// Implementations must either write a valid image at [`Operation::output`] or fail.
pub trait ImageBackend: Send + Sync {
    fn run(&self, op: &Operation) -> anyhow::Result<()>;
}

/// Runs each operation as a short-lived ImageMagick process.
#[derive(Clone, Debug)]
pub struct MagickBackend {
    tools: ToolPaths,
    verify_outputs: bool,
}

impl MagickBackend {
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            tools,
            verify_outputs: true,
        }
    }

    /// Skip the post-run header check of every written image.
    pub fn verify_outputs(mut self, on: bool) -> Self {
        self.verify_outputs = on;
        self
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }
}

impl ImageBackend for MagickBackend {
    fn run(&self, op: &Operation) -> anyhow::Result<()> {
        for input in op.inputs() {
            if !input.is_file() {
                anyhow::bail!("{} input '{}' does not exist", op.name(), input.display());
            }
        }

        let dst = op.output();
        // Scratch slots are reused across frames; a stale file must not pass the output check.
        match std::fs::remove_file(dst) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("remove stale output '{}'", dst.display())));
            }
        }

        let inv = op.invocation(&self.tools);
        tracing::debug!(
            op = op.name(),
            program = %inv.program.display(),
            args = ?inv.args_lossy(),
            "backend invocation"
        );

        let output = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to spawn '{}'", inv.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "'{}' exited with status {}: {}",
                inv.program.display(),
                output.status,
                stderr.trim()
            );
        }

        if !dst.is_file() {
            anyhow::bail!(
                "'{}' succeeded but wrote no image at '{}'",
                inv.program.display(),
                dst.display()
            );
        }
        if self.verify_outputs {
            image::image_dimensions(dst)
                .with_context(|| format!("check written image '{}'", dst.display()))?;
        }
        Ok(())
    }
}
