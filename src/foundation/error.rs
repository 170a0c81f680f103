/// Convenience result type used across Ava.
pub type AvaResult<T> = Result<T, AvaError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum AvaError {
    /// Invalid graph description: unknown kind, arity, unresolved input, bad params.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external image operation failed for a node while producing a frame.
    #[error("backend error: node '{node}' frame {frame}: {message}")]
    Backend {
        /// Name of the node whose operation failed.
        node: String,
        /// Frame index (local to that node) being produced.
        frame: u64,
        /// Failure details (tool, exit status, stderr, missing path).
        message: String,
    },

    /// A node was asked for a frame outside of its stream.
    #[error("index out of range: node '{node}' has {len} frames, requested {index}")]
    OutOfRange {
        /// Name of the node that rejected the request.
        node: String,
        /// Requested local index.
        index: u64,
        /// Stream length of the node.
        len: u64,
    },

    /// The run was stopped before every frame was dispatched.
    #[error("render cancelled: {rendered} of {total} frames written")]
    Cancelled {
        /// Frames that were written before the stop.
        rendered: u64,
        /// Frames the run would have written.
        total: u64,
    },

    /// Errors when serializing or deserializing graph descriptions.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AvaError {
    /// Build an [`AvaError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an [`AvaError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Build an [`AvaError::Backend`] value.
    pub fn backend(node: impl Into<String>, frame: u64, msg: impl Into<String>) -> Self {
        Self::Backend {
            node: node.into(),
            frame,
            message: msg.into(),
        }
    }

    /// True for errors detected while building the graph, before any frame work.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Serde(_))
    }
}
