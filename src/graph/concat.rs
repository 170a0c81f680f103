//! Segment scheduling for concatenation with cross-blending.
//!
//! Adjacent segments overlap by `window` frames in the concatenated stream. Boundaries are
//! `B[0] = 0`, `B[i] = B[i-1] + L[i-1] - window` and, for the final segment,
//! `B[n] = B[n-1] + L[n-1]`. Global index `idx` belongs to the segment `i` with
//! `B[i] <= idx < B[i+1]`; the first `window` frames of every segment but the first are
//! blended with the tail of the previous one.

use crate::foundation::error::{AvaError, AvaResult};

/// Maximum blur radius applied at the midpoint of a blend.
pub const BLEND_BLUR_MAX: f64 = 16.0;

/// Where a global index of a concatenation comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Segment {
    /// Pass through input `input` at `local`.
    Direct { input: usize, local: u64 },
    /// Blend two neighbouring inputs.
    Blend(BlendStep),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendStep {
    /// Previous segment, sampled near its tail.
    pub outgoing: usize,
    pub outgoing_index: u64,
    /// Current segment, sampled within its first `window` frames.
    pub incoming: usize,
    pub incoming_index: u64,
    /// Fraction of the way into the incoming segment, in `[0, 1)`.
    pub in_factor: f64,
    /// Triangular profile: 0 at both ends of the blend, 1 at its midpoint.
    pub blur_factor: f64,
}

impl BlendStep {
    /// Blend strength in percent, weighted toward the incoming segment.
    pub fn percent(&self) -> u32 {
        (self.in_factor * 100.0).round() as u32
    }

    pub fn blur_radius(&self) -> u32 {
        (self.blur_factor * BLEND_BLUR_MAX).round() as u32
    }
}

/// Check that `window` fits every input, then compute the segment boundaries.
pub fn checked_boundaries(node: &str, lengths: &[u64], window: u64) -> AvaResult<Vec<u64>> {
    if lengths.is_empty() {
        return Err(AvaError::config(format!(
            "node '{node}' needs at least one input to concatenate"
        )));
    }
    if lengths.len() > 1 {
        for (i, &len) in lengths.iter().enumerate() {
            if window >= len {
                return Err(AvaError::config(format!(
                    "node '{node}': cross-blend window {window} must be shorter than input {i} ({len} frames)"
                )));
            }
        }
    }
    Ok(blend_boundaries(lengths, window))
}

/// Segment boundaries; `window` must be shorter than every input when there are two or more.
pub fn blend_boundaries(lengths: &[u64], window: u64) -> Vec<u64> {
    let mut out = Vec::with_capacity(lengths.len() + 1);
    let mut at = 0u64;
    out.push(at);
    let Some((last, head)) = lengths.split_last() else {
        return out;
    };
    for &len in head {
        at = at + len - window;
        out.push(at);
    }
    out.push(at + last);
    out
}

/// Map a global index to its source segment(s). `None` past the end of the stream.
pub fn locate(boundaries: &[u64], window: u64, idx: u64) -> Option<Segment> {
    let i = boundaries
        .windows(2)
        .position(|b| b[0] <= idx && idx < b[1])?;
    let local = idx - boundaries[i];

    if i == 0 || local >= window {
        return Some(Segment::Direct { input: i, local });
    }

    let in_factor = local as f64 / window as f64;
    let blur_factor = 1.0 - (in_factor - 0.5).abs() * 2.0;
    Some(Segment::Blend(BlendStep {
        outgoing: i - 1,
        outgoing_index: idx - boundaries[i - 1],
        incoming: i,
        incoming_index: local,
        in_factor,
        blur_factor,
    }))
}
