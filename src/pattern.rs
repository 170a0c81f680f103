//! Indexed file-name patterns for source frame sequences.
//!
//! A pattern is a path with one or more index placeholders. The placeholder grammar is
//! the positional subset of the familiar `format` syntax:
//!
//! - `{}` or `{0}`: the index, no padding
//! - `{:04}` or `{0:04}`: zero-padded to four digits
//! - `{:4}`: space-padded to four characters
//! - `{{` / `}}`: literal braces
//!
//! For instance `img{0:04}.png` with index 7 renders as `img0007.png`.

use crate::foundation::error::{AvaError, AvaResult};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Index { width: usize, zero: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePattern {
    source: String,
    segments: Vec<Segment>,
}

impl FramePattern {
    pub fn parse(pattern: &str) -> AvaResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut spec = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        spec.push(c);
                    }
                    if !closed {
                        return Err(bad(pattern, "unterminated '{'"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(pattern, &spec)?);
                }
                '}' => return Err(bad(pattern, "unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Index { .. })) {
            return Err(bad(pattern, "no index placeholder"));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn render(&self, index: u64) -> String {
        let mut out = String::with_capacity(self.source.len() + 8);
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                &Segment::Index { width, zero } => {
                    if zero {
                        out.push_str(&format!("{index:0width$}"));
                    } else {
                        out.push_str(&format!("{index:>width$}"));
                    }
                }
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn parse_placeholder(pattern: &str, spec: &str) -> AvaResult<Segment> {
    let (arg, fmt) = match spec.split_once(':') {
        Some((a, f)) => (a, f),
        None => (spec, ""),
    };
    if !(arg.is_empty() || arg == "0") {
        return Err(bad(
            pattern,
            &format!("placeholder '{{{spec}}}' must refer to argument 0"),
        ));
    }
    if fmt.is_empty() {
        return Ok(Segment::Index {
            width: 0,
            zero: false,
        });
    }

    let zero = fmt.starts_with('0');
    let digits = if zero { &fmt[1..] } else { fmt };
    let width = if digits.is_empty() {
        0
    } else {
        digits.parse::<usize>().map_err(|_| {
            bad(
                pattern,
                &format!("unsupported format spec '{fmt}' (expected [0]WIDTH)"),
            )
        })?
    };
    Ok(Segment::Index { width, zero })
}

fn bad(pattern: &str, why: &str) -> AvaError {
    AvaError::config(format!("invalid frame pattern '{pattern}': {why}"))
}
