use std::{collections::BTreeSet, path::Path};

use anyhow::Context as _;
use serde::de::DeserializeOwned;

use crate::foundation::error::{AvaError, AvaResult};

/// Ordered list of node descriptions. Inputs may only name nodes that appear earlier.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct GraphDesc {
    pub nodes: Vec<NodeDesc>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeDesc {
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<String>>,
}

impl NodeDesc {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: serde_json::Value::Null,
            inputs: None,
        }
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Input names in slot order; absent and `null` both mean "no inputs".
    pub fn input_names(&self) -> &[String] {
        self.inputs.as_deref().unwrap_or(&[])
    }
}

impl GraphDesc {
    pub fn from_json_str(s: &str) -> AvaResult<Self> {
        serde_json::from_str(s).map_err(|e| AvaError::serde(format!("parse graph JSON: {e}")))
    }

    pub fn load(path: &Path) -> AvaResult<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read graph description '{}'", path.display()))?;
        Self::from_json_str(&s)
    }

    pub fn to_json_pretty(&self) -> AvaResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AvaError::serde(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Gravity names accepted by the label annotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Corner {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    #[default]
    SouthWest,
    South,
    SouthEast,
}

impl Corner {
    pub fn as_str(self) -> &'static str {
        match self {
            Corner::NorthWest => "NorthWest",
            Corner::North => "North",
            Corner::NorthEast => "NorthEast",
            Corner::West => "West",
            Corner::Center => "Center",
            Corner::East => "East",
            Corner::SouthWest => "SouthWest",
            Corner::South => "South",
            Corner::SouthEast => "SouthEast",
        }
    }
}

fn default_duration() -> u64 {
    24
}

fn default_box() -> u32 {
    256
}

fn default_tiles() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SequenceParams {
    pub format: String,
    pub count: u64,
    #[serde(default)]
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StillImageParams {
    pub image: String,
    #[serde(default = "default_duration")]
    pub duration: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvaluateFrameParams {
    pub frame: u64,
    #[serde(default = "default_duration")]
    pub duration: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LabelParams {
    pub label: String,
    #[serde(default)]
    pub corner: Corner,
}

/// Percent rectangle plus pixel offsets.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CropParams {
    pub h_size: u32,
    pub v_size: u32,
    #[serde(default)]
    pub h_offset: u32,
    #[serde(default)]
    pub v_offset: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResizeParams {
    #[serde(default = "default_box")]
    pub maximum_width: u32,
    #[serde(default = "default_box")]
    pub maximum_height: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CanvasParams {
    #[serde(default = "default_box")]
    pub width: u32,
    #[serde(default = "default_box")]
    pub height: u32,
    #[serde(default)]
    pub h_shift: i32,
    #[serde(default)]
    pub v_shift: i32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OverlayParams {
    pub overlay: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TiledParams {
    #[serde(default = "default_tiles")]
    pub columns: u32,
    #[serde(default = "default_tiles")]
    pub rows: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FadeOutParams {
    #[serde(rename = "fadeOutDuration", default = "default_duration")]
    pub duration: u64,
    #[serde(default)]
    pub blur: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FadeInParams {
    #[serde(rename = "fadeInDuration", default = "default_duration")]
    pub duration: u64,
    #[serde(default)]
    pub blur: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubSequenceParams {
    #[serde(default)]
    pub first: u64,
    #[serde(default)]
    pub last: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConcatParams {
    #[serde(default)]
    pub cross_blend_duration: u64,
    #[serde(default = "default_true")]
    pub blur: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

/// Parsed node kind with typed parameters. One variant per catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub enum KindSpec {
    ImageSequence(SequenceParams),
    StillImage(StillImageParams),
    EvaluateFrame(EvaluateFrameParams),
    AddLabel(LabelParams),
    Crop(CropParams),
    Resize(ResizeParams),
    ChangeCanvasSize(CanvasParams),
    Overlay(OverlayParams),
    Merge,
    MergeTiled(TiledParams),
    FadeOut(FadeOutParams),
    FadeIn(FadeInParams),
    SubSequence(SubSequenceParams),
    Concatenate(ConcatParams),
    Output,
}

impl KindSpec {
    /// Accepted input count as `(min, max)`; `None` means unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            KindSpec::ImageSequence(_) | KindSpec::StillImage(_) => (0, Some(0)),
            KindSpec::EvaluateFrame(_)
            | KindSpec::AddLabel(_)
            | KindSpec::Crop(_)
            | KindSpec::Resize(_)
            | KindSpec::ChangeCanvasSize(_)
            | KindSpec::Overlay(_)
            | KindSpec::FadeOut(_)
            | KindSpec::FadeIn(_)
            | KindSpec::SubSequence(_)
            | KindSpec::Output => (1, Some(1)),
            KindSpec::Merge | KindSpec::Concatenate(_) => (1, None),
            KindSpec::MergeTiled(p) => (1, Some((p.columns as usize) * (p.rows as usize))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            KindSpec::ImageSequence(_) => "ImageSequence",
            KindSpec::StillImage(_) => "StillImage",
            KindSpec::EvaluateFrame(_) => "EvaluateFrame",
            KindSpec::AddLabel(_) => "AddLabel",
            KindSpec::Crop(_) => "Crop",
            KindSpec::Resize(_) => "Resize",
            KindSpec::ChangeCanvasSize(_) => "ChangeCanvasSize",
            KindSpec::Overlay(_) => "Overlay",
            KindSpec::Merge => "Merge",
            KindSpec::MergeTiled(_) => "MergeTiled",
            KindSpec::FadeOut(_) => "FadeOut",
            KindSpec::FadeIn(_) => "FadeIn",
            KindSpec::SubSequence(_) => "SubSequence",
            KindSpec::Concatenate(_) => "Concatenate",
            KindSpec::Output => "Output",
        }
    }
}

pub fn parse_kind(desc: &NodeDesc) -> AvaResult<KindSpec> {
    let kind = desc.kind.trim();
    if kind.is_empty() {
        return Err(AvaError::config(format!("node '{}' has an empty type", desc.name)));
    }

    let spec = match kind {
        "ImageSequence" => KindSpec::ImageSequence(params(desc)?),
        "StillImage" | "Image" => KindSpec::StillImage(params(desc)?),
        "EvaluateFrame" => KindSpec::EvaluateFrame(params(desc)?),
        "AddLabel" => KindSpec::AddLabel(params(desc)?),
        "Crop" => KindSpec::Crop(params(desc)?),
        "Resize" => KindSpec::Resize(params(desc)?),
        "ChangeCanvasSize" => KindSpec::ChangeCanvasSize(params(desc)?),
        "Overlay" => KindSpec::Overlay(params(desc)?),
        "Merge" => {
            params::<NoParams>(desc)?;
            KindSpec::Merge
        }
        "MergeTiled" => KindSpec::MergeTiled(params(desc)?),
        "FadeOut" => KindSpec::FadeOut(params(desc)?),
        "FadeIn" => KindSpec::FadeIn(params(desc)?),
        "SubSequence" => KindSpec::SubSequence(params(desc)?),
        "Concatenate" => KindSpec::Concatenate(params(desc)?),
        "Output" => {
            params::<NoParams>(desc)?;
            KindSpec::Output
        }
        other => {
            return Err(AvaError::config(format!(
                "node '{}' has unknown type '{other}'",
                desc.name
            )));
        }
    };
    Ok(spec)
}

fn params<T: DeserializeOwned>(desc: &NodeDesc) -> AvaResult<T> {
    let value = if desc.params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        desc.params.clone()
    };
    if !value.is_object() {
        return Err(AvaError::config(format!("node '{}' params must be an object", desc.name)));
    }
    serde_json::from_value(value).map_err(|e| {
        AvaError::config(format!(
            "node '{}' ({}) has invalid params: {e}",
            desc.name, desc.kind
        ))
    })
}

/// Programmatic construction of a [`GraphDesc`].
#[derive(Default)]
pub struct GraphDescBuilder {
    nodes: Vec<NodeDesc>,
}

impl GraphDescBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, desc: NodeDesc) -> Self {
        self.nodes.push(desc);
        self
    }

    pub fn build(self) -> AvaResult<GraphDesc> {
        let mut seen = BTreeSet::new();
        for n in &self.nodes {
            if n.name.trim().is_empty() {
                return Err(AvaError::config("node name must be non-empty"));
            }
            if !seen.insert(n.name.as_str()) {
                return Err(AvaError::config(format!("duplicate node name '{}'", n.name)));
            }
        }
        Ok(GraphDesc { nodes: self.nodes })
    }
}
