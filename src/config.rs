//! Augmentation configuration.
//!
//! A raw configuration is a JSON-like mapping from augmentation name to either
//! a bool or `{ "enabled": bool, <params> }`. Parameters may also be given in
//! the flat form `<prefix>_<param>` at the top level, e.g. `elastic_n` or
//! `box_fill`. [`AugmentConfig::normalize`] turns such a mapping into a
//! complete, typed list of [`Stage`]s in canonical order. Missing names are
//! disabled and unknown names are ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::transforms::MisalignKind;

/// Every recognized augmentation name.
pub const AUGMENTATIONS: [&str; 13] = [
    "blur",
    "box",
    "circle",
    "elastic_warp",
    "flip",
    "grey",
    "misalign",
    "missing_section",
    "noise",
    "rotate",
    "rotate90",
    "rescale",
    "sin",
];

/// Identifies an augmentation independently of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    ElasticWarp,
    Flip,
    Rotate,
    Rotate90,
    Blur,
    Misalign,
    MissingSection,
    Rescale,
    Circle,
    Grey,
    Noise,
    Sin,
    Box,
}

impl StageKind {
    /// Order in which enabled stages run. Shape-changing stages come first;
    /// misalign precedes rescale so its seams are not resampled away.
    pub const CANONICAL_ORDER: [StageKind; 13] = [
        StageKind::ElasticWarp,
        StageKind::Flip,
        StageKind::Rotate,
        StageKind::Rotate90,
        StageKind::Blur,
        StageKind::Misalign,
        StageKind::MissingSection,
        StageKind::Rescale,
        StageKind::Circle,
        StageKind::Grey,
        StageKind::Noise,
        StageKind::Sin,
        StageKind::Box,
    ];

    /// Configuration key.
    pub fn name(self) -> &'static str {
        match self {
            Self::ElasticWarp => "elastic_warp",
            Self::Flip => "flip",
            Self::Rotate => "rotate",
            Self::Rotate90 => "rotate90",
            Self::Blur => "blur",
            Self::Misalign => "misalign",
            Self::MissingSection => "missing_section",
            Self::Rescale => "rescale",
            Self::Circle => "circle",
            Self::Grey => "grey",
            Self::Noise => "noise",
            Self::Sin => "sin",
            Self::Box => "box",
        }
    }

    /// Prefix of this augmentation's flat top-level parameter keys.
    fn flat_prefix(self) -> &'static str {
        match self {
            Self::ElasticWarp => "elastic",
            other => other.name(),
        }
    }
}

fn validate_probability(p: f64, ctx: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::configuration(format!(
            "{}: probability must be between 0.0 and 1.0 (got {})",
            ctx, p
        )));
    }
    Ok(())
}

fn validate_non_negative(v: f64, what: &str, ctx: &str) -> Result<()> {
    if !v.is_finite() || v < 0.0 {
        return Err(Error::configuration(format!(
            "{}: {} must be finite and non-negative (got {})",
            ctx, what, v
        )));
    }
    Ok(())
}

fn validate_finite(v: f64, what: &str, ctx: &str) -> Result<()> {
    if !v.is_finite() {
        return Err(Error::configuration(format!(
            "{}: {} must be finite (got {})",
            ctx, what, v
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticParams {
    /// Random control impulses per axis.
    pub n: usize,
    /// Upper bound of the smoothing sigma, in voxels.
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateParams {
    /// Largest rotation in degrees, either direction.
    #[serde(default = "default_max_angle")]
    pub max_angle: f64,
}

fn default_max_angle() -> f64 {
    180.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlurParams {
    pub sigma: f64,
    pub prob: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisalignParams {
    pub prob: f64,
    pub delta: usize,
    #[serde(rename = "type")]
    pub kind: MisalignKind,
    /// Whether labels follow the displaced slices.
    #[serde(default)]
    pub label_shift: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSectionParams {
    pub prob: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescaleParams {
    pub min: f64,
    pub max: f64,
    /// Draw independent factors for y and x.
    #[serde(default)]
    pub per_axis: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleParams {
    pub prob: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinParams {
    /// Amplitude.
    pub a: f64,
    /// Spatial frequency, radians per voxel.
    pub f: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxParams {
    /// Number of boxes.
    pub n: usize,
    /// In-plane half-width.
    pub r: usize,
    /// Depth in slices.
    pub z: usize,
    pub fill: f64,
}

/// An enabled augmentation with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    ElasticWarp(ElasticParams),
    Flip,
    Rotate(RotateParams),
    Rotate90,
    Blur(BlurParams),
    Misalign(MisalignParams),
    MissingSection(MissingSectionParams),
    Rescale(RescaleParams),
    Circle(CircleParams),
    Grey,
    Noise(NoiseParams),
    Sin(SinParams),
    Box(BoxParams),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::ElasticWarp(_) => StageKind::ElasticWarp,
            Self::Flip => StageKind::Flip,
            Self::Rotate(_) => StageKind::Rotate,
            Self::Rotate90 => StageKind::Rotate90,
            Self::Blur(_) => StageKind::Blur,
            Self::Misalign(_) => StageKind::Misalign,
            Self::MissingSection(_) => StageKind::MissingSection,
            Self::Rescale(_) => StageKind::Rescale,
            Self::Circle(_) => StageKind::Circle,
            Self::Grey => StageKind::Grey,
            Self::Noise(_) => StageKind::Noise,
            Self::Sin(_) => StageKind::Sin,
            Self::Box(_) => StageKind::Box,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check parameter domains.
    fn validate(&self) -> Result<()> {
        let ctx = self.name();
        match self {
            Self::ElasticWarp(p) => validate_non_negative(p.sigma, "sigma", ctx),
            Self::Rotate(p) => {
                validate_non_negative(p.max_angle, "max_angle", ctx)?;
                if p.max_angle > 180.0 {
                    return Err(Error::configuration(format!(
                        "rotate: max_angle must be at most 180 (got {})",
                        p.max_angle
                    )));
                }
                Ok(())
            }
            Self::Blur(p) => {
                validate_non_negative(p.sigma, "sigma", ctx)?;
                validate_probability(p.prob, ctx)
            }
            Self::Misalign(p) => validate_probability(p.prob, ctx),
            Self::MissingSection(p) => validate_probability(p.prob, ctx),
            Self::Rescale(p) => {
                validate_finite(p.min, "min", ctx)?;
                validate_finite(p.max, "max", ctx)?;
                if p.min <= 0.0 {
                    return Err(Error::configuration(format!(
                        "rescale: min must be positive (got {})",
                        p.min
                    )));
                }
                if p.max < p.min {
                    return Err(Error::configuration(format!(
                        "rescale: min ({}) cannot be greater than max ({})",
                        p.min, p.max
                    )));
                }
                Ok(())
            }
            Self::Circle(p) => {
                validate_probability(p.prob, ctx)?;
                validate_non_negative(p.radius, "radius", ctx)
            }
            Self::Noise(p) => validate_non_negative(p.sigma, "sigma", ctx),
            Self::Sin(p) => {
                validate_finite(p.a, "a", ctx)?;
                validate_non_negative(p.f, "f", ctx)
            }
            Self::Box(p) => validate_finite(p.fill, "fill", ctx),
            Self::Flip | Self::Rotate90 | Self::Grey => Ok(()),
        }
    }
}

/// A complete configuration: the enabled stages, in canonical order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AugmentConfig {
    stages: Vec<Stage>,
}

impl AugmentConfig {
    /// A configuration with every augmentation disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Normalize a raw mapping into a complete configuration.
    ///
    /// Every enabled augmentation must carry its required parameters, each
    /// within its domain; nothing is clamped.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use volaug::config::{AugmentConfig, StageKind};
    ///
    /// let config = AugmentConfig::normalize(&json!({
    ///     "box": { "enabled": true, "n": 1, "r": 3, "z": 1, "fill": 0 },
    ///     "rotate90": true,
    ///     "noise": false,
    /// }))
    /// .unwrap();
    /// let kinds: Vec<_> = config.stages().iter().map(|s| s.kind()).collect();
    /// assert_eq!(kinds, [StageKind::Rotate90, StageKind::Box]);
    /// ```
    pub fn normalize(raw: &Value) -> Result<Self> {
        let top = match raw {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::disabled()),
            other => {
                return Err(Error::configuration(format!(
                    "augmentation config must be a mapping, got {}",
                    other
                )))
            }
        };

        let mut stages = Vec::new();
        for kind in StageKind::CANONICAL_ORDER {
            if let Some(params) = enabled_params(top, kind)? {
                let stage = build_stage(kind, params)?;
                stage.validate()?;
                stages.push(stage);
            }
        }
        Ok(Self { stages })
    }

    /// Parse and normalize a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid JSON: {}", e)))?;
        Self::normalize(&raw)
    }

    /// Enabled stages in the order they run.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_enabled(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|s| s.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl TryFrom<&Value> for AugmentConfig {
    type Error = Error;

    fn try_from(raw: &Value) -> Result<Self> {
        Self::normalize(raw)
    }
}

/// Collect the parameters of `kind` if it is enabled.
fn enabled_params(top: &Map<String, Value>, kind: StageKind) -> Result<Option<Map<String, Value>>> {
    let name = kind.name();
    let mut params = match top.get(name) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(None),
        Some(Value::Bool(true)) => Map::new(),
        Some(Value::Object(entry)) => {
            let enabled = match entry.get("enabled") {
                None => false,
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(Error::configuration(format!(
                        "{}: `enabled` must be a bool, got {}",
                        name, other
                    )))
                }
            };
            if !enabled {
                return Ok(None);
            }
            let mut params = entry.clone();
            params.remove("enabled");
            params
        }
        Some(other) => {
            return Err(Error::configuration(format!(
                "{}: expected a bool or a mapping, got {}",
                name, other
            )))
        }
    };

    let prefix = format!("{}_", kind.flat_prefix());
    for (key, value) in top {
        if AUGMENTATIONS.contains(&key.as_str()) {
            continue;
        }
        if let Some(param) = key.strip_prefix(&prefix) {
            if !param.is_empty() && !params.contains_key(param) {
                params.insert(param.to_string(), value.clone());
            }
        }
    }
    Ok(Some(params))
}

fn parse<T: DeserializeOwned>(kind: StageKind, params: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| Error::configuration(format!("{}: {}", kind.name(), e)))
}

fn build_stage(kind: StageKind, params: Map<String, Value>) -> Result<Stage> {
    Ok(match kind {
        StageKind::ElasticWarp => Stage::ElasticWarp(parse(kind, params)?),
        StageKind::Flip => Stage::Flip,
        StageKind::Rotate => Stage::Rotate(parse(kind, params)?),
        StageKind::Rotate90 => Stage::Rotate90,
        StageKind::Blur => Stage::Blur(parse(kind, params)?),
        StageKind::Misalign => Stage::Misalign(parse(kind, params)?),
        StageKind::MissingSection => Stage::MissingSection(parse(kind, params)?),
        StageKind::Rescale => Stage::Rescale(parse(kind, params)?),
        StageKind::Circle => Stage::Circle(parse(kind, params)?),
        StageKind::Grey => Stage::Grey,
        StageKind::Noise => Stage::Noise(parse(kind, params)?),
        StageKind::Sin => Stage::Sin(parse(kind, params)?),
        StageKind::Box => Stage::Box(parse(kind, params)?),
    })
}
