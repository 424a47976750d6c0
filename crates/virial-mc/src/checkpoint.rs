use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use virial_core::{ErrorInfo, VirialError};

/// How the target cluster treats the path-integral discretization. Only
/// affects the refpref file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DiscretizationMode {
    /// The full cluster is sampled directly.
    #[default]
    Direct,
    /// Full resolution minus half resolution.
    SubtractHalf,
    /// Quantum minus semiclassical.
    Semiclassical,
    /// Full potential minus an approximate potential.
    SubtractApprox,
    /// Quantum minus classical.
    Classical,
}

impl DiscretizationMode {
    /// File-name suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            DiscretizationMode::Direct => "_d",
            DiscretizationMode::SubtractHalf => "_sh",
            DiscretizationMode::Semiclassical => "_sc",
            DiscretizationMode::SubtractApprox => "_sa",
            DiscretizationMode::Classical => "_c",
        }
    }
}

/// Which body orders the target cluster carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Additivity {
    /// Not recorded in the file name.
    #[default]
    Unspecified,
    /// Pair interactions only.
    TwoBody,
    /// Pair plus three-body interactions.
    ThreeBody,
}

impl Additivity {
    fn suffix(&self) -> &'static str {
        match self {
            Additivity::Unspecified => "",
            Additivity::TwoBody => "_2b",
            Additivity::ThreeBody => "_3b",
        }
    }
}

/// Everything that identifies a calibrated run for refpref reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefPrefKey {
    /// Cluster order.
    pub points: usize,
    /// Body orders of the target.
    pub additivity: Additivity,
    /// Temperature as configured.
    pub temperature: f64,
    /// Beads per molecule.
    pub beads: usize,
    /// Discretization mode.
    pub mode: DiscretizationMode,
    /// Free suffix.
    pub tag: Option<String>,
}

impl RefPrefKey {
    /// `refpref{n}{_2b|_3b}_{T}_{B}{mode}{tag}`, with an integral
    /// temperature printed without a fractional part.
    pub fn file_name(&self) -> String {
        let temperature = if self.temperature.fract() == 0.0 && self.temperature.abs() < 1e15 {
            format!("{}", self.temperature as i64)
        } else {
            format!("{}", self.temperature)
        };
        format!(
            "refpref{}{}_{}_{}{}{}",
            self.points,
            self.additivity.suffix(),
            temperature,
            self.beads,
            self.mode.suffix(),
            self.tag.as_deref().unwrap_or("")
        )
    }

    /// File path under `directory`.
    pub fn path(&self, directory: &Path) -> PathBuf {
        directory.join(self.file_name())
    }
}

/// Calibration state worth reusing: the reference weight alpha and,
/// optionally, the reference fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefPref {
    /// Bennett reference weight.
    pub alpha: f64,
    /// Reference fraction at the end of the run that wrote the file.
    pub fraction: Option<f64>,
}

impl RefPref {
    fn parse(text: &str) -> Option<Self> {
        let line = text.lines().next()?;
        let mut fields = line.split_whitespace();
        let alpha: f64 = fields.next()?.parse().ok()?;
        if !(alpha.is_finite() && alpha > 0.0) {
            return None;
        }
        let fraction = match fields.next() {
            Some(field) => {
                let p: f64 = field.parse().ok()?;
                if !(p > 0.0 && p < 1.0) {
                    return None;
                }
                Some(p)
            }
            None => None,
        };
        Some(Self { alpha, fraction })
    }

    /// Reads a refpref file. A missing file is `None`; an unreadable or
    /// malformed one is `None` with a warning, so the caller recalibrates.
    pub fn load(path: &Path) -> Option<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("ignoring unreadable refpref {}: {}", path.display(), err);
                return None;
            }
        };
        let parsed = Self::parse(&text);
        if parsed.is_none() {
            tracing::warn!("ignoring malformed refpref {}", path.display());
        }
        parsed
    }

    /// Writes the one-line `alpha [fraction]` file.
    pub fn store(&self, path: &Path) -> Result<(), VirialError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                VirialError::Checkpoint(
                    ErrorInfo::new("refpref-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let line = match self.fraction {
            Some(p) => format!("{} {}\n", self.alpha, p),
            None => format!("{}\n", self.alpha),
        };
        fs::write(path, line).map_err(|err| {
            VirialError::Checkpoint(
                ErrorInfo::new("refpref-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}
