use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use virial_core::{ErrorInfo, VirialError};

use crate::checkpoint::DiscretizationMode;
use crate::moves::MoveKind;
use crate::overlap::MICRO_STEPS;

/// YAML-configurable parameters governing an overlap-sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Micro-steps of the production run, summed over both ensembles. Must be
    /// a multiple of the 1000-step macro cycle.
    pub steps: u64,
    /// Samples per accumulator block.
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    /// Temperature in the energy units of the potentials; `beta = 1 / T`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Beads per molecule. One is a classical molecule.
    #[serde(default = "default_beads")]
    pub beads: usize,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Move frequencies, initial step sizes and bounds.
    #[serde(default)]
    pub moves: MoveConfig,
    /// Step-size tuning during equilibration.
    #[serde(default)]
    pub tuning: TuningConfig,
    /// Allocation between the two ensembles.
    #[serde(default)]
    pub overlap: OverlapConfig,
    /// Equilibration and alpha search.
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// refpref checkpoint behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Ring-polymer parameters, used when `beads > 1`.
    #[serde(default)]
    pub ring: RingConfig,
    /// Optional target-ensemble distance histogram.
    #[serde(default)]
    pub histogram: HistogramConfig,
    /// Number of beta derivatives of the target cluster to record.
    #[serde(default)]
    pub derivative_order: usize,
    /// Macro cycles between progress lines.
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_block_size() -> u64 {
    1000
}

fn default_temperature() -> f64 {
    1.0
}

fn default_beads() -> usize {
    1
}

fn default_report_interval() -> u64 {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: 100_000,
            block_size: default_block_size(),
            temperature: default_temperature(),
            beads: default_beads(),
            seed_policy: SeedPolicy::default(),
            moves: MoveConfig::default(),
            tuning: TuningConfig::default(),
            overlap: OverlapConfig::default(),
            calibration: CalibrationConfig::default(),
            checkpoint: CheckpointConfig::default(),
            ring: RingConfig::default(),
            histogram: HistogramConfig::default(),
            derivative_order: 0,
            report_interval: default_report_interval(),
            output: OutputConfig::default(),
        }
    }
}

fn invalid(code: &str, message: &str, key: &str, value: impl ToString) -> VirialError {
    VirialError::Configuration(
        ErrorInfo::new(code, message).with_context(key, value.to_string()),
    )
}

impl RunConfig {
    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, VirialError> {
        let config: Self = serde_yaml::from_str(text).map_err(|err| {
            VirialError::Configuration(ErrorInfo::new("config-parse", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file. `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn load(path: &Path) -> Result<Self, VirialError> {
        let text = fs::read_to_string(path).map_err(|err| {
            VirialError::Configuration(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            let config: Self = serde_json::from_str(&text).map_err(|err| {
                VirialError::Configuration(
                    ErrorInfo::new("config-parse", err.to_string())
                        .with_context("path", path.display().to_string()),
                )
            })?;
            config.validate()?;
            Ok(config)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Inverse temperature.
    pub fn beta(&self) -> f64 {
        1.0 / self.temperature
    }

    /// Production macro cycles.
    pub fn cycles(&self) -> u64 {
        self.steps / MICRO_STEPS
    }

    /// Checks parameter combinations that cannot be sampled.
    pub fn validate(&self) -> Result<(), VirialError> {
        if self.steps == 0 || self.steps % MICRO_STEPS != 0 {
            return Err(VirialError::Configuration(
                ErrorInfo::new("steps-granularity", "steps must be a positive multiple of 1000")
                    .with_context("steps", self.steps.to_string())
                    .with_hint("the controller advances ensembles in macro cycles of 1000 steps"),
            ));
        }
        if self.block_size == 0 {
            return Err(invalid("block-size", "block size must be positive", "block_size", 0));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(invalid(
                "temperature",
                "temperature must be positive",
                "temperature",
                self.temperature,
            ));
        }
        if self.beads == 0 {
            return Err(invalid("beads", "molecules need at least one bead", "beads", 0));
        }
        self.moves.validate(self.beads)?;
        self.tuning.validate()?;
        self.overlap.validate()?;
        self.calibration.validate()?;
        if self.beads > 1 {
            self.ring.validate()?;
        }
        if self.histogram.enabled
            && (self.histogram.bins == 0
                || !(self.histogram.max_distance.is_finite() && self.histogram.max_distance > 0.0))
        {
            return Err(invalid(
                "histogram",
                "histogram needs bins and a positive range",
                "bins",
                self.histogram.bins,
            ));
        }
        if self.report_interval == 0 {
            return Err(invalid(
                "report-interval",
                "report interval must be positive",
                "report_interval",
                0,
            ));
        }
        Ok(())
    }
}

/// Frequency, initial step and clamp bounds of one move kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveSetting {
    /// Relative selection frequency. Zero disables the move.
    #[serde(default)]
    pub frequency: f64,
    /// Initial step size.
    pub step: f64,
    /// Smallest step tuning may reach.
    pub min_step: f64,
    /// Largest step tuning may reach.
    pub max_step: f64,
}

/// Per-kind move settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Rigid translation of every molecule except the anchor.
    #[serde(default = "default_translate")]
    pub translate: MoveSetting,
    /// Rigid rotation about each centroid.
    #[serde(default = "default_rotate")]
    pub rotate: MoveSetting,
    /// Exact regrowth of a whole ring.
    #[serde(default = "default_ring_regrow_full")]
    pub ring_regrow_full: MoveSetting,
    /// Rebuild of a ring arc; the step is the arc length in beads.
    #[serde(default = "default_ring_regrow_partial")]
    pub ring_regrow_partial: MoveSetting,
    /// Ring dilation about the centroid.
    #[serde(default = "default_ring_scale")]
    pub ring_scale: MoveSetting,
}

fn default_translate() -> MoveSetting {
    MoveSetting {
        frequency: 1.0,
        step: 1.0,
        min_step: 1e-3,
        max_step: 10.0,
    }
}

fn default_rotate() -> MoveSetting {
    MoveSetting {
        frequency: 0.0,
        step: 0.5,
        min_step: 1e-3,
        max_step: std::f64::consts::PI,
    }
}

fn default_ring_regrow_full() -> MoveSetting {
    MoveSetting {
        frequency: 0.0,
        step: 0.0,
        min_step: 0.0,
        max_step: 0.0,
    }
}

fn default_ring_regrow_partial() -> MoveSetting {
    MoveSetting {
        frequency: 0.0,
        step: 2.0,
        min_step: 1.0,
        max_step: 1.0e6,
    }
}

fn default_ring_scale() -> MoveSetting {
    MoveSetting {
        frequency: 0.0,
        step: 0.1,
        min_step: 1e-3,
        max_step: 2.0,
    }
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            translate: default_translate(),
            rotate: default_rotate(),
            ring_regrow_full: default_ring_regrow_full(),
            ring_regrow_partial: default_ring_regrow_partial(),
            ring_scale: default_ring_scale(),
        }
    }
}

impl MoveConfig {
    /// Settings of `kind`.
    pub fn setting(&self, kind: MoveKind) -> &MoveSetting {
        match kind {
            MoveKind::Translate => &self.translate,
            MoveKind::Rotate => &self.rotate,
            MoveKind::RingRegrowFull => &self.ring_regrow_full,
            MoveKind::RingRegrowPartial => &self.ring_regrow_partial,
            MoveKind::RingScale => &self.ring_scale,
        }
    }

    /// Mutable settings of `kind`.
    pub fn setting_mut(&mut self, kind: MoveKind) -> &mut MoveSetting {
        match kind {
            MoveKind::Translate => &mut self.translate,
            MoveKind::Rotate => &mut self.rotate,
            MoveKind::RingRegrowFull => &mut self.ring_regrow_full,
            MoveKind::RingRegrowPartial => &mut self.ring_regrow_partial,
            MoveKind::RingScale => &mut self.ring_scale,
        }
    }

    /// Move kinds with a positive frequency, in declaration order.
    pub fn enabled(&self) -> Vec<(MoveKind, f64)> {
        MoveKind::ALL
            .iter()
            .map(|&kind| (kind, self.setting(kind).frequency))
            .filter(|(_, frequency)| *frequency > 0.0)
            .collect()
    }

    fn validate(&self, beads: usize) -> Result<(), VirialError> {
        for kind in MoveKind::ALL {
            let setting = self.setting(kind);
            if !(setting.frequency.is_finite() && setting.frequency >= 0.0) {
                return Err(invalid(
                    "move-frequency",
                    "move frequencies must be finite and non-negative",
                    kind.as_str(),
                    setting.frequency,
                ));
            }
            if setting.frequency > 0.0 && kind.is_ring_move() && beads < 2 {
                return Err(VirialError::Configuration(
                    ErrorInfo::new("ring-move-classical", "ring moves need molecules with beads")
                        .with_context("move", kind.as_str())
                        .with_context("beads", beads.to_string())
                        .with_hint("set beads above one or zero the ring move frequencies"),
                ));
            }
            if setting.frequency > 0.0
                && kind.is_tunable()
                && !(setting.min_step > 0.0
                    && setting.min_step <= setting.step
                    && setting.step <= setting.max_step)
            {
                return Err(invalid(
                    "move-step",
                    "step size must lie within positive bounds",
                    kind.as_str(),
                    setting.step,
                ));
            }
        }
        if self.enabled().is_empty() {
            return Err(VirialError::configuration(
                "no-moves",
                "at least one move needs a positive frequency",
            ));
        }
        Ok(())
    }
}

/// Step-size tuning toward a target acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Target acceptance fraction.
    #[serde(default = "default_target_acceptance")]
    pub target_acceptance: f64,
    /// Proposals of one kind between adjustments.
    #[serde(default = "default_tune_interval")]
    pub interval: u64,
    /// Multiplicative adjustment.
    #[serde(default = "default_tune_factor")]
    pub factor: f64,
}

fn default_target_acceptance() -> f64 {
    0.5
}

fn default_tune_interval() -> u64 {
    100
}

fn default_tune_factor() -> f64 {
    1.05
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            target_acceptance: default_target_acceptance(),
            interval: default_tune_interval(),
            factor: default_tune_factor(),
        }
    }
}

impl TuningConfig {
    fn validate(&self) -> Result<(), VirialError> {
        if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
            return Err(invalid(
                "target-acceptance",
                "target acceptance must lie in (0, 1)",
                "target_acceptance",
                self.target_acceptance,
            ));
        }
        if self.interval == 0 || !(self.factor.is_finite() && self.factor > 1.0) {
            return Err(invalid(
                "tuning",
                "tuning needs a positive interval and a factor above one",
                "factor",
                self.factor,
            ));
        }
        Ok(())
    }
}

/// Split of the sampling effort between the reference and target ensembles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Fixed reference fraction. When set, Neyman re-estimation is off.
    #[serde(default)]
    pub reference_fraction: Option<f64>,
    /// Starting reference fraction when not pinned.
    #[serde(default = "default_initial_fraction")]
    pub initial_fraction: f64,
    /// Macro cycles between Neyman re-estimates.
    #[serde(default = "default_adjust_interval")]
    pub adjust_interval: u64,
    /// Lower clamp of the fraction; the upper clamp is `1 - min_fraction`.
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f64,
}

fn default_initial_fraction() -> f64 {
    0.5
}

fn default_adjust_interval() -> u64 {
    10
}

fn default_min_fraction() -> f64 {
    0.001
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            reference_fraction: None,
            initial_fraction: default_initial_fraction(),
            adjust_interval: default_adjust_interval(),
            min_fraction: default_min_fraction(),
        }
    }
}

impl OverlapConfig {
    fn validate(&self) -> Result<(), VirialError> {
        let in_unit = |p: f64| p > 0.0 && p < 1.0;
        if let Some(pinned) = self.reference_fraction {
            if !in_unit(pinned) {
                return Err(invalid(
                    "reference-fraction",
                    "reference fraction must lie in (0, 1)",
                    "reference_fraction",
                    pinned,
                ));
            }
        }
        if !in_unit(self.initial_fraction) {
            return Err(invalid(
                "reference-fraction",
                "initial fraction must lie in (0, 1)",
                "initial_fraction",
                self.initial_fraction,
            ));
        }
        if !(self.min_fraction > 0.0 && self.min_fraction < 0.5) {
            return Err(invalid(
                "min-fraction",
                "minimum fraction must lie in (0, 0.5)",
                "min_fraction",
                self.min_fraction,
            ));
        }
        if self.adjust_interval == 0 {
            return Err(invalid(
                "adjust-interval",
                "adjust interval must be positive",
                "adjust_interval",
                0,
            ));
        }
        Ok(())
    }
}

/// Equilibration and Bennett alpha search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Equilibration micro-steps over both ensembles. Defaults to a tenth of
    /// the production steps.
    #[serde(default)]
    pub equilibration_steps: Option<u64>,
    /// Micro-steps of each alpha scan. Defaults to a twentieth of the
    /// production steps.
    #[serde(default)]
    pub alpha_steps: Option<u64>,
    /// Centre of the first alpha scan.
    #[serde(default = "default_alpha_center")]
    pub alpha_center: f64,
    /// The first scan covers `[center / span, center * span]`.
    #[serde(default = "default_alpha_span")]
    pub alpha_span: f64,
    /// Alphas per scan.
    #[serde(default = "default_alpha_count")]
    pub alpha_count: usize,
    /// Span of the refinement scan.
    #[serde(default = "default_refine_span")]
    pub refine_span: f64,
    /// Rescans allowed while the root sits at a scan edge.
    #[serde(default = "default_max_alpha_rounds")]
    pub max_alpha_rounds: usize,
    /// Unconditional moves tried on a zero-weight initial configuration.
    #[serde(default = "default_init_attempts")]
    pub init_attempts: usize,
}

fn default_alpha_center() -> f64 {
    1.0
}

fn default_alpha_span() -> f64 {
    30.0
}

fn default_alpha_count() -> usize {
    21
}

fn default_refine_span() -> f64 {
    4.0
}

fn default_max_alpha_rounds() -> usize {
    5
}

fn default_init_attempts() -> usize {
    50
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            equilibration_steps: None,
            alpha_steps: None,
            alpha_center: default_alpha_center(),
            alpha_span: default_alpha_span(),
            alpha_count: default_alpha_count(),
            refine_span: default_refine_span(),
            max_alpha_rounds: default_max_alpha_rounds(),
            init_attempts: default_init_attempts(),
        }
    }
}

impl CalibrationConfig {
    /// Equilibration macro cycles per ensemble for a production of `steps`.
    pub fn equilibration_cycles(&self, steps: u64) -> u64 {
        let total = self.equilibration_steps.unwrap_or(steps / 10);
        (total / MICRO_STEPS / 2).max(1)
    }

    /// Alpha-scan macro cycles per ensemble for a production of `steps`.
    pub fn alpha_cycles(&self, steps: u64) -> u64 {
        let total = self.alpha_steps.unwrap_or(steps / 20);
        (total / MICRO_STEPS / 2).max(1)
    }

    fn validate(&self) -> Result<(), VirialError> {
        if !(self.alpha_center.is_finite() && self.alpha_center > 0.0) {
            return Err(invalid(
                "alpha-center",
                "alpha centre must be positive",
                "alpha_center",
                self.alpha_center,
            ));
        }
        if !(self.alpha_span > 1.0 && self.refine_span > 1.0) {
            return Err(invalid(
                "alpha-span",
                "alpha spans must exceed one",
                "alpha_span",
                self.alpha_span,
            ));
        }
        if self.alpha_count == 0 {
            return Err(invalid("alpha-count", "alpha count must be positive", "alpha_count", 0));
        }
        Ok(())
    }
}

/// refpref checkpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding refpref files. `None` disables reading and writing.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Discretization mode recorded in the file name.
    #[serde(default)]
    pub mode: DiscretizationMode,
    /// Free suffix appended to the file name.
    #[serde(default)]
    pub tag: Option<String>,
    /// Skip the alpha scan when a checkpoint provides alpha.
    #[serde(default = "default_reuse_alpha")]
    pub reuse_alpha: bool,
}

fn default_reuse_alpha() -> bool {
    true
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: None,
            mode: DiscretizationMode::default(),
            tag: None,
            reuse_alpha: default_reuse_alpha(),
        }
    }
}

/// Ring-polymer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Thermal de Broglie wavelength. Takes precedence over `mass`.
    #[serde(default)]
    pub wavelength: Option<f64>,
    /// Molecular mass in Dalton; the wavelength then follows from the
    /// temperature in Kelvin.
    #[serde(default)]
    pub mass: Option<f64>,
    /// Candidates per bead in partial regrowth.
    #[serde(default = "default_partial_trials")]
    pub partial_trials: usize,
}

fn default_partial_trials() -> usize {
    4
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            wavelength: None,
            mass: None,
            partial_trials: default_partial_trials(),
        }
    }
}

impl RingConfig {
    fn validate(&self) -> Result<(), VirialError> {
        if self.wavelength.is_none() && self.mass.is_none() {
            return Err(VirialError::Configuration(
                ErrorInfo::new("ring-scale", "ring molecules need a wavelength or a mass")
                    .with_hint("set ring.wavelength or ring.mass"),
            ));
        }
        if self.partial_trials == 0 {
            return Err(invalid(
                "partial-trials",
                "partial regrowth needs at least one trial",
                "partial_trials",
                0,
            ));
        }
        Ok(())
    }
}

/// Histogram of the target ensemble's molecule 0 to molecule 1 distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Record the histogram.
    #[serde(default)]
    pub enabled: bool,
    /// Number of bins.
    #[serde(default = "default_histogram_bins")]
    pub bins: usize,
    /// Upper edge of the last bin.
    #[serde(default = "default_histogram_range")]
    pub max_distance: f64,
}

fn default_histogram_bins() -> usize {
    100
}

fn default_histogram_range() -> f64 {
    5.0
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bins: default_histogram_bins(),
            max_distance: default_histogram_range(),
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in the manifest.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Nothing is written when unset.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
    /// Histogram filename relative to `run_directory`.
    #[serde(default = "default_histogram_filename")]
    pub histogram_file: PathBuf,
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_histogram_filename() -> PathBuf {
    PathBuf::from("histogram.csv")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            manifest_file: default_manifest_filename(),
            histogram_file: default_histogram_filename(),
        }
    }
}
