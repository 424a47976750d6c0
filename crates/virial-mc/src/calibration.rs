//! Equilibration with step tuning, then the search for Bennett's alpha.

use serde::{Deserialize, Serialize};
use virial_core::{ErrorInfo, VirialError};

use crate::config::CalibrationConfig;
use crate::ensemble::EnsembleKind;
use crate::overlap::{OverlapController, StopHandle};

/// Where the root of `ln(<OS_r>/<OS_t>) - ln(alpha)` lies on a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "alpha", rename_all = "kebab-case")]
pub enum AlphaRoot {
    /// Bracketed inside the scan, interpolated in `ln(alpha)`.
    Interior(f64),
    /// Every alpha was too large; the root lies below the lowest.
    BelowRange(f64),
    /// Every alpha was too small; the root lies above the highest.
    AboveRange(f64),
}

impl AlphaRoot {
    /// Best alpha this scan supports.
    pub fn alpha(&self) -> f64 {
        match *self {
            AlphaRoot::Interior(a) | AlphaRoot::BelowRange(a) | AlphaRoot::AboveRange(a) => a,
        }
    }
}

/// How calibration settled alpha.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    /// Alpha used for production.
    pub alpha: f64,
    /// True when alpha came from a refpref checkpoint.
    pub from_checkpoint: bool,
    /// Coarse scans run before refinement.
    pub rounds: usize,
    /// True when a stop request cut calibration short; `alpha` is then the
    /// starting guess rather than a calibrated value.
    pub stopped: bool,
}

/// `count` alphas log-spaced over `[center / span, center * span]`. A single
/// alpha is the centre itself.
pub fn alpha_grid(center: f64, span: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![center];
    }
    let last = (count - 1) as f64;
    (0..count)
        .map(|i| center * span.powf(2.0 * i as f64 / last - 1.0))
        .collect()
}

/// Root of `g(alpha) = ln(r/t) - ln(alpha)` over a scan, where `r` and `t`
/// are the mean overlap functions of the two ensembles at each alpha.
/// Alphas whose means are not both positive are skipped.
pub fn locate_alpha(reference: &[f64], target: &[f64], alphas: &[f64]) -> Option<AlphaRoot> {
    let points: Vec<(f64, f64)> = alphas
        .iter()
        .zip(reference.iter().zip(target))
        .filter(|(_, (r, t))| **r > 0.0 && **t > 0.0 && r.is_finite() && t.is_finite())
        .map(|(a, (r, t))| (a.ln(), (r / t).ln() - a.ln()))
        .collect();
    let (first, last) = (points.first()?, points.last()?);
    if points.len() == 1 {
        return Some(AlphaRoot::Interior((first.0 + first.1).exp()));
    }
    if first.1 < 0.0 {
        return Some(AlphaRoot::BelowRange(first.0.exp()));
    }
    if last.1 > 0.0 {
        return Some(AlphaRoot::AboveRange(last.0.exp()));
    }
    for pair in points.windows(2) {
        let ((x0, g0), (x1, g1)) = (pair[0], pair[1]);
        if g0 >= 0.0 && g1 <= 0.0 {
            let x = if g0 == g1 { x0 } else { x0 + g0 * (x1 - x0) / (g0 - g1) };
            return Some(AlphaRoot::Interior(x.exp()));
        }
    }
    Some(AlphaRoot::Interior(last.0.exp()))
}

/// Alternates the two ensembles for `cycles` macro cycles each. Returns
/// false when `stop` cut the run short.
fn alternate(
    controller: &mut OverlapController,
    cycles: u64,
    stop: &StopHandle,
) -> Result<bool, VirialError> {
    for _ in 0..cycles {
        if stop.is_stop_requested() {
            return Ok(false);
        }
        controller.advance(EnsembleKind::Reference)?;
        controller.advance(EnsembleKind::Target)?;
    }
    Ok(true)
}

/// Equal-allocation run with step tuning, then discards the statistics.
/// Returns false when `stop` cut the run short.
pub fn equilibrate(
    controller: &mut OverlapController,
    cycles: u64,
    stop: &StopHandle,
) -> Result<bool, VirialError> {
    tracing::info!("equilibrating both ensembles for {} cycles each", cycles);
    if !alternate(controller, cycles, stop)? {
        tracing::info!("stop requested during equilibration");
        controller.reset_statistics();
        return Ok(false);
    }
    controller.check_overlap()?;
    for kind in [EnsembleKind::Reference, EnsembleKind::Target] {
        tracing::debug!(
            "{} acceptance after equilibration {:?}",
            kind.as_str(),
            controller.ensemble(kind).acceptance_rates()
        );
    }
    controller.reset_statistics();
    Ok(true)
}

fn scan(
    controller: &mut OverlapController,
    alphas: Vec<f64>,
    cycles: u64,
    stop: &StopHandle,
) -> Result<Option<AlphaRoot>, VirialError> {
    controller.set_alphas(alphas)?;
    if !alternate(controller, cycles, stop)? {
        return Ok(None);
    }
    controller.check_overlap()?;
    let reference = controller.overlap_means(EnsembleKind::Reference);
    let target = controller.overlap_means(EnsembleKind::Target);
    let root = locate_alpha(&reference, &target, controller.alphas()).ok_or_else(|| {
        VirialError::DegenerateSampling(
            ErrorInfo::new("alpha-not-finite", "no alpha with positive overlap on both sides")
                .with_context("alphas", format!("{:?}", controller.alphas())),
        )
    })?;
    tracing::debug!("alpha scan {:?} -> {:?}", controller.alphas(), root);
    Ok(Some(root))
}

/// Scans alpha grids until the root is bracketed, recentring on the edge
/// the root lies beyond, then refines once with the narrower span. Returns
/// the alpha and the number of coarse rounds, or `None` when `stop` was
/// raised before the search finished.
pub fn search_alpha(
    controller: &mut OverlapController,
    settings: &CalibrationConfig,
    cycles: u64,
    stop: &StopHandle,
) -> Result<Option<(f64, usize)>, VirialError> {
    let mut center = settings.alpha_center;
    let mut rounds = 0;
    loop {
        rounds += 1;
        let grid = alpha_grid(center, settings.alpha_span, settings.alpha_count);
        let Some(root) = scan(controller, grid, cycles, stop)? else {
            tracing::info!("stop requested during alpha scan {}", rounds);
            return Ok(None);
        };
        center = root.alpha();
        match root {
            AlphaRoot::Interior(_) => break,
            _ if rounds >= settings.max_alpha_rounds.max(1) => {
                tracing::warn!("alpha root still outside the scan after {} rounds", rounds);
                break;
            }
            _ => tracing::info!("alpha root beyond scan edge, recentring on {:.6e}", center),
        }
    }
    let grid = alpha_grid(center, settings.refine_span, settings.alpha_count);
    let Some(refined) = scan(controller, grid, cycles, stop)? else {
        tracing::info!("stop requested during alpha refinement");
        return Ok(None);
    };
    let alpha = refined.alpha();
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(VirialError::DegenerateSampling(
            ErrorInfo::new("alpha-not-finite", "alpha search produced a non-finite value")
                .with_context("alpha", alpha.to_string()),
        ));
    }
    tracing::info!("alpha settled at {:.6e} after {} rounds", alpha, rounds);
    Ok(Some((alpha, rounds)))
}
