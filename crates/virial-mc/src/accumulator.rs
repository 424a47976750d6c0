//! Blocked running statistics of vector samples.
//!
//! Samples are grouped into blocks of a fixed size; block means are treated
//! as independent draws. Each completed block updates a Welford grand mean,
//! the co-moment matrix of block means and the lag-one sums needed for the
//! block autocorrelation. Sums over every sample give the all-sample mean.

use serde::{Deserialize, Serialize};
use virial_core::{ErrorInfo, VirialError};

/// Running block statistics of samples of a fixed dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAccumulator {
    dimension: usize,
    block_size: u64,
    block_sum: Vec<f64>,
    block_count: u64,
    blocks: u64,
    block_mean: Vec<f64>,
    comoment: Vec<f64>,
    first_block: Option<Vec<f64>>,
    last_block: Option<Vec<f64>>,
    lag_products: Vec<f64>,
    total_sum: Vec<f64>,
    samples: u64,
}

impl BlockAccumulator {
    /// Empty accumulator.
    pub fn new(dimension: usize, block_size: u64) -> Result<Self, VirialError> {
        if dimension == 0 || block_size == 0 {
            return Err(VirialError::Configuration(
                ErrorInfo::new("accumulator-shape", "accumulator needs a dimension and a block size")
                    .with_context("dimension", dimension.to_string())
                    .with_context("block_size", block_size.to_string()),
            ));
        }
        Ok(Self {
            dimension,
            block_size,
            block_sum: vec![0.0; dimension],
            block_count: 0,
            blocks: 0,
            block_mean: vec![0.0; dimension],
            comoment: vec![0.0; dimension * dimension],
            first_block: None,
            last_block: None,
            lag_products: vec![0.0; dimension],
            total_sum: vec![0.0; dimension],
            samples: 0,
        })
    }

    /// Sample dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Samples per block.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Samples pushed since the last reset.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Completed blocks.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Adds one sample.
    pub fn push(&mut self, sample: &[f64]) -> Result<(), VirialError> {
        if sample.len() != self.dimension {
            return Err(VirialError::Configuration(
                ErrorInfo::new("sample-dimension", "sample length differs from accumulator dimension")
                    .with_context("expected", self.dimension.to_string())
                    .with_context("found", sample.len().to_string()),
            ));
        }
        for (i, &x) in sample.iter().enumerate() {
            self.block_sum[i] += x;
            self.total_sum[i] += x;
        }
        self.samples += 1;
        self.block_count += 1;
        if self.block_count == self.block_size {
            self.close_block(self.block_size);
        }
        Ok(())
    }

    fn close_block(&mut self, count: u64) {
        let means: Vec<f64> = self.block_sum.iter().map(|s| s / count as f64).collect();
        self.absorb_block(&means);
        self.block_sum.iter_mut().for_each(|s| *s = 0.0);
        self.block_count = 0;
    }

    fn absorb_block(&mut self, means: &[f64]) {
        let d = self.dimension;
        self.blocks += 1;
        let n = self.blocks as f64;
        let delta: Vec<f64> = (0..d).map(|i| means[i] - self.block_mean[i]).collect();
        for i in 0..d {
            self.block_mean[i] += delta[i] / n;
        }
        for i in 0..d {
            for j in 0..d {
                self.comoment[i * d + j] += delta[i] * (means[j] - self.block_mean[j]);
            }
        }
        if let Some(last) = &self.last_block {
            for i in 0..d {
                self.lag_products[i] += last[i] * means[i];
            }
        }
        if self.first_block.is_none() {
            self.first_block = Some(means.to_vec());
        }
        self.last_block = Some(means.to_vec());
    }

    /// Mean over every sample, including those of an incomplete block.
    pub fn mean(&self) -> Vec<f64> {
        let n = self.samples as f64;
        self.total_sum.iter().map(|s| s / n).collect()
    }

    /// Mean of the completed block means.
    pub fn block_mean(&self) -> Vec<f64> {
        if self.blocks == 0 {
            return vec![f64::NAN; self.dimension];
        }
        self.block_mean.clone()
    }

    /// Covariance matrix of block means. NaN with fewer than two blocks.
    pub fn covariance(&self) -> Vec<Vec<f64>> {
        let d = self.dimension;
        if self.blocks < 2 {
            return vec![vec![f64::NAN; d]; d];
        }
        let denom = (self.blocks - 1) as f64;
        (0..d)
            .map(|i| (0..d).map(|j| self.comoment[i * d + j] / denom).collect())
            .collect()
    }

    /// Covariance matrix of the grand mean, block covariance over block count.
    pub fn mean_covariance(&self) -> Vec<Vec<f64>> {
        let n = self.blocks as f64;
        self.covariance()
            .into_iter()
            .map(|row| row.into_iter().map(|c| c / n).collect())
            .collect()
    }

    /// Standard error of each component, with block means as the unit of
    /// independence.
    pub fn std_error(&self) -> Vec<f64> {
        let cov = self.mean_covariance();
        (0..self.dimension).map(|i| cov[i][i].max(0.0).sqrt()).collect()
    }

    /// Correlation matrix of block means. A zero-variance component
    /// correlates as 0.
    pub fn correlation(&self) -> Vec<Vec<f64>> {
        let cov = self.covariance();
        let d = self.dimension;
        (0..d)
            .map(|i| {
                (0..d)
                    .map(|j| {
                        let denom = (cov[i][i] * cov[j][j]).sqrt();
                        if denom == 0.0 {
                            0.0
                        } else {
                            cov[i][j] / denom
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Lag-one autocorrelation of the block means of each component. NaN
    /// with fewer than three blocks, 0 for a constant component.
    pub fn block_correlation(&self) -> Vec<f64> {
        let d = self.dimension;
        let (first, last) = match (&self.first_block, &self.last_block) {
            (Some(first), Some(last)) if self.blocks >= 3 => (first, last),
            _ => return vec![f64::NAN; d],
        };
        let n = self.blocks as f64;
        (0..d)
            .map(|i| {
                let mean = self.block_mean[i];
                let head = n * mean - last[i];
                let tail = n * mean - first[i];
                let numerator =
                    self.lag_products[i] - mean * (head + tail) + (n - 1.0) * mean * mean;
                let variance = self.comoment[i * d + i];
                if variance == 0.0 {
                    0.0
                } else {
                    numerator / variance
                }
            })
            .collect()
    }

    /// Ratio `mean[numerator] / mean[denominator]` and its first-order
    /// propagated standard error.
    pub fn ratio_error(&self, numerator: usize, denominator: usize) -> (f64, f64) {
        let mean = self.mean();
        let cov = self.mean_covariance();
        let (a, b) = (mean[numerator], mean[denominator]);
        let ratio = a / b;
        let relative = cov[numerator][numerator] / (a * a)
            + cov[denominator][denominator] / (b * b)
            - 2.0 * cov[numerator][denominator] / (a * b);
        (ratio, ratio.abs() * relative.max(0.0).sqrt())
    }

    /// Folds another accumulator of the same shape into this one. Completed
    /// blocks combine exactly; the two trailing partial blocks are pooled.
    /// When the pool reaches a full block, exactly `block_size` samples'
    /// share of the pooled sums closes a block and the rest stays partial,
    /// so every completed block carries the same weight.
    pub fn merge(&mut self, other: &BlockAccumulator) -> Result<(), VirialError> {
        if other.dimension != self.dimension || other.block_size != self.block_size {
            return Err(VirialError::Configuration(
                ErrorInfo::new("accumulator-merge", "accumulators differ in shape")
                    .with_context("dimension", format!("{} vs {}", self.dimension, other.dimension))
                    .with_context(
                        "block_size",
                        format!("{} vs {}", self.block_size, other.block_size),
                    ),
            ));
        }
        let d = self.dimension;
        if other.blocks > 0 {
            if self.blocks == 0 {
                self.blocks = other.blocks;
                self.block_mean = other.block_mean.clone();
                self.comoment = other.comoment.clone();
                self.lag_products = other.lag_products.clone();
                self.first_block = other.first_block.clone();
            } else {
                let na = self.blocks as f64;
                let nb = other.blocks as f64;
                let n = na + nb;
                let delta: Vec<f64> = (0..d)
                    .map(|i| other.block_mean[i] - self.block_mean[i])
                    .collect();
                for i in 0..d {
                    for j in 0..d {
                        self.comoment[i * d + j] +=
                            other.comoment[i * d + j] + delta[i] * delta[j] * na * nb / n;
                    }
                }
                for i in 0..d {
                    self.block_mean[i] += delta[i] * nb / n;
                }
                if let (Some(last), Some(first)) = (&self.last_block, &other.first_block) {
                    for i in 0..d {
                        self.lag_products[i] += last[i] * first[i] + other.lag_products[i];
                    }
                }
                self.blocks += other.blocks;
            }
            self.last_block = other.last_block.clone();
        }
        for i in 0..d {
            self.total_sum[i] += other.total_sum[i];
            self.block_sum[i] += other.block_sum[i];
        }
        self.samples += other.samples;
        self.block_count += other.block_count;
        if self.block_count >= self.block_size {
            let carried = self.block_count - self.block_size;
            let share = carried as f64 / self.block_count as f64;
            let remainder: Vec<f64> = self.block_sum.iter().map(|s| s * share).collect();
            for (sum, rest) in self.block_sum.iter_mut().zip(&remainder) {
                *sum -= rest;
            }
            self.close_block(self.block_size);
            self.block_sum = remainder;
            self.block_count = carried;
        }
        Ok(())
    }

    /// Discards every sample.
    pub fn reset(&mut self) {
        let d = self.dimension;
        self.block_sum = vec![0.0; d];
        self.block_count = 0;
        self.blocks = 0;
        self.block_mean = vec![0.0; d];
        self.comoment = vec![0.0; d * d];
        self.first_block = None;
        self.last_block = None;
        self.lag_products = vec![0.0; d];
        self.total_sum = vec![0.0; d];
        self.samples = 0;
    }
}
