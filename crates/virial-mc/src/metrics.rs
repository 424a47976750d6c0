use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use virial_core::{ErrorInfo, VirialError};

/// One normalized histogram bin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistogramBin {
    /// Bin centre.
    pub center: f64,
    /// Fraction of samples in the bin divided by the bin width.
    pub density: f64,
}

/// Fixed-range histogram of a scalar observable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Histogram {
    max: f64,
    counts: Vec<u64>,
    total: u64,
    overflow: u64,
}

impl Histogram {
    /// `bins` equal bins over `[0, max)`.
    pub fn new(bins: usize, max: f64) -> Self {
        Self {
            max,
            counts: vec![0; bins.max(1)],
            total: 0,
            overflow: 0,
        }
    }

    /// Records one value. Values outside the range only count toward the
    /// normalization.
    pub fn push(&mut self, x: f64) {
        self.total += 1;
        if !(x >= 0.0 && x < self.max) {
            self.overflow += 1;
            return;
        }
        let width = self.max / self.counts.len() as f64;
        let index = ((x / width) as usize).min(self.counts.len() - 1);
        self.counts[index] += 1;
    }

    /// Values recorded, in range or not.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Values that fell outside the range.
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Normalized bins.
    pub fn bins(&self) -> Vec<HistogramBin> {
        let width = self.max / self.counts.len() as f64;
        let norm = (self.total.max(1) as f64) * width;
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &count)| HistogramBin {
                center: (i as f64 + 0.5) * width,
                density: count as f64 / norm,
            })
            .collect()
    }

    /// Clears every count.
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
        self.overflow = 0;
    }

    /// Writes `center,density` rows to a CSV file.
    pub fn write_csv(&self, path: &Path) -> Result<(), VirialError> {
        let io_err = |err: std::io::Error| {
            VirialError::Checkpoint(
                ErrorInfo::new("histogram-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        };
        let mut file = File::create(path).map_err(io_err)?;
        writeln!(file, "center,density").map_err(io_err)?;
        for bin in self.bins() {
            writeln!(file, "{},{}", bin.center, bin.density).map_err(io_err)?;
        }
        Ok(())
    }
}
