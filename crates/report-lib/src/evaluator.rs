//! Utilization band classification and savings estimation
//!
//! Turns the six raw series of a [`MetricSample`] into an
//! [`EvaluationResult`]. A family is flagged when either its CPU or memory
//! utilization ratio (average utilized over average reserved) leaves the
//! acceptable band.
//!
//! Savings per axis:
//!
//! ```text
//! ratio < lower:  reserved * (1 - ratio / lower)
//! ratio > upper:  reserved * (1 - ratio / upper)   // negative, over-utilized
//! otherwise:      0
//! ```

use crate::models::{EvaluationResult, MetricSample, MetricSeries, Resource};
use serde::Serialize;

/// Lower bound of the acceptable utilization ratio
pub const BAND_LOWER: f64 = 0.5;

/// Upper bound of the acceptable utilization ratio
pub const BAND_UPPER: f64 = 0.8;

/// Reasons a sample cannot be evaluated.
///
/// These are per-family data anomalies: the family is left out of the
/// report and the batch carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleDefect {
    #[error("no datapoint for {0}")]
    MissingMetric(MetricSeries),

    #[error("{0} value {1} is negative or not finite")]
    InvalidValue(MetricSeries, f64),

    #[error("{0} reserved average is zero")]
    ZeroReserved(Resource),
}

impl SampleDefect {
    /// Short label used for metric labels and log fields
    pub fn reason(&self) -> &'static str {
        match self {
            SampleDefect::MissingMetric(_) => "missing_metric",
            SampleDefect::InvalidValue(..) => "invalid_value",
            SampleDefect::ZeroReserved(_) => "zero_reserved",
        }
    }
}

/// Acceptable utilization ratio range, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtilizationBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for UtilizationBand {
    fn default() -> Self {
        Self {
            lower: BAND_LOWER,
            upper: BAND_UPPER,
        }
    }
}

impl UtilizationBand {
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.lower && ratio <= self.upper
    }

    /// Signed savings for a ratio against a reservation
    pub fn savings(&self, ratio: f64, reserved: f64) -> f64 {
        if ratio < self.lower {
            reserved * (1.0 - (ratio / self.lower))
        } else if ratio > self.upper {
            reserved * (1.0 - (ratio / self.upper))
        } else {
            0.0
        }
    }
}

/// Ratio and savings for a single resource axis
#[derive(Debug, Clone, Copy)]
struct AxisAssessment {
    ratio: f64,
    savings: f64,
    out_of_band: bool,
}

/// Pure evaluator over metric samples
#[derive(Debug, Clone, Default)]
pub struct SavingsEvaluator {
    band: UtilizationBand,
}

impl SavingsEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_band(band: UtilizationBand) -> Self {
        Self { band }
    }

    pub fn band(&self) -> UtilizationBand {
        self.band
    }

    /// Evaluate a sample, returning `None` when it is unusable
    pub fn evaluate(&self, sample: &MetricSample) -> Option<EvaluationResult> {
        self.classify(sample).ok()
    }

    /// Evaluate a sample, reporting why it was unusable
    pub fn classify(&self, sample: &MetricSample) -> Result<EvaluationResult, SampleDefect> {
        let mut values = [0.0_f64; 6];
        for (slot, series) in values.iter_mut().zip(MetricSeries::ALL) {
            *slot = sample
                .value(series)
                .ok_or(SampleDefect::MissingMetric(series))?;
        }
        for (value, series) in values.iter().zip(MetricSeries::ALL) {
            if !value.is_finite() || *value < 0.0 {
                return Err(SampleDefect::InvalidValue(series, *value));
            }
        }

        let [cpu_util_avg, cpu_util_max, cpu_reserved, mem_util_avg, mem_util_max, mem_reserved] =
            values;

        let cpu = self.assess(cpu_util_avg, cpu_reserved, Resource::Cpu)?;
        let mem = self.assess(mem_util_avg, mem_reserved, Resource::Memory)?;

        Ok(EvaluationResult {
            cluster: sample.cluster.clone(),
            task_family: sample.task_family.clone(),
            cpu_utilized_avg: cpu_util_avg,
            cpu_utilized_max: cpu_util_max,
            cpu_reserved_avg: cpu_reserved,
            mem_utilized_avg: mem_util_avg,
            mem_utilized_max: mem_util_max,
            mem_reserved_avg: mem_reserved,
            cpu_ratio: cpu.ratio,
            mem_ratio: mem.ratio,
            cpu_savings: cpu.savings,
            mem_savings: mem.savings,
            total_savings: cpu.savings + mem.savings,
            flagged: cpu.out_of_band || mem.out_of_band,
        })
    }

    fn assess(
        &self,
        utilized: f64,
        reserved: f64,
        resource: Resource,
    ) -> Result<AxisAssessment, SampleDefect> {
        if reserved == 0.0 {
            return Err(SampleDefect::ZeroReserved(resource));
        }
        let ratio = utilized / reserved;
        Ok(AxisAssessment {
            ratio,
            savings: self.band.savings(ratio, reserved),
            out_of_band: !self.band.contains(ratio),
        })
    }
}
