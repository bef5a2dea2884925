//! Core data models for the utilization report

use serde::{Deserialize, Serialize};

/// Resource axis a ratio or saving applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Cpu => write!(f, "cpu"),
            Resource::Memory => write!(f, "memory"),
        }
    }
}

/// CloudWatch statistic requested for a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Maximum,
}

/// The six CloudWatch series read for every task family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSeries {
    CpuUtilizedAvg,
    CpuUtilizedMax,
    CpuReservedAvg,
    MemUtilizedAvg,
    MemUtilizedMax,
    MemReservedAvg,
}

impl MetricSeries {
    /// All series in fetch order
    pub const ALL: [MetricSeries; 6] = [
        MetricSeries::CpuUtilizedAvg,
        MetricSeries::CpuUtilizedMax,
        MetricSeries::CpuReservedAvg,
        MetricSeries::MemUtilizedAvg,
        MetricSeries::MemUtilizedMax,
        MetricSeries::MemReservedAvg,
    ];

    /// Container Insights metric name backing this series
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricSeries::CpuUtilizedAvg | MetricSeries::CpuUtilizedMax => "CpuUtilized",
            MetricSeries::CpuReservedAvg => "CpuReserved",
            MetricSeries::MemUtilizedAvg | MetricSeries::MemUtilizedMax => "MemoryUtilized",
            MetricSeries::MemReservedAvg => "MemoryReserved",
        }
    }

    pub fn statistic(&self) -> Statistic {
        match self {
            MetricSeries::CpuUtilizedMax | MetricSeries::MemUtilizedMax => Statistic::Maximum,
            _ => Statistic::Average,
        }
    }
}

impl std::fmt::Display for MetricSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stat = match self.statistic() {
            Statistic::Average => "Average",
            Statistic::Maximum => "Maximum",
        };
        write!(f, "{}/{}", self.metric_name(), stat)
    }
}

/// Utilization values read for one task family on one cluster.
///
/// Any field may be absent when CloudWatch returned no datapoint for the
/// window; such a sample is not usable for evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub cluster: String,
    pub task_family: String,
    pub cpu_utilized_avg: Option<f64>,
    pub cpu_utilized_max: Option<f64>,
    pub cpu_reserved_avg: Option<f64>,
    pub mem_utilized_avg: Option<f64>,
    pub mem_utilized_max: Option<f64>,
    pub mem_reserved_avg: Option<f64>,
}

impl MetricSample {
    pub fn new(cluster: impl Into<String>, task_family: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            task_family: task_family.into(),
            ..Default::default()
        }
    }

    pub fn value(&self, series: MetricSeries) -> Option<f64> {
        match series {
            MetricSeries::CpuUtilizedAvg => self.cpu_utilized_avg,
            MetricSeries::CpuUtilizedMax => self.cpu_utilized_max,
            MetricSeries::CpuReservedAvg => self.cpu_reserved_avg,
            MetricSeries::MemUtilizedAvg => self.mem_utilized_avg,
            MetricSeries::MemUtilizedMax => self.mem_utilized_max,
            MetricSeries::MemReservedAvg => self.mem_reserved_avg,
        }
    }

    pub fn set(&mut self, series: MetricSeries, value: Option<f64>) {
        let slot = match series {
            MetricSeries::CpuUtilizedAvg => &mut self.cpu_utilized_avg,
            MetricSeries::CpuUtilizedMax => &mut self.cpu_utilized_max,
            MetricSeries::CpuReservedAvg => &mut self.cpu_reserved_avg,
            MetricSeries::MemUtilizedAvg => &mut self.mem_utilized_avg,
            MetricSeries::MemUtilizedMax => &mut self.mem_utilized_max,
            MetricSeries::MemReservedAvg => &mut self.mem_reserved_avg,
        };
        *slot = value;
    }

    /// Builder-style setter used by callers assembling samples by hand
    pub fn with(mut self, series: MetricSeries, value: f64) -> Self {
        self.set(series, Some(value));
        self
    }
}

/// Classification and savings estimate for one usable sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub cluster: String,
    pub task_family: String,
    pub cpu_utilized_avg: f64,
    pub cpu_utilized_max: f64,
    pub cpu_reserved_avg: f64,
    pub mem_utilized_avg: f64,
    pub mem_utilized_max: f64,
    pub mem_reserved_avg: f64,
    pub cpu_ratio: f64,
    pub mem_ratio: f64,
    /// Negative when utilization is above the band
    pub cpu_savings: f64,
    pub mem_savings: f64,
    pub total_savings: f64,
    pub flagged: bool,
}
