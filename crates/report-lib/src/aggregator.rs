//! Ranking of evaluation results into the report table

use serde::Serialize;

use crate::models::EvaluationResult;

/// Flagged results ordered by total savings, largest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportTable {
    rows: Vec<EvaluationResult>,
}

impl ReportTable {
    pub fn rows(&self) -> &[EvaluationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.rows.iter()
    }

    /// Sum of the signed totals across all rows
    pub fn total_savings(&self) -> f64 {
        self.rows.iter().map(|r| r.total_savings).sum()
    }
}

/// Keep flagged results and rank them by total savings, descending.
///
/// The sort is stable, so results with equal totals keep their input order.
pub fn aggregate(results: impl IntoIterator<Item = EvaluationResult>) -> ReportTable {
    let mut rows: Vec<EvaluationResult> = results.into_iter().filter(|r| r.flagged).collect();
    rows.sort_by(|a, b| b.total_savings.total_cmp(&a.total_savings));
    ReportTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(family: &str, total: f64, flagged: bool) -> EvaluationResult {
        EvaluationResult {
            cluster: "prod".to_string(),
            task_family: family.to_string(),
            cpu_utilized_avg: 10.0,
            cpu_utilized_max: 20.0,
            cpu_reserved_avg: 100.0,
            mem_utilized_avg: 100.0,
            mem_utilized_max: 200.0,
            mem_reserved_avg: 512.0,
            cpu_ratio: 0.1,
            mem_ratio: 0.2,
            cpu_savings: total,
            mem_savings: 0.0,
            total_savings: total,
            flagged,
        }
    }

    fn families(table: &ReportTable) -> Vec<&str> {
        table.iter().map(|r| r.task_family.as_str()).collect()
    }

    #[test]
    fn test_orders_by_total_descending() {
        let table = aggregate(vec![result("a", 40.0, true), result("b", 55.0, true)]);
        assert_eq!(families(&table), vec!["b", "a"]);
    }

    #[test]
    fn test_excludes_unflagged() {
        let table = aggregate(vec![
            result("a", 0.0, false),
            result("b", 10.0, true),
            result("c", 99.0, false),
        ]);
        assert_eq!(families(&table), vec!["b"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let table = aggregate(vec![
            result("first", 25.0, true),
            result("top", 80.0, true),
            result("second", 25.0, true),
            result("third", 25.0, true),
        ]);
        assert_eq!(families(&table), vec!["top", "first", "second", "third"]);
    }

    #[test]
    fn test_negative_totals_rank_last() {
        let table = aggregate(vec![
            result("over", -12.5, true),
            result("under", 40.0, true),
            result("zero", 0.0, true),
        ]);
        assert_eq!(families(&table), vec!["under", "zero", "over"]);
        assert!((table.total_savings() - 27.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let table = aggregate(Vec::new());
        assert!(table.is_empty());
        assert_eq!(table.total_savings(), 0.0);
    }
}
