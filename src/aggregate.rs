//! Reduces per-candidate validation reports into the summary that drives
//! the iteration policy and the determinism hash.

use crate::schema::{CheckName, TopCandidate, ValidationReport, ValidationSummary};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Acceptance is recomputed here from the threshold; the reports' own
/// `accept` flags are ignored so a drifting validator cannot skew counts.
pub fn aggregate_reports(
    reports: &[ValidationReport],
    truth_accept_threshold: f64,
) -> ValidationSummary {
    let mut truth_scores = BTreeMap::new();
    let mut failure_histogram: BTreeMap<String, u32> = CheckName::ALL
        .iter()
        .map(|name| (name.as_str().to_string(), 0))
        .collect();
    let mut accepted = 0;

    for report in reports {
        truth_scores.insert(report.candidate_id.clone(), report.truth_score);
        if report.truth_score >= truth_accept_threshold {
            accepted += 1;
        }
        for check in &report.checks {
            if !check.passed {
                *failure_histogram
                    .entry(check.name.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    let mut top_candidates: Vec<TopCandidate> = reports
        .iter()
        .map(|report| TopCandidate {
            candidate_id: report.candidate_id.clone(),
            truth_score: report.truth_score,
        })
        .collect();
    top_candidates.sort_by(|a, b| {
        b.truth_score
            .partial_cmp(&a.truth_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    let best_candidate_id = top_candidates
        .first()
        .map(|top| top.candidate_id.clone())
        .or_else(|| reports.first().map(|report| report.candidate_id.clone()))
        .unwrap_or_default();

    let total = reports.len();
    ValidationSummary {
        total,
        accepted,
        rejected: total - accepted,
        best_candidate_id,
        truth_scores,
        failure_histogram,
        top_candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CheckSeverity, ValidationCheck};

    fn report(candidate_id: &str, truth_score: f64, failed: &[CheckName]) -> ValidationReport {
        let checks = CheckName::ALL
            .iter()
            .map(|&name| ValidationCheck {
                name,
                passed: !failed.contains(&name),
                value: Some(truth_score),
                message: None,
                severity: Some(CheckSeverity::Info),
            })
            .collect();
        ValidationReport {
            candidate_id: candidate_id.to_string(),
            truth_score,
            accept: false,
            checks,
        }
    }

    #[test]
    fn counts_and_ordering() {
        let reports = vec![
            report("cand_0002", 0.72, &[CheckName::MinDistance]),
            report("cand_0001", 0.85, &[]),
            report("cand_0003", 0.60, &[CheckName::MinDistance, CheckName::SymmetryMatch]),
        ];
        let summary = aggregate_reports(&reports, 0.8);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.best_candidate_id, "cand_0001");
        let order: Vec<&str> = summary
            .top_candidates
            .iter()
            .map(|top| top.candidate_id.as_str())
            .collect();
        assert_eq!(order, vec!["cand_0001", "cand_0002", "cand_0003"]);
        assert_eq!(summary.failure_histogram["min_distance"], 2);
        assert_eq!(summary.failure_histogram["symmetry_match"], 1);
    }

    #[test]
    fn ties_break_lexicographically_ascending() {
        let reports = vec![
            report("cand_0004", 0.5, &[]),
            report("cand_0002", 0.5, &[]),
            report("cand_0003", 0.9, &[]),
        ];
        let summary = aggregate_reports(&reports, 0.8);
        let order: Vec<&str> = summary
            .top_candidates
            .iter()
            .map(|top| top.candidate_id.as_str())
            .collect();
        assert_eq!(order, vec!["cand_0003", "cand_0002", "cand_0004"]);
        assert_eq!(summary.best_candidate_id, "cand_0003");
    }

    #[test]
    fn histogram_always_carries_every_check_name() {
        let summary = aggregate_reports(&[report("cand_0001", 0.9, &[])], 0.8);
        assert_eq!(summary.failure_histogram.len(), 6);
        for name in CheckName::ALL {
            assert_eq!(summary.failure_histogram[name.as_str()], 0);
        }
    }

    #[test]
    fn acceptance_ignores_the_report_flag() {
        // The builder above always writes accept = false.
        let summary = aggregate_reports(&[report("cand_0001", 0.95, &[])], 0.8);
        assert_eq!(summary.accepted, 1);
    }

    #[test]
    fn empty_input_yields_a_degenerate_summary() {
        let summary = aggregate_reports(&[], 0.8);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.best_candidate_id, "");
        assert!(summary.top_candidates.is_empty());
        assert_eq!(summary.failure_histogram.len(), 6);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let summary = aggregate_reports(&[report("cand_0001", 0.8, &[])], 0.8);
        assert_eq!(summary.accepted, 1);
    }
}
