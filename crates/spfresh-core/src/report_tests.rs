//! Tests for report module

#[cfg(test)]
mod tests {
    use crate::engine::{EngineError, SearchStats};
    use crate::error::{Error, FailureKind};
    use crate::identifier_map::UNRESOLVED;
    use crate::report::*;
    use std::time::Duration;

    fn mixed_batch() -> BatchReport {
        BatchReport::new(
            vec![
                ItemOutcome::Success,
                ItemOutcome::NotFound,
                ItemOutcome::Failed(EngineError::new(5, "missing")),
                ItemOutcome::Success,
            ],
            Duration::from_millis(4),
        )
    }

    #[test]
    fn test_batch_report_counts() {
        // Arrange & Act
        let report = mixed_batch();

        // Assert
        assert_eq!(report.len(), 4);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.not_found(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_complete_success());
        assert_eq!(report.outcome(1), Some(&ItemOutcome::NotFound));
        assert_eq!(report.outcome(9), None);
        assert_eq!(report.elapsed(), Duration::from_millis(4));
    }

    #[test]
    fn test_batch_report_failures_carry_index() {
        let report = mixed_batch();
        let failures: Vec<_> = report.failures().map(|(j, e)| (j, e.code)).collect();
        assert_eq!(failures, vec![(2, 5)]);
    }

    #[test]
    fn test_into_result_ignores_not_found() {
        // Act
        let err = mixed_batch().into_result().expect_err("engine failure");

        // Assert
        let failed = err.failed_items();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 2);
        assert!(matches!(failed[0].kind, FailureKind::Engine(ref e) if e.code == 5));
    }

    #[test]
    fn test_into_strict_result_counts_not_found() {
        // Act
        let err = mixed_batch().into_strict_result().expect_err("failures");

        // Assert
        match err {
            Error::PartialFailure { failed, total } => {
                assert_eq!(total, 4);
                assert_eq!(failed.len(), 2);
                assert_eq!(failed[0].kind, FailureKind::NotFound);
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_into_result_ok_when_only_not_found() {
        // Arrange
        let report = BatchReport::new(
            vec![ItemOutcome::NotFound, ItemOutcome::Success],
            Duration::ZERO,
        );

        // Act & Assert
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_empty_batch_is_complete_success() {
        let report = BatchReport::default();
        assert!(report.is_empty());
        assert!(report.is_complete_success());
    }

    #[test]
    fn test_query_result_unresolved() {
        // Act
        let row = QueryResult::unresolved(3);

        // Assert
        assert_eq!(row.ids, vec![UNRESOLVED; 3]);
        assert!(row.distances.iter().all(|d| d.is_infinite()));
        assert_eq!(row.resolved().count(), 0);
    }

    #[test]
    fn test_query_result_resolved_skips_sentinel() {
        let row = QueryResult {
            ids: vec![4, UNRESOLVED, 9],
            distances: vec![0.1, 0.2, 0.3],
            error: None,
        };
        assert_eq!(row.resolved().collect::<Vec<_>>(), vec![4, 9]);
    }

    #[test]
    fn test_search_report_matrix_and_failures() {
        // Arrange
        let ok = QueryResult {
            ids: vec![1, 2],
            distances: vec![0.0, 1.0],
            error: None,
        };
        let failed = QueryResult {
            error: Some(EngineError::new(7, "disk")),
            ..QueryResult::unresolved(2)
        };
        let stats = SearchStats {
            queries: 2,
            failed_queries: 1,
            ..SearchStats::default()
        };
        let report = SearchReport::new(vec![ok, failed], stats, Duration::from_millis(1));

        // Act
        let matrix = report.to_matrix();
        let failures: Vec<_> = report.failures().map(|(j, _)| j).collect();

        // Assert
        assert_eq!(matrix, vec![vec![1, 2], vec![UNRESOLVED, UNRESOLVED]]);
        assert_eq!(failures, vec![1]);
        assert_eq!(report.stats().failed_queries, 1);
        assert_eq!(report.result(0).map(|r| r.ids[0]), Some(1));

        let err = report.into_result().expect_err("one query failed");
        assert_eq!(err.failed_items()[0].index, 1);
    }

    #[test]
    fn test_search_report_into_matrix() {
        let report = SearchReport::new(
            vec![QueryResult::unresolved(1)],
            SearchStats::default(),
            Duration::ZERO,
        );
        assert_eq!(report.into_matrix(), vec![vec![UNRESOLVED]]);
    }
}
