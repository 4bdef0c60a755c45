//! Bridge Reconciliation
//!
//! Proves that the effects explain the movement of the root total: the sum
//! of `total_effect` over all rows must equal the root total of the last
//! period minus that of the first. Consecutive period pairs telescope, so
//! the check holds for any number of periods.

use super::{float_values, string_values};
use crate::core::engine::compiler::{DISCONTINUED, INTRODUCED, LIKE_FOR_LIKE, STATUS, TOTAL_EFFECT};
use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeReconciliation {
    /// Root total of the last period minus that of the first
    pub expected_change: f64,

    /// Sum of `total_effect`
    pub explained_change: f64,

    /// Absolute difference between expected and explained (should be ~0)
    pub reconciliation_error: f64,

    pub passes: bool,

    pub breakdown: StatusBreakdown,
}

/// `total_effect` per lifecycle status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub introduced: f64,
    pub discontinued: f64,
    pub like_for_like: f64,
}

pub struct ReconciliationEngine {
    /// Largest accepted absolute error
    pub tolerance: f64,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

impl ReconciliationEngine {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// `period_totals` are the root totals in period order
    pub fn reconcile(
        &self,
        period_totals: &[(String, f64)],
        calculated: &DataFrame,
    ) -> Result<BridgeReconciliation> {
        let expected_change = match (period_totals.first(), period_totals.last()) {
            (Some((_, first)), Some((_, last))) => last - first,
            _ => 0.0,
        };

        let statuses = string_values(calculated, STATUS)?;
        let effects = float_values(calculated, TOTAL_EFFECT)?;

        let mut breakdown = StatusBreakdown::default();
        for (status, effect) in statuses.iter().zip(&effects) {
            match status.as_str() {
                INTRODUCED => breakdown.introduced += effect,
                DISCONTINUED => breakdown.discontinued += effect,
                LIKE_FOR_LIKE => breakdown.like_for_like += effect,
                _ => {}
            }
        }

        let explained_change = effects.iter().sum::<f64>();
        let reconciliation_error = (expected_change - explained_change).abs();

        Ok(BridgeReconciliation {
            expected_change,
            explained_change,
            reconciliation_error,
            passes: reconciliation_error <= self.tolerance,
            breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation() {
        let calculated = df![
            "status" => ["like-for-like", "introduced", "discontinued"],
            "total_effect" => [10.0, 15.0, -5.0],
        ]
        .unwrap();
        let totals = vec![("2017".to_string(), 25.0), ("2018".to_string(), 45.0)];

        let result = ReconciliationEngine::default()
            .reconcile(&totals, &calculated)
            .unwrap();
        assert!(result.passes);
        assert_eq!(result.expected_change, 20.0);
        assert_eq!(result.breakdown.introduced, 15.0);
        assert_eq!(result.breakdown.discontinued, -5.0);
        assert_eq!(result.breakdown.like_for_like, 10.0);
    }

    #[test]
    fn test_reconciliation_failure() {
        let calculated = df![
            "status" => ["like-for-like"],
            "total_effect" => [3.0],
        ]
        .unwrap();
        let totals = vec![("a".to_string(), 1.0), ("b".to_string(), 5.0)];

        let result = ReconciliationEngine::new(0.01)
            .reconcile(&totals, &calculated)
            .unwrap();
        assert!(!result.passes);
        assert_eq!(result.reconciliation_error, 1.0);
    }
}
