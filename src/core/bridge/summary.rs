//! Status summary
//!
//! Sums total-like and effect columns per (status, status_reason) and counts
//! the rows behind each group. Intermediate `_calculated` columns are left
//! out.

use super::{float_values, string_values};
use crate::core::engine::compiler::{STATUS, STATUS_REASON};
use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ROWS: &str = "__pvm_rows";

/// One (status, status_reason) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: String,
    pub status_reason: String,

    /// Column name -> sum, rounded to one decimal
    pub totals: BTreeMap<String, f64>,

    pub row_count: usize,
}

pub struct Summarizer<'a> {
    total_field: &'a str,
}

impl<'a> Summarizer<'a> {
    /// `total_field` is the root field; every numeric column containing its
    /// name is summed alongside the effect columns.
    pub fn new(total_field: &'a str) -> Self {
        Self { total_field }
    }

    fn is_summed(&self, column: &str) -> bool {
        (column.contains(self.total_field) || column.ends_with("effect"))
            && !column.contains("calculated")
    }

    pub fn summarize(&self, calculated: &DataFrame) -> Result<Vec<StatusSummary>> {
        let columns: Vec<String> = calculated
            .get_columns()
            .iter()
            .filter(|s| s.dtype().is_numeric())
            .map(|s| s.name().to_string())
            .filter(|c| self.is_summed(c))
            .collect();

        let mut aggs: Vec<Expr> = columns.iter().map(|c| col(c).sum()).collect();
        aggs.push(col(ROWS).sum());

        let grouped = calculated
            .clone()
            .lazy()
            .with_column(lit(1i64).alias(ROWS))
            .group_by_stable([col(STATUS), col(STATUS_REASON)])
            .agg(aggs)
            .collect()?;

        let statuses = string_values(&grouped, STATUS)?;
        let reasons = string_values(&grouped, STATUS_REASON)?;
        let rows = float_values(&grouped, ROWS)?;
        let sums = columns
            .iter()
            .map(|c| Ok((c.clone(), float_values(&grouped, c)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..grouped.height())
            .map(|i| StatusSummary {
                status: statuses[i].clone(),
                status_reason: reasons[i].clone(),
                totals: sums
                    .iter()
                    .map(|(name, values)| (name.clone(), round1(values[i])))
                    .collect(),
                row_count: rows[i] as usize,
            })
            .collect())
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
