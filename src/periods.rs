//! Period Index
//!
//! Ordered distinct periods of the dataset with next/previous lookups.
//! Period values only need to be orderable; callers may supply an explicit
//! order, matched against the rendered (string) form of each value.

use crate::error::{PvmError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PeriodIndex {
    column: String,
    periods: Series,
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl PeriodIndex {
    /// Build the index from the period column of `data`. An empty `order`
    /// falls back to the natural order.
    pub fn build(data: &DataFrame, column: &str, order: Option<&[String]>) -> Result<Self> {
        let series = data.column(column).map_err(|_| {
            PvmError::InvalidConfiguration(format!("Column '{}' not in dataframe", column))
        })?;

        let unique = series.unique()?.drop_nulls();
        let rendered = render_values(&unique)?;

        let sorted = match order.filter(|o| !o.is_empty()) {
            None => {
                let idx = unique.arg_sort(SortOptions::default());
                unique.take(&idx)?
            }
            Some(order) => {
                let missing: Vec<&str> = rendered
                    .iter()
                    .filter(|v| !order.contains(v))
                    .map(|v| v.as_str())
                    .collect();
                if !missing.is_empty() {
                    return Err(PvmError::InvalidConfiguration(format!(
                        "Column '{}' contains values '{}' that are missing in the provided sorted list",
                        column,
                        missing.join(",")
                    )));
                }

                // Periods listed in the order but absent from the data are skipped
                let positions: Vec<IdxSize> = order
                    .iter()
                    .filter_map(|label| rendered.iter().position(|v| v == label))
                    .map(|pos| pos as IdxSize)
                    .collect();
                unique.take(&IdxCa::from_vec("idx", positions))?
            }
        };

        let labels = render_values(&sorted)?;
        let positions = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();

        debug!("Period index on '{}': {:?}", column, labels);

        Ok(Self {
            column: column.to_string(),
            periods: sorted.with_name(column),
            labels,
            positions,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Name of the column holding the successor period
    pub fn next_column(&self) -> String {
        format!("{}_next", self.column)
    }

    pub fn periods(&self) -> &Series {
        &self.periods
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.labels.first().map(|s| s.as_str())
    }

    pub fn last(&self) -> Option<&str> {
        self.labels.last().map(|s| s.as_str())
    }

    pub fn next_period(&self, label: &str) -> Option<&str> {
        let pos = *self.positions.get(label)?;
        self.labels.get(pos + 1).map(|s| s.as_str())
    }

    pub fn prev_period(&self, label: &str) -> Option<&str> {
        let pos = *self.positions.get(label)?;
        pos.checked_sub(1)
            .and_then(|p| self.labels.get(p))
            .map(|s| s.as_str())
    }

    /// Two-column frame `[period, period_next]` pairing every period but the
    /// last with its successor. Values keep the dtype of the period column.
    pub fn next_map(&self) -> Result<DataFrame> {
        let pairs = self.len().saturating_sub(1);
        let current = self.periods.slice(0, pairs).with_name(&self.column);
        let next = self
            .periods
            .slice(1, pairs)
            .with_name(&self.next_column());
        Ok(DataFrame::new(vec![current, next])?)
    }
}

/// Render every value of a series as a string (nulls as empty strings)
pub(crate) fn render_values(series: &Series) -> Result<Vec<String>> {
    let rendered = series.cast(&DataType::String)?;
    Ok(rendered
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        let df = df![
            "year" => [2018i32, 2017, 2018, 2019, 2017],
        ]
        .unwrap();
        let index = PeriodIndex::build(&df, "year", None).unwrap();
        assert_eq!(index.labels(), &["2017", "2018", "2019"]);
        assert_eq!(index.next_period("2017"), Some("2018"));
        assert_eq!(index.prev_period("2017"), None);
        assert_eq!(index.prev_period("2019"), Some("2018"));
        assert_eq!(index.next_period("2019"), None);
    }

    #[test]
    fn test_explicit_order() {
        let df = df![
            "quarter" => ["Q2", "Q1", "Q3", "Q1"],
        ]
        .unwrap();
        let order: Vec<String> = ["Q3", "Q1", "Q2"].iter().map(|s| s.to_string()).collect();
        let index = PeriodIndex::build(&df, "quarter", Some(&order)).unwrap();
        assert_eq!(index.labels(), &["Q3", "Q1", "Q2"]);
        assert_eq!(index.first(), Some("Q3"));
        assert_eq!(index.last(), Some("Q2"));
    }

    #[test]
    fn test_empty_order_is_natural() {
        let df = df![
            "year" => [2019i32, 2017, 2018],
        ]
        .unwrap();
        let order: Vec<String> = Vec::new();
        let index = PeriodIndex::build(&df, "year", Some(&order)).unwrap();
        assert_eq!(index.labels(), &["2017", "2018", "2019"]);
    }

    #[test]
    fn test_explicit_order_missing_value() {
        let df = df![
            "quarter" => ["Q1", "Q2", "Q4"],
        ]
        .unwrap();
        let order: Vec<String> = ["Q1", "Q2", "Q3"].iter().map(|s| s.to_string()).collect();
        let err = PeriodIndex::build(&df, "quarter", Some(&order)).unwrap_err();
        assert!(matches!(err, PvmError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("Q4"));
    }

    #[test]
    fn test_missing_column() {
        let df = df!["year" => [2017i32]].unwrap();
        let err = PeriodIndex::build(&df, "month", None).unwrap_err();
        assert!(matches!(err, PvmError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_next_map_keeps_dtype() {
        let df = df!["year" => [2017i64, 2018, 2019]].unwrap();
        let index = PeriodIndex::build(&df, "year", None).unwrap();
        let map = index.next_map().unwrap();
        assert_eq!(map.height(), 2);
        assert_eq!(map.column("year").unwrap().dtype(), &DataType::Int64);
        assert_eq!(map.column("year_next").unwrap().dtype(), &DataType::Int64);
    }
}
