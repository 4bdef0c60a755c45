//! Bridge reductions
//!
//! Turns effect rows into presentation-ready views: status summaries,
//! ranked waterfall components, the reconciliation check and bar layout.

pub mod components;
pub mod reconcile;
pub mod summary;
pub mod waterfall;

pub use components::{BridgeComponent, ComponentFinder};
pub use reconcile::{BridgeReconciliation, ReconciliationEngine, StatusBreakdown};
pub use summary::{StatusSummary, Summarizer};
pub use waterfall::{layout, BarColor, WaterfallBar};

use crate::error::{PvmError, Result};
use polars::prelude::*;

/// Values of a numeric column as `f64`, nulls read as zero
pub(crate) fn float_values(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    let series = require_column(df, column)?.cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

/// Values of a string column, nulls read as empty strings
pub(crate) fn string_values(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let series = require_column(df, column)?;
    crate::periods::render_values(series)
}

pub(crate) fn require_column<'a>(df: &'a DataFrame, column: &str) -> Result<&'a Series> {
    df.column(column).map_err(|_| {
        PvmError::InvalidConfiguration(format!("column '{}' not in calculated frame", column))
    })
}
