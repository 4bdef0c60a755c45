//! Bridge configuration
//!
//! Engine options plus a JSON-loadable description of a full bridge run.

use crate::error::{PvmError, Result};
use crate::fields::Field;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// PVM attribution method
///
/// Only `Classic` has defined formulas. The other variants are reserved:
/// they are accepted and computed as `Classic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    /// Quantity effect at prior average rate, rate effect at new quantity
    #[default]
    Classic,
    Inverse,
    ThreeWay,
    Symmetric,
}

/// How intermediate frames are evaluated. Results are identical either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Materialise the pre-aggregated frame once and reuse it for every join
    #[default]
    Eager,

    /// Keep one lazy plan until the final collect
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default)]
    pub method: CalculationMethod,

    #[serde(default)]
    pub evaluation: EvaluationMode,
}

fn default_max_components() -> usize {
    5
}

/// Everything needed to run one bridge over a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Column holding the period of each row
    pub period_column: String,

    /// Explicit period order, matched against the rendered period values
    #[serde(default)]
    pub period_order: Option<Vec<String>>,

    /// Grouping hierarchy, outermost first
    #[serde(default)]
    pub hierarchy: Vec<String>,

    /// Root of the field tree
    pub fields: Field,

    /// Column used to label the largest like-for-like contributors
    #[serde(default)]
    pub dimension: Option<String>,

    #[serde(default = "default_max_components")]
    pub max_components: usize,

    #[serde(default)]
    pub return_detail: bool,

    #[serde(default)]
    pub options: EngineOptions,
}

impl BridgeConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that can be made without looking at the data
    pub fn validate(&self) -> Result<()> {
        if self.period_column.trim().is_empty() {
            return Err(PvmError::InvalidConfiguration(
                "period_column must not be empty".to_string(),
            ));
        }
        if self.hierarchy.iter().any(|c| c == &self.period_column) {
            return Err(PvmError::InvalidConfiguration(format!(
                "period column '{}' cannot be part of the hierarchy",
                self.period_column
            )));
        }
        if let Some(dimension) = &self.dimension {
            if !self.hierarchy.contains(dimension) {
                return Err(PvmError::InvalidConfiguration(format!(
                    "dimension '{}' is not one of the hierarchy columns",
                    dimension
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "period_column": "year",
        "hierarchy": ["product_category", "seller_state"],
        "dimension": "product_category",
        "fields": {
            "name": "revenue",
            "kind": "total",
            "components": [
                {"name": "price", "kind": "rate"},
                {"name": "quantity", "kind": "quantity"},
                {"name": "freight_value", "kind": "other"}
            ]
        }
    }"#;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.max_components, 5);
        assert!(!config.return_detail);
        assert_eq!(config.options.method, CalculationMethod::Classic);
        assert_eq!(config.options.evaluation, EvaluationMode::Eager);
        assert!(config.period_order.is_none());
        assert_eq!(config.fields.components().len(), 3);
    }

    #[test]
    fn test_method_parsing() {
        let json = CONFIG.replacen(
            "\"period_column\"",
            "\"options\": {\"method\": \"three_way\", \"evaluation\": \"lazy\"}, \"period_column\"",
            1,
        );
        let config = BridgeConfig::from_json(&json).unwrap();
        assert_eq!(config.options.method, CalculationMethod::ThreeWay);
        assert_eq!(config.options.evaluation, EvaluationMode::Lazy);
    }

    #[test]
    fn test_dimension_outside_hierarchy() {
        let json = CONFIG.replace(
            "\"dimension\": \"product_category\"",
            "\"dimension\": \"customer_state\"",
        );
        let err = BridgeConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, PvmError::InvalidConfiguration(_)));
    }
}
