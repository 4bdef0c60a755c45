//! Largest bridge components
//!
//! Reduces effect rows to an ordered list of labelled contributions for a
//! waterfall: one entry per introduction / discontinuation reason, the top
//! like-for-like quantity and price effects by absolute size, one entry per
//! remaining effect column, and residual "other" entries so that the list
//! always adds up to the summed `total_effect`.

use super::{float_values, string_values};
use crate::core::engine::compiler::{
    CompiledExpressions, DISCONTINUED, INTRODUCED, LIKE_FOR_LIKE, STATUS, STATUS_REASON,
    TOTAL_EFFECT,
};
use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A labelled amount of the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeComponent {
    pub label: String,
    pub is_total: bool,
    pub amount: f64,
}

impl BridgeComponent {
    pub fn new(label: impl Into<String>, amount: f64) -> Self {
        Self {
            label: label.into(),
            is_total: false,
            amount,
        }
    }

    pub fn total(label: impl Into<String>, amount: f64) -> Self {
        Self {
            label: label.into(),
            is_total: true,
            amount,
        }
    }
}

pub struct ComponentFinder<'a> {
    compiled: &'a CompiledExpressions,
}

impl<'a> ComponentFinder<'a> {
    pub fn new(compiled: &'a CompiledExpressions) -> Self {
        Self { compiled }
    }

    pub fn find_largest_components(
        &self,
        calculated: &DataFrame,
        dimension: &str,
        max_components: usize,
    ) -> Result<Vec<BridgeComponent>> {
        let quantity_column = self.compiled.quantity_effect_column();
        let rate_column = self.compiled.rate_effect_column();

        let statuses = string_values(calculated, STATUS)?;
        let reasons = string_values(calculated, STATUS_REASON)?;
        let labels = string_values(calculated, dimension)?;
        let totals = float_values(calculated, TOTAL_EFFECT)?;
        let quantity = float_values(calculated, &quantity_column)?;
        let price = float_values(calculated, &rate_column)?;

        let mut introductions: BTreeMap<&str, f64> = BTreeMap::new();
        let mut discontinuations: BTreeMap<&str, f64> = BTreeMap::new();
        let mut like_for_like = Vec::new();

        for (i, status) in statuses.iter().enumerate() {
            match status.as_str() {
                INTRODUCED => *introductions.entry(reasons[i].as_str()).or_default() += totals[i],
                DISCONTINUED => {
                    *discontinuations.entry(reasons[i].as_str()).or_default() += totals[i]
                }
                LIKE_FOR_LIKE => like_for_like.push(i),
                _ => {}
            }
        }

        let mut components = Vec::new();
        for (reason, amount) in &introductions {
            components.push(BridgeComponent::new(format!("New: {}", reason), *amount));
        }
        for (reason, amount) in &discontinuations {
            components.push(BridgeComponent::new(
                format!("Discontinued: {}", reason),
                *amount,
            ));
        }

        let top_volume = largest_by_magnitude(&like_for_like, &quantity, max_components);
        let top_price = largest_by_magnitude(&like_for_like, &price, max_components);

        for &i in &top_volume {
            components.push(BridgeComponent::new(
                format!("{} quantity effect", labels[i]),
                quantity[i],
            ));
        }
        for &i in &top_price {
            components.push(BridgeComponent::new(
                format!("{} price effect", labels[i]),
                price[i],
            ));
        }

        // Like-for-like effects outside the root quantity/price pair
        for column in self.compiled.effect_columns() {
            if *column == quantity_column || *column == rate_column {
                continue;
            }
            let values = float_values(calculated, column)?;
            let amount: f64 = like_for_like.iter().map(|&i| values[i]).sum();
            let field = column.strip_suffix("_effect").unwrap_or(column.as_str());
            components.push(BridgeComponent::new(format!("{} effect", field), amount));
        }

        let volume_total: f64 = like_for_like.iter().map(|&i| quantity[i]).sum();
        let price_total: f64 = like_for_like.iter().map(|&i| price[i]).sum();
        let shown_volume: f64 = top_volume.iter().map(|&i| quantity[i]).sum();
        let shown_price: f64 = top_price.iter().map(|&i| price[i]).sum();

        components.push(BridgeComponent::new(
            if top_volume.is_empty() {
                "Volume effect"
            } else {
                "Other - volume effect"
            },
            volume_total - shown_volume,
        ));
        components.push(BridgeComponent::new(
            if top_price.is_empty() {
                "Price effect"
            } else {
                "Other - price effect"
            },
            price_total - shown_price,
        ));

        Ok(components)
    }
}

/// Indices from `rows` with the largest `|values[i]|`, ties kept in row order
fn largest_by_magnitude(rows: &[usize], values: &[f64], limit: usize) -> Vec<usize> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|a, b| {
        values[*b]
            .abs()
            .partial_cmp(&values[*a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::compiler::ExpressionCompiler;
    use crate::fields::{Field, FlatFields};

    fn compiled() -> CompiledExpressions {
        let fields = FlatFields::from_root(Field::total(
            "revenue",
            vec![
                Field::rate("price"),
                Field::quantity("quantity"),
                Field::other("freight"),
            ],
        ))
        .unwrap();
        let available: Vec<String> = ["revenue", "price", "quantity", "freight"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ExpressionCompiler::new(&fields, &available).compile().unwrap()
    }

    fn calculated() -> DataFrame {
        df![
            "region" => ["A", "B", "C", "D", "E"],
            "status" => ["like-for-like", "like-for-like", "like-for-like", "introduced", "discontinued"],
            "status_reason" => ["", "", "", "region", "region"],
            "freight_effect" => [1.0, 0.0, -0.5, 0.0, 0.0],
            "quantity_effect" => [4.0, -8.0, 1.0, 15.0, -7.0],
            "price_effect" => [6.0, 0.5, -3.0, 0.0, 0.0],
            "total_effect" => [11.0, -7.5, -2.5, 15.0, -7.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_top_components_and_residuals() {
        let compiled = compiled();
        let components = ComponentFinder::new(&compiled)
            .find_largest_components(&calculated(), "region", 1)
            .unwrap();

        let labels: Vec<&str> = components.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "New: region",
                "Discontinued: region",
                "B quantity effect",
                "A price effect",
                "freight effect",
                "Other - volume effect",
                "Other - price effect",
            ]
        );
        assert_eq!(components[2].amount, -8.0);
        assert_eq!(components[3].amount, 6.0);
        assert_eq!(components[4].amount, 0.5);
        assert_eq!(components[5].amount, 5.0);
        assert_eq!(components[6].amount, -2.5);
    }

    #[test]
    fn test_components_close_to_total_effect() {
        let compiled = compiled();
        let components = ComponentFinder::new(&compiled)
            .find_largest_components(&calculated(), "region", 2)
            .unwrap();
        let sum: f64 = components.iter().map(|c| c.amount).sum();
        assert!((sum - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_like_for_like_rows() {
        let compiled = compiled();
        let df = calculated()
            .lazy()
            .filter(col("status").neq(lit("like-for-like")))
            .collect()
            .unwrap();
        let components = ComponentFinder::new(&compiled)
            .find_largest_components(&df, "region", 5)
            .unwrap();
        let last: Vec<&str> = components
            .iter()
            .rev()
            .take(2)
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(last, vec!["Price effect", "Volume effect"]);
        assert_eq!(components.iter().map(|c| c.amount).sum::<f64>(), 8.0);
    }

    #[test]
    fn test_unknown_dimension() {
        let compiled = compiled();
        let err = ComponentFinder::new(&compiled)
            .find_largest_components(&calculated(), "country", 5)
            .unwrap_err();
        assert!(err.to_string().contains("country"));
    }
}
