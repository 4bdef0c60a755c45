//! Expression Compiler
//!
//! Walks the flattened field tree once and produces the aggregation,
//! post-aggregation, change and effect expressions needed to evaluate the
//! bridge over any grouping.

use crate::error::{PvmError, Result};
use crate::fields::{required_component, FieldKind, FlatFields};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

pub const STATUS: &str = "status";
pub const STATUS_REASON: &str = "status_reason";
pub const TOTAL_EFFECT: &str = "total_effect";

pub const INTRODUCED: &str = "introduced";
pub const DISCONTINUED: &str = "discontinued";
pub const LIKE_FOR_LIKE: &str = "like-for-like";

pub fn calculated_column(field: &str) -> String {
    format!("{}_calculated", field)
}

pub fn avg_rate_column(rate: &str) -> String {
    format!("avg_{}", rate)
}

pub fn next_column(column: &str) -> String {
    format!("{}_next", column)
}

pub fn change_column(column: &str) -> String {
    format!("{}_change", column)
}

pub fn effect_column(field: &str) -> String {
    format!("{}_effect", field)
}

/// Compiled operation lists plus the column names they produce
#[derive(Debug, Clone)]
pub struct CompiledExpressions {
    /// Applied while grouping by period + hierarchy
    pub aggregations: Vec<Expr>,

    /// Applied to every pre-aggregated row
    pub post_aggregations: Vec<Expr>,

    /// `c_change = coalesce(c_next, 0) - coalesce(c, 0)`
    pub changes: Vec<Expr>,

    /// Effect contributions, evaluated after `changes`
    pub effects: Vec<Expr>,

    measure_columns: Vec<String>,
    change_columns: Vec<String>,
    effect_columns: Vec<String>,
    status_column: String,
    root_quantity: String,
    root_rate: String,
}

impl CompiledExpressions {
    /// Columns of a pre-aggregated row besides period and hierarchy
    pub fn measure_columns(&self) -> &[String] {
        &self.measure_columns
    }

    pub fn change_columns(&self) -> &[String] {
        &self.change_columns
    }

    pub fn effect_columns(&self) -> &[String] {
        &self.effect_columns
    }

    /// Root total column whose nullness decides the lifecycle status
    pub fn status_column(&self) -> &str {
        &self.status_column
    }

    /// Quantity effect column of the root total
    pub fn quantity_effect_column(&self) -> String {
        effect_column(&self.root_quantity)
    }

    /// Rate effect column of the root total
    pub fn rate_effect_column(&self) -> String {
        effect_column(&self.root_rate)
    }

    /// Sum of all effect columns, nulls counted as zero
    pub fn total_effect(&self) -> Expr {
        self.effect_columns
            .iter()
            .map(|c| col(c).fill_null(lit(0.0)))
            .reduce(|acc, e| acc + e)
            .unwrap_or_else(|| lit(0.0))
            .alias(TOTAL_EFFECT)
    }
}

/// Builds [`CompiledExpressions`] from a flattened field tree
pub struct ExpressionCompiler<'a> {
    fields: &'a FlatFields,
    available: HashSet<&'a str>,
}

impl<'a> ExpressionCompiler<'a> {
    /// `available_columns` are the columns of the input dataset
    pub fn new(fields: &'a FlatFields, available_columns: &'a [String]) -> Self {
        Self {
            fields,
            available: available_columns.iter().map(|c| c.as_str()).collect(),
        }
    }

    pub fn compile(&self) -> Result<CompiledExpressions> {
        let root = self.fields.root();
        let root_rate = root.rate_component()?.name().to_string();
        let root_quantity = root.quantity_component()?.name().to_string();

        let mut state = CompileState::default();
        let mut status_column = None;

        for (name, components) in self.fields.entries() {
            let Some(components) = components else {
                continue;
            };

            let rate = required_component(name, components, FieldKind::Rate)?;
            let quantity = required_component(name, components, FieldKind::Quantity)?;
            for leaf in [rate, quantity] {
                self.require_column(leaf.name())?;
            }

            let raw_present = self.available.contains(name.as_str());
            let calculated = calculated_column(name);
            let is_root = name == root.name();

            if raw_present {
                state.push_aggregation(name, col(name).sum());
                state.push_change(name);
            }
            state.push_change(&calculated);

            for other in components.iter().filter(|c| c.kind() == FieldKind::Other) {
                self.require_column(other.name())?;
                state.push_aggregation(other.name(), col(other.name()).sum());
                state.push_change(other.name());
                state.push_effect(
                    other.name(),
                    when(not_like_for_like())
                        .then(lit(0.0))
                        .otherwise(col(&change_column(other.name()))),
                );
            }

            // Pre-aggregation of the rate * quantity decomposition
            state.push_aggregation(
                &calculated,
                (col(rate.name()).cast(DataType::Float64)
                    * col(quantity.name()).cast(DataType::Float64))
                .sum(),
            );
            state.push_aggregation(quantity.name(), col(quantity.name()).sum());

            let avg_rate = avg_rate_column(rate.name());
            state.post_aggregations.push(
                (col(&calculated) / col(quantity.name()).cast(DataType::Float64)).alias(&avg_rate),
            );
            state.measure_columns.push(avg_rate.clone());

            state.push_change(&avg_rate);
            state.push_change(quantity.name());

            let total_change = if raw_present {
                change_column(name)
            } else {
                change_column(&calculated)
            };
            if is_root {
                status_column = Some(if raw_present {
                    name.clone()
                } else {
                    calculated.clone()
                });
            }

            // Only the root total carries introductions and discontinuations
            let unmatched_quantity_effect = if is_root {
                col(&total_change)
            } else {
                lit(0.0)
            };
            state.push_effect(
                quantity.name(),
                when(not_like_for_like())
                    .then(unmatched_quantity_effect)
                    .otherwise(col(&change_column(quantity.name())) * col(&avg_rate)),
            );
            state.push_effect(
                rate.name(),
                when(not_like_for_like())
                    .then(lit(0.0))
                    .otherwise(col(&change_column(&avg_rate)) * col(&next_column(quantity.name()))),
            );
        }

        let status_column = status_column.ok_or_else(|| {
            PvmError::MalformedFieldModel(format!(
                "root field '{}' has no components",
                root.name()
            ))
        })?;

        debug!(
            "Compiled {} aggregations, {} changes, {} effects",
            state.aggregations.len(),
            state.changes.len(),
            state.effects.len()
        );

        Ok(CompiledExpressions {
            aggregations: state.aggregations,
            post_aggregations: state.post_aggregations,
            changes: state.changes,
            effects: state.effects,
            measure_columns: state.measure_columns,
            change_columns: state.change_columns,
            effect_columns: state.effect_columns,
            status_column,
            root_quantity,
            root_rate,
        })
    }

    fn require_column(&self, name: &str) -> Result<()> {
        if self.available.contains(name) {
            Ok(())
        } else {
            Err(PvmError::InvalidConfiguration(format!(
                "field column '{}' not in dataframe",
                name
            )))
        }
    }
}

fn not_like_for_like() -> Expr {
    col(STATUS).neq(lit(LIKE_FOR_LIKE))
}

#[derive(Default)]
struct CompileState {
    aggregations: Vec<Expr>,
    post_aggregations: Vec<Expr>,
    changes: Vec<Expr>,
    effects: Vec<Expr>,
    measure_columns: Vec<String>,
    change_columns: Vec<String>,
    effect_columns: Vec<String>,
}

impl CompileState {
    fn push_aggregation(&mut self, name: &str, expr: Expr) {
        if self.measure_columns.iter().any(|c| c == name) {
            return;
        }
        self.aggregations.push(expr.alias(name));
        self.measure_columns.push(name.to_string());
    }

    fn push_change(&mut self, column: &str) {
        let change = change_column(column);
        if self.change_columns.contains(&change) {
            return;
        }
        self.changes.push(
            (col(&next_column(column)).fill_null(lit(0.0)) - col(column).fill_null(lit(0.0)))
                .alias(&change),
        );
        self.change_columns.push(change);
    }

    fn push_effect(&mut self, field: &str, expr: Expr) {
        let effect = effect_column(field);
        if self.effect_columns.contains(&effect) {
            return;
        }
        self.effects.push(expr.alias(&effect));
        self.effect_columns.push(effect);
    }
}
