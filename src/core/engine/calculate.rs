//! Calculation Orchestrator
//!
//! Owns the dataset, the period ordering and the compiled field model, and
//! sequences pre-aggregation -> pairing -> changes -> effects -> pruning.
//! Every setter rebuilds the derived snapshots (period index, compiled
//! expressions) and only swaps them in when the rebuild succeeds.

use crate::config::{BridgeConfig, CalculationMethod, EngineOptions, EvaluationMode};
use crate::core::bridge::components::{BridgeComponent, ComponentFinder};
use crate::core::bridge::reconcile::{BridgeReconciliation, ReconciliationEngine};
use crate::core::bridge::summary::{StatusSummary, Summarizer};
use crate::core::engine::compiler::{
    next_column, CompiledExpressions, ExpressionCompiler, STATUS, STATUS_REASON,
};
use crate::core::engine::pairing::PeriodPairing;
use crate::error::{PvmError, Result};
use crate::fields::{Field, FlatFields};
use crate::periods::{render_values, PeriodIndex};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Price-Volume-Mix bridge engine
#[derive(Debug, Clone)]
pub struct PvmEngine {
    data: DataFrame,
    period_column: String,
    period_order: Option<Vec<String>>,
    fields: FlatFields,
    options: EngineOptions,
    periods: PeriodIndex,
    compiled: CompiledExpressions,
}

impl PvmEngine {
    pub fn new(data: DataFrame, period_column: &str, fields: Field) -> Result<Self> {
        Self::with_options(data, period_column, fields, EngineOptions::default())
    }

    pub fn with_options(
        data: DataFrame,
        period_column: &str,
        fields: Field,
        options: EngineOptions,
    ) -> Result<Self> {
        let periods = PeriodIndex::build(&data, period_column, None)?;
        let fields = FlatFields::from_root(fields)?;
        let compiled = compile(&fields, &data)?;
        warn_on_method(options.method);

        Ok(Self {
            data,
            period_column: period_column.to_string(),
            period_order: None,
            fields,
            options,
            periods,
            compiled,
        })
    }

    /// Build an engine from a [`BridgeConfig`]
    pub fn from_config(data: DataFrame, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let mut engine =
            Self::with_options(data, &config.period_column, config.fields.clone(), config.options)?;
        if config.period_order.is_some() {
            engine.set_period_column(&config.period_column, config.period_order.clone())?;
        }
        Ok(engine)
    }

    /// Replace the dataset; the period index and expressions are rebuilt
    /// against the new columns.
    pub fn set_data(&mut self, data: DataFrame) -> Result<()> {
        let periods =
            PeriodIndex::build(&data, &self.period_column, self.period_order.as_deref())?;
        let compiled = compile(&self.fields, &data)?;
        self.data = data;
        self.periods = periods;
        self.compiled = compiled;
        Ok(())
    }

    /// Set the period column, optionally with an explicit order of its
    /// (rendered) values. Every observed period must appear in the order;
    /// an empty order means natural order.
    pub fn set_period_column(&mut self, column: &str, order: Option<Vec<String>>) -> Result<()> {
        let periods = PeriodIndex::build(&self.data, column, order.as_deref())?;
        self.period_column = column.to_string();
        self.period_order = order;
        self.periods = periods;
        Ok(())
    }

    pub fn set_calculation_fields(&mut self, fields: Field) -> Result<()> {
        let fields = FlatFields::from_root(fields)?;
        let compiled = compile(&fields, &self.data)?;
        self.fields = fields;
        self.compiled = compiled;
        Ok(())
    }

    pub fn set_options(&mut self, options: EngineOptions) {
        warn_on_method(options.method);
        self.options = options;
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn period_column(&self) -> &str {
        &self.period_column
    }

    pub fn periods(&self) -> &PeriodIndex {
        &self.periods
    }

    pub fn fields(&self) -> &FlatFields {
        &self.fields
    }

    /// Names of every field in the calculation tree
    pub fn calculation_fields(&self) -> Vec<String> {
        self.fields.calculation_fields()
    }

    pub fn compiled(&self) -> &CompiledExpressions {
        &self.compiled
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Aggregate raw rows to one row per period and hierarchy key
    pub fn pre_aggregate(&self, hierarchy: &[String]) -> Result<LazyFrame> {
        self.validate_hierarchy(hierarchy)?;

        let mut group = vec![col(&self.period_column)];
        group.extend(hierarchy.iter().map(|h| col(h)));

        Ok(self
            .data
            .clone()
            .lazy()
            .group_by_stable(group)
            .agg(self.compiled.aggregations.clone())
            .with_columns(self.compiled.post_aggregations.clone()))
    }

    /// Pair consecutive periods of pre-aggregated rows
    pub fn join_periods(&self, aggregated: LazyFrame, hierarchy: &[String]) -> Result<LazyFrame> {
        self.validate_hierarchy(hierarchy)?;
        PeriodPairing::new(&self.periods, &self.compiled).pair(aggregated, hierarchy)
    }

    /// Build the full bridge as a lazy plan
    pub fn calculate_lazy(&self, hierarchy: &[String], return_detail: bool) -> Result<LazyFrame> {
        info!(
            "Calculating PVM bridge over {} periods, hierarchy [{}]",
            self.periods.len(),
            hierarchy.join(", ")
        );

        let aggregated = self.pre_aggregate(hierarchy)?;
        let aggregated = match self.options.evaluation {
            EvaluationMode::Eager => {
                let materialized = aggregated.collect()?;
                debug!("Pre-aggregated to {} rows", materialized.height());
                materialized.lazy()
            }
            EvaluationMode::Lazy => aggregated,
        };

        let calculated = self
            .join_periods(aggregated, hierarchy)?
            .with_columns(self.compiled.changes.clone())
            .with_columns(self.compiled.effects.clone());

        let measures = self.compiled.measure_columns();
        let mut output = vec![col(&self.period_column)];
        output.extend(hierarchy.iter().map(|h| col(h)));
        output.extend(measures.iter().map(|m| col(m)));
        if return_detail {
            output.extend(measures.iter().map(|m| col(&next_column(m))));
        }
        output.push(col(STATUS));
        output.push(col(STATUS_REASON));
        if return_detail {
            output.extend(self.compiled.change_columns().iter().map(|c| col(c)));
        }
        output.extend(self.compiled.effect_columns().iter().map(|c| col(c)));

        Ok(calculated
            .select(output)
            .with_column(self.compiled.total_effect()))
    }

    /// Compute effect rows for `hierarchy`. Without `return_detail`, the
    /// `_next` and `_change` columns are dropped.
    pub fn calculate(&self, hierarchy: &[String], return_detail: bool) -> Result<DataFrame> {
        let calculated = self.calculate_lazy(hierarchy, return_detail)?.collect()?;
        info!("Bridge produced {} effect rows", calculated.height());
        Ok(calculated)
    }

    /// Totals per (status, status_reason)
    pub fn summarize(&self, calculated: &DataFrame) -> Result<Vec<StatusSummary>> {
        Summarizer::new(self.fields.root().name()).summarize(calculated)
    }

    /// Ranked contributions for a waterfall presentation
    pub fn find_largest_components(
        &self,
        calculated: &DataFrame,
        dimension: &str,
        max_components: usize,
    ) -> Result<Vec<BridgeComponent>> {
        ComponentFinder::new(&self.compiled).find_largest_components(
            calculated,
            dimension,
            max_components,
        )
    }

    /// Root total per period, in period order
    pub fn period_totals(&self) -> Result<Vec<(String, f64)>> {
        let status_column = self.compiled.status_column();
        let totals = self.pre_aggregate(&[])?.collect()?;

        let labels = render_values(totals.column(&self.period_column)?)?;
        let values = totals.column(status_column)?.cast(&DataType::Float64)?;
        let values = values.f64()?;

        Ok(self
            .periods
            .labels()
            .iter()
            .map(|label| {
                let value = labels
                    .iter()
                    .position(|l| l == label)
                    .and_then(|i| values.get(i))
                    .unwrap_or(0.0);
                (label.clone(), value)
            })
            .collect())
    }

    /// Check that the effects of `calculated` explain the change of the
    /// root total between the first and the last period
    pub fn reconcile(&self, calculated: &DataFrame) -> Result<BridgeReconciliation> {
        let totals = self.period_totals()?;
        ReconciliationEngine::default().reconcile(&totals, calculated)
    }

    fn validate_hierarchy(&self, hierarchy: &[String]) -> Result<()> {
        let available: HashSet<&str> = self.data.get_column_names().into_iter().collect();
        let mut seen = HashSet::new();

        for column in hierarchy {
            if column == &self.period_column {
                return Err(PvmError::InvalidConfiguration(format!(
                    "period column '{}' cannot be part of the hierarchy",
                    column
                )));
            }
            if !available.contains(column.as_str()) {
                return Err(PvmError::InvalidConfiguration(format!(
                    "hierarchy column '{}' not in dataframe",
                    column
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(PvmError::InvalidConfiguration(format!(
                    "hierarchy column '{}' listed more than once",
                    column
                )));
            }
        }
        Ok(())
    }
}

fn compile(fields: &FlatFields, data: &DataFrame) -> Result<CompiledExpressions> {
    let available: Vec<String> = data
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    ExpressionCompiler::new(fields, &available).compile()
}

fn warn_on_method(method: CalculationMethod) {
    if method != CalculationMethod::Classic {
        warn!(
            "Calculation method {:?} is not implemented; using classic attribution",
            method
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> DataFrame {
        df![
            "year" => [2017i32, 2018, 2018],
            "region" => ["A", "A", "B"],
            "revenue" => [20.0, 30.0, 15.0],
            "price" => [2.0, 2.5, 3.0],
            "quantity" => [10.0, 12.0, 5.0],
        ]
        .unwrap()
    }

    fn fields() -> Field {
        Field::total(
            "revenue",
            vec![Field::rate("price"), Field::quantity("quantity")],
        )
    }

    #[test]
    fn test_unknown_hierarchy_column() {
        let engine = PvmEngine::new(sales(), "year", fields()).unwrap();
        let err = engine
            .calculate(&["country".to_string()], false)
            .unwrap_err();
        assert!(matches!(err, PvmError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_period_column() {
        let err = PvmEngine::new(sales(), "month", fields()).unwrap_err();
        assert!(matches!(err, PvmError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_failed_setter_keeps_previous_snapshot() {
        let mut engine = PvmEngine::new(sales(), "year", fields()).unwrap();
        let broken = Field::total("revenue", vec![Field::rate("price")]);
        let err = engine.set_calculation_fields(broken).unwrap_err();
        assert!(matches!(err, PvmError::MalformedFieldModel(_)));
        assert_eq!(engine.calculation_fields(), vec!["revenue", "price", "quantity"]);
        assert!(engine.calculate(&["region".to_string()], false).is_ok());
    }

    #[test]
    fn test_detail_columns() {
        let engine = PvmEngine::new(sales(), "year", fields()).unwrap();
        let hierarchy = vec!["region".to_string()];

        let brief = engine.calculate(&hierarchy, false).unwrap();
        let names = brief.get_column_names();
        assert!(names.iter().all(|c| !c.ends_with("_next") && !c.ends_with("_change")));
        assert!(names.contains(&"total_effect"));

        let detail = engine.calculate(&hierarchy, true).unwrap();
        let names = detail.get_column_names();
        assert!(names.contains(&"quantity_next"));
        assert!(names.contains(&"avg_price_change"));
        assert_eq!(detail.height(), brief.height());
    }

    #[test]
    fn test_period_totals() {
        let engine = PvmEngine::new(sales(), "year", fields()).unwrap();
        let totals = engine.period_totals().unwrap();
        assert_eq!(
            totals,
            vec![("2017".to_string(), 20.0), ("2018".to_string(), 45.0)]
        );
    }
}
