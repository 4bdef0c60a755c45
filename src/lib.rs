//! Price-Volume-Mix bridge analysis
//!
//! Decomposes the period-over-period change of an aggregate (e.g. revenue)
//! into additive price, quantity and other-driver effects across a grouping
//! hierarchy, tracking entities that are introduced, discontinued or
//! like-for-like between consecutive periods.

pub mod config;
pub mod core;
pub mod error;
pub mod fields;
pub mod periods;

pub use crate::config::{BridgeConfig, CalculationMethod, EngineOptions, EvaluationMode};
pub use crate::core::bridge::{
    layout, BarColor, BridgeComponent, BridgeReconciliation, StatusSummary, WaterfallBar,
};
pub use crate::core::engine::PvmEngine;
pub use crate::error::{PvmError, Result};
pub use crate::fields::{Field, FieldKind, FlatFields};
pub use crate::periods::PeriodIndex;
