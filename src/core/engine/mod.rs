//! Core Engine Module
//!
//! Compiles the field model and evaluates the bridge: expression
//! compilation, period pairing and the calculation orchestrator.

pub mod calculate;
pub mod compiler;
pub mod pairing;

pub use calculate::PvmEngine;
pub use compiler::{
    CompiledExpressions, ExpressionCompiler, DISCONTINUED, INTRODUCED, LIKE_FOR_LIKE, STATUS,
    STATUS_REASON, TOTAL_EFFECT,
};
pub use pairing::PeriodPairing;
