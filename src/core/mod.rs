pub mod bridge;
pub mod engine;
