//! Command implementations for the Lumen CLI.

pub mod dashboard;
pub mod infer;
pub mod pipelines;
pub mod train;
pub mod types;
pub mod weights;

pub use types::WeightsCommand;
