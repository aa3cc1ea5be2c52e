//! Leakage-safe feature and label pipeline for lake bloom-risk prediction.
//!
//! Observations → clean → wide base table → feature table (+ label table)
//! → external model. Training and scoring share the same transform path,
//! and scoring is refused when its configuration drifts from the frozen
//! training cycle.

pub mod alert;
pub mod analysis;
pub mod artifacts;
pub mod clean;
pub mod config;
pub mod determinands;
pub mod features;
pub mod ingest;
pub mod labels;
pub mod logging;
pub mod model;
pub mod parity;
pub mod pipeline;
pub mod replay;
pub mod threshold;
pub mod viability;
pub mod wide;
