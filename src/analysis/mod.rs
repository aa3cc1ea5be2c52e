/// Data organization and series primitives for the bloom-risk pipeline.
///
/// This module provides the small, pure building blocks the table builders
/// are made of. Model fitting and evaluation are handled by an external
/// collaborator that reads the persisted feature and label tables.
///
/// Submodules:
/// - `calendar`: inclusive date ranges and seasonal encodings.
/// - `groupings`: organizes flat observation lists into per-site structures.
/// - `series`: leakage-safe shifts, rolling means and recency counters.

pub mod calendar;
pub mod groupings;
pub mod series;
