/// Observation ingestion.
///
/// The HTTP client that pages through the upstream water-quality API lives
/// outside this crate. What arrives here is an already-downloaded page or
/// file, which is parsed into `Observation`s.
///
/// Submodules:
/// - `ea_wqe`: Environment Agency water-quality observation CSV pages.

pub mod ea_wqe;
