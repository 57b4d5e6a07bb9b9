//! Shared primitive types used across the entire allocation core.

/// Code of an account in the chart of accounts. Unique per chart.
pub type AccountCode = String;

/// Reporting period tag (e.g. "2024-03"). Opaque to the engine.
pub type Period = String;

/// Scenario tag (e.g. "budget", "actual"). Opaque to the engine.
pub type Scenario = String;

/// The canonical run identifier.
pub type RunId = String;

/// One pass of the top-down distribution loop, starting at 1.
pub type IterationNo = u32;
