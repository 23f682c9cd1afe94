//! Optimize results
//!
//! One [`DexContainerFileOptimizeResult`] is recorded per container and ABI
//! that reached the staleness check, in processing order. The sequence is
//! the authoritative record of a request: on cancellation it just ends
//! early.

use std::fmt;

use crate::filter::CompilerFilter;

/// Outcome of one container/ABI, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptimizeStatus {
    /// Existing artifacts were current
    Skipped = 10,
    Performed = 20,
    Failed = 30,
    Cancelled = 40,
}

impl OptimizeStatus {
    /// Whether the container can still count as successful
    pub fn is_ok(self) -> bool {
        matches!(self, OptimizeStatus::Skipped | OptimizeStatus::Performed)
    }
}

impl fmt::Display for OptimizeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizeStatus::Skipped => "SKIPPED",
            OptimizeStatus::Performed => "PERFORMED",
            OptimizeStatus::Failed => "FAILED",
            OptimizeStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Result for one container and ABI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexContainerFileOptimizeResult {
    pub dex_path: String,
    pub is_primary_abi: bool,
    pub abi_name: String,
    /// The filter after adjustment, i.e. what was actually requested
    pub actual_compiler_filter: CompilerFilter,
    pub status: OptimizeStatus,
    pub wall_time_ms: u64,
    pub cpu_time_ms: u64,
    pub size_bytes: u64,
    pub size_before_bytes: u64,
}

/// Collects per-ABI results and tracks whether the current container succeeded
#[derive(Debug)]
pub struct ResultAggregator {
    results: Vec<DexContainerFileOptimizeResult>,
    container_succeeded: bool,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            container_succeeded: true,
        }
    }

    /// Start tracking a new container.
    pub fn begin_container(&mut self) {
        self.container_succeeded = true;
    }

    /// Record one result.
    pub fn record(&mut self, result: DexContainerFileOptimizeResult) {
        if !result.status.is_ok() {
            self.container_succeeded = false;
        }
        self.results.push(result);
    }

    /// Whether every ABI of the current container was skipped or performed
    pub fn container_succeeded(&self) -> bool {
        self.container_succeeded
    }

    pub fn results(&self) -> &[DexContainerFileOptimizeResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<DexContainerFileOptimizeResult> {
        self.results
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of optimizing one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeResult {
    pub package_name: String,
    pub requested_compiler_filter: CompilerFilter,
    pub reason: String,
    pub results: Vec<DexContainerFileOptimizeResult>,
}

impl OptimizeResult {
    /// The most severe status, or `Skipped` if nothing was attempted
    pub fn final_status(&self) -> OptimizeStatus {
        self.results
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(OptimizeStatus::Skipped)
    }

    pub fn is_cancelled(&self) -> bool {
        self.final_status() == OptimizeStatus::Cancelled
    }
}
