//! Dexopt - ahead-of-time compilation policy for installed applications
//!
//! For every code container of a package, this crate decides whether its
//! compiled artifacts must be regenerated, manages the profiles that steer
//! profile-guided compilation, and drives the compile step for each target
//! ISA through an external compiler service.
//!
//! # Architecture
//!
//! ```text
//! optimize_package
//!   └─ DexOptimizer<PrimaryDexProvider | SecondaryDexProvider>
//!        ├─ adjust_compiler_filter     (policy ladder)
//!        ├─ profile::resolve_profile   (reference / init / merge)
//!        ├─ trigger::dexopt_trigger    (staleness conditions)
//!        ├─ CompilerService            (query, compile, profile primitives)
//!        └─ ResultAggregator           (ordered per-ABI outcomes)
//! ```
//!
//! The engine is synchronous. Cancellation is cooperative through
//! [`CancellationSignal`]: while a compile is in flight the signal forwards
//! to the service's per-invocation token, and the service reports the
//! compile as cancelled.
//!
//! # Example
//!
//! ```ignore
//! use dexopt::{optimize_package, DexoptConfig, Injector, OptimizeParams};
//! use dexopt_runtime::CancellationSignal;
//!
//! let config = DexoptConfig::from_file("/etc/dexopt.toml")?;
//! let injector = Injector::new(&service, &config);
//! let params = OptimizeParams::parse("speed-profile", "bg-dexopt")?;
//! let result = optimize_package(injector, &package, &params, &CancellationSignal::new())?;
//! println!("{}: {}", result.package_name, result.final_status());
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod optimizer;
pub mod package;
pub mod params;
pub mod paths;
pub mod profile;
pub mod provider;
pub mod reason;
pub mod result;
pub mod service;
pub mod trigger;

use tracing::info;

pub use config::DexoptConfig;
pub use dexopt_runtime::CancellationSignal;
pub use error::{DexoptError, DexoptResult, ServiceError};
pub use filter::CompilerFilter;
pub use optimizer::{
    adjust_compiler_filter, AdjustedFilter, DexOptimizer, DexoptTarget, FilterAdjustment, Injector,
};
pub use package::{Abi, CodePath, PackageState, SecondaryDexFile};
pub use params::{OptimizeFlags, OptimizeParams, PriorityClass};
pub use provider::{DexContainer, DexInfoProvider, PrimaryDexProvider, SecondaryDexProvider};
pub use result::{DexContainerFileOptimizeResult, OptimizeResult, OptimizeStatus, ResultAggregator};
pub use service::{
    ArtifactsLocation, CompileRequest, CompileResult, CompilerService, DexoptNeededResult,
    DexoptOptions, FileVisibility, ServiceCancellationToken,
};
pub use trigger::{dexopt_trigger, DexoptNeededOptions, DexoptTrigger};

/// Optimize a package's containers.
///
/// Primary containers are processed when `FOR_PRIMARY_DEX` is set, then
/// secondary containers when `FOR_SECONDARY_DEX` is set, unless the request
/// was cancelled in between.
pub fn optimize_package(
    injector: Injector<'_>,
    package: &PackageState,
    params: &OptimizeParams,
    signal: &CancellationSignal,
) -> DexoptResult<OptimizeResult> {
    package.validate()?;
    info!(
        package = %package.name,
        compiler_filter = %params.compiler_filter,
        reason = %params.reason,
        "Optimizing package"
    );

    let mut results = Vec::new();

    if params.flags.contains(OptimizeFlags::FOR_PRIMARY_DEX) {
        let provider = PrimaryDexProvider::new(package);
        results.extend(DexOptimizer::new(injector, package, provider, params, signal)?.dexopt()?);
    }

    let cancelled = results
        .iter()
        .any(|r| r.status == OptimizeStatus::Cancelled);
    if !cancelled && params.flags.contains(OptimizeFlags::FOR_SECONDARY_DEX) {
        let provider = SecondaryDexProvider::new(package);
        results.extend(DexOptimizer::new(injector, package, provider, params, signal)?.dexopt()?);
    }

    Ok(OptimizeResult {
        package_name: package.name.clone(),
        requested_compiler_filter: params.compiler_filter,
        reason: params.reason.clone(),
        results,
    })
}
