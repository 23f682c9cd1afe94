//! Dexopt driver
//!
//! [`DexOptimizer`] runs the per-container control loop for one package and
//! one container kind:
//!
//! ```text
//! for each container:
//!     adjust filter -> resolve profile -> settle visibility
//!     for each ABI:
//!         trigger -> staleness query -> compile (cancellable)
//!     commit or discard the temporary profile
//! ```
//!
//! Operational failures of the compiler service are contained to a single
//! ABI. Cancellation stops everything and returns what was recorded so far.

use std::sync::Arc;

use dexopt_runtime::CancellationSignal;
use tracing::{debug, error, info};

use crate::config::DexoptConfig;
use crate::error::{DexoptError, DexoptResult};
use crate::filter::CompilerFilter;
use crate::package::PackageState;
use crate::params::OptimizeParams;
use crate::paths::{
    ArtifactsPath, DexMetadataPath, OutputArtifacts, PermissionSettings, ProfilePath, VdexPath,
};
use crate::profile::{cleanup_current_profiles, resolve_profile, HeldProfile, ProfileState};
use crate::provider::{DexContainer, DexInfoProvider};
use crate::reason::reason_for_compile;
use crate::result::{DexContainerFileOptimizeResult, OptimizeStatus, ResultAggregator};
use crate::service::{
    ArtifactsLocation, CompileRequest, CompileResult, CompilerService, DexoptNeededResult,
    DexoptOptions, FileVisibility, ServiceCancellationToken,
};
use crate::trigger::{dexopt_trigger, DexoptNeededOptions};

/// Collaborators the engine depends on
#[derive(Clone, Copy)]
pub struct Injector<'a> {
    pub service: &'a dyn CompilerService,
    pub config: &'a DexoptConfig,
}

impl<'a> Injector<'a> {
    pub fn new(service: &'a dyn CompilerService, config: &'a DexoptConfig) -> Self {
        Self { service, config }
    }
}

// ============================================================================
// Filter adjustment
// ============================================================================

/// Which rule decided the adjusted filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAdjustment {
    /// The configured system UI override
    SystemUiOverride,
    /// Debuggable or safe-mode package
    SafeMode,
    /// No class loader context, so no AOT compilation
    NoClassLoaderContext,
    /// The package runs its embedded dex code directly
    EmbeddedDex,
    /// The requested filter, unchanged
    Requested,
}

/// An adjusted filter and the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustedFilter {
    pub filter: CompilerFilter,
    pub rule: FilterAdjustment,
}

/// Adjust the requested filter for a container. The first matching rule wins.
pub fn adjust_compiler_filter(
    config: &DexoptConfig,
    package: &PackageState,
    requested: CompilerFilter,
    class_loader_context: Option<&str>,
) -> AdjustedFilter {
    let adjusted = |filter, rule| AdjustedFilter { filter, rule };

    if config.is_system_ui_package(&package.name) {
        if let Some(filter) = config.system_ui_compiler_filter {
            return adjusted(filter, FilterAdjustment::SystemUiOverride);
        }
    }

    // The runtime ignores compiled code of debuggable apps, and such apps
    // tend to have enough methods to make the compiler run out of memory.
    if package.is_vm_safe_mode || package.is_debuggable {
        return adjusted(requested.safe_mode(), FilterAdjustment::SafeMode);
    }

    if class_loader_context.is_none() {
        return adjusted(verify_if_optimized(requested), FilterAdjustment::NoClassLoaderContext);
    }

    // The app wants to run the uncompressed dex in its APK; only verify it.
    if package.is_use_embedded_dex {
        return adjusted(verify_if_optimized(requested), FilterAdjustment::EmbeddedDex);
    }

    adjusted(requested, FilterAdjustment::Requested)
}

fn verify_if_optimized(filter: CompilerFilter) -> CompilerFilter {
    if filter.is_optimized() {
        CompilerFilter::Verify
    } else {
        filter
    }
}

/// Whether hidden API restrictions apply to the package
pub fn is_hidden_api_policy_enabled(package: &PackageState) -> bool {
    if package.is_signed_with_platform_key {
        return false;
    }
    if package.is_system || package.is_updated_system_app {
        return !package.is_uses_non_sdk_api;
    }
    true
}

// ============================================================================
// Driver
// ============================================================================

/// One container compiled for one ISA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexoptTarget<'i> {
    pub dex_path: &'i str,
    pub class_loader_context: Option<&'i str>,
    pub isa: &'i str,
    pub is_in_dalvik_cache: bool,
    pub compiler_filter: CompilerFilter,
}

impl DexoptTarget<'_> {
    fn artifacts_path(&self, is_in_dalvik_cache: bool) -> ArtifactsPath {
        ArtifactsPath::new(self.dex_path, self.isa, is_in_dalvik_cache)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerFlow {
    Continue,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct AbiRun {
    status: OptimizeStatus,
    compiled: CompileResult,
}

impl AbiRun {
    fn with_status(status: OptimizeStatus) -> Self {
        Self {
            status,
            compiled: CompileResult::default(),
        }
    }
}

/// Optimizes every container of one kind for one package
pub struct DexOptimizer<'a, P: DexInfoProvider> {
    injector: Injector<'a>,
    package: &'a PackageState,
    provider: P,
    params: &'a OptimizeParams,
    signal: &'a CancellationSignal,
}

impl<'a, P: DexInfoProvider> DexOptimizer<'a, P> {
    pub fn new(
        injector: Injector<'a>,
        package: &'a PackageState,
        provider: P,
        params: &'a OptimizeParams,
        signal: &'a CancellationSignal,
    ) -> DexoptResult<Self> {
        package.validate()?;
        Ok(Self {
            injector,
            package,
            provider,
            params,
            signal,
        })
    }

    /// Run the loop. Returns one result per container/ABI that reached the
    /// staleness check; stops early on cancellation.
    pub fn dexopt(&self) -> DexoptResult<Vec<DexContainerFileOptimizeResult>> {
        let mut aggregator = ResultAggregator::new();

        for info in self.provider.dex_info_list() {
            if self.dexopt_container(&info, &mut aggregator)? == ContainerFlow::Cancelled {
                info!(package = %self.package.name, "Dexopt cancelled");
                break;
            }
        }

        Ok(aggregator.into_results())
    }

    fn dexopt_container(
        &self,
        info: &P::Info,
        aggregator: &mut ResultAggregator,
    ) -> DexoptResult<ContainerFlow> {
        let service = self.injector.service;

        if !self.provider.is_optimizable(info) {
            return Ok(ContainerFlow::Continue);
        }

        let adjusted = adjust_compiler_filter(
            self.injector.config,
            self.package,
            self.params.compiler_filter,
            info.class_loader_context(),
        );
        debug!(
            dex_path = info.dex_path(),
            "Compiler filter {} -> {} ({:?})",
            self.params.compiler_filter,
            adjusted.filter,
            adjusted.rule
        );
        let mut compiler_filter = adjusted.filter;
        if compiler_filter.is_skip() {
            return Ok(ContainerFlow::Continue);
        }

        let needs_to_be_shared = self.provider.needs_to_be_shared(info);
        let mut profile = HeldProfile::new(service);
        let mut profile_state = ProfileState::default();
        if compiler_filter.is_profile_guided() {
            profile_state =
                resolve_profile(service, &self.provider, info, needs_to_be_shared, &mut profile)?;
            if !profile.is_some() {
                // Without a profile this is a plain verification compile.
                // Say so explicitly, so that visibility and staleness are
                // decided for the filter that really runs.
                compiler_filter = if needs_to_be_shared {
                    self.injector.config.shared_compiler_filter
                } else {
                    CompilerFilter::Verify
                };
            }
        }

        let is_profile_guided = compiler_filter.is_profile_guided();
        if is_profile_guided != profile.is_some() {
            return Err(DexoptError::ProfileInvariant {
                dex_path: info.dex_path().to_string(),
                detail: format!(
                    "filter '{}' with profile {:?}",
                    compiler_filter,
                    profile.path()
                ),
            });
        }

        let can_be_public = (!is_profile_guided || profile_state.is_other_readable)
            && self.provider.is_dex_file_public(info);
        if needs_to_be_shared && !can_be_public {
            return Err(DexoptError::ProfileInvariant {
                dex_path: info.dex_path().to_string(),
                detail: "shared artifacts cannot be public".to_string(),
            });
        }
        let permission_settings = self.provider.permission_settings(info, can_be_public)?;
        let options = self.dexopt_options(info, is_profile_guided);
        let needed_options = DexoptNeededOptions {
            flags: self.params.flags,
            profile_merged: profile_state.profile_merged,
            needs_to_be_public: needs_to_be_shared,
        };

        aggregator.begin_container();
        for abi in self.provider.all_abis(info)? {
            let target = DexoptTarget {
                dex_path: info.dex_path(),
                class_loader_context: info.class_loader_context(),
                isa: &abi.isa,
                is_in_dalvik_cache: self.provider.is_in_dalvik_cache(),
                compiler_filter,
            };

            let run = match self.dexopt_target(
                &target,
                info,
                profile.path(),
                &needed_options,
                &permission_settings,
                &options,
            ) {
                Ok(run) => run,
                Err(DexoptError::Service(e)) if e.is_service_specific() => {
                    error!(
                        package = %self.package.name,
                        dex_path = target.dex_path,
                        isa = target.isa,
                        class_loader_context = ?target.class_loader_context,
                        compiler_filter = %compiler_filter,
                        "Failed to dexopt: {}",
                        e
                    );
                    AbiRun::with_status(OptimizeStatus::Failed)
                }
                Err(e) => return Err(e),
            };

            aggregator.record(DexContainerFileOptimizeResult {
                dex_path: info.dex_path().to_string(),
                is_primary_abi: abi.is_primary_abi,
                abi_name: abi.name.clone(),
                actual_compiler_filter: compiler_filter,
                status: run.status,
                wall_time_ms: run.compiled.wall_time_ms,
                cpu_time_ms: run.compiled.cpu_time_ms,
                size_bytes: run.compiled.size_bytes,
                size_before_bytes: run.compiled.size_before_bytes,
            });

            if run.status == OptimizeStatus::Cancelled {
                return Ok(ContainerFlow::Cancelled);
            }
        }

        if profile.is_some() && aggregator.container_succeeded() {
            let committed = profile.is_temporary() && profile.commit()?;
            if committed && profile_state.profile_merged {
                cleanup_current_profiles(service, &self.provider, info);
            }
        }

        Ok(ContainerFlow::Continue)
    }

    fn dexopt_target(
        &self,
        target: &DexoptTarget<'_>,
        info: &P::Info,
        profile: Option<&ProfilePath>,
        needed_options: &DexoptNeededOptions,
        permission_settings: &PermissionSettings,
        options: &DexoptOptions,
    ) -> DexoptResult<AbiRun> {
        let service = self.injector.service;

        let needed = self.get_dexopt_needed(target, needed_options)?;
        if !needed.is_dexopt_needed {
            debug!(dex_path = target.dex_path, isa = target.isa, "Artifacts are up to date");
            return Ok(AbiRun::with_status(OptimizeStatus::Skipped));
        }

        let token = service.create_cancellation_token()?;
        let forward = Arc::clone(&token);
        // Scoped to this invocation: the caller may hold the signal forever.
        let _subscription = self.signal.subscribe(move || {
            if let Err(e) = forward.cancel() {
                error!("An error occurred when sending a cancellation signal: {}", e);
            }
        });

        let compiled = self.dexopt_file(
            target,
            info,
            profile,
            &needed,
            permission_settings,
            options,
            token.as_ref(),
        )?;

        let status = if compiled.cancelled {
            OptimizeStatus::Cancelled
        } else {
            OptimizeStatus::Performed
        };
        info!(
            dex_path = target.dex_path,
            isa = target.isa,
            compiler_filter = %target.compiler_filter,
            wall_time_ms = compiled.wall_time_ms,
            size_bytes = compiled.size_bytes,
            "Dexopt {}",
            status
        );
        Ok(AbiRun { status, compiled })
    }

    fn get_dexopt_needed(
        &self,
        target: &DexoptTarget<'_>,
        options: &DexoptNeededOptions,
    ) -> DexoptResult<DexoptNeededResult> {
        let service = self.injector.service;
        let existing = target.artifacts_path(target.is_in_dalvik_cache);
        let trigger = dexopt_trigger(options, || service.get_artifacts_visibility(&existing))?;

        // Always ask, even for a full trigger: the answer also says which
        // VDEX can be reused. A `None` context skips the context check.
        Ok(service.get_dexopt_needed(
            target.dex_path,
            target.isa,
            target.class_loader_context,
            target.compiler_filter,
            trigger,
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    fn dexopt_file(
        &self,
        target: &DexoptTarget<'_>,
        info: &P::Info,
        profile: Option<&ProfilePath>,
        needed: &DexoptNeededResult,
        permission_settings: &PermissionSettings,
        options: &DexoptOptions,
        token: &dyn ServiceCancellationToken,
    ) -> DexoptResult<CompileResult> {
        let input_vdex = input_vdex(needed, target)?;
        let dm_file = self.dm_file(info)?;

        let mut options = options.clone();
        options.compilation_reason =
            reason_for_compile(&options.compilation_reason, dm_file.is_some());

        let request = CompileRequest {
            output_artifacts: OutputArtifacts {
                artifacts_path: target.artifacts_path(target.is_in_dalvik_cache),
                permission_settings: permission_settings.clone(),
            },
            dex_path: target.dex_path.to_string(),
            isa: target.isa.to_string(),
            class_loader_context: target.class_loader_context.map(str::to_string),
            compiler_filter: target.compiler_filter,
            profile: profile.cloned(),
            input_vdex,
            dm_file,
            priority_class: self.params.priority_class,
            options,
        };

        Ok(self.injector.service.dexopt(&request, token)?)
    }

    fn dm_file(&self, info: &P::Info) -> DexoptResult<Option<DexMetadataPath>> {
        let Some(path) = self.provider.dm_path(info) else {
            return Ok(None);
        };
        match self.injector.service.get_dm_file_visibility(&path) {
            Ok(FileVisibility::NotFound) => Ok(None),
            Ok(_) => Ok(Some(path)),
            Err(e) if e.is_service_specific() => {
                error!(dex_path = info.dex_path(), "Failed to check DM file: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn dexopt_options(&self, info: &P::Info, is_profile_guided: bool) -> DexoptOptions {
        let config = self.injector.config;
        DexoptOptions {
            compilation_reason: self.params.reason.clone(),
            target_sdk_version: self.package.target_sdk_version,
            debuggable: self.package.is_debuggable || config.always_debuggable,
            // Without a profile there is nothing to put in the image.
            generate_app_image: is_profile_guided
                && self.provider.is_app_image_allowed(info)
                && config.is_app_image_enabled(),
            hidden_api_policy_enabled: is_hidden_api_policy_enabled(self.package),
        }
    }
}

/// The VDEX to reuse as compile input, if any.
fn input_vdex(
    needed: &DexoptNeededResult,
    target: &DexoptTarget<'_>,
) -> DexoptResult<Option<VdexPath>> {
    if !needed.is_vdex_usable {
        return Ok(None);
    }
    match needed.artifacts_location {
        ArtifactsLocation::DalvikCache => {
            Ok(Some(VdexPath::Artifacts(target.artifacts_path(true))))
        }
        ArtifactsLocation::NextToDex => {
            Ok(Some(VdexPath::Artifacts(target.artifacts_path(false))))
        }
        // The metadata file is passed on its own whenever it exists.
        ArtifactsLocation::Dm => Ok(None),
        ArtifactsLocation::NoneOrError => Err(DexoptError::UnknownArtifactsLocation {
            location: format!("{:?}", needed.artifacts_location),
            dex_path: target.dex_path.to_string(),
            isa: target.isa.to_string(),
        }),
    }
}
