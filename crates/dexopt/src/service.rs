//! Compiler service interface
//!
//! The compiler service owns everything that touches the filesystem or runs
//! native tools: staleness checks, the compile step itself, and the profile
//! primitives. The engine talks to it only through [`CompilerService`].
//!
//! Every method may fail with [`ServiceError`]. `ServiceSpecific` failures
//! are operational and the engine absorbs them at the narrowest sensible
//! scope; `Transport` failures abort the request.

use std::sync::Arc;

use crate::error::ServiceError;
use crate::filter::CompilerFilter;
use crate::params::PriorityClass;
use crate::paths::{
    ArtifactsPath, DexMetadataPath, OutputArtifacts, OutputProfile, ProfilePath, TmpProfilePath,
    VdexPath,
};
use crate::trigger::DexoptTrigger;

/// Visibility of a file to other apps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVisibility {
    NotFound,
    OtherReadable,
    NotOtherReadable,
}

/// Where the existing artifacts of a container live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactsLocation {
    /// No usable artifacts, or the lookup failed
    NoneOrError,
    DalvikCache,
    NextToDex,
    /// Artifacts come from the container's metadata file
    Dm,
}

/// Answer to a staleness query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexoptNeededResult {
    pub is_dexopt_needed: bool,
    pub is_vdex_usable: bool,
    pub artifacts_location: ArtifactsLocation,
}

/// Options derived from the package and configuration for a compile call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexoptOptions {
    pub compilation_reason: String,
    pub target_sdk_version: i32,
    pub debuggable: bool,
    pub generate_app_image: bool,
    pub hidden_api_policy_enabled: bool,
}

/// Everything the compile step needs for one container and ISA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub output_artifacts: OutputArtifacts,
    pub dex_path: String,
    pub isa: String,
    pub class_loader_context: Option<String>,
    pub compiler_filter: CompilerFilter,
    pub profile: Option<ProfilePath>,
    pub input_vdex: Option<VdexPath>,
    pub dm_file: Option<DexMetadataPath>,
    pub priority_class: PriorityClass,
    pub options: DexoptOptions,
}

/// Outcome of a compile call that did not fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileResult {
    pub cancelled: bool,
    pub wall_time_ms: u64,
    pub cpu_time_ms: u64,
    pub size_bytes: u64,
    pub size_before_bytes: u64,
}

/// Per-invocation cancellation token issued by the service
pub trait ServiceCancellationToken: Send + Sync {
    /// Ask the service to stop the invocation this token was passed to.
    fn cancel(&self) -> Result<(), ServiceError>;
}

/// The compiler service
pub trait CompilerService {
    /// Ask whether the artifacts for `dex_path`/`isa` are stale under `trigger`.
    ///
    /// A `None` class loader context skips the context check.
    fn get_dexopt_needed(
        &self,
        dex_path: &str,
        isa: &str,
        class_loader_context: Option<&str>,
        compiler_filter: CompilerFilter,
        trigger: DexoptTrigger,
    ) -> Result<DexoptNeededResult, ServiceError>;

    /// Compile. Blocks until done or cancelled through `cancellation`.
    fn dexopt(
        &self,
        request: &CompileRequest,
        cancellation: &dyn ServiceCancellationToken,
    ) -> Result<CompileResult, ServiceError>;

    /// Issue a fresh cancellation token for one compile call.
    fn create_cancellation_token(
        &self,
    ) -> Result<Arc<dyn ServiceCancellationToken>, ServiceError>;

    /// Whether `profile` exists and matches the current content of `dex_path`.
    fn is_profile_usable(
        &self,
        profile: &ProfilePath,
        dex_path: &str,
    ) -> Result<bool, ServiceError>;

    fn get_profile_visibility(&self, profile: &ProfilePath) -> Result<FileVisibility, ServiceError>;

    /// Copy `src` into `output`, rewriting it for `dex_path`. Returns false if
    /// `src` does not exist or is unusable.
    fn copy_and_rewrite_profile(
        &self,
        src: &ProfilePath,
        output: &OutputProfile,
        dex_path: &str,
    ) -> Result<bool, ServiceError>;

    /// Merge `current` profiles into `reference`, writing to `output`.
    /// Returns true iff the output differs materially from `reference`.
    fn merge_profiles(
        &self,
        current: &[ProfilePath],
        reference: Option<&ProfilePath>,
        output: &OutputProfile,
        dex_paths: &[String],
    ) -> Result<bool, ServiceError>;

    /// Atomically move a temporary profile to its final path.
    fn commit_tmp_profile(&self, profile: &TmpProfilePath) -> Result<(), ServiceError>;

    fn delete_profile(&self, profile: &ProfilePath) -> Result<(), ServiceError>;

    fn get_artifacts_visibility(
        &self,
        artifacts: &ArtifactsPath,
    ) -> Result<FileVisibility, ServiceError>;

    fn get_dm_file_visibility(&self, dm: &DexMetadataPath) -> Result<FileVisibility, ServiceError>;
}
