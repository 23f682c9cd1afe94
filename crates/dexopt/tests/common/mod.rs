//! In-memory compiler service for driving the engine in tests.
//!
//! The fake keeps just enough state to behave like the real service:
//! compiled artifacts per container/ISA (so staleness follows the trigger),
//! reference and temporary profiles, and metadata files. Every call that
//! matters to an assertion is recorded.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dexopt::paths::{
    ArtifactsPath, DexMetadataPath, OutputProfile, ProfilePath, RefProfilePath, TmpProfilePath,
};
use dexopt::{
    ArtifactsLocation, CancellationSignal, CodePath, CompileRequest, CompileResult, CompilerFilter,
    CompilerService, DexoptNeededResult, DexoptTrigger, FileVisibility, PackageState,
    ServiceCancellationToken, ServiceError,
};

pub const PACKAGE: &str = "com.example.app";
pub const CLC: &str = "PCL[]";

#[derive(Debug, Default)]
pub struct FakeToken {
    cancelled: AtomicBool,
}

impl FakeToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ServiceCancellationToken for FakeToken {
    fn cancel(&self) -> Result<(), ServiceError> {
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted behavior and recorded calls
#[derive(Default)]
pub struct FakeState {
    // --- artifacts ---
    /// Filter of the existing artifacts per (dex path, isa)
    pub artifacts: HashMap<(String, String), CompilerFilter>,
    /// Artifacts that are not readable by other apps
    pub private_artifacts: HashSet<(String, String)>,
    /// Overrides the location reported by staleness queries
    pub artifacts_location: Option<ArtifactsLocation>,
    pub vdex_usable: bool,

    // --- profiles ---
    /// Usable reference profiles and whether they are other-readable
    pub ref_profiles: HashMap<RefProfilePath, bool>,
    /// External profiles available for initialization
    pub external_profiles: HashSet<ProfilePath>,
    /// Temporary profiles currently on disk, with their readability
    pub tmp_profiles: HashMap<TmpProfilePath, bool>,
    /// Whether a merge reports a material change
    pub merge_changes: bool,
    pub fail_merge: bool,
    pub fail_commit: bool,
    pub fail_delete: bool,

    // --- metadata files ---
    pub dm_files: HashSet<String>,

    // --- scripted failures ---
    /// (dex path, isa) pairs whose compile fails operationally
    pub fail_compile: HashSet<(String, String)>,
    /// (dex path, isa) during whose compile the caller cancels
    pub cancel_during: Option<(String, String)>,
    /// Staleness queries fail with a transport error
    pub transport_failure: bool,

    // --- recorded calls ---
    pub queries: Vec<(String, String, CompilerFilter, DexoptTrigger)>,
    pub compiles: Vec<CompileRequest>,
    pub tokens: Vec<Arc<FakeToken>>,
    pub merges: Vec<Option<ProfilePath>>,
    pub committed: Vec<RefProfilePath>,
    pub deleted: Vec<ProfilePath>,
    pub listener_seen_during_compile: Vec<bool>,
}

pub struct FakeCompilerService {
    state: Mutex<FakeState>,
    signal: CancellationSignal,
}

impl FakeCompilerService {
    pub fn new(signal: &CancellationSignal) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            signal: signal.clone(),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn key(dex_path: &str, isa: &str) -> (String, String) {
    (dex_path.to_string(), isa.to_string())
}

impl CompilerService for FakeCompilerService {
    fn get_dexopt_needed(
        &self,
        dex_path: &str,
        isa: &str,
        _class_loader_context: Option<&str>,
        compiler_filter: CompilerFilter,
        trigger: DexoptTrigger,
    ) -> Result<DexoptNeededResult, ServiceError> {
        let mut state = self.state();
        if state.transport_failure {
            return Err(ServiceError::Transport("service died".to_string()));
        }
        state
            .queries
            .push((dex_path.to_string(), isa.to_string(), compiler_filter, trigger));

        let existing = state.artifacts.get(&key(dex_path, isa)).copied();
        let is_dexopt_needed = match existing {
            None => true,
            Some(existing) if compiler_filter > existing => {
                trigger.contains(DexoptTrigger::COMPILER_FILTER_IS_BETTER)
            }
            Some(existing) if compiler_filter == existing => {
                trigger.contains(DexoptTrigger::COMPILER_FILTER_IS_SAME)
            }
            Some(_) => trigger.contains(DexoptTrigger::COMPILER_FILTER_IS_WORSE),
        };
        let artifacts_location = state.artifacts_location.unwrap_or(match existing {
            Some(_) => ArtifactsLocation::NextToDex,
            None => ArtifactsLocation::NoneOrError,
        });

        Ok(DexoptNeededResult {
            is_dexopt_needed,
            is_vdex_usable: state.vdex_usable && existing.is_some(),
            artifacts_location,
        })
    }

    fn dexopt(
        &self,
        request: &CompileRequest,
        _cancellation: &dyn ServiceCancellationToken,
    ) -> Result<CompileResult, ServiceError> {
        let target = key(&request.dex_path, &request.isa);
        let cancel_now = {
            let mut state = self.state();
            state.compiles.push(request.clone());
            state.listener_seen_during_compile.push(self.signal.has_listener());
            if state.fail_compile.contains(&target) {
                return Err(ServiceError::service_specific(-1, "dex2oat crashed"));
            }
            state.cancel_during.as_ref() == Some(&target)
        };

        if cancel_now {
            // The caller cancels while the compiler runs.
            self.signal.cancel();
        }

        let mut state = self.state();
        let token_cancelled = state.tokens.last().map_or(false, |t| t.is_cancelled());
        if token_cancelled {
            return Ok(CompileResult {
                cancelled: true,
                ..Default::default()
            });
        }

        state.artifacts.insert(target.clone(), request.compiler_filter);
        if request.output_artifacts.permission_settings.file_fs_permission.is_other_readable {
            state.private_artifacts.remove(&target);
        } else {
            state.private_artifacts.insert(target);
        }
        Ok(CompileResult {
            cancelled: false,
            wall_time_ms: 120,
            cpu_time_ms: 300,
            size_bytes: 4096,
            size_before_bytes: 1024,
        })
    }

    fn create_cancellation_token(&self) -> Result<Arc<dyn ServiceCancellationToken>, ServiceError> {
        let token = Arc::new(FakeToken::default());
        self.state().tokens.push(Arc::clone(&token));
        Ok(token)
    }

    fn is_profile_usable(
        &self,
        profile: &ProfilePath,
        _dex_path: &str,
    ) -> Result<bool, ServiceError> {
        let state = self.state();
        Ok(match profile {
            ProfilePath::Ref(path) => state.ref_profiles.contains_key(path),
            _ => false,
        })
    }

    fn get_profile_visibility(
        &self,
        profile: &ProfilePath,
    ) -> Result<FileVisibility, ServiceError> {
        let state = self.state();
        let readable = match profile {
            ProfilePath::Ref(path) => state.ref_profiles.get(path).copied(),
            ProfilePath::Tmp(tmp) => state.tmp_profiles.get(tmp).copied(),
            _ => None,
        };
        Ok(match readable {
            None => FileVisibility::NotFound,
            Some(true) => FileVisibility::OtherReadable,
            Some(false) => FileVisibility::NotOtherReadable,
        })
    }

    fn copy_and_rewrite_profile(
        &self,
        src: &ProfilePath,
        output: &OutputProfile,
        _dex_path: &str,
    ) -> Result<bool, ServiceError> {
        let mut state = self.state();
        if !state.external_profiles.contains(src) {
            return Ok(false);
        }
        state
            .tmp_profiles
            .insert(output.profile_path.clone(), output.fs_permission.is_other_readable);
        Ok(true)
    }

    fn merge_profiles(
        &self,
        _current: &[ProfilePath],
        reference: Option<&ProfilePath>,
        output: &OutputProfile,
        _dex_paths: &[String],
    ) -> Result<bool, ServiceError> {
        let mut state = self.state();
        state.merges.push(reference.cloned());
        if state.fail_merge {
            return Err(ServiceError::service_specific(-2, "profman failed"));
        }
        if !state.merge_changes {
            return Ok(false);
        }
        state
            .tmp_profiles
            .insert(output.profile_path.clone(), output.fs_permission.is_other_readable);
        Ok(true)
    }

    fn commit_tmp_profile(&self, profile: &TmpProfilePath) -> Result<(), ServiceError> {
        let mut state = self.state();
        if state.fail_commit {
            return Err(ServiceError::service_specific(-3, "rename failed"));
        }
        let readable = state
            .tmp_profiles
            .remove(profile)
            .ok_or_else(|| ServiceError::service_specific(-4, "no such tmp profile"))?;
        state.ref_profiles.insert(profile.final_path.clone(), readable);
        state.committed.push(profile.final_path.clone());
        Ok(())
    }

    fn delete_profile(&self, profile: &ProfilePath) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.deleted.push(profile.clone());
        if state.fail_delete {
            return Err(ServiceError::service_specific(-5, "unlink failed"));
        }
        if let ProfilePath::Tmp(tmp) = profile {
            state.tmp_profiles.remove(tmp);
        }
        Ok(())
    }

    fn get_artifacts_visibility(
        &self,
        artifacts: &ArtifactsPath,
    ) -> Result<FileVisibility, ServiceError> {
        let state = self.state();
        let target = key(&artifacts.dex_path, &artifacts.isa);
        Ok(if !state.artifacts.contains_key(&target) {
            FileVisibility::NotFound
        } else if state.private_artifacts.contains(&target) {
            FileVisibility::NotOtherReadable
        } else {
            FileVisibility::OtherReadable
        })
    }

    fn get_dm_file_visibility(&self, dm: &DexMetadataPath) -> Result<FileVisibility, ServiceError> {
        Ok(if self.state().dm_files.contains(&dm.dex_path) {
            FileVisibility::OtherReadable
        } else {
            FileVisibility::NotFound
        })
    }
}

/// Path of the `index`-th container
pub fn dex_path(index: usize) -> String {
    if index == 0 {
        format!("/data/app/{}/base.apk", PACKAGE)
    } else {
        format!("/data/app/{}/split_{}.apk", PACKAGE, index)
    }
}

/// A package with `containers` code paths and both a 64- and 32-bit ABI
pub fn package(containers: usize) -> PackageState {
    let code_paths = (0..containers)
        .map(|i| {
            if i == 0 {
                CodePath::base(dex_path(0), Some(CLC))
            } else {
                CodePath::split(format!("split{}", i), dex_path(i), Some(CLC))
            }
        })
        .collect();

    PackageState {
        name: PACKAGE.to_string(),
        app_id: 10_123,
        primary_abi: Some("arm64-v8a".to_string()),
        secondary_abi: Some("armeabi-v7a".to_string()),
        target_sdk_version: 34,
        se_info: "default:targetSdkVersion=34".to_string(),
        user_ids: vec![0],
        code_paths,
        ..Default::default()
    }
}

/// Reference profile of the base container
pub fn base_ref_profile() -> RefProfilePath {
    RefProfilePath::Primary {
        package_name: PACKAGE.to_string(),
        profile_name: "primary".to_string(),
    }
}

/// Run one request against `service`.
pub fn run(
    service: &FakeCompilerService,
    config: &dexopt::DexoptConfig,
    package: &PackageState,
    params: &dexopt::OptimizeParams,
    signal: &CancellationSignal,
) -> dexopt::DexoptResult<dexopt::OptimizeResult> {
    dexopt::optimize_package(dexopt::Injector::new(service, config), package, params, signal)
}
