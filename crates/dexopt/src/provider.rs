//! Dex info providers
//!
//! A provider answers every per-container policy question that depends on
//! the kind of container. The engine is written once against
//! [`DexInfoProvider`] and is handed either a [`PrimaryDexProvider`] (the
//! package's own base and split containers) or a [`SecondaryDexProvider`]
//! (containers the app loaded at runtime).

use tracing::error;
use uuid::Uuid;

use crate::error::DexoptResult;
use crate::package::{Abi, CodePath, PackageState, SecondaryDexFile, SYSTEM_UID};
use crate::paths::{
    DexMetadataPath, FsPermission, OutputProfile, PermissionSettings, ProfilePath, RefProfilePath,
    SeContext, TmpProfilePath,
};
use crate::service::CompilerService;

/// Common view of a code container
pub trait DexContainer {
    fn dex_path(&self) -> &str;
    fn class_loader_context(&self) -> Option<&str>;
}

impl DexContainer for CodePath {
    fn dex_path(&self) -> &str {
        &self.dex_path
    }

    fn class_loader_context(&self) -> Option<&str> {
        self.class_loader_context.as_deref()
    }
}

impl DexContainer for SecondaryDexFile {
    fn dex_path(&self) -> &str {
        &self.dex_path
    }

    fn class_loader_context(&self) -> Option<&str> {
        self.class_loader_context.as_deref()
    }
}

/// Per-kind container policy
pub trait DexInfoProvider {
    type Info: DexContainer;

    /// Whether artifacts go to the global dalvik-cache directory.
    fn is_in_dalvik_cache(&self) -> bool;

    /// Containers to consider, in processing order.
    fn dex_info_list(&self) -> Vec<Self::Info>;

    fn is_optimizable(&self, info: &Self::Info) -> bool;

    /// Whether the artifacts are shared with other apps. Implies
    /// [`DexInfoProvider::is_dex_file_public`].
    fn needs_to_be_shared(&self, info: &Self::Info) -> bool;

    /// Whether the container file is readable by others.
    fn is_dex_file_public(&self, info: &Self::Info) -> bool;

    /// Initialize a temporary reference profile from an external profile, if
    /// one exists.
    fn init_reference_profile(
        &self,
        service: &dyn CompilerService,
        info: &Self::Info,
    ) -> DexoptResult<Option<ProfilePath>>;

    fn permission_settings(
        &self,
        info: &Self::Info,
        can_be_public: bool,
    ) -> DexoptResult<PermissionSettings>;

    /// ABIs to compile for, in order.
    fn all_abis(&self, info: &Self::Info) -> DexoptResult<Vec<Abi>>;

    fn ref_profile_path(&self, info: &Self::Info) -> RefProfilePath;

    fn is_app_image_allowed(&self, info: &Self::Info) -> bool;

    /// A fresh temporary profile destination for this container.
    fn output_profile(&self, info: &Self::Info, is_public: bool) -> DexoptResult<OutputProfile>;

    fn current_profiles(&self, info: &Self::Info) -> Vec<ProfilePath>;

    /// Metadata file to pass to the compiler, if the kind has one.
    fn dm_path(&self, info: &Self::Info) -> Option<DexMetadataPath>;
}

fn new_tmp_profile_path(final_path: RefProfilePath) -> TmpProfilePath {
    TmpProfilePath {
        final_path,
        id: Uuid::new_v4().to_string(),
    }
}

// ============================================================================
// Primary containers
// ============================================================================

/// Policy for the package's base and split containers
#[derive(Debug, Clone, Copy)]
pub struct PrimaryDexProvider<'a> {
    package: &'a PackageState,
}

impl<'a> PrimaryDexProvider<'a> {
    pub fn new(package: &'a PackageState) -> Self {
        Self { package }
    }

    fn profile_name(info: &CodePath) -> String {
        match &info.split_name {
            None => "primary".to_string(),
            Some(split) => format!("{}.split", split),
        }
    }

}

impl DexInfoProvider for PrimaryDexProvider<'_> {
    type Info = CodePath;

    fn is_in_dalvik_cache(&self) -> bool {
        self.package.is_system && !self.package.is_updated_system_app
    }

    fn dex_info_list(&self) -> Vec<CodePath> {
        self.package.code_paths.clone()
    }

    fn is_optimizable(&self, info: &CodePath) -> bool {
        info.has_code
    }

    fn needs_to_be_shared(&self, info: &CodePath) -> bool {
        self.package.is_shared_library || info.used_by_other_apps
    }

    fn is_dex_file_public(&self, _info: &CodePath) -> bool {
        true
    }

    fn init_reference_profile(
        &self,
        service: &dyn CompilerService,
        info: &CodePath,
    ) -> DexoptResult<Option<ProfilePath>> {
        let output = self.output_profile(info, true)?;

        let sources = [
            ProfilePath::Prebuilt {
                dex_path: info.dex_path.clone(),
            },
            ProfilePath::Dm {
                dex_path: info.dex_path.clone(),
            },
        ];
        for source in &sources {
            match service.copy_and_rewrite_profile(source, &output, &info.dex_path) {
                Ok(true) => return Ok(Some(ProfilePath::Tmp(output.profile_path))),
                Ok(false) => {}
                Err(e) if e.is_service_specific() => {
                    error!(
                        package = %self.package.name,
                        dex_path = %info.dex_path,
                        "Failed to initialize profile from {}: {}",
                        source,
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    fn permission_settings(
        &self,
        _info: &CodePath,
        can_be_public: bool,
    ) -> DexoptResult<PermissionSettings> {
        let gid = self.package.require_shared_app_gid()?;
        Ok(PermissionSettings {
            dir_fs_permission: FsPermission::new(SYSTEM_UID, gid, false)
                .with_other_executable(true),
            file_fs_permission: FsPermission::new(SYSTEM_UID, gid, can_be_public),
            se_context: None,
        })
    }

    fn all_abis(&self, _info: &CodePath) -> DexoptResult<Vec<Abi>> {
        self.package.all_abis()
    }

    fn ref_profile_path(&self, info: &CodePath) -> RefProfilePath {
        RefProfilePath::Primary {
            package_name: self.package.name.clone(),
            profile_name: Self::profile_name(info),
        }
    }

    fn is_app_image_allowed(&self, info: &CodePath) -> bool {
        info.is_base()
    }

    fn output_profile(&self, info: &CodePath, is_public: bool) -> DexoptResult<OutputProfile> {
        let gid = self.package.require_shared_app_gid()?;
        Ok(OutputProfile {
            profile_path: new_tmp_profile_path(self.ref_profile_path(info)),
            fs_permission: FsPermission::new(SYSTEM_UID, gid, is_public),
        })
    }

    fn current_profiles(&self, info: &CodePath) -> Vec<ProfilePath> {
        let profile_name = Self::profile_name(info);
        self.package
            .user_ids
            .iter()
            .map(|&user_id| ProfilePath::PrimaryCur {
                user_id,
                package_name: self.package.name.clone(),
                profile_name: profile_name.clone(),
            })
            .collect()
    }

    fn dm_path(&self, info: &CodePath) -> Option<DexMetadataPath> {
        Some(DexMetadataPath {
            dex_path: info.dex_path.clone(),
        })
    }
}

// ============================================================================
// Secondary containers
// ============================================================================

/// Policy for containers the app loaded at runtime
#[derive(Debug, Clone, Copy)]
pub struct SecondaryDexProvider<'a> {
    package: &'a PackageState,
}

impl<'a> SecondaryDexProvider<'a> {
    pub fn new(package: &'a PackageState) -> Self {
        Self { package }
    }
}

impl DexInfoProvider for SecondaryDexProvider<'_> {
    type Info = SecondaryDexFile;

    fn is_in_dalvik_cache(&self) -> bool {
        false
    }

    fn dex_info_list(&self) -> Vec<SecondaryDexFile> {
        self.package.secondary_dex_files.clone()
    }

    fn is_optimizable(&self, info: &SecondaryDexFile) -> bool {
        info.exists
    }

    fn needs_to_be_shared(&self, info: &SecondaryDexFile) -> bool {
        info.used_by_other_apps
    }

    fn is_dex_file_public(&self, info: &SecondaryDexFile) -> bool {
        info.is_other_readable
    }

    fn init_reference_profile(
        &self,
        _service: &dyn CompilerService,
        _info: &SecondaryDexFile,
    ) -> DexoptResult<Option<ProfilePath>> {
        // Secondary containers never ship with a profile.
        Ok(None)
    }

    fn permission_settings(
        &self,
        info: &SecondaryDexFile,
        can_be_public: bool,
    ) -> DexoptResult<PermissionSettings> {
        let uid = self.package.uid(info.user_id)?;
        Ok(PermissionSettings {
            dir_fs_permission: FsPermission::new(uid, uid, false)
                .with_other_executable(can_be_public),
            file_fs_permission: FsPermission::new(uid, uid, can_be_public),
            se_context: Some(SeContext {
                se_info: self.package.se_info.clone(),
                uid,
            }),
        })
    }

    fn all_abis(&self, info: &SecondaryDexFile) -> DexoptResult<Vec<Abi>> {
        info.abi_names
            .iter()
            .map(|name| {
                let is_primary = self.package.primary_abi.as_deref() == Some(name.as_str());
                Abi::new(name, is_primary, &self.package.name)
            })
            .collect()
    }

    fn ref_profile_path(&self, info: &SecondaryDexFile) -> RefProfilePath {
        RefProfilePath::Secondary {
            dex_path: info.dex_path.clone(),
        }
    }

    fn is_app_image_allowed(&self, _info: &SecondaryDexFile) -> bool {
        false
    }

    fn output_profile(
        &self,
        info: &SecondaryDexFile,
        is_public: bool,
    ) -> DexoptResult<OutputProfile> {
        let uid = self.package.uid(info.user_id)?;
        Ok(OutputProfile {
            profile_path: new_tmp_profile_path(self.ref_profile_path(info)),
            fs_permission: FsPermission::new(uid, uid, is_public),
        })
    }

    fn current_profiles(&self, info: &SecondaryDexFile) -> Vec<ProfilePath> {
        vec![ProfilePath::SecondaryCur {
            dex_path: info.dex_path.clone(),
        }]
    }

    fn dm_path(&self, _info: &SecondaryDexFile) -> Option<DexMetadataPath> {
        None
    }
}
