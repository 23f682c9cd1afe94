//! Package metadata snapshot
//!
//! The package layer (outside this crate) enumerates installed packages and
//! the code containers they own. `PackageState` is the immutable snapshot it
//! hands to the engine for one request.

use crate::error::{DexoptError, DexoptResult};

/// Uid of the system server
pub const SYSTEM_UID: i32 = 1000;
const PER_USER_RANGE: i32 = 100_000;
const FIRST_APPLICATION_UID: i32 = 10_000;
const LAST_APPLICATION_UID: i32 = 19_999;
const FIRST_SHARED_APPLICATION_GID: i32 = 50_000;

/// One code container shipped with the package (base APK or split)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodePath {
    /// `None` for the base container
    pub split_name: Option<String>,
    pub dex_path: String,
    pub has_code: bool,
    /// `None` if no valid class loader context could be computed
    pub class_loader_context: Option<String>,
    /// Recorded as loaded by other apps
    pub used_by_other_apps: bool,
}

impl CodePath {
    pub fn base(dex_path: impl Into<String>, class_loader_context: Option<&str>) -> Self {
        Self {
            split_name: None,
            dex_path: dex_path.into(),
            has_code: true,
            class_loader_context: class_loader_context.map(str::to_string),
            used_by_other_apps: false,
        }
    }

    pub fn split(
        name: impl Into<String>,
        dex_path: impl Into<String>,
        class_loader_context: Option<&str>,
    ) -> Self {
        Self {
            split_name: Some(name.into()),
            ..Self::base(dex_path, class_loader_context)
        }
    }

    pub fn is_base(&self) -> bool {
        self.split_name.is_none()
    }
}

/// A container the app loaded at runtime, as recorded by dex-use tracking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryDexFile {
    pub dex_path: String,
    pub user_id: i32,
    /// `None` if the app loaded it with varying class loader contexts
    pub class_loader_context: Option<String>,
    /// ABI names the container was loaded with
    pub abi_names: Vec<String>,
    pub used_by_other_apps: bool,
    /// The file has the "read" bit for others
    pub is_other_readable: bool,
    /// The file still exists on disk
    pub exists: bool,
}

/// Immutable view of an installed package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageState {
    pub name: String,
    /// Negative for packages without a valid app id
    pub app_id: i32,
    pub primary_abi: Option<String>,
    pub secondary_abi: Option<String>,
    pub is_system: bool,
    pub is_updated_system_app: bool,
    pub is_debuggable: bool,
    pub is_vm_safe_mode: bool,
    pub is_use_embedded_dex: bool,
    pub is_signed_with_platform_key: bool,
    pub is_uses_non_sdk_api: bool,
    pub is_shared_library: bool,
    pub target_sdk_version: i32,
    pub se_info: String,
    pub user_ids: Vec<i32>,
    pub code_paths: Vec<CodePath>,
    pub secondary_dex_files: Vec<SecondaryDexFile>,
}

impl PackageState {
    /// Reject packages the engine cannot reason about.
    pub fn validate(&self) -> DexoptResult<()> {
        if self.app_id < 0 {
            return Err(self.invalid(format!("invalid app ID {}", self.app_id)));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> DexoptError {
        DexoptError::InvalidPackage {
            package: self.name.clone(),
            reason,
        }
    }

    /// Uid of the package for `user_id`
    pub fn uid(&self, user_id: i32) -> DexoptResult<i32> {
        if user_id < 0 {
            return Err(self.invalid(format!("invalid user ID {}", user_id)));
        }
        user_id
            .checked_mul(PER_USER_RANGE)
            .and_then(|base| base.checked_add(self.app_id))
            .ok_or_else(|| self.invalid(format!("uid out of range for user ID {}", user_id)))
    }

    /// Group shared by all users of the package, if it has one
    pub fn shared_app_gid(&self) -> Option<i32> {
        match self.app_id {
            id @ FIRST_APPLICATION_UID..=LAST_APPLICATION_UID => {
                Some(id - FIRST_APPLICATION_UID + FIRST_SHARED_APPLICATION_GID)
            }
            id if id >= 0 && id < FIRST_APPLICATION_UID => Some(id),
            _ => None,
        }
    }

    /// Like [`PackageState::shared_app_gid`], but a missing gid is a broken package
    pub fn require_shared_app_gid(&self) -> DexoptResult<i32> {
        self.shared_app_gid()
            .ok_or_else(|| self.invalid(format!("no shared gid for app ID {}", self.app_id)))
    }

    /// ABIs the package's own containers are compiled for, primary first
    pub fn all_abis(&self) -> DexoptResult<Vec<Abi>> {
        let mut abis = Vec::new();
        if let Some(name) = &self.primary_abi {
            abis.push(Abi::new(name, true, &self.name)?);
        }
        if let Some(name) = &self.secondary_abi {
            abis.push(Abi::new(name, false, &self.name)?);
        }
        if abis.is_empty() {
            return Err(DexoptError::InvalidPackage {
                package: self.name.clone(),
                reason: "no ABI".to_string(),
            });
        }
        Ok(abis)
    }
}

/// A target ABI and the instruction set it compiles to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Abi {
    pub name: String,
    pub isa: String,
    pub is_primary_abi: bool,
}

impl Abi {
    /// Build an ABI from its name. Unknown names are a broken package.
    pub fn new(name: &str, is_primary_abi: bool, package_name: &str) -> DexoptResult<Self> {
        let isa = isa_for_abi(name).ok_or_else(|| DexoptError::InvalidPackage {
            package: package_name.to_string(),
            reason: format!("unsupported ABI '{}'", name),
        })?;
        Ok(Self {
            name: name.to_string(),
            isa: isa.to_string(),
            is_primary_abi,
        })
    }
}

/// Instruction set for an ABI name
pub fn isa_for_abi(abi_name: &str) -> Option<&'static str> {
    match abi_name {
        "armeabi" | "armeabi-v7a" => Some("arm"),
        "arm64-v8a" => Some("arm64"),
        "x86" => Some("x86"),
        "x86_64" => Some("x86_64"),
        "riscv64" => Some("riscv64"),
        _ => None,
    }
}
