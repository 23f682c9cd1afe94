//! Descriptors for files the compiler service operates on
//!
//! The engine never touches the filesystem itself. It only builds these
//! descriptors and hands them to the compiler service, which resolves them
//! to real paths.

use std::fmt;

/// Durable reference profile location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefProfilePath {
    /// Reference profile of a primary container
    Primary {
        package_name: String,
        profile_name: String,
    },
    /// Reference profile of a secondary container
    Secondary { dex_path: String },
}

/// An uncommitted profile that will replace `final_path` on commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TmpProfilePath {
    pub final_path: RefProfilePath,
    /// Unique suffix that keeps concurrent writers apart
    pub id: String,
}

/// Any profile the engine may read, write or delete
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfilePath {
    Ref(RefProfilePath),
    Tmp(TmpProfilePath),
    /// Profile shipped next to the container (`<dex>.prof`)
    Prebuilt { dex_path: String },
    /// Profile embedded in the container's metadata file
    Dm { dex_path: String },
    /// Runtime-collected profile of a primary container for one user
    PrimaryCur {
        user_id: i32,
        package_name: String,
        profile_name: String,
    },
    /// Runtime-collected profile of a secondary container
    SecondaryCur { dex_path: String },
}

impl ProfilePath {
    /// Whether this profile is uncommitted
    pub fn is_temporary(&self) -> bool {
        matches!(self, ProfilePath::Tmp(_))
    }

    pub fn as_tmp(&self) -> Option<&TmpProfilePath> {
        match self {
            ProfilePath::Tmp(tmp) => Some(tmp),
            _ => None,
        }
    }
}

impl fmt::Display for RefProfilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefProfilePath::Primary {
                package_name,
                profile_name,
            } => write!(f, "ref:{}/{}", package_name, profile_name),
            RefProfilePath::Secondary { dex_path } => write!(f, "ref:{}", dex_path),
        }
    }
}

impl fmt::Display for ProfilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfilePath::Ref(path) => path.fmt(f),
            ProfilePath::Tmp(tmp) => write!(f, "tmp:{}#{}", tmp.final_path, tmp.id),
            ProfilePath::Prebuilt { dex_path } => write!(f, "prebuilt:{}.prof", dex_path),
            ProfilePath::Dm { dex_path } => write!(f, "dm:{}", dex_path),
            ProfilePath::PrimaryCur {
                user_id,
                package_name,
                profile_name,
            } => write!(f, "cur:{}/{}/{}", user_id, package_name, profile_name),
            ProfilePath::SecondaryCur { dex_path } => write!(f, "cur:{}", dex_path),
        }
    }
}

/// Filesystem ownership and mode for files the service creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsPermission {
    pub uid: i32,
    pub gid: i32,
    pub is_other_readable: bool,
    pub is_other_executable: bool,
}

impl FsPermission {
    pub fn new(uid: i32, gid: i32, is_other_readable: bool) -> Self {
        Self {
            uid,
            gid,
            is_other_readable,
            is_other_executable: false,
        }
    }

    pub fn with_other_executable(mut self, is_other_executable: bool) -> Self {
        self.is_other_executable = is_other_executable;
        self
    }
}

/// SELinux labelling input, computed by the package layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeContext {
    pub se_info: String,
    pub uid: i32,
}

/// Permissions applied to generated artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSettings {
    pub dir_fs_permission: FsPermission,
    pub file_fs_permission: FsPermission,
    pub se_context: Option<SeContext>,
}

/// Where a temporary profile is written before commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputProfile {
    pub profile_path: TmpProfilePath,
    pub fs_permission: FsPermission,
}

/// Location of compiled artifacts for one container and ISA
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactsPath {
    pub dex_path: String,
    pub isa: String,
    pub is_in_dalvik_cache: bool,
}

impl ArtifactsPath {
    pub fn new(
        dex_path: impl Into<String>,
        isa: impl Into<String>,
        is_in_dalvik_cache: bool,
    ) -> Self {
        Self {
            dex_path: dex_path.into(),
            isa: isa.into(),
            is_in_dalvik_cache,
        }
    }
}

/// Artifacts the compile step produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifacts {
    pub artifacts_path: ArtifactsPath,
    pub permission_settings: PermissionSettings,
}

/// Existing VDEX reused as compile input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdexPath {
    Artifacts(ArtifactsPath),
}

/// Metadata file that accompanies a container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DexMetadataPath {
    pub dex_path: String,
}
