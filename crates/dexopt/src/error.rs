//! Dexopt errors
//!
//! Two layers of failure are kept apart here. `ServiceError` is what the
//! compiler service reports; only its `ServiceSpecific` variant is an
//! operational failure the engine may absorb at a narrow scope.
//! `DexoptError` is fatal for the whole request.

use thiserror::Error;

/// Result type for dexopt requests
pub type DexoptResult<T> = Result<T, DexoptError>;

/// Errors reported by the compiler service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service ran the operation and it failed
    #[error("service-specific error {code}: {message}")]
    ServiceSpecific { code: i32, message: String },

    /// The binding to the service itself failed
    #[error("compiler service transport failure: {0}")]
    Transport(String),
}

impl ServiceError {
    /// Shorthand for an operational failure
    pub fn service_specific(code: i32, message: impl Into<String>) -> Self {
        Self::ServiceSpecific {
            code,
            message: message.into(),
        }
    }

    /// Whether the failure is operational (as opposed to a broken binding)
    pub fn is_service_specific(&self) -> bool {
        matches!(self, Self::ServiceSpecific { .. })
    }
}

/// Fatal errors that abort an optimize request
#[derive(Debug, Error)]
pub enum DexoptError {
    /// The package state cannot be optimized at all
    #[error("package '{package}' is invalid: {reason}")]
    InvalidPackage { package: String, reason: String },

    /// A compiler filter string is not recognized
    #[error("invalid compiler filter '{0}'")]
    InvalidCompilerFilter(String),

    /// The service reported a usable VDEX without a location for it
    #[error("unknown artifacts location {location:?} for {dex_path} ({isa})")]
    UnknownArtifactsLocation {
        location: String,
        dex_path: String,
        isa: String,
    },

    /// An internal profile/filter/visibility invariant was broken
    #[error("profile invariant violated for {dex_path}: {detail}")]
    ProfileInvariant { dex_path: String, detail: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// A compiler service call failed in a way that cannot be absorbed
    #[error(transparent)]
    Service(#[from] ServiceError),
}
