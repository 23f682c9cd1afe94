//! Compiler filters
//!
//! A compiler filter names a compilation strategy. Filters are totally
//! ordered from weakest (`assume-verified`) to strongest (`everything`);
//! the `*-profile` filters only compile what a profile marks as hot.
//!
//! `skip` is not a real filter: it tells the engine to leave a container
//! alone entirely.

use std::fmt;
use std::str::FromStr;

use crate::error::DexoptError;

/// A compiler filter, or the `skip` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompilerFilter {
    AssumeVerified,
    Extract,
    Verify,
    SpaceProfile,
    Space,
    SpeedProfile,
    Speed,
    EverythingProfile,
    Everything,
    /// Do nothing for the container
    Skip,
}

impl CompilerFilter {
    /// All real filters, weakest first
    pub const ALL: [CompilerFilter; 9] = [
        CompilerFilter::AssumeVerified,
        CompilerFilter::Extract,
        CompilerFilter::Verify,
        CompilerFilter::SpaceProfile,
        CompilerFilter::Space,
        CompilerFilter::SpeedProfile,
        CompilerFilter::Speed,
        CompilerFilter::EverythingProfile,
        CompilerFilter::Everything,
    ];

    /// The name understood by the compiler
    pub fn as_str(self) -> &'static str {
        match self {
            CompilerFilter::AssumeVerified => "assume-verified",
            CompilerFilter::Extract => "extract",
            CompilerFilter::Verify => "verify",
            CompilerFilter::SpaceProfile => "space-profile",
            CompilerFilter::Space => "space",
            CompilerFilter::SpeedProfile => "speed-profile",
            CompilerFilter::Speed => "speed",
            CompilerFilter::EverythingProfile => "everything-profile",
            CompilerFilter::Everything => "everything",
            CompilerFilter::Skip => "skip",
        }
    }

    /// Whether this is the no-op sentinel
    pub fn is_skip(self) -> bool {
        self == CompilerFilter::Skip
    }

    /// Whether compilation with this filter is steered by a profile
    pub fn is_profile_guided(self) -> bool {
        matches!(
            self,
            CompilerFilter::SpaceProfile
                | CompilerFilter::SpeedProfile
                | CompilerFilter::EverythingProfile
        )
    }

    /// Whether this filter produces compiled code, i.e. is stronger than `verify`
    pub fn is_optimized(self) -> bool {
        !self.is_skip() && self > CompilerFilter::Verify
    }

    /// The filter to use when the runtime will ignore compiled code anyway
    pub fn safe_mode(self) -> CompilerFilter {
        if self.is_optimized() {
            CompilerFilter::Verify
        } else {
            self
        }
    }
}

impl fmt::Display for CompilerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompilerFilter {
    type Err = DexoptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CompilerFilter::Skip.as_str() {
            return Ok(CompilerFilter::Skip);
        }
        CompilerFilter::ALL
            .iter()
            .copied()
            .find(|filter| filter.as_str() == s)
            .ok_or_else(|| DexoptError::InvalidCompilerFilter(s.to_string()))
    }
}
