//! Optimize request parameters

use bitflags::bitflags;

use crate::error::DexoptResult;
use crate::filter::CompilerFilter;

bitflags! {
    /// Flags that shape an optimize request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OptimizeFlags: u32 {
        /// Optimize the package's own code containers
        const FOR_PRIMARY_DEX = 1 << 0;
        /// Optimize containers the app loaded at runtime
        const FOR_SECONDARY_DEX = 1 << 1;
        /// Also optimize the package's dependencies (handled by the caller)
        const SHOULD_INCLUDE_DEPENDENCIES = 1 << 2;
        /// Only recompile when the result would be weaker than what exists
        const SHOULD_DOWNGRADE = 1 << 3;
        /// Recompile regardless of existing artifacts
        const FORCE = 1 << 4;
        /// Restrict primary optimization to one split (handled by the caller)
        const FOR_SINGLE_SPLIT = 1 << 5;
    }
}

impl Default for OptimizeFlags {
    fn default() -> Self {
        OptimizeFlags::FOR_PRIMARY_DEX
    }
}

/// Scheduling priority passed through to the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityClass {
    Background = 40,
    Interactive = 60,
    InteractiveFast = 80,
    Boot = 100,
}

impl PriorityClass {
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl Default for PriorityClass {
    fn default() -> Self {
        PriorityClass::Interactive
    }
}

/// Parameters of one optimize request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeParams {
    /// Requested compiler filter
    pub compiler_filter: CompilerFilter,
    /// Request flags
    pub flags: OptimizeFlags,
    /// Scheduling priority
    pub priority_class: PriorityClass,
    /// Compilation reason tag
    pub reason: String,
}

impl OptimizeParams {
    /// Create parameters for `reason` with an already parsed filter
    pub fn new(compiler_filter: CompilerFilter, reason: impl Into<String>) -> Self {
        Self {
            compiler_filter,
            flags: OptimizeFlags::default(),
            priority_class: PriorityClass::default(),
            reason: reason.into(),
        }
    }

    /// Create parameters from a filter name, rejecting unknown names
    pub fn parse(compiler_filter: &str, reason: impl Into<String>) -> DexoptResult<Self> {
        Ok(Self::new(compiler_filter.parse()?, reason))
    }

    /// Set the request flags.
    pub fn with_flags(mut self, flags: OptimizeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the priority class.
    pub fn with_priority_class(mut self, priority_class: PriorityClass) -> Self {
        self.priority_class = priority_class;
        self
    }
}
