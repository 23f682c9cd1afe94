//! Dexopt triggers
//!
//! A trigger is the set of conditions under which existing artifacts count
//! as stale. The compiler service compares the requested filter with the
//! filter of the existing artifacts and reports "stale" if any condition in
//! the set holds.

use bitflags::bitflags;

use crate::error::ServiceError;
use crate::params::OptimizeFlags;
use crate::service::FileVisibility;

bitflags! {
    /// Conditions that make existing artifacts stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DexoptTrigger: u32 {
        /// Requested filter is better than the existing one
        const COMPILER_FILTER_IS_BETTER = 1 << 0;
        /// Requested filter equals the existing one
        const COMPILER_FILTER_IS_SAME = 1 << 1;
        /// Requested filter is worse than the existing one
        const COMPILER_FILTER_IS_WORSE = 1 << 2;
        /// The primary boot image has become usable since the last compile
        const PRIMARY_BOOT_IMAGE_BECOMES_USABLE = 1 << 3;
    }
}

impl DexoptTrigger {
    /// Every condition: always stale
    pub fn force() -> Self {
        DexoptTrigger::all()
    }
}

/// Inputs to the trigger computation that do not depend on the ISA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexoptNeededOptions {
    pub flags: OptimizeFlags,
    /// The profile changed since the last compile
    pub profile_merged: bool,
    /// The artifacts will be shared and must be readable by other apps
    pub needs_to_be_public: bool,
}

/// Compute the trigger for one compilation target.
///
/// `existing_artifacts_visibility` is only consulted when the artifacts must
/// be public and neither `FORCE` nor `SHOULD_DOWNGRADE` decided the answer.
pub fn dexopt_trigger<F>(
    options: &DexoptNeededOptions,
    existing_artifacts_visibility: F,
) -> Result<DexoptTrigger, ServiceError>
where
    F: FnOnce() -> Result<FileVisibility, ServiceError>,
{
    if options.flags.contains(OptimizeFlags::FORCE) {
        return Ok(DexoptTrigger::force());
    }

    if options.flags.contains(OptimizeFlags::SHOULD_DOWNGRADE) {
        return Ok(DexoptTrigger::COMPILER_FILTER_IS_WORSE);
    }

    let mut trigger = DexoptTrigger::COMPILER_FILTER_IS_BETTER
        | DexoptTrigger::PRIMARY_BOOT_IMAGE_BECOMES_USABLE;
    if options.profile_merged {
        trigger |= DexoptTrigger::COMPILER_FILTER_IS_SAME;
    }

    // Typically the app just started being used by other apps. There is no
    // way to fix the visibility other than compiling again.
    if options.needs_to_be_public
        && existing_artifacts_visibility()? == FileVisibility::NotOtherReadable
    {
        trigger |= DexoptTrigger::COMPILER_FILTER_IS_SAME | DexoptTrigger::COMPILER_FILTER_IS_WORSE;
    }

    Ok(trigger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL_VISIBILITIES: [FileVisibility; 3] = [
        FileVisibility::NotFound,
        FileVisibility::OtherReadable,
        FileVisibility::NotOtherReadable,
    ];

    fn options(
        flags: OptimizeFlags,
        profile_merged: bool,
        needs_to_be_public: bool,
    ) -> DexoptNeededOptions {
        DexoptNeededOptions {
            flags,
            profile_merged,
            needs_to_be_public,
        }
    }

    fn visibility(v: FileVisibility) -> impl FnOnce() -> Result<FileVisibility, ServiceError> {
        move || Ok(v)
    }

    #[test]
    fn test_force_sets_every_bit() {
        for merged in [false, true] {
            for public in [false, true] {
                for v in ALL_VISIBILITIES {
                    let opts = options(OptimizeFlags::FORCE, merged, public);
                    assert_eq!(dexopt_trigger(&opts, visibility(v)).unwrap(), DexoptTrigger::all());
                }
            }
        }
    }

    #[test]
    fn test_force_wins_over_downgrade() {
        let opts = options(OptimizeFlags::FORCE | OptimizeFlags::SHOULD_DOWNGRADE, false, false);
        assert_eq!(
            dexopt_trigger(&opts, visibility(FileVisibility::NotFound)).unwrap(),
            DexoptTrigger::all()
        );
    }

    #[test]
    fn test_downgrade_is_only_worse() {
        for merged in [false, true] {
            for public in [false, true] {
                for v in ALL_VISIBILITIES {
                    let opts = options(OptimizeFlags::SHOULD_DOWNGRADE, merged, public);
                    assert_eq!(
                        dexopt_trigger(&opts, visibility(v)).unwrap(),
                        DexoptTrigger::COMPILER_FILTER_IS_WORSE
                    );
                }
            }
        }
    }

    #[test]
    fn test_baseline() {
        let opts = options(OptimizeFlags::FOR_PRIMARY_DEX, false, false);
        assert_eq!(
            dexopt_trigger(&opts, || panic!("visibility must not be queried")).unwrap(),
            DexoptTrigger::COMPILER_FILTER_IS_BETTER
                | DexoptTrigger::PRIMARY_BOOT_IMAGE_BECOMES_USABLE
        );
    }

    #[test]
    fn test_merged_profile_adds_same() {
        let opts = options(OptimizeFlags::FOR_PRIMARY_DEX, true, false);
        assert_eq!(
            dexopt_trigger(&opts, visibility(FileVisibility::OtherReadable)).unwrap(),
            DexoptTrigger::COMPILER_FILTER_IS_BETTER
                | DexoptTrigger::COMPILER_FILTER_IS_SAME
                | DexoptTrigger::PRIMARY_BOOT_IMAGE_BECOMES_USABLE
        );
    }

    #[test]
    fn test_public_mismatch_adds_same_and_worse() {
        let opts = options(OptimizeFlags::FOR_PRIMARY_DEX, false, true);
        assert_eq!(
            dexopt_trigger(&opts, visibility(FileVisibility::NotOtherReadable)).unwrap(),
            DexoptTrigger::all()
        );
    }

    #[test]
    fn test_public_match_keeps_baseline() {
        let opts = options(OptimizeFlags::FOR_PRIMARY_DEX, false, true);
        for v in [FileVisibility::OtherReadable, FileVisibility::NotFound] {
            assert_eq!(
                dexopt_trigger(&opts, visibility(v)).unwrap(),
                DexoptTrigger::COMPILER_FILTER_IS_BETTER
                    | DexoptTrigger::PRIMARY_BOOT_IMAGE_BECOMES_USABLE
            );
        }
    }

    #[test]
    fn test_visibility_error_propagates() {
        let opts = options(OptimizeFlags::FOR_PRIMARY_DEX, false, true);
        let err = dexopt_trigger(&opts, || Err(ServiceError::service_specific(2, "stat failed")))
            .unwrap_err();
        assert!(err.is_service_specific());
    }
}
