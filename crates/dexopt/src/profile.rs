//! Profile management
//!
//! For each container compiled with a profile-guided filter, the engine
//! needs one profile in hand: an existing reference profile, one freshly
//! initialized from an external source, or the output of merging the
//! runtime's current profiles. Anything freshly produced is temporary until
//! committed.
//!
//! [`HeldProfile`] owns that profile for one container. If it is still
//! temporary when the holder is dropped, it is deleted, so every exit path
//! (success, failure, cancellation, fatal error) releases it.

use tracing::{debug, error, warn};

use crate::error::DexoptResult;
use crate::paths::ProfilePath;
use crate::provider::{DexContainer, DexInfoProvider};
use crate::service::{CompilerService, FileVisibility};

/// The profile held while one container is processed
pub struct HeldProfile<'s> {
    service: &'s dyn CompilerService,
    path: Option<ProfilePath>,
}

impl<'s> HeldProfile<'s> {
    /// Hold nothing yet
    pub fn new(service: &'s dyn CompilerService) -> Self {
        Self {
            service,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&ProfilePath> {
        self.path.as_ref()
    }

    pub fn is_some(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_temporary(&self) -> bool {
        self.path.as_ref().is_some_and(ProfilePath::is_temporary)
    }

    /// Hold `profile`, deleting a temporary profile held so far.
    pub fn replace(&mut self, profile: Option<ProfilePath>) {
        self.release();
        self.path = profile;
    }

    /// Commit a temporary profile to its final path.
    ///
    /// Returns true if a commit happened. On an operational failure the
    /// profile stays temporary and is deleted on drop.
    pub fn commit(&mut self) -> DexoptResult<bool> {
        let Some(tmp) = self.path.as_ref().and_then(ProfilePath::as_tmp) else {
            return Ok(false);
        };

        match self.service.commit_tmp_profile(tmp) {
            Ok(()) => {
                debug!("Committed profile {}", tmp.final_path);
                let committed = ProfilePath::Ref(tmp.final_path.clone());
                self.path = Some(committed);
                Ok(true)
            }
            Err(e) if e.is_service_specific() => {
                error!("Failed to commit profile changes {}: {}", tmp.final_path, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release(&mut self) {
        if let Some(profile) = self.path.take() {
            if profile.is_temporary() {
                delete_best_effort(self.service, &profile);
            }
        }
    }
}

impl Drop for HeldProfile<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// What profile resolution learned about the held profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileState {
    /// The held profile may back artifacts readable by other apps
    pub is_other_readable: bool,
    /// The profile content changed since the last compile
    pub profile_merged: bool,
}

impl Default for ProfileState {
    fn default() -> Self {
        Self {
            is_other_readable: true,
            profile_merged: false,
        }
    }
}

/// Resolve the profile for a profile-guided compile of `info` into `held`.
///
/// Leaves `held` empty if no profile is available.
pub fn resolve_profile<P: DexInfoProvider>(
    service: &dyn CompilerService,
    provider: &P,
    info: &P::Info,
    needs_to_be_shared: bool,
    held: &mut HeldProfile<'_>,
) -> DexoptResult<ProfileState> {
    let mut state = ProfileState::default();

    if needs_to_be_shared {
        // Shared artifacts must not be built from a private profile.
        held.replace(provider.init_reference_profile(service, info)?);
        return Ok(state);
    }

    if let Some((profile, is_other_readable)) =
        get_or_init_reference_profile(service, provider, info)?
    {
        held.replace(Some(profile));
        state.is_other_readable = is_other_readable;
    }

    if let Some(merged) = merge_profiles(service, provider, info, held.path())? {
        held.replace(Some(merged));
        state.is_other_readable = false;
        state.profile_merged = true;
    }

    Ok(state)
}

/// The usable reference profile and its visibility, or an initialized one.
fn get_or_init_reference_profile<P: DexInfoProvider>(
    service: &dyn CompilerService,
    provider: &P,
    info: &P::Info,
) -> DexoptResult<Option<(ProfilePath, bool)>> {
    let ref_profile = ProfilePath::Ref(provider.ref_profile_path(info));

    let existing = service
        .is_profile_usable(&ref_profile, info.dex_path())
        .and_then(|usable| {
            if usable {
                service.get_profile_visibility(&ref_profile).map(Some)
            } else {
                Ok(None)
            }
        });
    match existing {
        Ok(Some(visibility)) => {
            let is_other_readable = visibility == FileVisibility::OtherReadable;
            return Ok(Some((ref_profile, is_other_readable)));
        }
        Ok(None) => {}
        Err(e) if e.is_service_specific() => {
            error!("Failed to use the existing reference profile {}: {}", ref_profile, e);
        }
        Err(e) => return Err(e.into()),
    }

    // Profiles from external sources are always readable by others.
    Ok(provider
        .init_reference_profile(service, info)?
        .map(|profile| (profile, true)))
}

/// Merge the current profiles into `reference`. Returns the temporary output
/// if the merge produced a materially different profile.
fn merge_profiles<P: DexInfoProvider>(
    service: &dyn CompilerService,
    provider: &P,
    info: &P::Info,
    reference: Option<&ProfilePath>,
) -> DexoptResult<Option<ProfilePath>> {
    let output = provider.output_profile(info, false)?;
    let current = provider.current_profiles(info);
    let dex_paths = [info.dex_path().to_string()];

    match service.merge_profiles(&current, reference, &output, &dex_paths) {
        Ok(true) => Ok(Some(ProfilePath::Tmp(output.profile_path))),
        Ok(false) => Ok(None),
        Err(e) if e.is_service_specific() => {
            error!("Failed to merge profiles {}: {}", output.profile_path.final_path, e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete the runtime's current profiles of `info`.
///
/// Only reclaims space: future merges work on the diff, so leftover current
/// profiles do not change the result.
pub fn cleanup_current_profiles<P: DexInfoProvider>(
    service: &dyn CompilerService,
    provider: &P,
    info: &P::Info,
) {
    for profile in provider.current_profiles(info) {
        delete_best_effort(service, &profile);
    }
}

fn delete_best_effort(service: &dyn CompilerService, profile: &ProfilePath) {
    if let Err(e) = service.delete_profile(profile) {
        warn!("Failed to delete profile {}: {}", profile, e);
    }
}

