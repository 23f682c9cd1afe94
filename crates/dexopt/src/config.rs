//! Engine configuration
//!
//! Operator-tunable settings that the engine consults while deciding how to
//! compile. They are read once, validated, and then treated as immutable
//! for the lifetime of a request.
//!
//! ```toml
//! system-ui-package = "com.android.systemui"
//! system-ui-compiler-filter = "speed"
//! always-debuggable = false
//! app-image-format = "lz4"
//! shared-compiler-filter = "speed"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DexoptError, DexoptResult};
use crate::filter::CompilerFilter;

const DEFAULT_SYSTEM_UI_PACKAGE: &str = "com.android.systemui";
const DEFAULT_SHARED_COMPILER_FILTER: &str = "speed";

/// On-disk shape of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    system_ui_package: Option<String>,
    #[serde(default)]
    system_ui_compiler_filter: Option<String>,
    #[serde(default)]
    always_debuggable: bool,
    #[serde(default)]
    app_image_format: Option<String>,
    #[serde(default)]
    shared_compiler_filter: Option<String>,
}

/// Validated engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexoptConfig {
    /// Package name of the system UI
    pub system_ui_package: String,
    /// Filter override applied to the system UI package
    pub system_ui_compiler_filter: Option<CompilerFilter>,
    /// Treat every package as debuggable
    pub always_debuggable: bool,
    /// App image format; app images are generated only when set
    pub app_image_format: Option<String>,
    /// Filter for artifacts shared with other apps when no profile exists
    pub shared_compiler_filter: CompilerFilter,
}

impl Default for DexoptConfig {
    fn default() -> Self {
        Self {
            system_ui_package: DEFAULT_SYSTEM_UI_PACKAGE.to_string(),
            system_ui_compiler_filter: None,
            always_debuggable: false,
            app_image_format: None,
            shared_compiler_filter: CompilerFilter::Speed,
        }
    }
}

impl DexoptConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> DexoptResult<Self> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| DexoptError::Config(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DexoptResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| DexoptError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    fn from_raw(raw: RawConfig) -> DexoptResult<Self> {
        let system_ui_compiler_filter = match raw.system_ui_compiler_filter.as_deref() {
            None | Some("") => None,
            Some(name) => Some(parse_filter("system-ui-compiler-filter", name)?),
        };

        let shared_name = raw
            .shared_compiler_filter
            .as_deref()
            .unwrap_or(DEFAULT_SHARED_COMPILER_FILTER);
        let shared_compiler_filter = parse_filter("shared-compiler-filter", shared_name)?;
        validate_shared_filter(shared_compiler_filter)?;

        Ok(Self {
            system_ui_package: raw
                .system_ui_package
                .unwrap_or_else(|| DEFAULT_SYSTEM_UI_PACKAGE.to_string()),
            system_ui_compiler_filter,
            always_debuggable: raw.always_debuggable,
            app_image_format: raw.app_image_format.filter(|f| !f.is_empty()),
            shared_compiler_filter,
        })
    }

    /// Set the system UI package name.
    pub fn with_system_ui_package(mut self, package: impl Into<String>) -> Self {
        self.system_ui_package = package.into();
        self
    }

    /// Set the system UI filter override.
    pub fn with_system_ui_compiler_filter(mut self, filter: CompilerFilter) -> Self {
        self.system_ui_compiler_filter = Some(filter);
        self
    }

    /// Treat every package as debuggable.
    pub fn with_always_debuggable(mut self, always_debuggable: bool) -> Self {
        self.always_debuggable = always_debuggable;
        self
    }

    /// Set the app image format.
    pub fn with_app_image_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        self.app_image_format = if format.is_empty() { None } else { Some(format) };
        self
    }

    /// Set the filter for shared artifacts without a profile.
    pub fn with_shared_compiler_filter(mut self, filter: CompilerFilter) -> DexoptResult<Self> {
        validate_shared_filter(filter)?;
        self.shared_compiler_filter = filter;
        Ok(self)
    }

    pub fn is_system_ui_package(&self, package_name: &str) -> bool {
        self.system_ui_package == package_name
    }

    pub fn is_app_image_enabled(&self) -> bool {
        self.app_image_format.is_some()
    }
}

fn parse_filter(key: &str, name: &str) -> DexoptResult<CompilerFilter> {
    name.parse()
        .map_err(|_| DexoptError::Config(format!("{} has invalid compiler filter '{}'", key, name)))
}

fn validate_shared_filter(filter: CompilerFilter) -> DexoptResult<()> {
    if filter.is_profile_guided() || filter.is_skip() {
        return Err(DexoptError::Config(format!(
            "shared-compiler-filter must not be '{}'",
            filter
        )));
    }
    Ok(())
}
