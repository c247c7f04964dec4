/// Vulkan backend configuration

/// Validation message severity forwarded by the debug messenger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    #[default]
    ErrorsAndWarnings,
    /// Everything, including info and verbose messages
    All,
}

/// Device creation configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable VK_LAYER_KHRONOS_validation and the debug messenger
    ///
    /// Only honored when the crate is built with the `vulkan-validation`
    /// feature; otherwise a warning is logged and the layer stays off.
    pub enable_validation: bool,

    /// Application name reported to the driver
    pub app_name: String,

    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),

    /// Minimum severity printed by the debug messenger
    pub debug_severity: DebugSeverity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Orbit Application".to_string(),
            app_version: (0, 1, 0),
            debug_severity: DebugSeverity::default(),
        }
    }
}
