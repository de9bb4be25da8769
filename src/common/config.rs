use std::env;

/// Method writer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Compute max stack and max locals instead of taking them from `set_maxs`
    pub compute_maxs: bool,
    /// Log every emitted instruction at debug level
    pub debug_code: bool,
    /// Upper bound on resizer passes; derived from the number of branch and
    /// switch sites when unset
    pub max_resize_passes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compute_maxs: true,
            debug_code: false,
            max_resize_passes: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `TOLC_COMPUTE_MAXS` and `TOLC_DEBUG_CODE`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_flag("TOLC_COMPUTE_MAXS") {
            config.compute_maxs = value;
        }
        if let Some(value) = env_flag("TOLC_DEBUG_CODE") {
            config.debug_code = value;
        }
        config
    }

    pub fn with_compute_maxs(mut self, compute_maxs: bool) -> Self {
        self.compute_maxs = compute_maxs;
        self
    }

    pub fn with_debug_code(mut self, debug_code: bool) -> Self {
        self.debug_code = debug_code;
        self
    }

    pub fn with_max_resize_passes(mut self, passes: usize) -> Self {
        self.max_resize_passes = Some(passes);
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
