//! Environment configuration.
//!
//! Device selection stays a single adapter, but which one is an explicit
//! input rather than global state. Defaults pick the first adapter on any
//! backend; `from_env` honours the usual overrides.

/// Adapter index override.
pub const ADAPTER_ENV: &str = "XFORM_ADAPTER";
/// Kernel timing override (`0`/`1`/`true`/`false`/`on`/`off`).
pub const PROFILING_ENV: &str = "XFORM_PROFILING";
/// Backend list, same syntax wgpu uses (`vulkan,metal,dx12,gl`).
pub const BACKEND_ENV: &str = "WGPU_BACKEND";

/// Settings used by [`crate::Environment::with_config`].
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Index into the adapter list enumerated for `backends`.
    pub adapter_index: usize,
    /// Backends to enumerate adapters on.
    pub backends: wgpu::Backends,
    /// Request timestamp queries and time every kernel pass.
    /// Silently off when the adapter lacks `TIMESTAMP_QUERY`.
    pub profiling: bool,
    /// Device label, shows up in graphics debuggers.
    pub label: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            backends: wgpu::Backends::all(),
            profiling: true,
            label: "xform".to_string(),
        }
    }
}

impl EnvironmentConfig {
    /// Defaults overridden by `XFORM_ADAPTER`, `XFORM_PROFILING` and `WGPU_BACKEND`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(index) = lookup(ADAPTER_ENV).and_then(|v| v.trim().parse::<usize>().ok()) {
            config.adapter_index = index;
        }
        if let Some(profiling) = lookup(PROFILING_ENV).as_deref().and_then(parse_flag) {
            config.profiling = profiling;
        }
        if let Some(list) = lookup(BACKEND_ENV) {
            let backends = wgpu::Backends::from_comma_list(&list);
            if !backends.is_empty() {
                config.backends = backends;
            }
        }

        config
    }

    /// Select a different adapter index.
    pub fn with_adapter(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Enable or disable kernel timing.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Restrict adapter enumeration to `backends`.
    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
