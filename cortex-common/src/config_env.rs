//! Environment variables CORTEX reads at startup (spec.md §6).
//!
//! Centralized here so every crate reads configuration the same way instead
//! of scattering `std::env::var` calls — the single-source-of-truth pattern
//! the teacher applies to platform paths in `common::platform`.

use std::env;

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Environment-derived CORTEX configuration, read once at process start.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub host_ip: Option<String>,
    pub cors_allow_origins: Vec<String>,
    pub offline_mode: bool,
    pub dev_allow_all_keys: bool,
    pub vllm_version: String,
    pub llamacpp_tag: String,
    pub internal_backend_auth: Option<String>,
    pub models_dir: String,
    pub hf_cache_dir: String,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let host_ip = env::var("HOST_IP").ok();
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        Self {
            host_ip,
            cors_allow_origins,
            offline_mode: env_bool("OFFLINE_MODE", false),
            dev_allow_all_keys: env_bool("GATEWAY_DEV_ALLOW_ALL_KEYS", false),
            vllm_version: env_string("VLLM_VERSION", "0.6.3"),
            llamacpp_tag: env_string("LLAMACPP_TAG", "latest"),
            internal_backend_auth: env::var("INTERNAL_BACKEND_AUTH_TOKEN").ok(),
            models_dir: env_string("MODELS_DIR", "/data/models"),
            hf_cache_dir: env_string("HF_CACHE_DIR", "/data/hf-cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_defaults_to_wildcard() {
        // SAFETY: test-only; no other test in this process races this var.
        unsafe {
            env::remove_var("CORS_ALLOW_ORIGINS");
        }
        let cfg = EnvConfig::from_env();
        assert_eq!(cfg.cors_allow_origins, vec!["*".to_string()]);
    }
}
