//! The model configuration bundle (spec.md §4.2) as a closed struct.
//!
//! The original system passes this around as a loose dictionary; per the
//! design note in spec.md §9 ("dynamic configuration bundles ... define a
//! closed struct ... reject unknown fields on ingress"), every recognized
//! field is named here and unrecognized JSON keys are a deserialization
//! error rather than being silently dropped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    TransformersServer,
    GgufServer,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::TransformersServer => "transformers-server",
            EngineKind::GgufServer => "gguf-server",
        }
    }
}

/// Every option the controller's command-line builder (`cortex-controller`)
/// must cover, per the table in spec.md §4.2. Fields unused by a given
/// `EngineKind` are simply left `None` by callers; the controller's match
/// is exhaustive over this struct so a new field forces a decision there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigBundle {
    // Shared across both engines.
    pub context_length: Option<u32>,
    pub quantization: Option<String>,
    pub flash_attention: Option<bool>,
    pub debug_logging: Option<bool>,
    pub trace_mode: Option<bool>,
    pub gpu_ids: Option<serde_json::Value>,

    // transformers-server.
    pub tensor_parallel: Option<u32>,
    pub kv_cache_dtype: Option<String>,
    pub attention_backend: Option<String>,
    pub gguf_weight_format: Option<String>,
    pub vllm_v1_enabled: Option<bool>,
    pub engine_request_timeout: Option<u32>,
    pub enforce_eager: Option<bool>,
    pub enable_prefix_caching: Option<bool>,
    pub enable_chunked_prefill: Option<bool>,
    pub max_num_seqs: Option<u32>,
    pub max_num_batched_tokens: Option<u32>,
    pub cpu_offload_gb: Option<f64>,
    pub swap_space_gb: Option<f64>,
    pub block_size: Option<u32>,

    // gguf-server.
    pub gpu_layers: Option<i32>,
    pub tensor_split: Option<Vec<f64>>,
    pub draft_model_path: Option<String>,
    pub draft_model_n: Option<u32>,
    pub draft_model_p_min: Option<f64>,
    pub mlock: Option<bool>,
    pub no_mmap: Option<bool>,
    pub numa_policy: Option<String>,
    pub split_mode: Option<String>,
    pub batch_size: Option<u32>,
    pub ubatch_size: Option<u32>,
    pub threads: Option<u32>,
    pub parallel_slots: Option<u32>,
    pub rope_freq_base: Option<f64>,
    pub rope_freq_scale: Option<f64>,

    // Dry-run / VRAM-estimate inputs (spec.md Glossary), carried on the
    // bundle so `dry_run` needs nothing beyond the model row.
    pub params_billions: Option<f64>,
    pub dtype: Option<String>,
    pub hidden_size: Option<u32>,
    pub num_layers: Option<u32>,

    pub entry_point_override: Option<String>,
    pub tokenizer_source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_field_is_rejected() {
        let raw = serde_json::json!({ "context_length": 4096, "made_up_field": true });
        let result: Result<ConfigBundle, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn partial_bundle_defaults_the_rest() {
        let raw = serde_json::json!({ "context_length": 8192 });
        let bundle: ConfigBundle = serde_json::from_value(raw).unwrap();
        assert_eq!(bundle.context_length, Some(8192));
        assert_eq!(bundle.tensor_parallel, None);
    }

    #[test]
    fn engine_kind_round_trips_as_kebab_case() {
        let json = serde_json::to_string(&EngineKind::GgufServer).unwrap();
        assert_eq!(json, "\"gguf-server\"");
    }
}
