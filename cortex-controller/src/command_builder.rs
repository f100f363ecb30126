//! Engine command-line construction (spec.md §4.2).
//!
//! One exhaustive match arm per `ConfigBundle` field so that adding a new
//! field to the bundle is a compile error here until someone decides what
//! it does for each engine — the closed-struct strategy from spec.md §9
//! carried all the way through to the builder.

use cortex_values::config_bundle::{ConfigBundle, EngineKind};
use cortex_values::gpu::{cuda_visible_devices, normalize_gpu_ids};

pub struct BuiltCommand {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Multi-GPU coordination environment variables the controller always
/// sets so collective operations cannot hang indefinitely (spec.md §4.2).
fn collective_ops_env() -> Vec<(String, String)> {
    vec![
        ("NCCL_TIMEOUT_S".into(), "1800".into()),
        ("NCCL_DEBUG".into(), "WARN".into()),
        ("NCCL_BLOCKING_WAIT".into(), "1".into()),
        ("NCCL_ASYNC_ERROR_HANDLING".into(), "1".into()),
    ]
}

pub fn build(engine_kind: EngineKind, bundle: &ConfigBundle) -> Result<BuiltCommand, cortex_common::error::CortexError> {
    let mut args = Vec::new();
    let mut env = collective_ops_env();

    let gpu_ids = normalize_gpu_ids(bundle.gpu_ids.as_ref())?;
    if !gpu_ids.is_empty() {
        env.push(("CUDA_VISIBLE_DEVICES".into(), cuda_visible_devices(&gpu_ids)));
    }

    match engine_kind {
        EngineKind::TransformersServer => build_transformers_server(bundle, &mut args, &mut env),
        EngineKind::GgufServer => build_gguf_server(bundle, &mut args, &mut env),
    }

    Ok(BuiltCommand { args, env })
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: impl ToString) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn build_transformers_server(bundle: &ConfigBundle, args: &mut Vec<String>, env: &mut Vec<(String, String)>) {
    let ConfigBundle {
        context_length,
        tensor_parallel,
        kv_cache_dtype,
        quantization,
        flash_attention,
        attention_backend,
        gguf_weight_format,
        vllm_v1_enabled,
        debug_logging,
        trace_mode,
        engine_request_timeout,
        enforce_eager,
        enable_prefix_caching,
        enable_chunked_prefill,
        max_num_seqs,
        max_num_batched_tokens,
        cpu_offload_gb,
        swap_space_gb,
        block_size,
        gpu_layers: _,
        tensor_split: _,
        draft_model_path: _,
        draft_model_n: _,
        draft_model_p_min: _,
        mlock: _,
        no_mmap: _,
        numa_policy: _,
        split_mode: _,
        batch_size: _,
        ubatch_size: _,
        threads: _,
        parallel_slots: _,
        rope_freq_base: _,
        rope_freq_scale: _,
        gpu_ids: _,
        params_billions: _,
        dtype: _,
        hidden_size: _,
        num_layers: _,
        entry_point_override: _,
        tokenizer_source: _,
    } = bundle;

    if let Some(v) = context_length {
        push_flag(args, "--max-model-len", v);
    }
    if let Some(v) = tensor_parallel {
        push_flag(args, "--tensor-parallel-size", v);
    }
    if let Some(v) = kv_cache_dtype {
        push_flag(args, "--kv-cache-dtype", v);
    }
    if let Some(v) = quantization {
        push_flag(args, "--quantization", v);
    }
    if *flash_attention == Some(true) {
        if let Some(backend) = attention_backend {
            push_flag(args, "--attention-backend", backend);
        } else {
            args.push("--attention-backend".into());
            args.push("FLASH_ATTN".into());
        }
    } else if let Some(backend) = attention_backend {
        push_flag(args, "--attention-backend", backend);
    }
    if let Some(v) = gguf_weight_format {
        push_flag(args, "--gguf-weight-format", v);
    }
    if *vllm_v1_enabled == Some(true) {
        env.push(("VLLM_USE_V1".into(), "1".into()));
    }
    if *debug_logging == Some(true) {
        env.push(("VLLM_LOGGING_LEVEL".into(), "DEBUG".into()));
    }
    if *trace_mode == Some(true) {
        env.push(("VLLM_TRACE_FUNCTION".into(), "1".into()));
    }
    if let Some(v) = engine_request_timeout {
        env.push(("VLLM_ENGINE_ITERATION_TIMEOUT_S".into(), v.to_string()));
    }
    if *enforce_eager == Some(true) {
        args.push("--enforce-eager".into());
    }
    if *enable_prefix_caching == Some(true) {
        args.push("--enable-prefix-caching".into());
    }
    if *enable_chunked_prefill == Some(true) {
        args.push("--enable-chunked-prefill".into());
    }
    if let Some(v) = max_num_seqs {
        push_flag(args, "--max-num-seqs", v);
    }
    if let Some(v) = max_num_batched_tokens {
        push_flag(args, "--max-num-batched-tokens", v);
    }
    if let Some(v) = cpu_offload_gb {
        push_flag(args, "--cpu-offload-gb", v);
    }
    if let Some(v) = swap_space_gb {
        push_flag(args, "--swap-space", v);
    }
    if let Some(v) = block_size {
        push_flag(args, "--block-size", v);
    }
}

fn build_gguf_server(bundle: &ConfigBundle, args: &mut Vec<String>, env: &mut Vec<(String, String)>) {
    let ConfigBundle {
        context_length,
        quantization: _,
        flash_attention,
        debug_logging,
        trace_mode: _,
        gpu_layers,
        tensor_split,
        kv_cache_dtype,
        draft_model_path,
        draft_model_n,
        draft_model_p_min,
        mlock,
        no_mmap,
        numa_policy,
        split_mode,
        batch_size,
        ubatch_size,
        threads,
        parallel_slots,
        rope_freq_base,
        rope_freq_scale,
        tensor_parallel: _,
        attention_backend: _,
        gguf_weight_format: _,
        vllm_v1_enabled: _,
        engine_request_timeout: _,
        enforce_eager: _,
        enable_prefix_caching: _,
        enable_chunked_prefill: _,
        max_num_seqs: _,
        max_num_batched_tokens: _,
        cpu_offload_gb: _,
        swap_space_gb: _,
        block_size: _,
        gpu_ids: _,
        params_billions: _,
        dtype: _,
        hidden_size: _,
        num_layers: _,
        entry_point_override: _,
        tokenizer_source: _,
    } = bundle;

    if let Some(v) = context_length {
        push_flag(args, "--ctx-size", v);
    }
    if let Some(v) = gpu_layers {
        push_flag(args, "--n-gpu-layers", v);
    }
    if let Some(v) = tensor_split {
        let joined = v.iter().map(f64::to_string).collect::<Vec<_>>().join(",");
        push_flag(args, "--tensor-split", joined);
    }
    if let Some(v) = kv_cache_dtype {
        push_flag(args, "--cache-type-k", v);
        push_flag(args, "--cache-type-v", v);
    }
    if *flash_attention == Some(true) {
        args.push("--flash-attn".into());
    }
    if let Some(path) = draft_model_path {
        push_flag(args, "--model-draft", path);
        if let Some(n) = draft_model_n {
            push_flag(args, "--draft-max", n);
        }
        if let Some(p_min) = draft_model_p_min {
            push_flag(args, "--draft-p-min", p_min);
        }
    }
    if *debug_logging == Some(true) {
        args.push("--verbose".into());
    }
    if *mlock == Some(true) {
        args.push("--mlock".into());
    }
    if *no_mmap == Some(true) {
        args.push("--no-mmap".into());
    }
    if let Some(v) = numa_policy {
        push_flag(args, "--numa", v);
    }
    if let Some(v) = split_mode {
        push_flag(args, "--split-mode", v);
    }
    if let Some(v) = batch_size {
        push_flag(args, "--batch-size", v);
    }
    if let Some(v) = ubatch_size {
        push_flag(args, "--ubatch-size", v);
    }
    if let Some(v) = threads {
        push_flag(args, "--threads", v);
    }
    if let Some(v) = parallel_slots {
        push_flag(args, "--parallel", v);
    }
    if let Some(v) = rope_freq_base {
        push_flag(args, "--rope-freq-base", v);
    }
    if let Some(v) = rope_freq_scale {
        push_flag(args, "--rope-freq-scale", v);
    }
    let _ = env;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transformers_server_builds_context_and_tensor_parallel_flags() {
        let bundle = ConfigBundle {
            context_length: Some(8192),
            tensor_parallel: Some(2),
            ..Default::default()
        };
        let built = build(EngineKind::TransformersServer, &bundle).unwrap();
        assert!(built.args.windows(2).any(|w| w == ["--max-model-len", "8192"]));
        assert!(built.args.windows(2).any(|w| w == ["--tensor-parallel-size", "2"]));
    }

    #[test]
    fn gguf_server_uses_ctx_size_not_max_model_len() {
        let bundle = ConfigBundle {
            context_length: Some(4096),
            gpu_layers: Some(-1),
            ..Default::default()
        };
        let built = build(EngineKind::GgufServer, &bundle).unwrap();
        assert!(built.args.windows(2).any(|w| w == ["--ctx-size", "4096"]));
        assert!(!built.args.iter().any(|a| a == "--max-model-len"));
    }

    #[test]
    fn always_sets_collective_ops_env() {
        let built = build(EngineKind::GgufServer, &ConfigBundle::default()).unwrap();
        assert!(built.env.iter().any(|(k, _)| k == "NCCL_BLOCKING_WAIT"));
    }

    #[test]
    fn gpu_ids_become_cuda_visible_devices_env() {
        let bundle = ConfigBundle {
            gpu_ids: Some(json!("[0,1]")),
            ..Default::default()
        };
        let built = build(EngineKind::TransformersServer, &bundle).unwrap();
        assert!(built.env.iter().any(|(k, v)| k == "CUDA_VISIBLE_DEVICES" && v == "0,1"));
    }
}
