//! VRAM estimate formulas (spec.md Glossary, scenario S5).
//!
//! `dry_run` (owned by `cortex-controller`) reports these alongside the
//! assembled command line; kept here so the registry and the controller
//! compute the same number from the same inputs.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VramEstimateInputs {
    pub params_billions: f64,
    pub dtype: BytesPerWeight,
    pub avg_active_tokens: u64,
    pub max_num_seqs: u64,
    pub max_num_batched_tokens: u64,
    pub num_layers: u64,
    pub hidden_size: u64,
    pub kv_dtype: BytesPerWeight,
    pub tensor_parallel_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesPerWeight {
    Bf16OrFp16,
    AwqOrGptq,
    Fp8OrInt8,
}

impl BytesPerWeight {
    /// Bytes per parameter/KV-element, per the glossary's table.
    pub fn bytes(self) -> f64 {
        match self {
            BytesPerWeight::Bf16OrFp16 => 2.0,
            BytesPerWeight::AwqOrGptq => 0.5,
            BytesPerWeight::Fp8OrInt8 => 1.0,
        }
    }

    /// Parses the free-text `quantization`/`dtype`/`kv_cache_dtype` fields
    /// the way the controller reads them off a `ConfigBundle`; unrecognized
    /// labels fall back to the BF16/FP16 byte width as the conservative
    /// default (matches the teacher's "unknown picks a documented default"
    /// convention for version parsing).
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_ascii_lowercase();
        if lower.contains("awq") || lower.contains("gptq") {
            BytesPerWeight::AwqOrGptq
        } else if lower.contains("fp8") || lower.contains("int8") {
            BytesPerWeight::Fp8OrInt8
        } else {
            BytesPerWeight::Bf16OrFp16
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct VramEstimate {
    pub weights_bytes: f64,
    pub kv_bytes: f64,
    pub overhead_bytes: f64,
    pub required_vram_gb: f64,
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const GB_PARAMS: f64 = 1_000_000_000.0;
const OVERHEAD_FRACTION: f64 = 0.15;

/// `weights_bytes + kv_bytes + overhead` per the Glossary formula.
pub fn estimate(inputs: &VramEstimateInputs) -> VramEstimate {
    let weights_bytes = inputs.params_billions * GB_PARAMS * inputs.dtype.bytes();

    let active_tokens = (inputs.avg_active_tokens * inputs.max_num_seqs)
        .min(inputs.max_num_batched_tokens.max(1));
    let tp = inputs.tensor_parallel_size.max(1) as f64;
    let kv_bytes = active_tokens as f64
        * inputs.num_layers as f64
        * 2.0
        * inputs.hidden_size as f64
        * inputs.kv_dtype.bytes()
        / tp;

    let overhead_bytes = OVERHEAD_FRACTION * (weights_bytes + kv_bytes);
    let required_vram_gb = (weights_bytes + kv_bytes + overhead_bytes) / GIB;

    VramEstimate {
        weights_bytes,
        kv_bytes,
        overhead_bytes,
        required_vram_gb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_billion_bf16_matches_scenario_s5_order_of_magnitude() {
        let inputs = VramEstimateInputs {
            params_billions: 7.0,
            dtype: BytesPerWeight::Bf16OrFp16,
            avg_active_tokens: 512,
            max_num_seqs: 1,
            max_num_batched_tokens: 2048,
            num_layers: 32,
            hidden_size: 4096,
            kv_dtype: BytesPerWeight::Bf16OrFp16,
            tensor_parallel_size: 1,
        };
        let est = estimate(&inputs);
        // weights alone are 2 * 7e9 bytes ~= 13.0 GiB; the total must exceed
        // that and include the 15% overhead on top of weights+kv.
        assert!(est.required_vram_gb > 13.0);
        let expected_overhead = 0.15 * (est.weights_bytes + est.kv_bytes);
        assert!((est.overhead_bytes - expected_overhead).abs() < 1e-6);
    }

    #[test]
    fn unknown_dtype_label_falls_back_to_bf16_width() {
        assert_eq!(BytesPerWeight::from_label("q4_k_m").bytes(), 2.0);
        assert_eq!(BytesPerWeight::from_label("awq").bytes(), 0.5);
        assert_eq!(BytesPerWeight::from_label("int8").bytes(), 1.0);
    }

    #[test]
    fn tensor_parallel_divides_kv_bytes() {
        let base = VramEstimateInputs {
            params_billions: 7.0,
            dtype: BytesPerWeight::Bf16OrFp16,
            avg_active_tokens: 512,
            max_num_seqs: 4,
            max_num_batched_tokens: 8192,
            num_layers: 32,
            hidden_size: 4096,
            kv_dtype: BytesPerWeight::Bf16OrFp16,
            tensor_parallel_size: 1,
        };
        let tp1 = estimate(&base);
        let tp2 = estimate(&VramEstimateInputs {
            tensor_parallel_size: 2,
            ..base
        });
        assert!((tp1.kv_bytes - tp2.kv_bytes * 2.0).abs() < 1.0);
    }
}
