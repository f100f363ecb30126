//! Tokenizer-source suggestions derived from a curated pattern table keyed
//! by folder/model name (spec.md §4.9). Same shape as the teacher's
//! family-detection pattern tables in `model-cache/src/detection.rs`.

struct TokenizerPattern {
    needles: &'static [&'static str],
    suggestion: &'static str,
}

const PATTERNS: &[TokenizerPattern] = &[
    TokenizerPattern { needles: &["llama-3", "llama3"], suggestion: "meta-llama/Meta-Llama-3-8B" },
    TokenizerPattern { needles: &["llama-2", "llama2"], suggestion: "meta-llama/Llama-2-7b-hf" },
    TokenizerPattern { needles: &["mistral"], suggestion: "mistralai/Mistral-7B-v0.1" },
    TokenizerPattern { needles: &["mixtral"], suggestion: "mistralai/Mixtral-8x7B-v0.1" },
    TokenizerPattern { needles: &["qwen2.5", "qwen2_5"], suggestion: "Qwen/Qwen2.5-7B" },
    TokenizerPattern { needles: &["qwen2"], suggestion: "Qwen/Qwen2-7B" },
    TokenizerPattern { needles: &["qwen"], suggestion: "Qwen/Qwen-7B" },
    TokenizerPattern { needles: &["gemma-2", "gemma2"], suggestion: "google/gemma-2-9b" },
    TokenizerPattern { needles: &["gemma"], suggestion: "google/gemma-7b" },
    TokenizerPattern { needles: &["phi-3", "phi3"], suggestion: "microsoft/Phi-3-mini-4k-instruct" },
    TokenizerPattern { needles: &["deepseek"], suggestion: "deepseek-ai/deepseek-llm-7b-base" },
    TokenizerPattern { needles: &["falcon"], suggestion: "tiiuae/falcon-7b" },
];

/// Returns the suggestion for the first (most specific) pattern matching
/// `name`, checked in table order so `qwen2.5` wins over the broader
/// `qwen2`/`qwen` patterns. Empty when nothing in the table matches; the
/// caller still allows the operator to supply a path or repo id manually.
pub fn suggest(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    PATTERNS
        .iter()
        .find(|pattern| pattern.needles.iter().any(|needle| lower.contains(needle)))
        .map(|pattern| vec![pattern.suggestion.to_string()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_llama_3_folder_names() {
        let suggestions = suggest("Meta-Llama-3-8B-Instruct-GGUF");
        assert_eq!(suggestions, vec!["meta-llama/Meta-Llama-3-8B"]);
    }

    #[test]
    fn qwen2_5_matches_the_more_specific_pattern_only() {
        let suggestions = suggest("Qwen2.5-14B-Instruct-Q4_K_M");
        assert_eq!(suggestions, vec!["Qwen/Qwen2.5-7B"]);
    }

    #[test]
    fn unknown_name_yields_no_suggestions() {
        assert!(suggest("totally-custom-finetune-xyz").is_empty());
    }
}
