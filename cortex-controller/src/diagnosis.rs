//! The log diagnosis pattern table (spec.md §4.2, §9): data-driven, not
//! scattered conditionals, so it can be extended and unit-tested.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisKind {
    MissingTokenizerOffline,
    CollectiveOpsTimeout,
    DriverMismatch,
    MemoryProfileError,
    LegacyFileFormat,
}

pub struct DiagnosisRule {
    pub needle: Regex,
    pub kind: DiagnosisKind,
    pub fix_text: &'static str,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnosis {
    pub kind: DiagnosisKind,
    pub fix_text: String,
}

static RULES: LazyLock<Vec<DiagnosisRule>> = LazyLock::new(|| {
    vec![
        DiagnosisRule {
            needle: Regex::new(r"(?i)tokenizer.*not found|could not locate tokenizer").unwrap(),
            kind: DiagnosisKind::MissingTokenizerOffline,
            fix_text: "provide a local tokenizer config path or pre-cache the remote tokenizer",
        },
        DiagnosisRule {
            needle: Regex::new(r"(?i)nccl.*timeout|watchdog.*timed out").unwrap(),
            kind: DiagnosisKind::CollectiveOpsTimeout,
            fix_text: "increase the collective-ops timeout or check GPU interconnect health",
        },
        DiagnosisRule {
            needle: Regex::new(r"(?i)cuda driver version is insufficient|driver/library version mismatch").unwrap(),
            kind: DiagnosisKind::DriverMismatch,
            fix_text: "update the host NVIDIA driver to match the container's CUDA runtime",
        },
        DiagnosisRule {
            needle: Regex::new(r"(?i)out of memory|cuda out of memory|failed to allocate").unwrap(),
            kind: DiagnosisKind::MemoryProfileError,
            fix_text: "reduce max_num_seqs/context_length or add more GPUs via tensor_parallel",
        },
        DiagnosisRule {
            needle: Regex::new(r"(?i)unsupported gguf version|invalid magic|legacy ggml format").unwrap(),
            kind: DiagnosisKind::LegacyFileFormat,
            fix_text: "reconvert the model with a current GGUF export tool",
        },
    ]
});

/// Matches a captured log tail against the curated pattern table, in
/// order, returning the first hit.
pub fn diagnose(log_tail: &str) -> Option<Diagnosis> {
    RULES.iter().find(|rule| rule.needle.is_match(log_tail)).map(|rule| Diagnosis {
        kind: rule.kind,
        fix_text: rule.fix_text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_oom() {
        let d = diagnose("RuntimeError: CUDA out of memory. Tried to allocate 2.00 GiB").unwrap();
        assert_eq!(d.kind, DiagnosisKind::MemoryProfileError);
    }

    #[test]
    fn detects_driver_mismatch() {
        let d = diagnose("CUDA driver version is insufficient for CUDA runtime version").unwrap();
        assert_eq!(d.kind, DiagnosisKind::DriverMismatch);
    }

    #[test]
    fn no_match_returns_none() {
        assert!(diagnose("server listening on 0.0.0.0:8000").is_none());
    }

    #[test]
    fn first_matching_rule_wins() {
        let combined = "tokenizer not found\nCUDA out of memory";
        let d = diagnose(combined).unwrap();
        assert_eq!(d.kind, DiagnosisKind::MissingTokenizerOffline);
    }
}
