//! File classification for a model folder: groups GGUF multi-part shards,
//! flags single GGUF files and safetensors, and pulls a quantization label
//! out of the filename. Pattern style follows the teacher's
//! `model-cache/src/detection.rs` (constant pattern lists + `.contains`
//! checks rather than a parser).

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SingleFile {
    pub path: String,
    pub bytes: u64,
    pub quantization: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultipartGroup {
    pub files: usize,
    pub first_part: String,
    pub status: String,
    pub total_bytes: u64,
    pub quantization: Option<String>,
}

#[derive(Debug, Default)]
pub struct ClassifiedFiles {
    pub safetensors: Vec<SingleFile>,
    pub single_gguf: Vec<SingleFile>,
    pub multipart_gguf: Vec<MultipartGroup>,
    pub total_bytes: u64,
}

impl ClassifiedFiles {
    pub fn has_safetensors(&self) -> bool {
        !self.safetensors.is_empty()
    }

    pub fn has_gguf(&self) -> bool {
        !self.single_gguf.is_empty() || !self.multipart_gguf.is_empty()
    }

    pub fn is_multipart(&self) -> bool {
        !self.multipart_gguf.is_empty()
    }
}

const QUANT_PATTERNS: &[&str] = &[
    "Q2_K", "Q3_K_S", "Q3_K_M", "Q3_K_L", "Q4_0", "Q4_1", "Q4_K_S", "Q4_K_M", "Q5_0", "Q5_1",
    "Q5_K_S", "Q5_K_M", "Q6_K", "Q8_0", "F16", "F32", "BF16", "IQ2_XXS", "IQ3_XXS", "IQ4_NL",
];

/// Pulls a known quantization tag out of a filename, case-insensitively.
fn detect_quantization(filename: &str) -> Option<String> {
    let upper = filename.to_uppercase();
    QUANT_PATTERNS.iter().find(|p| upper.contains(*p)).map(|p| p.to_string())
}

fn multipart_regex() -> Regex {
    Regex::new(r"(?i)^(?P<stem>.+)-(?P<part>\d+)-of-(?P<total>\d+)\.gguf$").expect("valid regex")
}

/// Walks `dir` one level deep (model folders are flat in practice) and
/// classifies every recognized file.
pub fn classify_dir(dir: &Path) -> std::io::Result<ClassifiedFiles> {
    let mut out = ClassifiedFiles::default();
    let multipart_re = multipart_regex();

    let mut gguf_files: Vec<(PathBuf, u64)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let meta = entry.metadata()?;
        let bytes = meta.len();
        out.total_bytes += bytes;

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        if name.ends_with(".safetensors") {
            out.safetensors.push(SingleFile {
                path: path.display().to_string(),
                bytes,
                quantization: None,
            });
        } else if name.ends_with(".gguf") {
            gguf_files.push((path, bytes));
        }
    }

    group_gguf_files(gguf_files, &multipart_re, &mut out);
    Ok(out)
}

fn group_gguf_files(mut files: Vec<(PathBuf, u64)>, multipart_re: &Regex, out: &mut ClassifiedFiles) {
    files.sort_by(|a, b| a.0.cmp(&b.0));

    use std::collections::BTreeMap;
    let mut groups: BTreeMap<String, Vec<(u32, u32, PathBuf, u64)>> = BTreeMap::new();
    let mut singles = Vec::new();

    for (path, bytes) in files {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Some(captures) = multipart_re.captures(name) {
            let stem = captures["stem"].to_string();
            let part: u32 = captures["part"].parse().unwrap_or(0);
            let total: u32 = captures["total"].parse().unwrap_or(0);
            groups.entry(stem).or_default().push((part, total, path, bytes));
        } else {
            singles.push((path, bytes));
        }
    }

    for (_, mut parts) in groups {
        parts.sort_by_key(|(part, ..)| *part);
        let total_expected = parts.first().map(|(_, total, ..)| *total).unwrap_or(0) as usize;
        let total_bytes: u64 = parts.iter().map(|(_, _, _, bytes)| bytes).sum();
        let first_part = parts
            .first()
            .map(|(_, _, path, _)| path.display().to_string())
            .unwrap_or_default();
        let quantization = parts
            .first()
            .and_then(|(_, _, path, _)| path.file_name().and_then(|n| n.to_str()))
            .and_then(detect_quantization);
        let status = if parts.len() == total_expected && total_expected > 0 {
            "ready"
        } else {
            "incomplete"
        };

        out.multipart_gguf.push(MultipartGroup {
            files: parts.len(),
            first_part,
            status: status.to_string(),
            total_bytes,
            quantization,
        });
    }

    for (path, bytes) in singles {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        out.single_gguf.push(SingleFile {
            path: path.display().to_string(),
            bytes,
            quantization: detect_quantization(name),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn groups_multipart_gguf_shards() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            fs::write(dir.path().join(format!("model-0000{i}-of-00003.gguf")), vec![0u8; 16]).unwrap();
        }
        let classified = classify_dir(dir.path()).unwrap();
        assert_eq!(classified.multipart_gguf.len(), 1);
        assert_eq!(classified.multipart_gguf[0].files, 3);
        assert_eq!(classified.multipart_gguf[0].status, "ready");
        assert!(classified.multipart_gguf[0].first_part.contains("00001-of-00003"));
        assert!(!classified.has_safetensors());
    }

    #[test]
    fn detects_single_gguf_with_quant_label() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model-Q4_K_M.gguf"), vec![0u8; 16]).unwrap();
        let classified = classify_dir(dir.path()).unwrap();
        assert_eq!(classified.single_gguf.len(), 1);
        assert_eq!(classified.single_gguf[0].quantization.as_deref(), Some("Q4_K_M"));
    }

    #[test]
    fn detects_safetensors_presence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.safetensors"), vec![0u8; 16]).unwrap();
        let classified = classify_dir(dir.path()).unwrap();
        assert!(classified.has_safetensors());
        assert!(!classified.has_gguf());
    }

    #[test]
    fn incomplete_multipart_group_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model-00001-of-00003.gguf"), vec![0u8; 16]).unwrap();
        fs::write(dir.path().join("model-00002-of-00003.gguf"), vec![0u8; 16]).unwrap();
        let classified = classify_dir(dir.path()).unwrap();
        assert_eq!(classified.multipart_gguf[0].status, "incomplete");
    }
}
