//! Ties classification, GGUF header reading, tokenizer suggestion and the
//! engine recommendation matrix together into the single response shape
//! documented in spec.md §4.9.

use std::path::Path;

use cortex_common::error::{CortexError, ErrorKind};
use cortex_values::model::EngineRecommendation;
use serde::Serialize;

use crate::classify::{classify_dir, MultipartGroup, SingleFile};
use crate::gguf::{read_header, GgufMetadata, GgufValidation};
use crate::tokenizer;

#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    pub has_safetensors: bool,
    pub has_gguf: bool,
    pub multipart_groups: Vec<MultipartGroup>,
    pub single_files: Vec<SingleFile>,
    pub total_bytes: u64,
    pub gguf_validation: GgufValidation,
    pub metadata: GgufMetadata,
    pub engine_recommendation: EngineRecommendationView,
    pub tokenizer_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineRecommendationView {
    pub recommended: cortex_values::model::RecommendedEngine,
    pub reason: String,
    pub options: Vec<cortex_values::model::RecommendedEngine>,
}

/// Pure filesystem read (spec.md §4.9): never writes, never deletes, never
/// touches anything outside `folder`.
pub fn inspect_folder(folder: &Path) -> Result<InspectionReport, CortexError> {
    if !folder.is_dir() {
        return Err(CortexError::validation(
            "path",
            format!("{} is not a directory", folder.display()),
        ));
    }

    let classified = classify_dir(folder).map_err(|err| {
        CortexError::new(ErrorKind::InternalError, format!("reading {}: {err}", folder.display()))
    })?;

    let is_multipart = classified.is_multipart();
    let has_safetensors = classified.has_safetensors();
    let has_gguf = classified.has_gguf();

    // Validate headers from whichever GGUF file is representative: the
    // first shard of the first multipart group, else the first single file.
    let representative_gguf = classified
        .multipart_gguf
        .first()
        .map(|group| group.first_part.clone())
        .or_else(|| classified.single_gguf.first().map(|file| file.path.clone()));

    let (validation, metadata) = match representative_gguf {
        Some(path) => {
            let header = read_header(Path::new(&path));
            (header.validation, header.metadata)
        }
        None => (GgufValidation { valid: true, errors: Vec::new() }, GgufMetadata::default()),
    };

    let recommendation = EngineRecommendation::decide(is_multipart, has_safetensors);
    let folder_name = folder.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let tokenizer_suggestions = tokenizer::suggest(folder_name);

    Ok(InspectionReport {
        has_safetensors,
        has_gguf,
        multipart_groups: classified.multipart_gguf,
        single_files: classified
            .single_gguf
            .into_iter()
            .chain(classified.safetensors)
            .collect(),
        total_bytes: classified.total_bytes,
        gguf_validation: validation,
        metadata,
        engine_recommendation: EngineRecommendationView {
            recommended: recommendation.recommended,
            reason: recommendation.reason,
            options: vec![
                cortex_values::model::RecommendedEngine::TransformersServer,
                cortex_values::model::RecommendedEngine::GgufServer,
            ],
        },
        tokenizer_suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn multipart_gguf_without_safetensors_recommends_gguf_server() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            fs::write(dir.path().join(format!("model-0000{i}-of-00003.gguf")), vec![0u8; 8]).unwrap();
        }
        let report = inspect_folder(dir.path()).unwrap();
        assert!(!report.has_safetensors);
        assert_eq!(report.multipart_groups.len(), 1);
        assert_eq!(
            report.engine_recommendation.recommended,
            cortex_values::model::RecommendedEngine::GgufServer
        );
    }

    #[test]
    fn rejects_a_path_that_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        fs::write(&file_path, b"x").unwrap();
        let err = inspect_folder(&file_path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn safetensors_alongside_single_gguf_recommends_transformers_server() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.safetensors"), vec![0u8; 8]).unwrap();
        fs::write(dir.path().join("model-Q4_K_M.gguf"), vec![0u8; 8]).unwrap();
        let report = inspect_folder(dir.path()).unwrap();
        assert!(report.has_safetensors);
        assert!(report.has_gguf);
        assert_eq!(
            report.engine_recommendation.recommended,
            cortex_values::model::RecommendedEngine::TransformersServer
        );
    }
}
