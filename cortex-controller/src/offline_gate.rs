//! The offline tokenizer validation gate (spec.md §4.2, scenario S4): a
//! pre-start check, never a runtime surprise.

use cortex_common::error::CortexError;
use cortex_values::model::ModelSource;

/// `tokenizer_source` on the config bundle is either a local path or,
/// absent an override, assumed to mirror the model source.
fn looks_like_remote_repo_id(source: &str) -> bool {
    !source.starts_with('/') && !source.starts_with("./") && source.contains('/')
}

/// Returns `Err(validation_error)` naming the offending fields when the
/// model would need to fetch a tokenizer over the network while offline.
pub fn check(
    offline_mode: bool,
    model_source: &ModelSource,
    tokenizer_source: Option<&str>,
) -> Result<(), CortexError> {
    if !offline_mode {
        return Ok(());
    }
    let is_local_gguf = matches!(model_source, ModelSource::LocalPath(_));
    if !is_local_gguf {
        return Ok(());
    }

    let effective_tokenizer_source = match tokenizer_source {
        Some(explicit) => explicit,
        None => match model_source {
            ModelSource::LocalPath(path) => path.as_str(),
            ModelSource::RepoId(repo) => repo.as_str(),
        },
    };

    if looks_like_remote_repo_id(effective_tokenizer_source) {
        return Err(CortexError::validation(
            "tokenizer_source",
            format!(
                "offline mode is enabled and the tokenizer source '{effective_tokenizer_source}' \
                 is a remote repo id; provide a local tokenizer config path or pre-cache the \
                 remote tokenizer before starting this model"
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_remote_tokenizer_while_offline() {
        let source = ModelSource::LocalPath("/models/llama-3-8b".into());
        let err = check(true, &source, Some("meta-llama/Meta-Llama-3-8B")).unwrap_err();
        assert_eq!(err.field(), Some("tokenizer_source"));
    }

    #[test]
    fn allows_local_tokenizer_while_offline() {
        let source = ModelSource::LocalPath("/models/llama-3-8b".into());
        assert!(check(true, &source, Some("/models/llama-3-8b/tokenizer.json")).is_ok());
    }

    #[test]
    fn online_mode_never_gates() {
        let source = ModelSource::LocalPath("/models/llama-3-8b".into());
        assert!(check(false, &source, Some("meta-llama/Meta-Llama-3-8B")).is_ok());
    }
}
