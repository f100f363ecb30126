//! Entry-point selection from an engine image tag (spec.md §4.2).

use cortex_values::config_bundle::EngineKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

fn parse_semver(tag: &str) -> Option<SemVer> {
    let core = tag.split(['-', '+']).next().unwrap_or(tag);
    let core = core.strip_prefix('v').unwrap_or(core);
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some(SemVer { major, minor, patch })
}

/// Documented default when the image tag doesn't parse as a semver, or an
/// explicit override is absent.
fn default_entry_point(engine_kind: EngineKind) -> &'static str {
    match engine_kind {
        EngineKind::TransformersServer => "python -m vllm.entrypoints.openai.api_server",
        EngineKind::GgufServer => "/usr/local/bin/llama-server",
    }
}

/// Resolves the in-container entry command, honoring an explicit override
/// field before attempting to parse the image tag.
pub fn resolve_entry_point(
    engine_kind: EngineKind,
    image_tag: &str,
    override_entry_point: Option<&str>,
) -> String {
    if let Some(explicit) = override_entry_point {
        return explicit.to_string();
    }

    match parse_semver(image_tag) {
        Some(version) if engine_kind == EngineKind::TransformersServer && version.major >= 1 => {
            "python -m vllm.entrypoints.openai.api_server --v1".to_string()
        }
        Some(_) | None => default_entry_point(engine_kind).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins() {
        assert_eq!(
            resolve_entry_point(EngineKind::GgufServer, "latest", Some("/custom/bin")),
            "/custom/bin"
        );
    }

    #[test]
    fn unparseable_tag_falls_back_to_default() {
        assert_eq!(
            resolve_entry_point(EngineKind::GgufServer, "latest", None),
            default_entry_point(EngineKind::GgufServer)
        );
    }

    #[test]
    fn v1_major_version_selects_v1_entrypoint() {
        assert_eq!(
            resolve_entry_point(EngineKind::TransformersServer, "v1.2.3", None),
            "python -m vllm.entrypoints.openai.api_server --v1"
        );
    }
}
