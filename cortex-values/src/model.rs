//! Domain data types (spec.md §3): `Model`, `ApiKey`, `UsageRecord`, and the
//! in-memory snapshot types the health poller and selector share.

use crate::config_bundle::{ConfigBundle, EngineKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Stopped,
    Starting,
    Loading,
    Running,
    Failed,
    Archived,
}

impl ModelState {
    /// The legality table from spec.md §4.1's state machine diagram.
    pub fn can_transition_to(self, next: ModelState) -> bool {
        use ModelState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Loading)
                | (Starting, Failed)
                | (Loading, Running)
                | (Loading, Failed)
                | (Running, Stopped)
                | (Failed, Starting)
                | (Stopped, Archived)
                | (Failed, Archived)
        )
    }

    pub fn requires_container(self) -> bool {
        matches!(self, ModelState::Starting | ModelState::Loading | ModelState::Running)
    }
}

/// One of `repo_id` or `local_path` — the invariant from spec.md §3 that
/// exactly one is set is encoded by making this an enum rather than two
/// optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ModelSource {
    RepoId(String),
    LocalPath(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub display_name: String,
    pub served_name: String,
    pub engine_kind: EngineKind,
    pub source: ModelSource,
    pub image_tag: String,
    pub config: ConfigBundle,
    pub state: ModelState,
    pub last_error: Option<String>,
    pub port: Option<u16>,
    pub container_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// The stable container name convention from spec.md §6.
    pub fn container_name_for(engine_kind: EngineKind, id: i64) -> String {
        format!("{}-model-{id}", engine_kind.as_str())
    }

    /// The §3 invariant: a model in a container-bearing state must carry a
    /// port and container name.
    pub fn invariants_hold(&self) -> bool {
        if self.state.requires_container() {
            self.port.is_some() && self.container_name.is_some()
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiKeyScope {
    ChatCompletions,
    Embeddings,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    /// Hex-encoded SHA-256 of the raw token; the raw value is never stored.
    pub key_hash: String,
    /// Short, non-secret lookup prefix shown in admin UIs.
    pub prefix: String,
    pub scopes: Vec<ApiKeyScope>,
    pub owner_user_id: i64,
    pub organization_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn has_scope(&self, scope: ApiKeyScope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.disabled && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ChatCompletion,
    Completion,
    Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: i64,
    pub key_id: i64,
    pub served_name: String,
    pub task_kind: TaskKind,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub latency_ms: u64,
    pub http_status: u16,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub base_url: String,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_status: ProbeStatus,
    pub consecutive_failures: u32,
    pub rolling_latency_ms: f64,
}

impl HealthSnapshot {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            last_probe_at: None,
            last_status: ProbeStatus::Unknown,
            consecutive_failures: 0,
            rolling_latency_ms: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub base_url: String,
    pub state: CircuitState,
    pub opened_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: CircuitState::Closed,
            opened_at: None,
            failure_count: 0,
            cooldown_until: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedEngine {
    TransformersServer,
    GgufServer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRecommendation {
    pub recommended: RecommendedEngine,
    pub reason: String,
    pub multipart_gguf: bool,
    pub has_safetensors: bool,
}

impl EngineRecommendation {
    /// The four-row decision matrix from spec.md §4.9.
    pub fn decide(multipart_gguf: bool, has_safetensors: bool) -> Self {
        let (recommended, reason) = match (multipart_gguf, has_safetensors) {
            (true, true) => (
                RecommendedEngine::TransformersServer,
                "multi-part GGUF alongside safetensors: safetensors is authoritative",
            ),
            (true, false) => (
                RecommendedEngine::GgufServer,
                "multi-part GGUF with no safetensors",
            ),
            (false, true) => (
                RecommendedEngine::TransformersServer,
                "single GGUF with safetensors present",
            ),
            (false, false) => (
                RecommendedEngine::GgufServer,
                "single GGUF, no safetensors",
            ),
        };
        Self {
            recommended,
            reason: reason.to_string(),
            multipart_gguf,
            has_safetensors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_follows_convention() {
        assert_eq!(
            Model::container_name_for(EngineKind::GgufServer, 42),
            "gguf-server-model-42"
        );
    }

    #[test]
    fn state_machine_rejects_illegal_transitions() {
        assert!(ModelState::Stopped.can_transition_to(ModelState::Starting));
        assert!(!ModelState::Stopped.can_transition_to(ModelState::Running));
        assert!(!ModelState::Archived.can_transition_to(ModelState::Running));
    }

    #[test]
    fn decision_matrix_covers_all_four_rows() {
        assert_eq!(
            EngineRecommendation::decide(true, false).recommended,
            RecommendedEngine::GgufServer
        );
        assert_eq!(
            EngineRecommendation::decide(true, true).recommended,
            RecommendedEngine::TransformersServer
        );
        assert_eq!(
            EngineRecommendation::decide(false, true).recommended,
            RecommendedEngine::TransformersServer
        );
        assert_eq!(
            EngineRecommendation::decide(false, false).recommended,
            RecommendedEngine::GgufServer
        );
    }
}
