//! The Model Registry (C1): durable source of truth for routing/lifecycle.

use crate::store::{self, Store};
use crate::validation::validate_served_name;
use chrono::Utc;
use cortex_common::error::{CortexError, ErrorKind};
use cortex_values::config_bundle::ConfigBundle;
use cortex_values::model::{Model, ModelSource, ModelState};
use cortex_values::EngineKind;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Fields accepted on model creation. A closed struct, per the same
/// "reject unknown fields on ingress" convention as `ConfigBundle`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewModel {
    pub display_name: String,
    pub served_name: String,
    pub engine_kind: EngineKind,
    pub source: ModelSource,
    pub image_tag: String,
    pub config: ConfigBundle,
}

/// A sparse patch for `update`; `None` fields are left untouched.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ModelPatch {
    pub display_name: Option<String>,
    pub image_tag: Option<String>,
    pub config: Option<ConfigBundle>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelFilters {
    pub engine_kind: Option<EngineKind>,
    pub state: Option<ModelState>,
    pub served_name_contains: Option<String>,
}

pub struct ModelRegistry {
    store: Arc<Store>,
    /// Per-model transition lock, keyed by model id (spec.md §5: "state
    /// transitions on a single Model are serialized").
    locks: DashMap<i64, Arc<AsyncMutex<()>>>,
}

impl ModelRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: i64) -> Arc<AsyncMutex<()>> {
        self.locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub fn create(&self, new_model: NewModel) -> Result<Model, CortexError> {
        validate_served_name(&new_model.served_name)?;

        let models = self.store.models().map_err(CortexError::from)?;
        for existing in store::scan_rows::<Model>(&models).map_err(CortexError::from)? {
            if existing.served_name == new_model.served_name && existing.state != ModelState::Archived {
                return Err(CortexError::validation(
                    "served_name",
                    format!("'{}' is already in use by a non-archived model", new_model.served_name),
                ));
            }
        }

        let id = self.store.next_id().map_err(CortexError::from)?;
        let now = Utc::now();
        let model = Model {
            id,
            display_name: new_model.display_name,
            served_name: new_model.served_name,
            engine_kind: new_model.engine_kind,
            source: new_model.source,
            image_tag: new_model.image_tag,
            config: new_model.config,
            state: ModelState::Stopped,
            last_error: None,
            port: None,
            container_name: None,
            created_at: now,
            updated_at: now,
        };
        store::put_row(&models, &id.to_be_bytes(), &model).map_err(CortexError::from)?;
        Ok(model)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Model, CortexError> {
        let models = self.store.models().map_err(CortexError::from)?;
        store::get_row::<Model>(&models, &id.to_be_bytes())
            .map_err(CortexError::from)?
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("model {id} not found")))
    }

    pub fn get_by_served_name(&self, served_name: &str) -> Result<Model, CortexError> {
        let models = self.store.models().map_err(CortexError::from)?;
        store::scan_rows::<Model>(&models)
            .map_err(CortexError::from)?
            .into_iter()
            .find(|m| m.served_name == served_name && m.state != ModelState::Archived)
            .ok_or_else(|| {
                CortexError::new(
                    ErrorKind::ModelNotFound,
                    format!("no running model served as '{served_name}'"),
                )
            })
    }

    pub fn list(&self, filters: &ModelFilters) -> Result<Vec<Model>, CortexError> {
        let models = self.store.models().map_err(CortexError::from)?;
        let mut rows = store::scan_rows::<Model>(&models).map_err(CortexError::from)?;
        if let Some(kind) = filters.engine_kind {
            rows.retain(|m| m.engine_kind == kind);
        }
        if let Some(state) = filters.state {
            rows.retain(|m| m.state == state);
        }
        if let Some(substr) = &filters.served_name_contains {
            rows.retain(|m| m.served_name.contains(substr.as_str()));
        }
        Ok(rows)
    }

    pub async fn update(&self, id: i64, patch: ModelPatch) -> Result<Model, CortexError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut model = self.get_by_id(id)?;
        if let Some(display_name) = patch.display_name {
            model.display_name = display_name;
        }
        if let Some(image_tag) = patch.image_tag {
            model.image_tag = image_tag;
        }
        if let Some(config) = patch.config {
            model.config = config;
        }
        model.updated_at = Utc::now();

        let models = self.store.models().map_err(CortexError::from)?;
        store::put_row(&models, &id.to_be_bytes(), &model).map_err(CortexError::from)?;
        Ok(model)
    }

    /// The only writer of `state`; serializes transitions per model and
    /// enforces the FSM legality table.
    pub async fn set_state(
        &self,
        id: i64,
        next: ModelState,
        error: Option<String>,
    ) -> Result<Model, CortexError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut model = self.get_by_id(id)?;
        if !model.state.can_transition_to(next) {
            return Err(CortexError::new(
                ErrorKind::StateConflict,
                format!("cannot transition model {id} from {:?} to {next:?}", model.state),
            ));
        }
        model.state = next;
        model.last_error = error;
        model.updated_at = Utc::now();
        if !next.requires_container() && next != ModelState::Archived {
            model.port = None;
            model.container_name = None;
        }

        let models = self.store.models().map_err(CortexError::from)?;
        store::put_row(&models, &id.to_be_bytes(), &model).map_err(CortexError::from)?;
        Ok(model)
    }

    /// Called exclusively by the controller once it has allocated a port
    /// and started a container; not part of the public state-machine API.
    pub async fn assign_runtime(
        &self,
        id: i64,
        port: u16,
        container_name: String,
    ) -> Result<Model, CortexError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut model = self.get_by_id(id)?;
        model.port = Some(port);
        model.container_name = Some(container_name);
        model.updated_at = Utc::now();

        let models = self.store.models().map_err(CortexError::from)?;
        store::put_row(&models, &id.to_be_bytes(), &model).map_err(CortexError::from)?;
        Ok(model)
    }

    pub async fn archive(&self, id: i64) -> Result<Model, CortexError> {
        let current = self.get_by_id(id)?;
        if !matches!(current.state, ModelState::Stopped | ModelState::Failed) {
            return Err(CortexError::new(
                ErrorKind::StateConflict,
                "archive is only permitted from stopped or failed",
            ));
        }
        self.set_state(id, ModelState::Archived, None).await
    }

    /// Removes the DB row only, per the delete-safety invariant (spec.md
    /// §4.1, §4.2, testable property #2): model files are never touched.
    pub fn delete(&self, id: i64) -> Result<(), CortexError> {
        let model = self.get_by_id(id)?;
        if model.state != ModelState::Archived {
            return Err(CortexError::new(
                ErrorKind::StateConflict,
                "delete is only permitted on archived models",
            ));
        }
        let models = self.store.models().map_err(CortexError::from)?;
        models
            .remove(id.to_be_bytes())
            .map_err(anyhow::Error::from)
            .map_err(CortexError::from)?;
        self.locks.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(Arc::new(Store::open_temporary().unwrap()))
    }

    fn sample() -> NewModel {
        NewModel {
            display_name: "Llama 3 8B".into(),
            served_name: "llama-3-8b".into(),
            engine_kind: EngineKind::GgufServer,
            source: ModelSource::LocalPath("/models/llama-3-8b".into()),
            image_tag: "latest".into(),
            config: ConfigBundle::default(),
        }
    }

    #[tokio::test]
    async fn served_name_uniqueness_is_enforced_only_among_non_archived() {
        let reg = registry();
        let m1 = reg.create(sample()).unwrap();
        assert!(reg.create(sample()).is_err());

        reg.set_state(m1.id, ModelState::Starting, None).await.unwrap();
        reg.set_state(m1.id, ModelState::Failed, None).await.unwrap();
        reg.archive(m1.id).await.unwrap();

        assert!(reg.create(sample()).is_ok());
    }

    #[tokio::test]
    async fn illegal_transition_is_a_state_conflict() {
        let reg = registry();
        let m1 = reg.create(sample()).unwrap();
        let err = reg.set_state(m1.id, ModelState::Running, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn delete_requires_archived_state() {
        let reg = registry();
        let m1 = reg.create(sample()).unwrap();
        assert_eq!(reg.delete(m1.id).unwrap_err().kind(), ErrorKind::StateConflict);

        reg.set_state(m1.id, ModelState::Starting, None).await.unwrap();
        reg.set_state(m1.id, ModelState::Failed, None).await.unwrap();
        reg.archive(m1.id).await.unwrap();
        assert!(reg.delete(m1.id).is_ok());
        assert_eq!(reg.get_by_id(m1.id).unwrap_err().kind(), ErrorKind::ModelNotFound);
    }

    #[tokio::test]
    async fn list_filters_by_engine_kind_and_state() {
        let reg = registry();
        reg.create(sample()).unwrap();
        let mut other = sample();
        other.served_name = "mixtral".into();
        other.engine_kind = EngineKind::TransformersServer;
        reg.create(other).unwrap();

        let gguf_only = reg
            .list(&ModelFilters {
                engine_kind: Some(EngineKind::GgufServer),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(gguf_only.len(), 1);
        assert_eq!(gguf_only[0].served_name, "llama-3-8b");
    }
}
