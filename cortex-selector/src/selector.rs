//! Upstream resolution (spec.md §4.4): model lookup → state check →
//! breaker check → URL.

use crate::breaker::{Admission, BreakerRegistry};
use cortex_common::error::{CortexError, ErrorKind};
use cortex_registry::ModelRegistry;
use cortex_values::model::ModelState;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedRequest {
    /// Dial the backend normally.
    Dial,
    /// This is the single half-open probe; the caller must feed the
    /// outcome back into the breaker.
    Probe,
}

pub struct UpstreamSelector {
    registry: Arc<ModelRegistry>,
    breaker: Arc<BreakerRegistry>,
}

impl UpstreamSelector {
    pub fn new(registry: Arc<ModelRegistry>, breaker: Arc<BreakerRegistry>) -> Self {
        Self { registry, breaker }
    }

    /// Resolves a `served_name` to a backend base URL, per the five-step
    /// algorithm in spec.md §4.4. One-model-one-container in this system,
    /// so the "round robin" in the spec note degenerates to identity.
    pub fn resolve(&self, served_name: &str) -> Result<(String, ResolvedRequest), CortexError> {
        let model = self.registry.get_by_served_name(served_name)?;

        if model.state != ModelState::Running {
            return Err(CortexError::new(
                ErrorKind::ModelNotReady,
                format!("model_not_ready: {:?}", model.state),
            ));
        }

        let port = model.port.ok_or_else(|| {
            CortexError::new(ErrorKind::InternalError, "running model has no allocated port")
        })?;
        let base_url = format!("http://127.0.0.1:{port}");

        match self.breaker.admit(&base_url) {
            Admission::Allow => Ok((base_url, ResolvedRequest::Dial)),
            Admission::AllowProbe => Ok((base_url, ResolvedRequest::Probe)),
            Admission::Reject => Err(CortexError::new(
                ErrorKind::UpstreamUnavailable,
                format!("circuit open for {served_name}"),
            )),
        }
    }

    pub fn record_outcome(&self, base_url: &str, success: bool) {
        if success {
            self.breaker.record_success(base_url);
        } else {
            self.breaker.record_failure(base_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use cortex_common::clock::SystemClock;
    use cortex_registry::{registry::NewModel, Store};
    use cortex_values::config_bundle::ConfigBundle;
    use cortex_values::model::ModelSource;
    use cortex_values::EngineKind;

    fn setup() -> (Arc<ModelRegistry>, UpstreamSelector) {
        let registry = Arc::new(ModelRegistry::new(Arc::new(Store::open_temporary().unwrap())));
        let breaker = Arc::new(BreakerRegistry::new(BreakerConfig::default(), Arc::new(SystemClock)));
        let selector = UpstreamSelector::new(registry.clone(), breaker);
        (registry, selector)
    }

    #[tokio::test]
    async fn unready_model_fails_with_model_not_ready() {
        let (registry, selector) = setup();
        registry
            .create(NewModel {
                display_name: "m1".into(),
                served_name: "m1".into(),
                engine_kind: EngineKind::GgufServer,
                source: ModelSource::LocalPath("/models/m1".into()),
                image_tag: "latest".into(),
                config: ConfigBundle::default(),
            })
            .unwrap();

        let err = selector.resolve("m1").unwrap_err();
        assert_eq!(err.kind(), cortex_common::error::ErrorKind::ModelNotReady);
    }

    #[tokio::test]
    async fn missing_model_fails_with_model_not_found() {
        let (_, selector) = setup();
        let err = selector.resolve("missing").unwrap_err();
        assert_eq!(err.kind(), cortex_common::error::ErrorKind::ModelNotFound);
    }

    #[tokio::test]
    async fn running_model_resolves_to_its_port() {
        let (registry, selector) = setup();
        let model = registry
            .create(NewModel {
                display_name: "m1".into(),
                served_name: "m1".into(),
                engine_kind: EngineKind::GgufServer,
                source: ModelSource::LocalPath("/models/m1".into()),
                image_tag: "latest".into(),
                config: ConfigBundle::default(),
            })
            .unwrap();
        registry.set_state(model.id, ModelState::Starting, None).await.unwrap();
        registry.assign_runtime(model.id, 18042, "gguf-server-model-1".into()).await.unwrap();
        registry.set_state(model.id, ModelState::Loading, None).await.unwrap();
        registry.set_state(model.id, ModelState::Running, None).await.unwrap();

        let (url, kind) = selector.resolve("m1").unwrap();
        assert_eq!(url, "http://127.0.0.1:18042");
        assert_eq!(kind, ResolvedRequest::Dial);
    }
}
