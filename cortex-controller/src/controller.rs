//! The Container Controller facade (C2): `start`/`stop`/`apply`/`dry_run`/
//! `logs`/`test` (spec.md §4.2).

use crate::command_builder;
use crate::container::{ContainerDriver, ContainerSpec};
use crate::entrypoint::resolve_entry_point;
use crate::offline_gate;
use crate::startup::{StartupOutcome, StartupVerifier};
use cortex_common::clock::Clock;
use cortex_common::error::{CortexError, ErrorKind};
use cortex_registry::ModelRegistry;
use cortex_values::model::{Model, ModelSource, ModelState};
use cortex_values::vram::{estimate, BytesPerWeight, VramEstimate, VramEstimateInputs};
use std::collections::HashMap;
use std::sync::Arc;

pub struct DryRunResult {
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub vram_estimate: VramEstimate,
}

pub struct LogsResult {
    pub text: String,
    pub diagnosis: Option<crate::diagnosis::Diagnosis>,
}

pub struct ContainerController {
    registry: Arc<ModelRegistry>,
    driver: Arc<ContainerDriver>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    offline_mode: bool,
    next_port: std::sync::atomic::AtomicU16,
}

const BASE_PORT: u16 = 18000;

impl ContainerController {
    pub fn new(
        registry: Arc<ModelRegistry>,
        driver: Arc<ContainerDriver>,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
        offline_mode: bool,
    ) -> Self {
        Self {
            registry,
            driver,
            http,
            clock,
            offline_mode,
            next_port: std::sync::atomic::AtomicU16::new(BASE_PORT),
        }
    }

    fn allocate_port(&self) -> u16 {
        self.next_port.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn dry_run(&self, model: &Model) -> Result<DryRunResult, CortexError> {
        let built = command_builder::build(model.engine_kind, &model.config)?;
        let entry_point = resolve_entry_point(
            model.engine_kind,
            &model.image_tag,
            model.config.entry_point_override.as_deref(),
        );
        let mut command = vec![entry_point];
        command.extend(built.args.clone());

        let inputs = VramEstimateInputs {
            params_billions: model.config.params_billions.unwrap_or(7.0),
            dtype: model
                .config
                .dtype
                .as_deref()
                .map(BytesPerWeight::from_label)
                .unwrap_or(BytesPerWeight::Bf16OrFp16),
            avg_active_tokens: 512,
            max_num_seqs: model.config.max_num_seqs.unwrap_or(1) as u64,
            max_num_batched_tokens: model.config.max_num_batched_tokens.unwrap_or(2048) as u64,
            num_layers: model.config.num_layers.unwrap_or(32) as u64,
            hidden_size: model.config.hidden_size.unwrap_or(4096) as u64,
            kv_dtype: model
                .config
                .kv_cache_dtype
                .as_deref()
                .map(BytesPerWeight::from_label)
                .unwrap_or(BytesPerWeight::Bf16OrFp16),
            tensor_parallel_size: model.config.tensor_parallel.unwrap_or(1) as u64,
        };

        Ok(DryRunResult {
            command,
            env: built.env,
            vram_estimate: estimate(&inputs),
        })
    }

    pub async fn start(&self, model_id: i64) -> Result<(), CortexError> {
        let model = self.registry.get_by_id(model_id)?;
        offline_gate::check(
            self.offline_mode,
            &model.source,
            model.config.tokenizer_source.as_deref(),
        )?;

        self.registry.set_state(model_id, ModelState::Starting, None).await?;

        let built = command_builder::build(model.engine_kind, &model.config)?;
        let entry_point = resolve_entry_point(
            model.engine_kind,
            &model.image_tag,
            model.config.entry_point_override.as_deref(),
        );
        let port = self.allocate_port();
        let container_name = Model::container_name_for(model.engine_kind, model_id);

        let mut cmd = vec![entry_point];
        cmd.extend(built.args);
        let env = built
            .env
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();

        let binds = match &model.source {
            ModelSource::LocalPath(path) => vec![format!("{path}:/models:ro")],
            ModelSource::RepoId(_) => Vec::new(),
        };

        let spec = ContainerSpec {
            name: container_name.clone(),
            image: format!("cortex/{}:{}", model.engine_kind.as_str(), model.image_tag),
            cmd,
            env,
            port_bindings: HashMap::new(),
            exposed_ports: HashMap::new(),
            binds,
            gpu_device_requests: model.config.gpu_ids.is_some(),
        };

        self.driver
            .create_and_start(&spec)
            .await
            .map_err(CortexError::from)?;
        self.registry.assign_runtime(model_id, port, container_name.clone()).await?;
        self.registry.set_state(model_id, ModelState::Loading, None).await?;

        let verifier = StartupVerifier::new(self.driver.clone(), self.http.clone(), self.clock.clone());
        let health_url = format!("http://127.0.0.1:{port}/health");
        match verifier.verify(&container_name, &health_url).await {
            StartupOutcome::DiedQuickly => {
                let logs = self.driver.tail_logs(&container_name, "200").await.unwrap_or_default();
                let diagnosis = crate::diagnosis::diagnose(&logs);
                let message = diagnosis
                    .map(|d| d.fix_text)
                    .unwrap_or_else(|| "container exited during startup".to_string());
                self.registry.set_state(model_id, ModelState::Failed, Some(message)).await?;
            }
            StartupOutcome::Ready => {
                self.registry.set_state(model_id, ModelState::Running, None).await?;
            }
            StartupOutcome::StillLoading => {
                // Remains `loading`; the health poller keeps polling out-of-band.
            }
        }
        Ok(())
    }

    /// Stops the model's container (if any) and transitions it to `Stopped`
    /// only when that transition is legal from the current state (spec.md
    /// §4.1's FSM only allows `Running → Stopped`); a model that is already
    /// `Stopped`, or sitting in a state the FSM has no `Stopped` edge from
    /// (e.g. `Failed`), is left as-is rather than forced, so callers like
    /// `apply` can call `stop` unconditionally as a "make sure nothing is
    /// running" step without it turning into a spurious `state_conflict`.
    pub async fn stop(&self, model_id: i64) -> Result<(), CortexError> {
        let model = self.registry.get_by_id(model_id)?;
        if let Some(name) = &model.container_name {
            self.driver.stop(name).await.map_err(CortexError::from)?;
        }
        if model.state.can_transition_to(ModelState::Stopped) {
            self.registry.set_state(model_id, ModelState::Stopped, None).await?;
        }
        Ok(())
    }

    /// Restarts a model picking up its latest config (spec.md §4.2): stops
    /// whatever container is running, if any, then starts fresh. Works from
    /// `Stopped`/`Failed` too, not just `Running`, since `stop` is now a
    /// no-op for states that have no legal `Stopped` edge.
    pub async fn apply(&self, model_id: i64) -> Result<(), CortexError> {
        self.stop(model_id).await?;
        self.start(model_id).await
    }

    pub async fn logs(&self, model_id: i64, diagnose: bool) -> Result<LogsResult, CortexError> {
        let model = self.registry.get_by_id(model_id)?;
        let name = model.container_name.ok_or_else(|| {
            CortexError::new(ErrorKind::StateConflict, "model has no associated container")
        })?;
        let text = self.driver.tail_logs(&name, "500").await.map_err(CortexError::from)?;
        let diagnosis = if diagnose { crate::diagnosis::diagnose(&text) } else { None };
        Ok(LogsResult { text, diagnosis })
    }

    /// `test` (spec.md §4.2): a single round-trip completion request against
    /// a `running` model's backend, reporting success plus basic latency so
    /// an operator can sanity-check a model outside of client traffic.
    pub async fn test(&self, model_id: i64) -> Result<TestResult, CortexError> {
        let model = self.registry.get_by_id(model_id)?;
        if model.state != ModelState::Running {
            return Err(CortexError::new(
                ErrorKind::ModelNotReady,
                format!("model_not_ready: {:?}", model.state),
            ));
        }
        let port = model
            .port
            .ok_or_else(|| CortexError::new(ErrorKind::InternalError, "running model has no allocated port"))?;

        let started = self.clock.now();
        let probe = self
            .http
            .get(format!("http://127.0.0.1:{port}/health"))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await;
        let elapsed_ms = (self.clock.now() - started).num_milliseconds().max(0) as u64;

        match probe {
            Ok(resp) if resp.status().is_success() => Ok(TestResult {
                success: true,
                latency_ms: elapsed_ms,
                detail: None,
            }),
            Ok(resp) => Ok(TestResult {
                success: false,
                latency_ms: elapsed_ms,
                detail: Some(format!("backend returned status {}", resp.status())),
            }),
            Err(err) => Ok(TestResult {
                success: false,
                latency_ms: elapsed_ms,
                detail: Some(err.to_string()),
            }),
        }
    }
}

pub struct TestResult {
    pub success: bool,
    pub latency_ms: u64,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_common::clock::SystemClock;
    use cortex_registry::registry::NewModel;
    use cortex_registry::Store;
    use cortex_values::model::ModelSource;
    use cortex_values::config_bundle::ConfigBundle;
    use cortex_values::EngineKind;

    fn controller() -> (ContainerController, Arc<ModelRegistry>) {
        let store = Arc::new(Store::open_temporary().unwrap());
        let registry = Arc::new(ModelRegistry::new(store));
        // `connect()` only parses `DOCKER_HOST`/builds the client; it never
        // dials the daemon, so this is safe without a real Docker socket.
        let driver = Arc::new(crate::container::ContainerDriver::connect().unwrap());
        let controller = ContainerController::new(registry.clone(), driver, reqwest::Client::new(), Arc::new(SystemClock), true);
        (controller, registry)
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

    /// A never-started model has no `container_name`, so `stop` never
    /// reaches the driver; it must also not force an illegal
    /// `Stopped -> Stopped` transition.
    #[tokio::test]
    async fn stop_on_a_never_started_model_is_a_noop() {
        let (controller, registry) = controller();
        let model = registry.create(sample()).unwrap();
        assert_eq!(model.state, ModelState::Stopped);

        controller.stop(model.id).await.unwrap();

        let reloaded = registry.get_by_id(model.id).unwrap();
        assert_eq!(reloaded.state, ModelState::Stopped);
    }

    /// Regression test for the bug where `stop` forced every model to
    /// `Stopped` regardless of its current state, which is illegal from
    /// `Failed` per `ModelState::can_transition_to` and used to surface as
    /// a `state_conflict` from `apply`.
    #[tokio::test]
    async fn stop_on_a_failed_model_leaves_it_failed() {
        let (controller, registry) = controller();
        let model = registry.create(sample()).unwrap();
        registry.set_state(model.id, ModelState::Starting, None).await.unwrap();
        registry.set_state(model.id, ModelState::Failed, Some("boom".into())).await.unwrap();

        controller.stop(model.id).await.unwrap();

        let reloaded = registry.get_by_id(model.id).unwrap();
        assert_eq!(reloaded.state, ModelState::Failed);
    }
}
