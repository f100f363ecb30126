//! The single explicit `AppContext` every handler is written against
//! (spec.md §9: "group into a single explicit `AppContext`... forbid
//! package-level mutable state"). `cortex-server` constructs one of these
//! at startup and clones the `Arc` into the router.

use std::sync::Arc;

use cortex_auth::{RateLimitStore, SessionStore};
use cortex_common::clock::Clock;
use cortex_common::config_env::EnvConfig;
use cortex_controller::ContainerController;
use cortex_deploy::JobRunner;
use cortex_health::SnapshotStore;
use cortex_registry::{ApiKeyStore, ModelRegistry, OrganizationDirectory, Store, UserDirectory};
use cortex_selector::{BreakerRegistry, UpstreamSelector};
use cortex_usage::UsageRecorder;
use metrics_exporter_prometheus::PrometheusHandle;

pub struct GatewayState {
    pub store: Arc<Store>,
    pub registry: Arc<ModelRegistry>,
    pub controller: Arc<ContainerController>,
    pub selector: Arc<UpstreamSelector>,
    pub breaker: Arc<BreakerRegistry>,
    pub health: Arc<SnapshotStore>,
    pub api_keys: Arc<ApiKeyStore>,
    pub users: Arc<UserDirectory>,
    pub organizations: Arc<OrganizationDirectory>,
    pub sessions: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<RateLimitStore>,
    pub usage: UsageRecorder,
    pub jobs: Arc<JobRunner>,
    pub http: reqwest::Client,
    pub metrics_handle: PrometheusHandle,
    pub clock: Arc<dyn Clock>,
    pub env: Arc<EnvConfig>,
}

pub type SharedState = Arc<GatewayState>;
