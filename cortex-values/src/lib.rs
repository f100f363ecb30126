//! Shared wire types, configuration bundle and domain math for CORTEX.
//!
//! This crate is deliberately free of any I/O: `cortex-registry` persists
//! `Model`/`ApiKey`/`UsageRecord`, `cortex-controller` drives containers,
//! `cortex-gateway` speaks HTTP — all of them share the types defined here
//! so that a `served_name` or a `ConfigBundle` means the same thing on both
//! sides of a crate boundary.

pub mod config_bundle;
pub mod error_envelope;
pub mod gpu;
pub mod model;
pub mod openai;
pub mod users;
pub mod vram;

pub use config_bundle::{ConfigBundle, EngineKind};
pub use error_envelope::ErrorEnvelope;
pub use model::{
    ApiKey, CircuitState, EngineRecommendation, HealthSnapshot, Model, ModelState, UsageRecord,
};
pub use users::{NewOrganization, NewUser, Organization, OrganizationPatch, User, UserPatch};
