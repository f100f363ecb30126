//! Container Controller (C2): command-line construction, Docker driving,
//! progressive startup verification, and log diagnosis.

pub mod command_builder;
pub mod container;
pub mod controller;
pub mod diagnosis;
pub mod entrypoint;
pub mod gpu_info;
pub mod offline_gate;
pub mod startup;

pub use controller::{ContainerController, DryRunResult, LogsResult, TestResult};
