//! Spotfleet spot provisioner.
//!
//! Keeps a pool of spot instances in line with what a capacity scheduler
//! asks for. The remote spot API is eventually consistent, so the engine
//! tracks every request it creates and reconciles that belief against the
//! remote view on every tick.
//!
//! ## Architecture
//!
//! ```text
//! TickWorker ──List──▶ ProvisionerActor ──▶ SpotProvisioner ──▶ SpotRequestApi
//! scheduler ─Launch/Terminate─┘                              └─▶ InstanceApi
//! ```
//!
//! ## Modules
//!
//! - `cloud`: remote API traits and the in-memory simulated cloud
//! - `spot`: the provisioning engine
//! - `actors`: mailbox actor serializing access to the engine
//! - `worker`: periodic reconciliation driver

pub mod actors;
pub mod cloud;
pub mod config;
pub mod error;
pub mod spot;
pub mod worker;

pub use actors::{ProvisionerActor, ProvisionerHandle, ProvisionerSnapshot};
pub use config::{Config, LaunchConfig, PoolConfig, SimulationConfig, SpotSettings, SpotTuning};
pub use error::{ProvisionerError, ProvisionerResult};
pub use spot::SpotProvisioner;
pub use worker::{TickConfig, TickWorker};
