//! Actor framework for the provisioner.
//!
//! A single actor owns the spot engine so that launch, terminate and the
//! periodic reconciliation pass never interleave.
//!
//! - `ProvisionerActor`: owns one `SpotProvisioner` and handles its messages
//! - `ProvisionerHandle`: cloneable client used by the tick worker and
//!   schedulers

mod framework;
mod provisioner;

pub use framework::{
    spawn, Actor, ActorContext, ActorError, ActorHandle, ActorRef, Message,
};
pub use provisioner::{
    ProvisionerActor, ProvisionerHandle, ProvisionerMessage, ProvisionerSnapshot,
    DEFAULT_MAILBOX_SIZE,
};
