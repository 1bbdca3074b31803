//! Provisioner actor - serializes access to the spot engine.
//!
//! The engine has no locking of its own. Launch, terminate and the periodic
//! reconciliation pass all arrive here as messages and run one at a time.

use async_trait::async_trait;
use spotfleet_reconcile::{ClockSkew, Instance, RequestSet};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::framework::{spawn, Actor, ActorContext, ActorError, ActorHandle, ActorRef};
use crate::error::ProvisionerResult;
use crate::spot::SpotProvisioner;

/// Default mailbox capacity.
pub const DEFAULT_MAILBOX_SIZE: usize = 64;

// =============================================================================
// Messages
// =============================================================================

/// Messages handled by ProvisionerActor.
#[derive(Debug)]
pub enum ProvisionerMessage {
    /// Request more instances.
    Launch {
        count: i32,
        reply_to: oneshot::Sender<ProvisionerResult<()>>,
    },

    /// Release instances and pending requests by handle id.
    Terminate {
        handles: Vec<String>,
        reply_to: oneshot::Sender<()>,
    },

    /// Run one reconciliation pass.
    List {
        reply_to: oneshot::Sender<ProvisionerResult<Vec<Instance>>>,
    },

    /// Read the engine state.
    Snapshot {
        reply_to: oneshot::Sender<ProvisionerSnapshot>,
    },
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone)]
pub struct ProvisionerSnapshot {
    /// Ids of the tracked requests.
    pub tracked_ids: Vec<String>,

    /// Estimated remote clock minus local clock, in seconds.
    pub approximate_clock_skew_secs: i64,

    /// Current validity-window lead, in seconds.
    pub launch_time_offset_secs: u64,

    /// Reconciliation passes run so far.
    pub passes: u64,

    /// Copy of the tracked request set.
    pub tracked: RequestSet,

    /// Clock skew state the two figures above are read from.
    pub clock: ClockSkew,
}

// =============================================================================
// Provisioner Actor
// =============================================================================

/// Actor owning one [`SpotProvisioner`].
pub struct ProvisionerActor {
    engine: SpotProvisioner,
    passes: u64,
}

impl ProvisionerActor {
    pub fn new(engine: SpotProvisioner) -> Self {
        Self { engine, passes: 0 }
    }

    /// Start the actor and return its client handle.
    pub fn start(self, mailbox_size: usize) -> (ProvisionerHandle, ActorRef) {
        let (handle, actor_ref) = spawn(self, mailbox_size);
        (ProvisionerHandle { inner: handle }, actor_ref)
    }

    fn snapshot(&self) -> ProvisionerSnapshot {
        let tracked = self.engine.tracked().clone();
        let clock = self.engine.clock();
        ProvisionerSnapshot {
            tracked_ids: tracked.ids(),
            approximate_clock_skew_secs: clock.approximate_clock_skew().num_seconds(),
            launch_time_offset_secs: clock.launch_time_offset().as_secs(),
            passes: self.passes,
            tracked,
            clock,
        }
    }
}

#[async_trait]
impl Actor for ProvisionerActor {
    type Message = ProvisionerMessage;

    fn name(&self) -> &str {
        "spot_provisioner"
    }

    async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        if self.engine.settings().tuning.calibrate_on_start {
            let skew = self.engine.approximate_clock_skew().await;
            info!(
                actor_id = %ctx.actor_id,
                approximate_clock_skew_secs = skew.num_seconds(),
                "Clock skew calibrated"
            );
        }
        Ok(())
    }

    async fn handle(
        &mut self,
        msg: ProvisionerMessage,
        _ctx: &mut ActorContext,
    ) -> Result<bool, ActorError> {
        match msg {
            ProvisionerMessage::Launch { count, reply_to } => {
                let result = self.engine.launch(count).await;
                let _ = reply_to.send(result);
            }
            ProvisionerMessage::Terminate { handles, reply_to } => {
                self.engine.terminate(&handles).await;
                let _ = reply_to.send(());
            }
            ProvisionerMessage::List { reply_to } => {
                self.passes += 1;
                let result = self.engine.list().await;
                let _ = reply_to.send(result);
            }
            ProvisionerMessage::Snapshot { reply_to } => {
                let _ = reply_to.send(self.snapshot());
            }
        }
        Ok(true)
    }

    async fn on_stop(&mut self, ctx: &mut ActorContext) {
        debug!(
            actor_id = %ctx.actor_id,
            tracked = self.engine.tracked().len(),
            passes = self.passes,
            "Provisioner actor stopping"
        );
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable client for a running [`ProvisionerActor`].
#[derive(Clone)]
pub struct ProvisionerHandle {
    inner: ActorHandle<ProvisionerMessage>,
}

impl ProvisionerHandle {
    /// Request `count` more instances.
    pub async fn launch(&self, count: i32) -> Result<(), ActorError> {
        self.inner
            .request(|reply_to| ProvisionerMessage::Launch { count, reply_to })
            .await??;
        Ok(())
    }

    /// Release instances and pending requests by handle id.
    pub async fn terminate(&self, handles: Vec<String>) -> Result<(), ActorError> {
        self.inner
            .request(|reply_to| ProvisionerMessage::Terminate { handles, reply_to })
            .await
    }

    /// Run a reconciliation pass and return the resulting handles.
    pub async fn list(&self) -> Result<Vec<Instance>, ActorError> {
        Ok(self
            .inner
            .request(|reply_to| ProvisionerMessage::List { reply_to })
            .await??)
    }

    pub async fn snapshot(&self) -> Result<ProvisionerSnapshot, ActorError> {
        self.inner
            .request(|reply_to| ProvisionerMessage::Snapshot { reply_to })
            .await
    }

    pub fn actor_id(&self) -> &str {
        self.inner.actor_id()
    }
}
