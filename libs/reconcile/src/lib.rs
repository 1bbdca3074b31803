//! Spot request reconciliation primitives.
//!
//! This library holds the I/O-free half of the spot provisioner: the data
//! model for spot requests and the decisions taken on every reconciliation
//! pass. Key concepts:
//!
//! - **Tracked set**: the requests the provisioner believes are outstanding.
//!   It is a consistency aid, not a system of record, and is re-derived from
//!   the remote API on every pass.
//! - **Visibility gap**: freshly created requests are not listed by the remote
//!   API for a while. Requests in the gap are looked up by id instead of
//!   being forgotten, which prevents overprovisioning.
//! - **Clock skew**: validity windows are judged by the remote clock, so the
//!   local clock is corrected by a measured skew plus a growing lead.
//!
//! # Invariants
//!
//! - A request id is tracked at most once; later observations replace earlier ones
//! - Requests observed in a terminal state stop being tracked
//! - Instances that are terminated or shutting down are never reported
//! - The launch time offset never decreases

mod clock;
mod error;
mod instance;
mod macros;
mod pass;
mod request;
mod terminate;
mod vocabulary;

pub use clock::{
    round_away_from_zero, ClockSkew, DEFAULT_LAUNCH_TIME_OFFSET, LAUNCH_TIME_OFFSET_GROWTH,
    SKEW_ROUNDING_INTERVAL,
};
pub use error::{ReconcileError, ReconcileResult};
pub use instance::{Instance, InstanceState, ResourceDescription};
pub use pass::{assemble_instances, AssembledInstances, PassSummary, ReconcilePass};
pub use request::{RequestSet, SpotRequest};
pub use terminate::{is_spot_request_id, partition_handles, TerminationPlan, SPOT_REQUEST_ID_PREFIX};
pub use vocabulary::{RequestState, ResourceState, StatusCode};
