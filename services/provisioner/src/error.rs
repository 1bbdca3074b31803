//! Provisioner errors.

use spotfleet_reconcile::ReconcileError;
use thiserror::Error;

use crate::cloud::CloudError;

/// Result type for provisioner operations.
pub type ProvisionerResult<T> = Result<T, ProvisionerError>;

/// Errors surfaced by the provisioner to its caller.
///
/// Best-effort side operations (tagging, cancellation cleanup, terminating
/// orphaned instances) are logged where they happen and never appear here.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// Listing or looking up spot requests failed.
    #[error("describing spot requests: {0}")]
    DescribeSpotRequests(#[source] CloudError),

    /// Describing the instances behind fulfilled requests failed.
    #[error("describing instances: {0}")]
    DescribeInstances(#[source] CloudError),

    /// Creating spot requests failed, after any validity-window retries.
    #[error("creating spot requests: {0}")]
    Launch(#[source] CloudError),

    /// Local time arithmetic failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl ProvisionerError {
    /// The underlying remote error, if any.
    pub fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            Self::DescribeSpotRequests(err) | Self::DescribeInstances(err) | Self::Launch(err) => {
                Some(err)
            }
            Self::Reconcile(_) => None,
        }
    }
}
