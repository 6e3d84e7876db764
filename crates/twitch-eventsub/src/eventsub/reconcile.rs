use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use super::api::{ApiError, BatchOutcome, SubscriptionApi, Transport};
use super::subscription::{SubscriptionRecord, SubscriptionRequest};

/// Time given to the API to forget deleted subscriptions before the one retry.
pub const CLEANUP_PROPAGATION_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Still conflicting after the cleanup pass.
    Conflict { raw_error: String },
    /// The credential may not create this subscription. Needs the channel
    /// owner to authorize again; never retried.
    PermissionDenied { reason: String },
    SubscriptionFailed { raw_error: String },
}

impl FailureReason {
    fn from_api_error(error: &ApiError) -> Self {
        if error.is_conflict() {
            Self::Conflict {
                raw_error: error.raw(),
            }
        } else if error.is_forbidden() {
            Self::PermissionDenied {
                reason: error.raw(),
            }
        } else {
            Self::SubscriptionFailed {
                raw_error: error.raw(),
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { raw_error } => write!(f, "conflict: {raw_error}"),
            Self::PermissionDenied { reason } => write!(f, "permission denied: {reason}"),
            Self::SubscriptionFailed { raw_error } => write!(f, "failed: {raw_error}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub succeeded: Vec<SubscriptionRecord>,
    pub failed: Vec<(SubscriptionRequest, FailureReason)>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Logs one line per outcome.
    pub fn log(&self, broadcaster_id: &str) {
        info!(
            "reconciled EventSub for broadcaster {}: {} active, {} failed",
            broadcaster_id,
            self.succeeded.len(),
            self.failed.len()
        );
        for record in &self.succeeded {
            info!("active: {} [{}] id={}", record.kind, record.status, record.id);
        }
        for (request, reason) in &self.failed {
            match reason {
                FailureReason::PermissionDenied { .. } => warn!(
                    "{} needs re-authorization by the channel owner: {}",
                    request, reason
                ),
                _ => warn!("{} could not be subscribed: {}", request, reason),
            }
        }
    }
}

/// What a listing implies for one broadcaster.
#[derive(Debug, Default)]
struct Plan {
    matching: Vec<SubscriptionRecord>,
    stale: Vec<SubscriptionRecord>,
    missing: Vec<SubscriptionRequest>,
}

/// Splits `existing` into records to keep and records to delete, and
/// `desired` into requests already covered and requests to create.
///
/// The first enabled record per key is kept. Every other record for
/// `broadcaster_id` is stale, including duplicates and disabled ones.
/// With a `session_id`, a record bound to a different WebSocket session is
/// stale too: it delivers to a connection that no longer exists.
/// Records of other broadcasters are left alone.
fn plan(
    broadcaster_id: &str,
    session_id: Option<&str>,
    desired: &[SubscriptionRequest],
    existing: Vec<SubscriptionRecord>,
) -> Plan {
    let wanted: HashSet<_> = desired.iter().map(SubscriptionRequest::key).collect();
    let mut plan = Plan::default();

    for record in existing {
        let Some(key) = record.key() else {
            continue;
        };
        if key.broadcaster_id != broadcaster_id && !wanted.contains(&key) {
            continue;
        }

        let current = session_id.is_none_or(|s| record.session_id().is_none_or(|r| r == s));
        let keep = record.status.is_enabled()
            && current
            && wanted.contains(&key)
            && !plan.matching.iter().any(|m| m.key() == Some(key));

        if keep {
            plan.matching.push(record);
        } else {
            plan.stale.push(record);
        }
    }

    plan.missing = desired
        .iter()
        .filter(|request| {
            !plan
                .matching
                .iter()
                .any(|record| record.key() == Some(request.key()))
        })
        .cloned()
        .collect();

    plan
}

/// Drives a [`SubscriptionApi`] towards a desired set of subscriptions.
pub struct Reconciler<'a, A: SubscriptionApi + ?Sized> {
    api: &'a A,
    propagation_delay: Duration,
    session_id: Option<String>,
}

impl<'a, A: SubscriptionApi + ?Sized> Reconciler<'a, A> {
    #[must_use]
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            propagation_delay: CLEANUP_PROPAGATION_DELAY,
            session_id: None,
        }
    }

    /// Only records delivering over `transport` count as existing.
    #[must_use]
    pub fn with_transport(mut self, transport: &Transport) -> Self {
        self.session_id = Some(transport.session_id().to_string());
        self
    }

    #[must_use]
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    pub async fn reconcile(
        &self,
        broadcaster_id: &str,
        desired: &[SubscriptionRequest],
    ) -> ReconcileReport {
        let desired = dedup(desired);

        let existing = match self.api.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "listing subscriptions for broadcaster {} failed, assuming none exist: {}",
                    broadcaster_id, e
                );
                Vec::new()
            }
        };

        let Plan {
            matching,
            stale,
            missing,
        } = plan(broadcaster_id, self.session_id.as_deref(), &desired, existing);

        for record in &stale {
            info!(
                "deleting stale subscription {} ({}, {})",
                record.id, record.kind, record.status
            );
            if let Err(e) = self.api.delete(&record.id).await {
                warn!(
                    "failed to delete subscription {} ({}) for broadcaster {}: {}",
                    record.id, record.kind, broadcaster_id, e
                );
            }
        }

        let mut report = ReconcileReport {
            succeeded: matching,
            failed: Vec::new(),
        };
        if missing.is_empty() {
            return report;
        }

        let outcome = self.api.batch_create(&missing).await;
        let conflicted = absorb(&mut report, outcome, broadcaster_id);
        if !conflicted {
            return report;
        }

        self.cleanup_and_retry(broadcaster_id, &desired, report).await
    }

    /// The single recovery pass after a conflict: everything owned by this
    /// credential set is deleted and the desired set created again, minus
    /// requests that already failed for other reasons.
    async fn cleanup_and_retry(
        &self,
        broadcaster_id: &str,
        desired: &[SubscriptionRequest],
        first: ReconcileReport,
    ) -> ReconcileReport {
        warn!(
            "subscription conflict for broadcaster {}, deleting all subscriptions and retrying once",
            broadcaster_id
        );

        if let Err(e) = self.api.delete_all().await {
            warn!("cleanup before retry failed: {}", e);
        }
        tokio::time::sleep(self.propagation_delay).await;

        let failed: Vec<_> = first
            .failed
            .into_iter()
            .filter(|(_, reason)| !matches!(reason, FailureReason::Conflict { .. }))
            .collect();
        let retry: Vec<_> = desired
            .iter()
            .filter(|request| !failed.iter().any(|(f, _)| f == *request))
            .cloned()
            .collect();

        let mut report = ReconcileReport {
            succeeded: Vec::new(),
            failed,
        };
        if retry.is_empty() {
            return report;
        }

        let outcome = self.api.batch_create(&retry).await;
        absorb(&mut report, outcome, broadcaster_id);
        report
    }
}

/// Moves a batch outcome into the report. Returns whether any item conflicted.
fn absorb(report: &mut ReconcileReport, outcome: BatchOutcome, broadcaster_id: &str) -> bool {
    report.succeeded.extend(outcome.succeeded);

    let mut conflicted = false;
    for (request, error) in outcome.failed {
        warn!(
            "creating {} for broadcaster {} failed: {}",
            request.kind, broadcaster_id, error
        );
        let reason = FailureReason::from_api_error(&error);
        conflicted |= matches!(reason, FailureReason::Conflict { .. });
        report.failed.push((request, reason));
    }
    conflicted
}

fn dedup(desired: &[SubscriptionRequest]) -> Vec<SubscriptionRequest> {
    let mut seen = HashSet::new();
    desired
        .iter()
        .filter(|&request| seen.insert(request.key()))
        .cloned()
        .collect()
}
