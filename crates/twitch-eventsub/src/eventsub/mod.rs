pub mod api;
pub mod client;
pub mod reconcile;
pub mod subscription;
pub mod types;

pub use api::{ApiError, BatchOutcome, HelixSubscriptionApi, SubscriptionApi, Transport};
pub use client::EventSubClient;
pub use reconcile::{FailureReason, ReconcileReport, Reconciler};
pub use subscription::{
    RecordTransport, SubscriptionKey, SubscriptionKind, SubscriptionRecord, SubscriptionRequest,
    SubscriptionStatus,
};
