pub mod auth;
pub mod callback;
pub mod eventsub;
pub mod oauth;
pub mod token_store;
pub mod types;
pub mod users;

pub use auth::{TokenManager, TokenPair};
pub use callback::{CallbackError, CallbackServer, PendingCode};
pub use eventsub::{
    ApiError, BatchOutcome, EventSubClient, FailureReason, HelixSubscriptionApi, ReconcileReport,
    Reconciler, RecordTransport, SubscriptionApi, SubscriptionKind, SubscriptionRecord, SubscriptionRequest,
    SubscriptionStatus, Transport,
};
pub use oauth::{AuthExchangeError, CodeTokens, OAuthClient, ValidatedToken};
pub use token_store::{Credential, TokenStore, TokenStoreError};
pub use types::{TwitchEvent, TwitchRole, TwitchUser};
pub use users::{HelixUser, UsersClient};
