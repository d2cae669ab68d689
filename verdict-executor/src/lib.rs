//! Per-user execution fan-out with credential isolation.
//!
//! One authorized decision is broadcast to every eligible user context and
//! executed in parallel; failure of one user never affects another.

use thiserror::Error;

pub mod context;
pub mod crypto;
pub mod fanout;
pub mod user;

pub use context::{sized_quantity, SkipReason, UserContext};
pub use crypto::{CredentialsCipher, ENCRYPTION_KEY_ENV};
pub use fanout::{BroadcastOutcome, FanoutSettings, MultiUserExecutor};
pub use user::{
    EncryptedCredentials, SubscriptionTier, UserCredentials, UserProfile, UserRiskLimits,
    UserRiskState, UserStatus,
};

/// Result alias for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Failures raised by the executor layer.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("encryption key missing from environment ({0})")]
    MissingEncryptionKey(&'static str),
    #[error("credential envelope error: {0}")]
    Crypto(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("audit write failed: {0}")]
    Audit(#[from] verdict_journal::JournalError),
}
