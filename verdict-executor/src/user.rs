//! Per-user profile, credentials, and isolated risk state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use verdict_core::UserId;

/// Platform account status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Removed,
}

/// Subscription tier; bounds the position fraction a decision may imply
/// for this user.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Basic,
    Pro,
    Unlimited,
}

impl SubscriptionTier {
    /// Largest decision position fraction the tier permits.
    #[must_use]
    pub fn max_position_pct(self) -> f64 {
        match self {
            Self::Basic => 0.01,
            Self::Pro => 0.03,
            Self::Unlimited => 0.05,
        }
    }
}

/// Static user settings consulted by the eligibility filter and sizer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub status: UserStatus,
    pub subscription: SubscriptionTier,
    pub leverage: f64,
    /// User-chosen cap on any single position, as a fraction of equity.
    pub max_position_pct: f64,
}

/// Credentials as stored: ciphertext envelopes plus a validity flag set by
/// the key-verification job.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EncryptedCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub is_valid: bool,
}

/// Secret bytes that are wiped on drop and never printed.
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(value.into_bytes())
    }

    /// Borrow the secret. Callers must not log or persist it.
    #[must_use]
    pub fn expose(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the buffer with zeroes and release it.
    pub fn wipe(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = 0;
        }
        self.0.clear();
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(***)")
    }
}

/// Decrypted exchange credentials, held only in memory.
#[derive(Debug)]
pub struct UserCredentials {
    pub api_key: SecretBytes,
    pub api_secret: SecretBytes,
}

impl UserCredentials {
    #[must_use]
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key: SecretBytes::new(api_key),
            api_secret: SecretBytes::new(api_secret),
        }
    }

    /// Zero both secrets.
    pub fn wipe(&mut self) {
        self.api_key.wipe();
        self.api_secret.wipe();
    }

    #[must_use]
    pub fn is_wiped(&self) -> bool {
        self.api_key.is_empty() && self.api_secret.is_empty()
    }
}

/// Per-user risk thresholds; the same account-survival numbers, applied
/// user-scoped.
#[derive(Clone, Copy, Debug)]
pub struct UserRiskLimits {
    pub max_drawdown: f64,
    pub daily_max_loss: f64,
    pub consecutive_loss_limit: u32,
    pub consecutive_timeout_limit: u32,
}

impl Default for UserRiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown: 0.20,
            daily_max_loss: 0.03,
            consecutive_loss_limit: 3,
            consecutive_timeout_limit: 3,
        }
    }
}

/// Mutable per-user risk state. Owned by exactly one task at a time.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct UserRiskState {
    pub is_locked: bool,
    pub locked_reason: Option<String>,
    pub current_drawdown: f64,
    pub daily_loss: f64,
    pub consecutive_losses: u32,
    pub consecutive_timeouts: u32,
}

impl UserRiskState {
    /// Lock the user out of further executions.
    pub fn lock(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "user risk state locked");
        self.is_locked = true;
        self.locked_reason = Some(reason);
    }

    /// Fold in a winning trade.
    pub fn record_win(&mut self) {
        self.consecutive_losses = 0;
    }

    /// Fold in a losing trade as a fraction of equity.
    pub fn record_loss(&mut self, loss_ratio: f64) {
        self.consecutive_losses += 1;
        self.daily_loss += loss_ratio.max(0.0);
    }

    /// Fold in one order timeout; the third consecutive timeout locks the
    /// user.
    pub fn record_timeout(&mut self, limits: &UserRiskLimits) {
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts >= limits.consecutive_timeout_limit && !self.is_locked {
            self.lock("consecutive order timeouts");
        }
    }

    /// Clear the timeout streak after a successful exchange call.
    pub fn reset_timeouts(&mut self) {
        self.consecutive_timeouts = 0;
    }

    /// Pre-trade gate; locks the state on a breach and returns the reason.
    pub fn check(&mut self, limits: &UserRiskLimits) -> Result<(), String> {
        if self.is_locked {
            return Err(self
                .locked_reason
                .clone()
                .unwrap_or_else(|| "risk locked".to_string()));
        }
        if self.current_drawdown >= limits.max_drawdown {
            self.lock("drawdown limit");
            return Err("drawdown limit".to_string());
        }
        if self.daily_loss >= limits.daily_max_loss {
            self.lock("daily loss limit");
            return Err("daily loss limit".to_string());
        }
        if self.consecutive_losses >= limits.consecutive_loss_limit {
            self.lock("consecutive losses");
            return Err("consecutive losses".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_wipe_to_empty() {
        let mut secret = SecretBytes::new("super-secret".into());
        assert_eq!(secret.expose(), "super-secret");
        secret.wipe();
        assert!(secret.is_empty());
        assert_eq!(format!("{secret:?}"), "SecretBytes(***)");
    }

    #[test]
    fn third_consecutive_timeout_locks() {
        let limits = UserRiskLimits::default();
        let mut state = UserRiskState::default();
        state.record_timeout(&limits);
        state.record_timeout(&limits);
        assert!(!state.is_locked);
        state.record_timeout(&limits);
        assert!(state.is_locked);
    }

    #[test]
    fn successful_call_resets_the_timeout_streak() {
        let limits = UserRiskLimits::default();
        let mut state = UserRiskState::default();
        state.record_timeout(&limits);
        state.record_timeout(&limits);
        state.reset_timeouts();
        state.record_timeout(&limits);
        assert!(!state.is_locked);
    }

    #[test]
    fn risk_check_locks_on_breach() {
        let limits = UserRiskLimits::default();
        let mut state = UserRiskState {
            current_drawdown: 0.25,
            ..UserRiskState::default()
        };
        assert!(state.check(&limits).is_err());
        assert!(state.is_locked);
    }
}
