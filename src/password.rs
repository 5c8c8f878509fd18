//! Password gate guarding settings changes in the extension.
//!
//! Five consecutive wrong attempts lock the gate for ten minutes. While
//! locked, the hash is not checked at all.

use log::{info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::constants::{LOCKOUT_MINUTES, MAX_PASSWORD_ATTEMPTS, MS_PER_MINUTE};
use crate::error::Result;
use crate::models::PasswordConfig;
use crate::store::{keys, PolicyStore};

/// SHA-256 of the password as lowercase hex.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum UnlockOutcome {
    Unlocked,
    NotProtected,
    #[serde(rename_all = "camelCase")]
    Rejected { attempts_remaining: u32 },
    #[serde(rename_all = "camelCase")]
    LockedOut { remaining_minutes: i64 },
}

/// Check one attempt against the stored config, updating the attempt counters.
pub fn check_attempt(config: &mut PasswordConfig, password: &str, now_ms: i64) -> UnlockOutcome {
    if !config.enabled || config.hash.is_empty() {
        return UnlockOutcome::NotProtected;
    }

    if let Some(until) = config.locked_until {
        if until > now_ms {
            let remaining_ms = until - now_ms;
            // Round up so a lock with seconds left still reports one minute.
            let remaining_minutes = (remaining_ms + MS_PER_MINUTE - 1) / MS_PER_MINUTE;
            return UnlockOutcome::LockedOut { remaining_minutes };
        }
        config.locked_until = None;
        config.failed_attempts = 0;
    }

    if hash_password(password) == config.hash {
        config.failed_attempts = 0;
        return UnlockOutcome::Unlocked;
    }

    config.failed_attempts += 1;
    if config.failed_attempts >= MAX_PASSWORD_ATTEMPTS {
        config.failed_attempts = 0;
        config.locked_until = Some(now_ms + LOCKOUT_MINUTES * MS_PER_MINUTE);
        return UnlockOutcome::LockedOut {
            remaining_minutes: LOCKOUT_MINUTES,
        };
    }
    UnlockOutcome::Rejected {
        attempts_remaining: MAX_PASSWORD_ATTEMPTS - config.failed_attempts,
    }
}

pub fn unlock(store: &PolicyStore, password: &str, now_ms: i64) -> Result<UnlockOutcome> {
    let outcome =
        store.update::<keys::Password, _>(|config| check_attempt(config, password, now_ms))?;
    match &outcome {
        UnlockOutcome::LockedOut { remaining_minutes } => {
            warn!("Password gate locked for {remaining_minutes} more minute(s)");
        }
        UnlockOutcome::Rejected { attempts_remaining } => {
            info!("Wrong password, {attempts_remaining} attempt(s) left");
        }
        UnlockOutcome::Unlocked | UnlockOutcome::NotProtected => {}
    }
    Ok(outcome)
}

/// Set a new password, or clear protection with `None`.
pub fn set_password(store: &PolicyStore, password: Option<&str>) -> Result<()> {
    let next = match password.filter(|p| !p.is_empty()) {
        Some(password) => PasswordConfig {
            enabled: true,
            hash: hash_password(password),
            failed_attempts: 0,
            locked_until: None,
        },
        None => PasswordConfig::default(),
    };
    info!(
        "Password protection {}",
        if next.enabled { "enabled" } else { "disabled" }
    );
    store.set::<keys::Password>(next)
}
