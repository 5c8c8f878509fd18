pub mod categories;
pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod engine;
pub mod error;
pub mod focus;
pub mod models;
pub mod native_host;
pub mod notify;
pub mod password;
pub mod planner;
pub mod rules;
pub mod store;
#[cfg(test)]
mod test_utils;
pub mod timers;
pub mod timeutil;
pub mod usage;
pub mod validation;

use log::warn;
use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering from poisoning if necessary
pub fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{context} mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
