//! Shared test utilities for SiteWarden.
//!
//! This module provides common setup functions and test doubles used across
//! test modules.

#![cfg(test)]

use chrono::{DateTime, Duration, Local, TimeZone};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

use crate::clock::Clock;
use crate::db::{migrations, Database};
use crate::notify::{Notification, Notifier};
use crate::store::PolicyStore;

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

/// A policy store over a fresh temporary database.
pub fn setup_test_store() -> (PolicyStore, TempDir) {
    let (db, dir) = setup_test_db();
    (PolicyStore::new(Arc::new(Mutex::new(db))), dir)
}

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.id.clone()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.message.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// A clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Local>>);

impl ManualClock {
    /// Monday 2026-06-15, 09:00 local time.
    pub fn monday_morning() -> Self {
        Self(Mutex::new(
            Local.with_ymd_and_hms(2026, 6, 15, 9, 0, 0).single().unwrap(),
        ))
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.0.lock().unwrap()
    }
}
