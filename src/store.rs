//! Persisted policy store.
//!
//! Every top-level key is an independent JSON document. Mutations are
//! read-merge-write closures executed under the single database lock, so two
//! concurrent updates of the same key never lose a write. Each effective write
//! is published as a typed [`StoreChange`] to every subscriber.

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::db::Database;
use crate::error::Result;
use crate::models::{AppStorage, BlockedItem, FocusModeConfig, Settings};
use crate::safe_lock;

/// A typed change to one top-level key.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    BlockedItems {
        before: Vec<BlockedItem>,
        after: Vec<BlockedItem>,
    },
    Settings {
        before: Settings,
        after: Settings,
    },
    FocusMode {
        before: FocusModeConfig,
        after: FocusModeConfig,
    },
    Other {
        key: &'static str,
    },
}

/// A top-level store key and the type of its value.
pub trait StoreEntry {
    const KEY: &'static str;
    type Value: Serialize + DeserializeOwned + Default + Clone + PartialEq;

    fn change(_before: Self::Value, _after: Self::Value) -> StoreChange {
        StoreChange::Other { key: Self::KEY }
    }
}

pub mod keys {
    use super::{StoreChange, StoreEntry};
    use crate::models::{
        BlockedItem, CustomBlockPageConfig, FocusModeConfig, InsightEntry, PasswordConfig,
        Settings,
    };

    pub struct BlockedItems;
    pub struct Insights;
    pub struct FocusMode;
    pub struct SettingsKey;
    pub struct Password;
    pub struct CustomBlockPage;
    pub struct LastDailyReset;
    pub struct LastDailySummary;
    pub struct ContinuousBrowsingStart;
    pub struct OnboardingCompleted;

    impl StoreEntry for BlockedItems {
        const KEY: &'static str = "blockedItems";
        type Value = Vec<BlockedItem>;

        fn change(before: Self::Value, after: Self::Value) -> StoreChange {
            StoreChange::BlockedItems { before, after }
        }
    }

    impl StoreEntry for Insights {
        const KEY: &'static str = "insights";
        type Value = Vec<InsightEntry>;
    }

    impl StoreEntry for FocusMode {
        const KEY: &'static str = "focusMode";
        type Value = FocusModeConfig;

        fn change(before: Self::Value, after: Self::Value) -> StoreChange {
            StoreChange::FocusMode { before, after }
        }
    }

    impl StoreEntry for SettingsKey {
        const KEY: &'static str = "settings";
        type Value = Settings;

        fn change(before: Self::Value, after: Self::Value) -> StoreChange {
            StoreChange::Settings { before, after }
        }
    }

    impl StoreEntry for Password {
        const KEY: &'static str = "password";
        type Value = PasswordConfig;
    }

    impl StoreEntry for CustomBlockPage {
        const KEY: &'static str = "customBlockPage";
        type Value = CustomBlockPageConfig;
    }

    impl StoreEntry for LastDailyReset {
        const KEY: &'static str = "lastDailyReset";
        type Value = String;
    }

    impl StoreEntry for LastDailySummary {
        const KEY: &'static str = "lastDailySummary";
        type Value = Option<String>;
    }

    impl StoreEntry for ContinuousBrowsingStart {
        const KEY: &'static str = "continuousBrowsingStart";
        type Value = Option<i64>;
    }

    impl StoreEntry for OnboardingCompleted {
        const KEY: &'static str = "onboardingCompleted";
        type Value = Option<bool>;
    }
}

#[derive(Clone)]
pub struct PolicyStore {
    db: Arc<Mutex<Database>>,
    subscribers: Arc<Mutex<Vec<Sender<StoreChange>>>>,
}

impl PolicyStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Receive every future change. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<StoreChange> {
        let (tx, rx) = channel();
        safe_lock(&self.subscribers, "Store subscribers").push(tx);
        rx
    }

    pub fn get<E: StoreEntry>(&self) -> Result<E::Value> {
        let db = safe_lock(&self.db, "Database");
        read::<E>(&db)
    }

    /// Replace the value of a key.
    pub fn set<E: StoreEntry>(&self, value: E::Value) -> Result<()> {
        self.update::<E, _>(|current| *current = value)
    }

    /// Atomically read, modify and write one key.
    ///
    /// The closure runs under the store lock and must not touch the store.
    /// Nothing is written and no change is published when the value is unchanged.
    pub fn update<E, R>(&self, f: impl FnOnce(&mut E::Value) -> R) -> Result<R>
    where
        E: StoreEntry,
    {
        let db = safe_lock(&self.db, "Database");
        let before = read::<E>(&db)?;
        let mut after = before.clone();
        let result = f(&mut after);

        if after != before {
            let json = serde_json::to_string(&after)?;
            db.write_value(E::KEY, &json, chrono::Utc::now().timestamp_millis())?;
            self.publish(E::change(before, after));
        }

        Ok(result)
    }

    /// Consistent read of every key.
    pub fn snapshot(&self) -> Result<AppStorage> {
        let db = safe_lock(&self.db, "Database");
        Ok(AppStorage {
            blocked_items: read::<keys::BlockedItems>(&db)?,
            insights: read::<keys::Insights>(&db)?,
            focus_mode: read::<keys::FocusMode>(&db)?,
            password: read::<keys::Password>(&db)?,
            custom_block_page: read::<keys::CustomBlockPage>(&db)?,
            settings: read::<keys::SettingsKey>(&db)?,
            last_daily_reset: read::<keys::LastDailyReset>(&db)?,
            onboarding_completed: read::<keys::OnboardingCompleted>(&db)?,
            continuous_browsing_start: read::<keys::ContinuousBrowsingStart>(&db)?,
            last_daily_summary: read::<keys::LastDailySummary>(&db)?,
        })
    }

    /// Restore every key to its default, publishing a change per affected key.
    pub fn reset_all(&self) -> Result<()> {
        self.set::<keys::BlockedItems>(Vec::new())?;
        self.set::<keys::Insights>(Vec::new())?;
        self.set::<keys::FocusMode>(FocusModeConfig::default())?;
        self.set::<keys::SettingsKey>(Settings::default())?;
        self.set::<keys::Password>(Default::default())?;
        self.set::<keys::CustomBlockPage>(Default::default())?;
        self.set::<keys::LastDailyReset>(String::new())?;
        self.set::<keys::LastDailySummary>(None)?;
        self.set::<keys::ContinuousBrowsingStart>(None)?;
        self.set::<keys::OnboardingCompleted>(None)?;
        Ok(())
    }

    fn publish(&self, change: StoreChange) {
        let mut subscribers = safe_lock(&self.subscribers, "Store subscribers");
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

fn read<E: StoreEntry>(db: &Database) -> Result<E::Value> {
    match db.read_value(E::KEY)? {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            warn!("Stored value for '{}' is unreadable: {e}", E::KEY);
            e.into()
        }),
        None => Ok(E::Value::default()),
    }
}
