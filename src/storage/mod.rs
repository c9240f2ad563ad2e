//! Durable snapshot of the bot's state.
//!
//! One flat JSON record: `current_balance`, `current_coin`, `position`,
//! `trading_history`, `last_update`. Timestamps are second-precision
//! `YYYY-MM-DD HH:MM:SS`. A missing or unreadable file loads documented
//! defaults; writes go through a temp file and a rename so a crash mid-write
//! leaves the previous snapshot intact.

use crate::types::{opt_timestamp_format, BotState, PositionState, TradeRecord};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io: {0}")]
    Io(#[from] std::io::Error),

    #[error("state encode: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    current_balance: Decimal,
    current_coin: Option<String>,
    #[serde(default)]
    position: PositionState,
    trading_history: Vec<TradeRecord>,
    #[serde(default, with = "opt_timestamp_format")]
    last_update: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn from_state(state: &BotState) -> Self {
        Self {
            current_balance: state.balance,
            current_coin: state.active_symbol.clone(),
            position: state.position.clone(),
            trading_history: state.history.clone(),
            last_update: state.last_update,
        }
    }

    fn into_state(self) -> BotState {
        BotState {
            balance: self.current_balance,
            active_symbol: self.current_coin,
            position: self.position,
            history: self.trading_history,
            last_update: self.last_update,
        }
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Restores the last snapshot, or a fresh state with `initial_balance`
    /// when there is none. Corruption is logged and falls back to defaults;
    /// it never blocks startup.
    pub async fn load(&self, initial_balance: Decimal) -> BotState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no saved state at {}; starting fresh", self.path.display());
                return BotState::new(initial_balance);
            }
            Err(e) => {
                warn!(
                    "could not read state file {}: {e}; starting fresh",
                    self.path.display()
                );
                return BotState::new(initial_balance);
            }
        };

        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) => {
                let state = snapshot.into_state();
                info!(
                    "restored state: balance={}, coin={:?}, {} trades",
                    state.balance,
                    state.active_symbol,
                    state.history.len()
                );
                state
            }
            Err(e) => {
                warn!(
                    "state file {} is corrupt: {e}; starting fresh",
                    self.path.display()
                );
                BotState::new(initial_balance)
            }
        }
    }

    pub async fn save(&self, state: &BotState) -> Result<(), StoreError> {
        let snapshot = Snapshot::from_state(state);
        let data = serde_json::to_string_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::TimeZone;

    fn sample_state() -> BotState {
        BotState {
            balance: "12.5".parse().unwrap(),
            active_symbol: Some("DOGEUSDT".to_string()),
            position: PositionState::Holding {
                symbol: "DOGEUSDT".to_string(),
                quantity: Decimal::new(150, 0),
                entry_price: "0.12".parse().unwrap(),
            },
            history: vec![TradeRecord {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                symbol: "DOGEUSDT".to_string(),
                side: Side::Buy,
                quantity: Decimal::new(150, 0),
                price: "0.12".parse().unwrap(),
            }],
            last_update: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("bot_state.json"));

        let state = sample_state();
        store.save(&state).await.unwrap();

        let loaded = store.load(Decimal::new(30, 0)).await;
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("bot_state.json"));

        let state = store.load(Decimal::new(30, 0)).await;
        assert_eq!(state, BotState::new(Decimal::new(30, 0)));
    }

    #[tokio::test]
    async fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = StateStore::new(&path);
        let state = store.load(Decimal::new(30, 0)).await;
        assert_eq!(state, BotState::new(Decimal::new(30, 0)));
    }

    #[tokio::test]
    async fn snapshot_without_position_field_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_state.json");
        let legacy = r#"{
            "current_balance": "30",
            "current_coin": null,
            "trading_history": [],
            "last_update": null
        }"#;
        tokio::fs::write(&path, legacy).await.unwrap();

        let store = StateStore::new(&path);
        let state = store.load(Decimal::ONE).await;
        assert_eq!(state.balance, Decimal::new(30, 0));
        assert!(state.position.is_flat());
    }

    #[tokio::test]
    async fn save_replaces_rather_than_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("bot_state.json"));

        store.save(&sample_state()).await.unwrap();
        let mut second = sample_state();
        second.balance = Decimal::ZERO;
        store.save(&second).await.unwrap();

        let loaded = store.load(Decimal::new(30, 0)).await;
        assert_eq!(loaded.balance, Decimal::ZERO);
    }
}
