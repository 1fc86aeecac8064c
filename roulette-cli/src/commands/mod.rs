pub mod audit;
pub mod participant;
pub mod pool;
pub mod round;
pub mod secret;

pub use audit::{handle_audit_command, AuditCommands};
pub use participant::{handle_participant_command, ParticipantCommands};
pub use pool::{handle_pool_command, PoolCommands};
pub use round::{handle_round_command, RoundCommands};
pub use secret::{handle_secret_command, SecretCommands};

use crate::config::load_engine_config;
use dialoguer::Confirm;
use roulette_core::{ParticipantId, Result, RouletteError, StateStore, Storage};
use roulette_table::{EngineSnapshot, OsEntropy, RouletteEngine};
use std::path::Path;
use std::sync::Arc;

/// Engine loaded from the data directory for the duration of one command.
pub struct Session {
    storage: Storage,
    engine: RouletteEngine,
}

impl Session {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let storage = Storage::new(&data_dir.join("roulette.db")).await?;
        let config = load_engine_config(data_dir)?;

        let engine = match StateStore::new(&storage).load::<EngineSnapshot>().await? {
            Some(snapshot) => RouletteEngine::restore(config, snapshot, Arc::new(OsEntropy)).await?,
            None => {
                tracing::info!("No engine state in {}, starting fresh", data_dir.display());
                RouletteEngine::new(config)?
            }
        };

        Ok(Self { storage, engine })
    }

    pub fn engine(&self) -> &RouletteEngine {
        &self.engine
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Append new audit entries, then overwrite the snapshot.
    pub async fn save(&self) -> Result<()> {
        let written = self.engine.audit_log().persist(&self.storage).await?;
        let snapshot = self.engine.snapshot().await;
        StateStore::new(&self.storage).save(&snapshot).await?;

        tracing::debug!("Saved engine state ({} new audit entries)", written);
        Ok(())
    }
}

/// Accepts either a participant UUID or a registered name.
pub fn resolve_participant(engine: &RouletteEngine, key: &str) -> Result<ParticipantId> {
    if let Ok(id) = key.parse::<ParticipantId>() {
        return engine.participant(id).map(|p| p.id);
    }

    engine
        .participant_by_name(key)
        .map(|p| p.id)
        .ok_or_else(|| RouletteError::validation(format!("No participant named '{}'", key)))
}

pub fn confirm(prompt: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }

    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| RouletteError::internal(format!("Prompt failed: {}", e)))
}

pub fn short_id(id: &ParticipantId) -> String {
    id.to_string()[..8].to_string()
}
