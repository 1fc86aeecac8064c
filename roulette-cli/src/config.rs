use roulette_core::{EngineConfig, Result};
use std::path::Path;

const CONFIG_FILE: &str = "config.json";

/// Engine config stored next to the database. Written with defaults on
/// first use so operators have a file to edit.
pub fn load_engine_config(data_dir: &Path) -> Result<EngineConfig> {
    let path = data_dir.join(CONFIG_FILE);

    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)?
    } else {
        let config = EngineConfig::default();
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        tracing::debug!("Wrote default engine config to {}", path.display());
        config
    };

    config.validate()?;
    Ok(config)
}
