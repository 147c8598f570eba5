//! Data directory initialization: `overseer init`.

use anyhow::{Context, Result};
use std::path::Path;

use overseer::board::db::BoardDb;
use overseer::config::{CONFIG_FILE_NAME, OverseerConfig};

pub fn cmd_init(data_dir: &Path, force: bool) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE_NAME);
    let wrote_config = if config_path.exists() && !force {
        false
    } else {
        let content = OverseerConfig::default().to_toml()?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    };

    // Open with the file layer only so the database lands where the file says.
    let config = OverseerConfig::load_or_default(data_dir)?;
    let db_path = config.db_path(data_dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    BoardDb::new(&db_path)
        .with_context(|| format!("Failed to initialize database at {}", db_path.display()))?;

    println!("Initialized overseer at {}", data_dir.display());
    println!();
    if wrote_config {
        println!("  {}  (default configuration)", config_path.display());
    } else {
        println!("  {}  (kept existing, use --force to overwrite)", config_path.display());
    }
    println!("  {}", db_path.display());
    println!();
    println!("Next: run `overseer serve` to start the server.");
    Ok(())
}
