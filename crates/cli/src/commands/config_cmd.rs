//! `contextrank config` — Configuration management commands.

use std::path::Path;

use contextrank_config::{AppConfig, ConfigError};

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn validate(loaded: Result<AppConfig, ConfigError>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if config.window.token_budget < 256 {
        warnings.push("window.token_budget is very small; most history will be dropped");
    }
    if config.store.event_capacity < 16 {
        warnings.push("store.event_capacity below 16; slow subscribers will lag");
    }
    if !config.store.promote_user_messages {
        warnings.push("store.promote_user_messages is off; instructions must be marked explicitly");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Promote user messages: {}", config.store.promote_user_messages);
    println!("   Token budget:          {}", config.window.token_budget);
    println!("   Cache capacity:        {}", config.classifier.cache_capacity);
    println!("   Log filter:            {}", config.logging.filter);
    Ok(())
}

pub fn path(explicit: Option<&Path>) {
    match explicit {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", AppConfig::config_dir().join("config.toml").display()),
    }
}

/// Write the default configuration unless a file already exists.
pub fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() && !force {
        println!("   Config already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("   ✅ Wrote default config to {}", path.display());
    Ok(())
}
