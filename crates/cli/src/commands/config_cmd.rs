//! `chatscout config`: show the effective configuration.

use chatscout_config::AppConfig;
use std::path::Path;

pub fn run(config: Option<&Path>, default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = super::load_config(config)?;
    let (primary, fallbacks) = config.backend_chain()?;

    println!("⚙️  chatscout configuration\n");
    println!("  Primary:     {} ({})", primary.name, primary.model);
    println!("  Credentials: {}", if primary.has_credentials() { "✅" } else { "❌ missing" });
    for fallback in &fallbacks {
        let tier = if fallback.is_free { "free" } else { "paid" };
        println!("  Fallback:    {} ({tier})", fallback.name);
    }
    println!("  Free only:   {}", config.free_tier_only);
    match &config.tools.url {
        Some(url) => println!("  Tools:       {url}"),
        None => println!("  Tools:       disabled"),
    }
    println!("  Iterations:  {}", config.agent.max_iterations);
    println!("  Observers:   {}", if config.observers.enabled { "enabled" } else { "disabled" });
    if config.observers.enabled {
        println!("    history:   {}", config.observers.history_dir.display());
        println!("    analytics: {}", config.observers.analytics_dir.display());
        println!("    audit:     {}", config.observers.audit_dir.display());
    }
    Ok(())
}
