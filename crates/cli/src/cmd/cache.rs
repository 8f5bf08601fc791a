//! `quill cache` - maintain the response cache directory.

use quill_cache::ResponseCache;
use quill_config::AppConfig;
use tracing::info;

use crate::CacheAction;

pub fn run(config: &AppConfig, action: &CacheAction) -> Result<(), Box<dyn std::error::Error>> {
    let cache = ResponseCache::new(&config.cache.directory, config.cache.expiry_days);
    match action {
        CacheAction::Clear { all: true, .. } => {
            let removed = cache.clear_all()?;
            info!(removed, dir = %cache.dir().display(), "Cleared response cache");
            println!("Removed {removed} cached response(s) from {}", cache.dir().display());
        }
        CacheAction::Clear { days, all: false } => {
            let days = days.unwrap_or(cache.expiry_days());
            let removed = cache.clear(days)?;
            info!(removed, days, dir = %cache.dir().display(), "Cleared expired responses");
            println!(
                "Removed {removed} cached response(s) older than {days} day(s) from {}",
                cache.dir().display()
            );
        }
    }
    Ok(())
}
