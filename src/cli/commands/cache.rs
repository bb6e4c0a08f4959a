use console::style;

use crate::cli::icons;
use crate::cache::ContentCache;
use crate::config::Settings;

pub async fn cmd_cache_stats(settings: &Settings, json: bool) -> anyhow::Result<bool> {
    let cache = ContentCache::from_settings(settings);
    let stats = cache.get_stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(true);
    }

    println!("{}", style("Content cache").bold());
    println!(
        "  Memory: {}/{} entries",
        stats.memory.size, stats.memory.max_size
    );
    match &stats.disk {
        Some(disk) => println!(
            "  Disk:   {} entries, {:.1} KiB in {}",
            disk.entries,
            disk.total_bytes as f64 / 1024.0,
            disk.directory.display()
        ),
        None => println!("  Disk:   {}", style("disabled").dim()),
    }
    Ok(true)
}

pub async fn cmd_cache_clear(settings: &Settings) -> anyhow::Result<bool> {
    let cache = ContentCache::from_settings(settings);
    let cleared = cache.clear().await?;
    println!(
        "{} Cleared {} disk entries",
        icons::success(),
        cleared.disk
    );
    Ok(true)
}

pub async fn cmd_cache_purge(settings: &Settings) -> anyhow::Result<bool> {
    let cache = ContentCache::from_settings(settings);
    let removed = cache.purge_expired().await?;
    println!("{} Removed {} expired entries", icons::success(), removed);
    Ok(true)
}
