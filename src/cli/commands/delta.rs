use console::style;

use crate::cli::icons;
use crate::config::Settings;
use crate::delta::DeltaTracker;

/// Dry-run the delta decision for a source without touching the network.
pub async fn cmd_delta(
    settings: &Settings,
    source: &str,
    online_count: u64,
    json: bool,
) -> anyhow::Result<bool> {
    let mut tracker = DeltaTracker::from_settings(settings);
    tracker.load().await;
    let delta = tracker.calculate_delta(source, online_count);

    if json {
        println!("{}", serde_json::to_string_pretty(&delta)?);
        return Ok(true);
    }

    let saved = tracker.get_item_count(source);
    println!("{} {}", icons::info(), style(source).bold());
    println!("  Saved items:  {}", saved);
    println!("  Online items: {}", online_count);
    match tracker.get_last_update() {
        Some(at) => println!("  Last update:  {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("  Last update:  {}", style("never").dim()),
    }
    println!("  {} {}", icons::dim_arrow(), delta.description());
    Ok(true)
}
