use console::style;

use crate::cli::icons;
use crate::config::Settings;
use crate::refresh::DataRefresher;

pub fn cmd_status(settings: &Settings, json: bool) -> anyhow::Result<bool> {
    let refresher = DataRefresher::from_settings(settings);
    let report = refresher.get_status();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    let format_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    };

    println!("{}", style("Refresh status").bold());
    println!("  Last full refresh:        {}", format_time(report.last_full_refresh));
    println!(
        "  Last incremental refresh: {}",
        format_time(report.last_incremental_refresh)
    );

    if report.sources.is_empty() {
        println!("\n  {}", style("No sources refreshed yet").dim());
        return Ok(true);
    }

    println!("\n{}", style("Sources").bold());
    for (name, state) in &report.sources {
        println!(
            "  {} {:15} | {:6} items | {}",
            icons::status(state.status),
            name,
            state.items,
            state.last_refresh.format("%Y-%m-%d %H:%M")
        );
    }

    if !report.recent_history.is_empty() {
        println!("\n{}", style("Recent runs").bold());
        for entry in report.recent_history.iter().rev() {
            println!(
                "  {} {} {:.1}s [{}]",
                if entry.success { icons::success() } else { icons::error() },
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                entry.duration,
                entry.sources.join(", ")
            );
        }
    }

    Ok(true)
}
