use std::collections::BTreeMap;
use std::sync::Arc;

use console::style;
use serde_json::json;

use crate::cli::icons;
use crate::config::Settings;
use crate::defaults;
use crate::http_client::HttpClient;
use crate::refresh::{DataRefresher, RefreshResult};
use crate::utils::truncate;

/// Errors shown per source in text output.
const SHOWN_ERRORS: usize = 3;

pub async fn cmd_refresh(
    settings: &Settings,
    sources: &[String],
    force: bool,
    json: bool,
) -> anyhow::Result<bool> {
    settings.ensure_directories()?;

    let client = HttpClient::builder(settings)
        .cache(defaults::content_cache(settings))
        .build()?;
    let mut refresher = DataRefresher::with_default_sources(settings, Arc::new(client));

    if !json {
        let names = if sources.is_empty() {
            refresher.source_names().join(", ")
        } else {
            sources.join(", ")
        };
        eprintln!(
            "{} Refreshing {}{}",
            icons::info(),
            names,
            if force { " (forced)" } else { "" }
        );
    }

    let requested = (!sources.is_empty()).then_some(sources);
    let result = refresher.refresh_all(force, requested).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
    } else {
        print_result(&result);
    }

    Ok(result.success)
}

fn result_json(result: &RefreshResult) -> serde_json::Value {
    let sources: BTreeMap<&str, serde_json::Value> = result
        .sources
        .iter()
        .map(|s| {
            (
                s.source.as_str(),
                json!({
                    "status": s.status,
                    "items_fetched": s.items_fetched,
                    "items_parsed": s.items_parsed,
                    "errors": s.errors,
                }),
            )
        })
        .collect();

    json!({
        "success": result.success,
        "started_at": result.started_at,
        "completed_at": result.completed_at,
        "duration_seconds": result.duration_seconds,
        "total_items": result.total_items(),
        "total_errors": result.total_errors(),
        "sources": sources,
    })
}

fn print_result(result: &RefreshResult) {
    println!();
    for source in &result.sources {
        println!(
            "  {} {:15} | {:6} items | {:.1}s",
            icons::status(source.status),
            source.source,
            source.items_parsed,
            source.duration_seconds
        );
        for error in source.errors.iter().take(SHOWN_ERRORS) {
            println!("      {} {}", icons::dim_arrow(), style(truncate(error, 80)).dim());
        }
        let hidden = source.error_count().saturating_sub(SHOWN_ERRORS);
        if hidden > 0 {
            println!("      {}", style(format!("... and {} more", hidden)).dim());
        }
    }
    println!();

    let summary = format!(
        "{} items, {} errors in {:.1}s",
        result.total_items(),
        result.total_errors(),
        result.duration_seconds
    );
    if result.success {
        println!("{} Refresh complete: {}", icons::success(), summary);
    } else {
        println!("{} Refresh finished with failures: {}", icons::error(), summary);
    }
}
