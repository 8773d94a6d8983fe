//! `fairprice logs` and `fairprice report`: the audit trail and user
//! reports of misleading pages.

use anyhow::{bail, Result};
use chrono::Utc;

use crate::config::Config;
use crate::db;
use crate::extract::format_inr;
use crate::models::ReportedUrl;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

pub async fn run_logs(config: &Config, limit: usize) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let logs = store.recent_logs(limit).await?;

    if logs.is_empty() {
        println!("No requests logged.");
        return Ok(());
    }

    println!(
        "{:<20} {:<8} {:>5} {:>9} {:>12}  QUERY",
        "TIME", "STATUS", "DEEP", "LATENCY", "PRICE"
    );
    for log in &logs {
        let price = if log.price > 0 {
            format_inr(log.price)
        } else {
            "-".to_string()
        };
        println!(
            "{:<20} {:<8} {:>5} {:>7}ms {:>12}  {}",
            log.created_at.format("%Y-%m-%d %H:%M:%S"),
            log.status.as_str(),
            if log.deep_search { "yes" } else { "no" },
            log.latency_ms,
            price,
            log.query
        );
    }
    Ok(())
}

pub async fn run_report(config: &Config, url: &str, reason: Option<&str>) -> Result<()> {
    let url = url.trim();
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => bail!("Not an http(s) URL: {}", url),
    }

    let report = ReportedUrl {
        id: uuid::Uuid::new_v4().to_string(),
        url: url.to_string(),
        reason: reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from),
        created_at: Utc::now(),
    };

    let store = SqliteStore::new(db::connect(config).await?);
    store.report_url(&report).await?;
    println!("Reported {} ({})", report.url, report.id);
    Ok(())
}

pub async fn list_reports(config: &Config, limit: usize) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let reports = store.list_reported_urls(limit).await?;

    if reports.is_empty() {
        println!("No reported URLs.");
        return Ok(());
    }
    for r in &reports {
        println!(
            "{}  {}  {}",
            r.created_at.format("%Y-%m-%d"),
            r.url,
            r.reason.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
