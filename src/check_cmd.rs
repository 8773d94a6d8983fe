//! `fairprice check`: run one price request from the command line.
//!
//! Prints a human-readable report, or the same JSON document the HTTP API
//! returns when `--json` is given.

use anyhow::Result;

use crate::config::Config;
use crate::extract::format_inr;
use crate::models::PriceReport;
use crate::pipeline::RequestOrchestrator;

pub async fn run_check(config: &Config, query: &str, deep: bool, json: bool) -> Result<()> {
    let orchestrator = RequestOrchestrator::from_config(config).await?;
    let report = orchestrator.process_price_request(query, deep).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &PriceReport) {
    println!("Item:        {}", report.item);
    if report.price > 0 {
        println!("Quoted:      {}", format_inr(report.price));
    } else {
        println!("Quoted:      (none)");
    }
    if let Some(location) = &report.location {
        println!("Location:    {}", location);
    }
    println!();
    println!("Verdict:     {}", report.analysis.verdict);
    println!("Range:       {}", report.analysis.expected_price_range);
    println!(
        "Confidence:  {} (score {})",
        report.analysis.confidence, report.confidence_score
    );
    if !report.analysis.explanation.is_empty() {
        println!("             {}", report.analysis.explanation);
    }

    if !report.history.is_empty() {
        println!();
        println!("History ({}):", report.history.len());
        for entry in &report.history {
            println!(
                "  {:<32} {:>12}  {}  {}",
                truncate(&entry.item, 32),
                format_inr(entry.price),
                entry.location,
                entry.timestamp.format("%Y-%m-%d")
            );
        }
    }

    if report.web_data.is_empty() {
        println!();
        println!("No web results.");
        return;
    }

    println!();
    println!("Web results ({}):", report.web_data.len());
    for (i, ev) in report.web_data.iter().enumerate() {
        println!(
            "{}. {} [{}]",
            i + 1,
            truncate(&ev.title, 70),
            ev.source
        );
        println!("    price: {}", ev.price().unwrap_or("-"));
        println!("    date:  {}", ev.date);
        println!("    url:   {}", ev.url);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("₹₹₹₹", 10), "₹₹₹₹");
        assert_eq!(truncate("₹₹₹₹", 3), "₹₹…");
    }
}
