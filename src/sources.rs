//! `fairprice sources` and `fairprice blacklist`: curate where evidence may
//! come from.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::{BlacklistRule, RuleKind, TrustedSource};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

async fn open(config: &Config) -> Result<SqliteStore> {
    Ok(SqliteStore::new(db::connect(config).await?))
}

// ============ Trusted sources ============

pub async fn list_sources(config: &Config) -> Result<()> {
    let store = open(config).await?;
    let sources = store.list_trusted_sources(false).await?;

    if sources.is_empty() {
        println!("No trusted sources.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20} {:<28} {:<14} {:<6} SELECTOR",
        "ID", "NAME", "URL", "CATEGORY", "ACTIVE"
    );
    for s in &sources {
        println!(
            "{:<36}  {:<20} {:<28} {:<14} {:<6} {}",
            s.id,
            s.name,
            s.url,
            s.category,
            s.is_active,
            s.price_selector.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn add_source(
    config: &Config,
    name: &str,
    url: &str,
    category: &str,
    price_selector: Option<&str>,
) -> Result<()> {
    let source = TrustedSource::new(name, url, category, price_selector);
    if source.name.is_empty() {
        bail!("source name must not be empty");
    }
    if source.host().is_none() {
        bail!("Not a usable source URL: {}", url);
    }
    if let Some(selector) = &source.price_selector {
        if scraper::Selector::parse(selector).is_err() {
            bail!("Invalid CSS selector: {}", selector);
        }
    }

    let store = open(config).await?;
    store.upsert_trusted_source(&source).await?;
    println!("Saved trusted source {} ({})", source.name, source.url);
    Ok(())
}

pub async fn remove_source(config: &Config, id: &str) -> Result<()> {
    let store = open(config).await?;
    if !store.delete_trusted_source(id).await? {
        bail!("No trusted source with id {}", id);
    }
    println!("Removed {}", id);
    Ok(())
}

// ============ Blacklist ============

pub async fn list_rules(config: &Config) -> Result<()> {
    let store = open(config).await?;
    let rules = store.list_blacklist_rules(false).await?;

    if rules.is_empty() {
        println!("No blacklist rules.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<7} {:<32} {:<6} DESCRIPTION",
        "ID", "KIND", "PATTERN", "ACTIVE"
    );
    for r in &rules {
        println!(
            "{:<36}  {:<7} {:<32} {:<6} {}",
            r.id,
            r.kind.as_str(),
            r.pattern,
            r.is_active,
            r.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn add_rule(
    config: &Config,
    pattern: &str,
    kind: &str,
    description: Option<&str>,
) -> Result<()> {
    let kind: RuleKind = kind.parse()?;
    let rule = BlacklistRule::new(pattern, kind, description);
    validate_rule(&rule)?;

    let store = open(config).await?;
    store.add_blacklist_rule(&rule).await?;
    println!("Added {} rule {} ({})", rule.kind.as_str(), rule.id, rule.pattern);
    Ok(())
}

pub async fn remove_rule(config: &Config, id: &str) -> Result<()> {
    let store = open(config).await?;
    if !store.delete_blacklist_rule(id).await? {
        bail!("No blacklist rule with id {}", id);
    }
    println!("Removed {}", id);
    Ok(())
}

/// Reject rules that could never match anything.
fn validate_rule(rule: &BlacklistRule) -> Result<()> {
    if rule.pattern.is_empty() {
        bail!("pattern must not be empty");
    }
    if rule.kind == RuleKind::Regex {
        if let Err(e) = regex::Regex::new(&rule.pattern) {
            bail!("Invalid regex '{}': {}", rule.pattern, e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rule() {
        assert!(validate_rule(&BlacklistRule::new("olx.in", RuleKind::Domain, None)).is_ok());
        assert!(validate_rule(&BlacklistRule::new("/used/", RuleKind::Regex, None)).is_ok());
        assert!(validate_rule(&BlacklistRule::new("(unclosed", RuleKind::Regex, None)).is_err());
        assert!(validate_rule(&BlacklistRule::new("  ", RuleKind::Domain, None)).is_err());
    }
}
