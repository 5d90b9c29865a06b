//! Audit trail command

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use creditgate_core::CreditEventType;
use creditgate_persistence::{EventQuery, EventReader};
use std::path::Path;

fn parse_date(raw: &str, label: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date: {}", label, raw))
}

/// Print credit events, newest first
pub fn show(
    events_dir: &Path,
    owner: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    types: Option<&[String]>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let mut query = EventQuery::new().latest(limit);
    if let Some(owner) = owner {
        query = query.owner(owner);
    }
    if let Some(from) = from {
        query = query.since(parse_date(from, "from")?);
    }
    if let Some(to) = to {
        query = query.until(parse_date(to, "to")?);
    }
    if let Some(types) = types {
        let mut parsed = Vec::with_capacity(types.len());
        for raw in types {
            match CreditEventType::from_str(raw) {
                Some(event_type) => parsed.push(event_type),
                None => bail!("Unknown event type: {}", raw),
            }
        }
        query = query.event_types(parsed);
    }

    let events = EventReader::new(events_dir).query(&query)?;

    if json {
        for event in events.iter().rev() {
            println!("{}", serde_json::to_string(event)?);
        }
        return Ok(());
    }

    println!("📜 Credit History");
    println!("   Events directory: {:?}", events_dir);
    if let Some(owner) = owner {
        println!("   Owner: {}", owner);
    }
    println!();

    if events.is_empty() {
        println!("No events found matching criteria.");
        return Ok(());
    }

    println!("Showing {} event(s)", events.len());
    for event in events.iter().rev() {
        let resource = event.resource_key.as_deref().unwrap_or("-");
        let amount = event
            .amount
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} {:<22} {:<12} {:<14} {:>4} {}",
            event.event_id,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type.as_str(),
            event.owner_id,
            resource,
            amount,
            event.detail.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
