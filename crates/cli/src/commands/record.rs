//! Record catalog commands

use anyhow::{anyhow, Result};
use creditgate_business::CatalogService;
use creditgate_core::{present, Identity, Record, RecordFilter};

use crate::commands::entitlement::print_record;
use crate::db::App;

/// Add a record; fields come as `key=value`
pub async fn add(app: &App, id: &str, name: &str, fields: &[String]) -> Result<()> {
    let mut record = Record::new(id, name);
    for field in fields {
        let (key, value) = parse_field(field)?;
        record = record.with_field(key, value);
    }

    CatalogService::new(app.context()).add(&record).await?;

    println!("✅ Record added: {} ({})", record.id, record.name);
    println!("   Fields: {}", record.fields.len());
    Ok(())
}

/// Search the catalog, masking records the identity has not unlocked
pub async fn search(
    app: &App,
    identity: &Identity,
    query: Option<&str>,
    page: u32,
    per_page: u32,
) -> Result<()> {
    let mut filter = RecordFilter::default().page(page, per_page);
    if let Some(query) = query {
        filter = filter.query(query);
    }

    let result = CatalogService::new(app.context()).search(&filter).await?;

    println!(
        "🔎 {} record(s) found, page {} ({} per page)",
        result.total_count, filter.page, filter.per_page
    );
    println!();

    if result.records.is_empty() {
        println!("No records on this page.");
        return Ok(());
    }

    for record in &result.records {
        let unlocked = app.gate.is_unlocked(identity, &record.id).await?;
        print_record(&present(record, unlocked));
        println!();
    }
    Ok(())
}

/// Show a single record through the presenter
pub async fn show(app: &App, identity: &Identity, id: &str) -> Result<()> {
    let record = app.gate.present_record(identity, id).await?;
    print_record(&record);
    if record.locked {
        println!();
        println!("   Run 'creditgate --owner <OWNER_ID> unlock {}' to reveal", id);
    }
    Ok(())
}

fn parse_field(raw: &str) -> Result<(&str, &str)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid field '{}', expected key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Invalid field '{}', key is empty", raw));
    }
    Ok((key, value.trim()))
}
