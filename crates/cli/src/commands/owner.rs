//! Owner provisioning commands

use anyhow::{bail, Result};
use creditgate_core::{CreditFlavor, Identity};

use crate::commands::entitlement::print_evaluation;
use crate::db::App;

/// Provision an owner with the configured initial allocation
pub async fn create(app: &App, identity: &Identity) -> Result<()> {
    let balance = app.gate.provision_owner(identity).await?;
    let policy = app.gate.calculation_policy(identity).await?;

    println!("✅ Owner ready: {}", balance.owner_id);
    println!("   View credits: {} / {}", balance.remaining(), balance.allocated);
    println!("   Tier:         {}", policy.tier);
    Ok(())
}

/// Show balance, calculation policy and unlocked records
pub async fn show(app: &App, identity: &Identity) -> Result<()> {
    let Some(balance) = app.gate.view_credit(identity).await? else {
        println!("❌ Owner not found: {}", identity.owner_id());
        println!("   Run 'creditgate --owner {} owner create' first", identity.owner_id());
        return Ok(());
    };
    let policy = app.gate.calculation_policy(identity).await?;
    let unlocks = app.gate.unlocked_records(identity).await?;

    println!("👤 Owner: {}", balance.owner_id);
    println!();
    println!("   View credits");
    println!("     Allocated: {}", balance.allocated);
    println!("     Used:      {}", balance.used);
    println!("     Remaining: {}", balance.remaining());
    println!();
    println!("   Calculation quota");
    println!("     Tier:      {}", policy.tier);
    if policy.unlimited_override {
        println!("     Override:  unlimited");
    }
    println!("     Used:      {}", policy.used);
    println!(
        "     Period:    {} → {}",
        policy.period_start.format("%Y-%m-%d %H:%M"),
        policy.period_end.format("%Y-%m-%d %H:%M")
    );
    let evaluation = app
        .gate
        .evaluate(identity, CreditFlavor::Calculation)
        .await?;
    print_evaluation("     ", &evaluation);
    println!();

    if unlocks.is_empty() {
        println!("   No unlocked records.");
    } else {
        println!("   Unlocked records ({})", unlocks.len());
        for fact in &unlocks {
            println!(
                "     {} ({})",
                fact.record_id,
                fact.unlocked_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    println!();

    let activity = app.db.event_reader().activity(identity.owner_id())?;
    println!("   Activity");
    println!("     Credits granted: {}", activity.credits_granted);
    println!("     Unlocks:         {}", activity.records_unlocked);
    println!("     Calculations:    {}", activity.total_calculations());
    for (tool, count) in &activity.calculations {
        println!("       {:<6} {}", tool, count);
    }
    println!("     Rollovers:       {}", activity.rollovers);
    println!("     Denials:         {}", activity.total_denials());
    for (reason, count) in &activity.denials {
        println!("       {:<22} {}", reason, count);
    }
    if let Some(last) = activity.last_event_at {
        println!("     Last event:      {}", last.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}

/// Grant additional view credits
pub async fn grant(app: &App, identity: &Identity, amount: i64) -> Result<()> {
    let balance = app.gate.grant_view_credits(identity, amount).await?;

    println!("✅ Granted {} view credits to {}", amount, balance.owner_id);
    println!("   Remaining: {} / {}", balance.remaining(), balance.allocated);
    Ok(())
}

/// Change tier and/or unlimited override
pub async fn tier(
    app: &App,
    identity: &Identity,
    tier: Option<&str>,
    unlimited: Option<bool>,
) -> Result<()> {
    if tier.is_none() && unlimited.is_none() {
        bail!("Nothing to change: pass a tier name and/or --unlimited <true|false>");
    }

    if let Some(tier) = tier {
        let policy = app.gate.set_tier(identity, tier).await?;
        println!("✅ Tier for {} set to {}", policy.owner_id, policy.tier);
    }
    if let Some(unlimited) = unlimited {
        let policy = app.gate.set_unlimited_override(identity, unlimited).await?;
        println!(
            "✅ Unlimited override for {} {}",
            policy.owner_id,
            if policy.unlimited_override { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}
