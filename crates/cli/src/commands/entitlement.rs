//! Unlock and credit inspection commands

use anyhow::Result;
use creditgate_core::{
    ConsumeOutcome, CreditFlavor, Evaluation, EvaluationReason, Identity, PresentedRecord,
};

use crate::db::App;

/// Unlock a record, then print it through the presenter
pub async fn unlock(app: &App, identity: &Identity, record_id: &str) -> Result<()> {
    // Record phải tồn tại trước khi trừ credit
    let before = app.gate.present_record(identity, record_id).await?;

    let outcome = app
        .gate
        .consume(identity, record_id, CreditFlavor::RecordUnlock)
        .await;

    match &outcome {
        ConsumeOutcome::Consumed { already_owned: true } => {
            println!("🔓 Already unlocked: {} (no credit charged)", record_id);
        }
        ConsumeOutcome::Consumed {
            already_owned: false,
        } => {
            println!("🔓 Unlocked {} (1 view credit charged)", record_id);
        }
        ConsumeOutcome::Denied { reason } => {
            println!("❌ Unlock denied: {}", reason);
            if reason.is_retryable() {
                println!("   State unchanged, safe to retry");
            }
            println!();
            print_record(&before);
            return Ok(());
        }
    }

    let record = app.gate.present_record(identity, record_id).await?;
    println!();
    print_record(&record);

    let evaluation = app
        .gate
        .evaluate(identity, CreditFlavor::RecordUnlock)
        .await?;
    println!();
    print_evaluation("   ", &evaluation);
    Ok(())
}

/// Show both credit types for the current identity
pub async fn credits(app: &App, identity: &Identity) -> Result<()> {
    println!(
        "💳 Credits for {} ({})",
        identity.owner_id(),
        identity.kind().as_str()
    );
    println!();

    for flavor in [CreditFlavor::RecordUnlock, CreditFlavor::Calculation] {
        let evaluation = app.gate.evaluate(identity, flavor).await?;
        println!("   {}", flavor.as_str());
        print_evaluation("     ", &evaluation);
    }
    Ok(())
}

pub fn print_evaluation(indent: &str, evaluation: &Evaluation) {
    let status = if evaluation.allowed { "✅" } else { "⛔" };
    println!("{}{} Remaining: {}", indent, status, evaluation.remaining);

    match &evaluation.reason {
        EvaluationReason::CreditsAvailable | EvaluationReason::Unlimited => {}
        EvaluationReason::InsufficientCredits => {
            println!("{}   No credits left, purchase more to continue", indent);
        }
        EvaluationReason::QuotaExhausted { reset_at } => {
            println!(
                "{}   Quota exhausted, resets at {}",
                indent,
                reset_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        EvaluationReason::SignInRequired => {
            println!("{}   Sign in required", indent);
        }
    }
}

pub fn print_record(record: &PresentedRecord) {
    let lock = if record.locked { "🔒" } else { "🔓" };
    println!("{} {} [{}]", lock, record.name, record.id);
    for (key, value) in &record.fields {
        println!("   {:<12} {}", key, value);
    }
}
