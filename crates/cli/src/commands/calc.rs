//! Calculation commands - mỗi lần chạy tiêu một calculation credit

use anyhow::Result;
use creditgate_calc::{moic, npv, validate_flows, validate_moic, validate_rate, IrrSolver};
use creditgate_core::{ConsumeOutcome, CreditFlavor, Identity, Remaining};

use crate::db::App;
use crate::CalcTool;

/// Validate input, consume one credit, then compute
pub async fn run(app: &App, identity: &Identity, tool: &CalcTool) -> Result<()> {
    // Input lỗi không được tốn credit
    match tool {
        CalcTool::Irr { flows } => validate_flows(flows)?,
        CalcTool::Npv { rate, .. } => validate_rate(*rate)?,
        CalcTool::Moic { invested, returned } => validate_moic(*invested, *returned)?,
    }

    let outcome = app
        .gate
        .consume(identity, tool.key(), CreditFlavor::Calculation)
        .await;
    if let ConsumeOutcome::Denied { reason } = &outcome {
        println!("⛔ {} denied: {}", tool.key(), reason);
        if reason.is_retryable() {
            println!("   State unchanged, safe to retry");
        }
        return Ok(());
    }

    match tool {
        CalcTool::Irr { flows } => {
            let settings = &app.gate.config().solver;
            let solver = IrrSolver::new(settings.max_iterations, settings.npv_tolerance)?;
            let result = solver.solve(flows)?;

            println!("📈 IRR: {:.4}%", result.rate * 100.0);
            println!("   NPV at rate: {:.6}", result.npv);
            println!(
                "   Iterations:  {}{}",
                result.iterations,
                if result.converged { " (converged)" } else { "" }
            );
        }
        CalcTool::Npv { rate, flows } => {
            let value = npv(*rate, flows)?;
            println!("📈 NPV at {}: {}", rate, value.round_dp(2));
        }
        CalcTool::Moic { invested, returned } => {
            let multiple = moic(*invested, *returned)?;
            println!("📈 MOIC: {}x", multiple.round_dp(2));
        }
    }

    let evaluation = app
        .gate
        .evaluate(identity, CreditFlavor::Calculation)
        .await?;
    match evaluation.remaining {
        Remaining::Unlimited => println!("   Calculation credits: unlimited"),
        Remaining::Count(n) => println!("   Calculation credits left: {}", n),
    }
    Ok(())
}
