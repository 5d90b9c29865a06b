//! Database initialization, status, and gate wiring

use anyhow::{Context, Result};
use creditgate_business::{EntitlementGate, GateConfig, ServiceContext};
use creditgate_persistence::{
    init_database as open_pool, sqlite_version, Database, RecordRepo, UnlockRepo, ViewCreditRepo,
};
use std::path::Path;

use crate::Cli;

/// Database + gate đã cấu hình cho một lần chạy CLI
pub struct App {
    pub db: Database,
    pub gate: EntitlementGate,
}

impl App {
    pub fn context(&self) -> &ServiceContext {
        self.gate.context()
    }

    pub async fn close(&self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }
}

fn db_url(db_path: &Path) -> String {
    format!("sqlite:{}", db_path.display())
}

/// Initialize the database with schema
pub async fn init_database(db_path: &Path, force: bool) -> Result<()> {
    if force && db_path.exists() {
        std::fs::remove_file(db_path).context("Failed to remove existing database")?;
        println!("🗑️  Removed existing database");
    }
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }

    println!("📦 Running migrations...");
    let pool = open_pool(&db_url(db_path))
        .await
        .context("Failed to initialize database")?;
    pool.close().await;
    Ok(())
}

/// Show database status
pub async fn show_status(cli: &Cli) -> Result<()> {
    if !cli.db.exists() {
        println!("❌ Database not found at {:?}", cli.db);
        println!("   Run 'creditgate init' to create the database");
        return Ok(());
    }

    let app = open(cli).await?;
    let pool = app.db.pool();
    let (major, minor, patch) = sqlite_version(pool).await?;

    println!("📊 Database Status");
    println!("   Path:    {:?}", cli.db);
    println!("   SQLite:  {}.{}.{}", major, minor, patch);
    println!("   Debiter: {}", app.gate.debiter_name());
    println!();

    println!("   Owners:   {}", ViewCreditRepo::count(pool).await?);
    println!("   Unlocks:  {}", UnlockRepo::count(pool).await?);
    println!("   Records:  {}", RecordRepo::count(pool).await?);

    app.close().await
}

/// Load config from `--config`, or defaults
pub fn load_config(path: Option<&Path>) -> Result<GateConfig> {
    match path {
        Some(path) => GateConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(GateConfig::default()),
    }
}

/// Connect to database and build the gate
pub async fn open(cli: &Cli) -> Result<App> {
    if !cli.db.exists() {
        anyhow::bail!(
            "Database not found at {:?}. Run 'creditgate init' first.",
            cli.db
        );
    }

    let config = load_config(cli.config.as_deref())?;
    let db = Database::connect(&db_url(&cli.db), &cli.events_dir)
        .await
        .context("Failed to connect to database")?;
    let ctx = ServiceContext::new(&db);
    let gate = EntitlementGate::new(ctx, config)
        .await
        .context("Failed to build entitlement gate")?;

    tracing::debug!(debiter = gate.debiter_name(), "gate ready");
    Ok(App { db, gate })
}
