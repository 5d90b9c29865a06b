//! Creditgate CLI - credit entitlement operations from command line
//!
//! Usage:
//! ```bash
//! creditgate init
//! creditgate --owner alice owner create
//! creditgate record add inv_001 "Jane Doe" --field firm=Acme
//! creditgate --owner alice unlock inv_001
//! creditgate --owner alice calc irr -- -1000,400,400,400
//! creditgate history --owner alice --type record_unlocked
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use creditgate_core::Identity;
use rust_decimal::Decimal;
use std::path::PathBuf;

mod commands;
mod db;

use commands::{calc, entitlement, history, owner, record};

/// Creditgate - view credits and calculation quota behind one gate
#[derive(Parser)]
#[command(name = "creditgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file path
    #[arg(long, default_value = "data/creditgate.db", global = true)]
    pub db: PathBuf,

    /// Events directory path
    #[arg(long, default_value = "data/events", global = true)]
    pub events_dir: PathBuf,

    /// Gate configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as an anonymous session
    #[arg(long, global = true, conflicts_with = "owner")]
    pub session: Option<String>,

    /// Act as an authenticated owner
    #[arg(long, global = true)]
    pub owner: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// `--owner` thắng; không có flag nào thì mở session mới
    pub fn identity(&self) -> Result<Identity> {
        let identity = match (&self.owner, &self.session) {
            (Some(owner), _) => Identity::authenticated(owner)?,
            (None, Some(session)) => Identity::anonymous(session)?,
            (None, None) => Identity::new_session(),
        };
        Ok(identity)
    }

    /// Các lệnh quản trị owner bắt buộc `--owner`
    pub fn owner_identity(&self) -> Result<Identity> {
        match &self.owner {
            Some(owner) => Ok(Identity::authenticated(owner)?),
            None => bail!("This command requires --owner <OWNER_ID>"),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database schema
    Init {
        /// Force re-initialization (drops existing data)
        #[arg(long)]
        force: bool,
    },

    /// Show database status
    Status,

    /// Owner provisioning and tiers
    Owner {
        #[command(subcommand)]
        action: OwnerAction,
    },

    /// Investor record catalog
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Unlock a record with one view credit
    Unlock {
        /// Record ID (e.g., inv_001)
        record_id: String,
    },

    /// Show remaining credits for the current identity
    Credits,

    /// Run a calculation tool (consumes one calculation credit)
    Calc {
        #[command(subcommand)]
        tool: CalcTool,
    },

    /// Show the credit event history
    History {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Event types to filter (comma-separated)
        #[arg(long = "type", value_delimiter = ',')]
        types: Option<Vec<String>>,
        /// Maximum number of events to show (latest first)
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Print raw events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum OwnerAction {
    /// Provision an owner with the initial allocation
    Create,
    /// Show balance, quota and unlocked records
    Show,
    /// Grant additional view credits
    Grant {
        /// Number of credits
        amount: i64,
    },
    /// Change calculation tier or unlimited override
    Tier {
        /// Tier name (e.g., free, pro, enterprise)
        tier: Option<String>,
        /// Set the unlimited override
        #[arg(long)]
        unlimited: Option<bool>,
    },
}

#[derive(Subcommand)]
pub enum RecordAction {
    /// Add a record to the catalog
    Add {
        /// Record ID
        id: String,
        /// Full name
        name: String,
        /// Extra field as key=value (repeatable)
        #[arg(long = "field", short)]
        fields: Vec<String>,
    },
    /// Search the catalog (results are masked unless unlocked)
    Search {
        /// Case-insensitive substring
        query: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        per_page: u32,
    },
    /// Show one record through the presenter
    Show {
        /// Record ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CalcTool {
    /// Internal rate of return by bisection
    Irr {
        /// Cash flows, first one negative (comma-separated)
        #[arg(value_delimiter = ',', allow_hyphen_values = true, required = true)]
        flows: Vec<f64>,
    },
    /// Net present value at a fixed rate
    Npv {
        /// Discount rate per period (0.08 = 8%)
        #[arg(long, allow_hyphen_values = true)]
        rate: Decimal,
        /// Cash flows (comma-separated)
        #[arg(value_delimiter = ',', allow_hyphen_values = true, required = true)]
        flows: Vec<Decimal>,
    },
    /// Multiple on invested capital
    Moic {
        /// Invested capital
        invested: Decimal,
        /// Returned value
        returned: Decimal,
    },
}

impl CalcTool {
    /// Resource key ghi vào audit trail
    pub fn key(&self) -> &'static str {
        match self {
            CalcTool::Irr { .. } => "irr",
            CalcTool::Npv { .. } => "npv",
            CalcTool::Moic { .. } => "moic",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { force } => {
            db::init_database(&cli.db, *force).await?;
            println!("✅ Database initialized at {:?}", cli.db);
        }

        Commands::Status => {
            db::show_status(&cli).await?;
        }

        Commands::Owner { action } => {
            let app = db::open(&cli).await?;
            let identity = cli.owner_identity()?;
            match action {
                OwnerAction::Create => owner::create(&app, &identity).await?,
                OwnerAction::Show => owner::show(&app, &identity).await?,
                OwnerAction::Grant { amount } => owner::grant(&app, &identity, *amount).await?,
                OwnerAction::Tier { tier, unlimited } => {
                    owner::tier(&app, &identity, tier.as_deref(), *unlimited).await?
                }
            }
            app.close().await?;
        }

        Commands::Record { action } => {
            let app = db::open(&cli).await?;
            let identity = cli.identity()?;
            match action {
                RecordAction::Add { id, name, fields } => {
                    record::add(&app, id, name, fields).await?
                }
                RecordAction::Search {
                    query,
                    page,
                    per_page,
                } => record::search(&app, &identity, query.as_deref(), *page, *per_page).await?,
                RecordAction::Show { id } => record::show(&app, &identity, id).await?,
            }
            app.close().await?;
        }

        Commands::Unlock { record_id } => {
            let app = db::open(&cli).await?;
            let identity = cli.identity()?;
            entitlement::unlock(&app, &identity, record_id).await?;
            app.close().await?;
        }

        Commands::Credits => {
            let app = db::open(&cli).await?;
            let identity = cli.identity()?;
            entitlement::credits(&app, &identity).await?;
            app.close().await?;
        }

        Commands::Calc { tool } => {
            let app = db::open(&cli).await?;
            let identity = cli.identity()?;
            calc::run(&app, &identity, tool).await?;
            app.close().await?;
        }

        Commands::History {
            from,
            to,
            types,
            limit,
            json,
        } => {
            history::show(
                &cli.events_dir,
                cli.owner.as_deref(),
                from.as_deref(),
                to.as_deref(),
                types.as_deref(),
                *limit,
                *json,
            )?;
        }
    }

    Ok(())
}
