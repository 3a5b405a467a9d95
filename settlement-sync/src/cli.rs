//! # settlement-sync CLI Interface (Module)
//!
//! Command parsing, adapter wiring and the async entrypoint for the `settlement-sync`
//! binary.
//!
//! All pipeline logic (reconciliation, parsing, validation, per-file state machine) lives
//! in [`settlement_sync_core`]. This module only loads configuration, builds the concrete
//! FTPS / archive directory / database collaborators, and prints the result.
//!
//! ## How To Use
//! - Command line: `settlement-sync sync --config settlement-sync.yaml` for a full run,
//!   `settlement-sync plan --config settlement-sync.yaml` to see what a run would do.
//! - Programmatic / integration use: call [`run`] with a constructed [`Cli`].
//!
//! ## Exit status
//! `sync` succeeds when the run completed, even if some files failed (they are in the
//! printed report and will be retried next run). Configuration errors and run aborts
//! (archive or ledger unreadable) are errors.
use crate::archive::DirectoryArchive;
use crate::load_config::{load_config, CliConfig};
use crate::remote::FtpsDropDirectory;
use crate::store::{Database, NoDatabase};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settlement_sync_core::contract::{PersistenceGateway, ProcessingLedger};
use settlement_sync_core::statement::FixedWidthParser;
use settlement_sync_core::synchronise::{plan, synchronise, Collaborators};
use settlement_sync_core::validate::SettlementRowValidator;
use std::path::{Path, PathBuf};

/// CLI for settlement-sync: load acquirer settlement statements into the database.
#[derive(Parser)]
#[clap(
    name = "settlement-sync",
    version,
    about = "Reconcile, load and archive settlement statement files from the acquirer's FTPS drop directory"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every pending statement file and print the run report
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Reconcile remote, archive and ledger and print what a run would do
    Plan {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

impl Commands {
    pub fn config_path(&self) -> &Path {
        match self {
            Commands::Sync { config } | Commands::Plan { config } => config,
        }
    }
}

/// The concrete collaborators for one invocation.
pub struct Adapters {
    pub remote: FtpsDropDirectory,
    pub archive: DirectoryArchive,
    pub ledger: Box<dyn ProcessingLedger>,
    pub gateway: Box<dyn PersistenceGateway>,
    database: Option<Database>,
}

impl Adapters {
    fn new(config: &CliConfig, database: Option<Database>) -> Self {
        let (ledger, gateway): (Box<dyn ProcessingLedger>, Box<dyn PersistenceGateway>) =
            match &database {
                Some(db) => (db.ledger(&config.database.tables.schema), db.gateway()),
                None => (Box::new(NoDatabase), Box::new(NoDatabase)),
            };
        Self {
            remote: FtpsDropDirectory::new(&config.remote, &config.credentials),
            archive: DirectoryArchive::new(&config.archive_dir),
            ledger,
            gateway,
            database,
        }
    }

    /// Connects to the database, makes sure the tables exist and builds the adapters.
    pub async fn connect(config: &CliConfig) -> Result<Self> {
        let database = Database::connect(&config.database.url)
            .await
            .context("Failed to connect to the database")?;
        database
            .init_schema(&config.database.tables)
            .await
            .context("Failed to prepare database schema")?;
        Ok(Self::new(config, Some(database)))
    }

    /// Builds the adapters for a plan: no DDL, and a database that does not exist yet (or
    /// has no ledger table) reads as an empty ledger.
    pub async fn connect_read_only(config: &CliConfig) -> Result<Self> {
        let database = Database::connect_read_only(&config.database.url)
            .await
            .context("Failed to connect to the database")?;
        let database = match database {
            Some(db) => {
                let has_ledger = db
                    .has_ledger(&config.database.tables.schema)
                    .await
                    .context("Failed to inspect the database")?;
                if has_ledger {
                    Some(db)
                } else {
                    tracing::info!("[SYNC][DB] No ledger table yet, planning against an empty ledger");
                    db.close().await;
                    None
                }
            }
            None => None,
        };
        Ok(Self::new(config, database))
    }

    /// Closes the database pool once the run is over.
    pub async fn close(self) {
        if let Some(database) = &self.database {
            database.close().await;
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            remote: &self.remote,
            archive: &self.archive,
            ledger: self.ledger.as_ref(),
            parser: &FixedWidthParser,
            validator: &SettlementRowValidator,
            gateway: self.gateway.as_ref(),
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(config)?;
            let sync_config = config.sync_config();
            sync_config.trace_loaded();
            tracing::info!(command = "sync", "Starting synchronisation process");

            let adapters = Adapters::connect(&config).await?;
            let outcome = synchronise(&sync_config, &adapters.collaborators()).await;
            adapters.close().await;
            match outcome {
                Ok(report) => {
                    tracing::info!(
                        command = "sync",
                        run_id = %report.run_id,
                        archived = report.archived(),
                        failed = report.failed(),
                        "Synchronisation complete"
                    );
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation aborted"))
                }
            }
        }
        Commands::Plan { config } => {
            let config = load_config(config)?;
            let sync_config = config.sync_config();
            sync_config.trace_loaded();
            tracing::info!(command = "plan", "Computing synchronisation plan");

            let adapters = Adapters::connect_read_only(&config).await?;
            let outcome = plan(&sync_config, &adapters.collaborators()).await;
            adapters.close().await;
            let plan = outcome.context("Planning aborted")?;
            tracing::info!(
                command = "plan",
                to_process = plan.reconciliation.to_process.len(),
                anomalies = plan.reconciliation.reports.len(),
                "Plan complete"
            );
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
    }
}
