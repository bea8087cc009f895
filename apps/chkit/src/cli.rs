//! Thin `clap`-derived command shell (§6.2). Argument parsing only — every
//! handler immediately delegates into `engine::*` via `commands.rs`.

pub mod commands;
pub mod logger;

use crate::config::ChkitConfig;
use crate::error::ChkitError;
use clap::{Parser, Subcommand};
use commands::{AppContext, CheckArgs, GenerateArgs, MigrateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "ClickHouse schema migration toolkit", arg_required_else_help(true))]
pub struct Cli {
    /// Path to chkit.toml (overrides CHKIT_CONFIG and ./chkit.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON to stdout instead of human text
    #[arg(long, global = true)]
    pub json: bool,

    /// Restrict the command to db.table[,db.table...]
    #[arg(long, global = true)]
    pub table: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create migrationsDir/metaDir and a default chkit.toml
    Init,
    /// Diff the declared schema against the last snapshot and write a migration
    Generate {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        migration_id: Option<String>,
        #[arg(long)]
        dryrun: bool,
        #[arg(long, value_delimiter = ',')]
        rename_table: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        rename_column: Vec<String>,
    },
    /// Show pending migrations and checksum status
    Status,
    /// Apply (or preview) pending migrations
    Migrate {
        #[arg(long, alias = "apply")]
        execute: bool,
        #[arg(long)]
        allow_destructive: bool,
    },
    /// Compare the snapshot against the live database
    Drift,
    /// Evaluate the pass/fail policy over pending/checksum/drift/plugin signals
    Check {
        #[arg(long)]
        strict: bool,
    },
    /// Invoke a named plugin subcommand
    Plugin {
        name: String,
        subcommand: String,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

fn build_context(cli: &Cli, config: ChkitConfig) -> anyhow::Result<AppContext> {
    let table_scope = cli
        .table
        .as_deref()
        .map(commands::parse_table_selector)
        .transpose()?;
    Ok(AppContext {
        migrations_dir: PathBuf::from(&config.migrations_dir),
        meta_dir: PathBuf::from(&config.meta_dir),
        json: cli.json,
        table_scope,
        config,
    })
}

/// Dispatch the parsed command, run it, and return the exit code (§6.2).
pub async fn run(cli: Cli, config: ChkitConfig) -> i32 {
    let json_mode = cli.json;
    let command_name = command_name(&cli.command);
    let scope = cli.table.as_deref().unwrap_or("");
    tracing::info!(command = command_name, scope, json = json_mode, "command start");

    let result = match build_context(&cli, config) {
        Ok(ctx) => dispatch(&cli, ctx).await,
        Err(e) => Err(ChkitError::Internal(e)),
    };

    let exit_code = match &result {
        Ok(output) => output.exit_code.unwrap_or(0),
        Err(e) => e.exit_code(),
    };
    emit(result, json_mode);
    if exit_code == 0 {
        tracing::info!(command = command_name, exit_code, "command finished");
    } else {
        tracing::error!(command = command_name, exit_code, "command finished");
    }
    exit_code
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init => "init",
        Commands::Generate { .. } => "generate",
        Commands::Status => "status",
        Commands::Migrate { .. } => "migrate",
        Commands::Drift => "drift",
        Commands::Check { .. } => "check",
        Commands::Plugin { .. } => "plugin",
    }
}

async fn dispatch(cli: &Cli, ctx: AppContext) -> Result<commands::CommandOutput, ChkitError> {
    match &cli.command {
        Commands::Init => commands::cmd_init(&ctx),
        Commands::Generate {
            name,
            migration_id,
            dryrun,
            rename_table,
            rename_column,
        } => {
            let args = GenerateArgs {
                name: name.clone(),
                migration_id: migration_id.clone(),
                dryrun: *dryrun,
                rename_table: rename_table.clone(),
                rename_column: rename_column.clone(),
            };
            match commands::cmd_generate(&ctx, args) {
                Ok(inner) => inner,
                Err(e) => Err(ChkitError::Internal(e)),
            }
        }
        Commands::Status => commands::cmd_status(&ctx),
        Commands::Migrate {
            execute,
            allow_destructive,
        } => {
            commands::cmd_migrate(
                &ctx,
                MigrateArgs {
                    execute: *execute,
                    allow_destructive: *allow_destructive,
                },
            )
            .await
        }
        Commands::Drift => commands::cmd_drift(&ctx).await,
        Commands::Check { strict } => commands::cmd_check(&ctx, CheckArgs { strict: *strict }).await,
        Commands::Plugin { name, subcommand, .. } => commands::cmd_plugin(name, subcommand).await,
    }
}

fn emit(result: Result<commands::CommandOutput, ChkitError>, json_mode: bool) {
    match result {
        Ok(output) => {
            if json_mode {
                println!("{}", output.json);
            } else {
                println!("{}", output.human);
            }
        }
        Err(e) => {
            if json_mode {
                println!("{}", serde_json::json!({"error": e.to_string()}));
            } else {
                eprintln!("error: {e}");
            }
        }
    }
}
