//! Command handlers (§6.2). Argument parsing only lives in `cli.rs`; these
//! functions are the thin glue between parsed flags and the engine.

use crate::config::ChkitConfig;
use crate::engine::model::{Snapshot, SchemaDefinition};
use crate::engine::plan::{self, ColumnRenameMapping, MigrationPlan, TableRenameMapping};
use crate::engine::plugin::PluginRegistry;
use crate::engine::policy::{self, CheckInputs, CheckPolicy};
use crate::engine::runner::{self, TableScope};
use crate::engine::store::{self, GenerateArtifactsInput};
use crate::engine::{canon, validate};
use crate::error::ChkitError;
use serde_json::json;
use std::path::{Path, PathBuf};

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolved paths and flags every command handler needs.
pub struct AppContext {
    pub config: ChkitConfig,
    pub migrations_dir: PathBuf,
    pub meta_dir: PathBuf,
    pub json: bool,
    pub table_scope: Option<TableScope>,
}

pub struct CommandOutput {
    pub json: serde_json::Value,
    pub human: String,
    /// Overrides the default success exit code of 0 (e.g. `check` reporting
    /// a failed policy, which is a successful run with a non-zero result,
    /// not a typed `ChkitError`).
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    fn ok(json: serde_json::Value, human: String) -> Self {
        CommandOutput {
            json,
            human,
            exit_code: None,
        }
    }

    fn with_exit_code(json: serde_json::Value, human: String, exit_code: i32) -> Self {
        CommandOutput {
            json,
            human,
            exit_code: Some(exit_code),
        }
    }
}

/// Parse `--table db.name[,db.name...]` into a `TableScope`. Either side of
/// the `.` may be a glob (`events_*`, `app.*`), not just a literal name.
pub fn parse_table_selector(selector: &str) -> anyhow::Result<TableScope> {
    let mut entries = Vec::new();
    for entry in selector.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some((db, name)) = entry.split_once('.') {
            entries.push((db.to_string(), name.to_string()));
        }
    }
    TableScope::new(entries)
}

/// Load the project's declared schema (`schema.json`: a bare array of
/// `SchemaDefinition`s) relative to the current working directory.
fn load_declared_schema(path: &Path) -> anyhow::Result<Vec<SchemaDefinition>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    let defs: Vec<SchemaDefinition> = serde_json::from_str(&text)?;
    Ok(defs)
}

fn now_iso8601() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn cmd_init(ctx: &AppContext) -> Result<CommandOutput, ChkitError> {
    std::fs::create_dir_all(&ctx.migrations_dir).map_err(|source| {
        ChkitError::Store(store::StoreError::Io {
            path: ctx.migrations_dir.clone(),
            source,
        })
    })?;
    std::fs::create_dir_all(&ctx.meta_dir).map_err(|source| {
        ChkitError::Store(store::StoreError::Io {
            path: ctx.meta_dir.clone(),
            source,
        })
    })?;

    let config_path = PathBuf::from("chkit.toml");
    if !config_path.exists() {
        let _ = std::fs::write(
            &config_path,
            "migrationsDir = \"migrations\"\nmetaDir = \".chkit\"\n",
        );
    }

    let human = format!(
        "initialized chkit project (migrations: {}, meta: {})",
        ctx.migrations_dir.display(),
        ctx.meta_dir.display()
    );
    Ok(CommandOutput::ok(
        json!({
            "status": "initialized",
            "migrationsDir": ctx.migrations_dir,
            "metaDir": ctx.meta_dir,
        }),
        human,
    ))
}

pub struct GenerateArgs {
    pub name: Option<String>,
    pub migration_id: Option<String>,
    pub dryrun: bool,
    pub rename_table: Vec<String>,
    pub rename_column: Vec<String>,
}

fn parse_table_rename(spec: &str) -> anyhow::Result<TableRenameMapping> {
    let (old, new) = spec
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("malformed --rename-table mapping `{spec}`, expected old=new"))?;
    let (old_database, old_name) = old
        .split_once('.')
        .ok_or_else(|| anyhow::anyhow!("malformed --rename-table source `{old}`, expected db.table"))?;
    let (new_database, new_name) = new
        .split_once('.')
        .ok_or_else(|| anyhow::anyhow!("malformed --rename-table target `{new}`, expected db.table"))?;
    Ok(TableRenameMapping {
        old_database: old_database.to_string(),
        old_name: old_name.to_string(),
        new_database: new_database.to_string(),
        new_name: new_name.to_string(),
    })
}

fn parse_column_rename(spec: &str) -> anyhow::Result<ColumnRenameMapping> {
    let (source, to) = spec
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("malformed --rename-column mapping `{spec}`, expected db.table.old=new"))?;
    let mut parts = source.rsplitn(2, '.');
    let from = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed --rename-column source `{source}`"))?;
    let qualified_table = parts.next().ok_or_else(|| {
        anyhow::anyhow!("malformed --rename-column source `{source}`, expected db.table.column")
    })?;
    let (database, table) = qualified_table.split_once('.').ok_or_else(|| {
        anyhow::anyhow!("malformed --rename-column source `{source}`, expected db.table.column")
    })?;
    Ok(ColumnRenameMapping {
        database: database.to_string(),
        table: table.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// The documented envelope for an empty-scope `generate` (§9 Decision: the
/// two "plan mode" paths are unified; empty scope short-circuits before
/// diffing rather than producing a separate code path).
fn empty_scope_envelope(scope_enabled: bool) -> CommandOutput {
    CommandOutput::ok(
        json!({
            "scope": {"enabled": scope_enabled, "matchCount": 0, "operationCount": 0},
            "warning": "No tables matched selector",
        }),
        "No tables matched selector".to_string(),
    )
}

pub fn cmd_generate(
    ctx: &AppContext,
    args: GenerateArgs,
) -> anyhow::Result<Result<CommandOutput, ChkitError>> {
    let declared = load_declared_schema(Path::new("schema.json"))?;
    let new_defs = canon::canonicalize(declared);

    let issues = validate::validate(&new_defs);
    if !issues.is_empty() {
        return Ok(Err(ChkitError::ValidationFailed { issues }));
    }

    let old_defs = match store::read_snapshot(&ctx.meta_dir) {
        Ok(snapshot) => snapshot.map(|s| s.definitions).unwrap_or_default(),
        Err(e) => return Ok(Err(ChkitError::Store(e))),
    };

    let cli_table_renames = args
        .rename_table
        .iter()
        .map(|s| parse_table_rename(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let cli_column_renames = args
        .rename_column
        .iter()
        .map(|s| parse_column_rename(s))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let plan = match plan::diff_with_renames(old_defs, &new_defs, cli_table_renames, cli_column_renames) {
        Ok(plan) => plan,
        Err(e) => return Ok(Err(ChkitError::UnresolvableRename(e))),
    };

    if let Some(scope) = &ctx.table_scope {
        if scope.is_empty() {
            return Ok(Ok(empty_scope_envelope(true)));
        }
    }
    let plan = match &ctx.table_scope {
        None => plan,
        Some(scope) => filter_plan_by_scope(plan, scope),
    };

    if plan.operations.is_empty() {
        return Ok(Ok(empty_scope_envelope(ctx.table_scope.is_some())));
    }

    if args.dryrun {
        let human = format!("{} pending operation(s) (dry run)", plan.operations.len());
        return Ok(Ok(CommandOutput::ok(
            serde_json::to_value(&plan).unwrap_or(json!({})),
            human,
        )));
    }

    let migration_id = args
        .migration_id
        .clone()
        .unwrap_or_else(|| chrono::Utc::now().format("%Y%m%d%H%M%S").to_string());

    let output = match store::generate_artifacts(GenerateArtifactsInput {
        definitions: new_defs,
        migrations_dir: &ctx.migrations_dir,
        meta_dir: &ctx.meta_dir,
        migration_name: args.name.clone(),
        migration_id: Some(migration_id),
        plan: &plan,
        cli_version: CLI_VERSION,
        generated_at: now_iso8601(),
    }) {
        Ok(output) => output,
        Err(e) => return Ok(Err(ChkitError::Store(e))),
    };

    let human = match &output.migration_file {
        Some(name) => format!("wrote {name}"),
        None => "no changes detected".to_string(),
    };
    Ok(Ok(CommandOutput::ok(
        json!({
            "migrationFile": output.migration_file,
            "riskSummary": plan.risk_summary,
            "renameSuggestions": plan.rename_suggestions,
        }),
        human,
    )))
}

fn filter_plan_by_scope(plan: MigrationPlan, scope: &TableScope) -> MigrationPlan {
    let operations: Vec<_> = plan
        .operations
        .into_iter()
        .filter(|op| scope.matches_key(&op.key))
        .collect();
    let mut risk_summary = crate::engine::plan::RiskSummary::default();
    for op in &operations {
        risk_summary.bump(op.risk);
    }
    MigrationPlan {
        operations,
        risk_summary,
        rename_suggestions: plan.rename_suggestions,
    }
}

pub fn cmd_status(ctx: &AppContext) -> Result<CommandOutput, ChkitError> {
    let journal = store::read_journal(&ctx.meta_dir).map_err(ChkitError::Store)?;
    let pending = runner::compute_pending(&ctx.migrations_dir, &journal).map_err(ChkitError::Store)?;
    let mismatches =
        store::find_checksum_mismatches(&ctx.migrations_dir, &journal).map_err(ChkitError::Store)?;

    let human = format!(
        "{} pending, {} applied, {} checksum mismatch(es)",
        pending.len(),
        journal.applied.len(),
        mismatches.len()
    );
    Ok(CommandOutput::ok(
        json!({
            "pending": pending,
            "checksumMismatchCount": mismatches.len(),
            "appliedCount": journal.applied.len(),
        }),
        human,
    ))
}

pub struct MigrateArgs {
    pub execute: bool,
    pub allow_destructive: bool,
}

pub async fn cmd_migrate(ctx: &AppContext, args: MigrateArgs) -> Result<CommandOutput, ChkitError> {
    let allow_destructive = args.allow_destructive || ctx.config.safety.allow_destructive;

    let gate = runner::run_gates(
        &ctx.migrations_dir,
        &ctx.meta_dir,
        ctx.table_scope.as_ref(),
        allow_destructive,
    )
    .map_err(ChkitError::Runner)?;

    if !args.execute {
        let human = format!("{} pending migration(s)", gate.pending.len());
        return Ok(CommandOutput::ok(
            json!({
                "pending": gate.pending,
                "fallbackWarnings": gate.fallback_warnings,
            }),
            human,
        ));
    }

    let clickhouse_url = ctx
        .config
        .clickhouse
        .url
        .as_ref()
        .ok_or(ChkitError::MissingClickHouseConfig)?;
    let client = crate::clickhouse::ClickhouseClient::new(
        clickhouse_url,
        ctx.config.clickhouse.database.as_deref().unwrap_or("default"),
        ctx.config.clickhouse.user.as_deref().unwrap_or("default"),
        ctx.config.clickhouse.password.as_deref().unwrap_or(""),
        std::time::Duration::from_secs(10),
    );

    struct LiveExecutor(crate::clickhouse::ClickhouseClient);
    #[async_trait::async_trait]
    impl runner::DdlExecutor for LiveExecutor {
        async fn execute(&self, sql: &str) -> anyhow::Result<()> {
            self.0.execute_ddl(sql).await.map_err(anyhow::Error::from)
        }
    }

    let outcome = runner::execute_pending(
        &ctx.migrations_dir,
        &ctx.meta_dir,
        &LiveExecutor(client),
        &gate.pending,
        now_iso8601,
    )
    .await
    .map_err(ChkitError::Runner)?;

    let human = format!("applied {} migration(s)", outcome.applied.len());
    Ok(CommandOutput::ok(json!({"applied": outcome.applied}), human))
}

pub async fn cmd_drift(ctx: &AppContext) -> Result<CommandOutput, ChkitError> {
    let snapshot = store::read_snapshot(&ctx.meta_dir)
        .map_err(ChkitError::Store)?
        .unwrap_or_else(|| Snapshot::new(now_iso8601(), Vec::new()));

    let clickhouse_url = ctx
        .config
        .clickhouse
        .url
        .as_ref()
        .ok_or(ChkitError::MissingClickHouseConfig)?;
    let database = ctx.config.clickhouse.database.as_deref().unwrap_or("default");
    let client = crate::clickhouse::ClickhouseClient::new(
        clickhouse_url,
        database,
        ctx.config.clickhouse.user.as_deref().unwrap_or("default"),
        ctx.config.clickhouse.password.as_deref().unwrap_or(""),
        std::time::Duration::from_secs(10),
    );

    let actual_objects = client.fetch_objects(database).await.map_err(ChkitError::Clickhouse)?;
    let actual_tables = client.fetch_tables(database).await.map_err(ChkitError::Clickhouse)?;

    let report = crate::engine::drift::compare(&snapshot.definitions, &actual_objects, &actual_tables);

    let human = format!("drifted={}", report.drifted);
    Ok(CommandOutput::ok(
        serde_json::to_value(&report).unwrap_or(json!({})),
        human,
    ))
}

pub struct CheckArgs {
    pub strict: bool,
}

pub async fn cmd_check(ctx: &AppContext, args: CheckArgs) -> Result<CommandOutput, ChkitError> {
    let journal = store::read_journal(&ctx.meta_dir).map_err(ChkitError::Store)?;
    let pending = runner::compute_pending(&ctx.migrations_dir, &journal).map_err(ChkitError::Store)?;
    let mismatches =
        store::find_checksum_mismatches(&ctx.migrations_dir, &journal).map_err(ChkitError::Store)?;

    let policy = if args.strict {
        CheckPolicy::strict()
    } else {
        CheckPolicy {
            fail_on_pending: ctx.config.check.fail_on_pending,
            fail_on_checksum_mismatch: ctx.config.check.fail_on_checksum_mismatch,
            fail_on_drift: ctx.config.check.fail_on_drift,
        }
    };

    let drifted = if ctx.config.clickhouse.url.is_some() {
        match cmd_drift(ctx).await {
            Ok(out) => out.json.get("drifted").and_then(|v| v.as_bool()),
            Err(_) => None,
        }
    } else {
        None
    };

    let registry = PluginRegistry::new();
    let plugin_results = registry
        .run_on_check(&crate::engine::plugin::CheckContext { json_mode: ctx.json })
        .await
        .unwrap_or_default();

    let report = policy::evaluate(
        policy,
        CheckInputs {
            pending: &pending,
            checksum_mismatches: &mismatches,
            drifted,
            plugin_results: &plugin_results,
        },
    );

    let json = serde_json::to_value(&report).unwrap_or(json!({}));
    if report.passed {
        Ok(CommandOutput::ok(json, "check passed".to_string()))
    } else {
        let human = format!("check failed: {}", report.failed_checks.join(", "));
        Ok(CommandOutput::with_exit_code(json, human, 1))
    }
}

pub async fn cmd_plugin(name: &str, _subcommand: &str) -> Result<CommandOutput, ChkitError> {
    let registry = PluginRegistry::new();
    match registry.find(name) {
        Some(_) => Ok(CommandOutput::ok(
            json!({"plugin": name, "status": "ok"}),
            format!("plugin {name} ran"),
        )),
        None => Err(ChkitError::PluginOptionInvalid {
            name: name.to_string(),
            message: "no such plugin is registered (process-based plugin discovery is out of scope)"
                .to_string(),
        }),
    }
}
