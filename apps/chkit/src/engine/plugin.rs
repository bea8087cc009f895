//! Plugin Bridge (§4.9, §6.4): typed hook contexts and the fixed invocation
//! order. Process-based plugin discovery is out of scope; this module
//! defines the trait seam and a `Box<dyn Plugin>` registry, the same split
//! the rest of the stack uses between an operations trait and its registry.

use crate::engine::model::SchemaDefinition;
use crate::engine::plan::MigrationPlan;
use crate::engine::policy::{PluginCheckResult, PluginFinding};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ConfigLoadedContext {
    pub command: String,
    pub config_path: Option<String>,
    pub table_scope: Vec<String>,
    pub flags: BTreeMap<String, String>,
    pub options: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct SchemaLoadedContext {
    pub command: String,
    pub definitions: Vec<SchemaDefinition>,
}

#[derive(Debug, Clone)]
pub struct PlanCreatedContext {
    pub command: String,
    pub plan: MigrationPlan,
}

#[derive(Debug, Clone)]
pub struct BeforeApplyContext {
    pub migration: String,
    pub sql: String,
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BeforeApplyResult {
    pub statements: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct AfterApplyContext {
    pub migration: String,
    pub statements: Vec<String>,
    pub applied_at: String,
}

#[derive(Debug, Clone)]
pub struct CheckContext {
    pub json_mode: bool,
}

/// The fixed hook contract. Plugins are external collaborators; the core
/// only defines this seam and enforces invocation order (§4.9).
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn on_config_loaded(&self, _ctx: &ConfigLoadedContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_schema_loaded(
        &self,
        _ctx: &SchemaLoadedContext,
    ) -> anyhow::Result<Option<Vec<SchemaDefinition>>> {
        Ok(None)
    }

    async fn on_plan_created(&self, _ctx: &PlanCreatedContext) -> anyhow::Result<Option<MigrationPlan>> {
        Ok(None)
    }

    async fn on_before_apply(&self, _ctx: &BeforeApplyContext) -> anyhow::Result<BeforeApplyResult> {
        Ok(BeforeApplyResult::default())
    }

    async fn on_after_apply(&self, _ctx: &AfterApplyContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_check(&self, _ctx: &CheckContext) -> anyhow::Result<PluginCheckResult> {
        Ok(PluginCheckResult {
            plugin: self.name().to_string(),
            evaluated: false,
            ok: true,
            findings: Vec::new(),
        })
    }

    fn on_check_report(&self, _result: &PluginCheckResult) {}
}

/// In-process registry of plugins, invoked sequentially (never in
/// parallel) in the fixed hook order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.iter().find(|p| p.name() == name).map(|p| p.as_ref())
    }

    pub async fn run_on_config_loaded(&self, ctx: &ConfigLoadedContext) -> anyhow::Result<()> {
        for plugin in &self.plugins {
            plugin.on_config_loaded(ctx).await?;
        }
        Ok(())
    }

    /// Each plugin may replace the definition list; the next plugin sees
    /// the prior plugin's replacement (§9: hooks are sequential, each
    /// result is authoritative input to the next phase).
    pub async fn run_on_schema_loaded(
        &self,
        command: &str,
        mut definitions: Vec<SchemaDefinition>,
    ) -> anyhow::Result<Vec<SchemaDefinition>> {
        for plugin in &self.plugins {
            let ctx = SchemaLoadedContext {
                command: command.to_string(),
                definitions: definitions.clone(),
            };
            if let Some(replacement) = plugin.on_schema_loaded(&ctx).await? {
                definitions = replacement;
            }
        }
        Ok(definitions)
    }

    pub async fn run_on_plan_created(
        &self,
        command: &str,
        mut plan: MigrationPlan,
    ) -> anyhow::Result<MigrationPlan> {
        for plugin in &self.plugins {
            let ctx = PlanCreatedContext {
                command: command.to_string(),
                plan: plan.clone(),
            };
            if let Some(replacement) = plugin.on_plan_created(&ctx).await? {
                plan = replacement;
            }
        }
        Ok(plan)
    }

    pub async fn run_on_before_apply(
        &self,
        migration: &str,
        sql: &str,
        mut statements: Vec<String>,
    ) -> anyhow::Result<Vec<String>> {
        for plugin in &self.plugins {
            let ctx = BeforeApplyContext {
                migration: migration.to_string(),
                sql: sql.to_string(),
                statements: statements.clone(),
            };
            if let Some(replacement) = plugin.on_before_apply(&ctx).await?.statements {
                statements = replacement;
            }
        }
        Ok(statements)
    }

    pub async fn run_on_after_apply(&self, ctx: &AfterApplyContext) -> anyhow::Result<()> {
        for plugin in &self.plugins {
            plugin.on_after_apply(ctx).await?;
        }
        Ok(())
    }

    pub async fn run_on_check(&self, ctx: &CheckContext) -> anyhow::Result<Vec<PluginCheckResult>> {
        let mut results = Vec::new();
        for plugin in &self.plugins {
            let result = plugin.on_check(ctx).await?;
            plugin.on_check_report(&result);
            results.push(result);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RewritingPlugin;
    #[async_trait::async_trait]
    impl Plugin for RewritingPlugin {
        fn name(&self) -> &str {
            "rewriter"
        }

        async fn on_before_apply(&self, ctx: &BeforeApplyContext) -> anyhow::Result<BeforeApplyResult> {
            let mut statements = ctx.statements.clone();
            statements.push("-- rewritten".to_string());
            Ok(BeforeApplyResult {
                statements: Some(statements),
            })
        }

        async fn on_check(&self, _ctx: &CheckContext) -> anyhow::Result<PluginCheckResult> {
            Ok(PluginCheckResult {
                plugin: self.name().to_string(),
                evaluated: true,
                ok: false,
                findings: vec![PluginFinding {
                    code: "broken".to_string(),
                    message: "nope".to_string(),
                    severity: "error".to_string(),
                }],
            })
        }
    }

    #[tokio::test]
    async fn before_apply_can_rewrite_statements() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(RewritingPlugin));
        let statements = registry
            .run_on_before_apply("m.sql", "SELECT 1;", vec!["SELECT 1".to_string()])
            .await
            .unwrap();
        assert_eq!(statements, vec!["SELECT 1".to_string(), "-- rewritten".to_string()]);
    }

    #[tokio::test]
    async fn check_results_carry_plugin_name_and_findings() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(RewritingPlugin));
        let results = registry
            .run_on_check(&CheckContext { json_mode: false })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].plugin, "rewriter");
        assert!(!results[0].ok);
    }

    #[tokio::test]
    async fn registry_find_looks_up_by_name() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(RewritingPlugin));
        assert!(registry.find("rewriter").is_some());
        assert!(registry.find("missing").is_none());
    }
}
