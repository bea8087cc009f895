//! Policy/Check Engine (§4.8): combines pending, checksum, drift, and
//! plugin findings into a single pass/fail report. Never throws; it reports.

use crate::engine::store::ChecksumMismatch;
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct CheckPolicy {
    pub fail_on_pending: bool,
    pub fail_on_checksum_mismatch: bool,
    pub fail_on_drift: bool,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        CheckPolicy {
            fail_on_pending: true,
            fail_on_checksum_mismatch: true,
            fail_on_drift: true,
        }
    }
}

impl CheckPolicy {
    /// `--strict` forces every gate on irrespective of config.
    pub fn strict() -> Self {
        CheckPolicy {
            fail_on_pending: true,
            fail_on_checksum_mismatch: true,
            fail_on_drift: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginFinding {
    pub code: String,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginCheckResult {
    pub plugin: String,
    pub evaluated: bool,
    pub ok: bool,
    pub findings: Vec<PluginFinding>,
}

impl PluginCheckResult {
    fn contributes_failure(&self) -> bool {
        self.evaluated && !self.ok && self.findings.iter().any(|f| f.severity == "error")
    }
}

pub struct CheckInputs<'a> {
    pub pending: &'a [String],
    pub checksum_mismatches: &'a [ChecksumMismatch],
    pub drifted: Option<bool>,
    pub plugin_results: &'a [PluginCheckResult],
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub passed: bool,
    #[serde(rename = "failedChecks")]
    pub failed_checks: Vec<String>,
}

/// Evaluate the policy: a check passes iff every enabled gate's signal is
/// empty.
pub fn evaluate(policy: CheckPolicy, inputs: CheckInputs<'_>) -> CheckReport {
    let mut failed = Vec::new();

    if policy.fail_on_pending && !inputs.pending.is_empty() {
        failed.push("pending_migrations".to_string());
    }
    if policy.fail_on_checksum_mismatch && !inputs.checksum_mismatches.is_empty() {
        failed.push("checksum_mismatch".to_string());
    }
    if policy.fail_on_drift && inputs.drifted == Some(true) {
        failed.push("schema_drift".to_string());
    }
    for result in inputs.plugin_results {
        if result.contributes_failure() {
            failed.push(format!("plugin:{}", result.plugin));
        }
    }

    CheckReport {
        passed: failed.is_empty(),
        failed_checks: failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_all_gates_are_clean() {
        let report = evaluate(
            CheckPolicy::default(),
            CheckInputs {
                pending: &[],
                checksum_mismatches: &[],
                drifted: Some(false),
                plugin_results: &[],
            },
        );
        assert!(report.passed);
        assert!(report.failed_checks.is_empty());
    }

    #[test]
    fn s8_schema_drift_fails_check() {
        let report = evaluate(
            CheckPolicy::default(),
            CheckInputs {
                pending: &[],
                checksum_mismatches: &[],
                drifted: Some(true),
                plugin_results: &[],
            },
        );
        assert!(!report.passed);
        assert!(report.failed_checks.contains(&"schema_drift".to_string()));
    }

    #[test]
    fn plugin_non_error_finding_does_not_fail_check() {
        let report = evaluate(
            CheckPolicy::default(),
            CheckInputs {
                pending: &[],
                checksum_mismatches: &[],
                drifted: Some(false),
                plugin_results: &[PluginCheckResult {
                    plugin: "acme".to_string(),
                    evaluated: true,
                    ok: false,
                    findings: vec![PluginFinding {
                        code: "slow_query".to_string(),
                        message: "warning only".to_string(),
                        severity: "warning".to_string(),
                    }],
                }],
            },
        );
        assert!(report.passed);
    }

    #[test]
    fn plugin_error_finding_fails_check() {
        let report = evaluate(
            CheckPolicy::default(),
            CheckInputs {
                pending: &[],
                checksum_mismatches: &[],
                drifted: Some(false),
                plugin_results: &[PluginCheckResult {
                    plugin: "acme".to_string(),
                    evaluated: true,
                    ok: false,
                    findings: vec![PluginFinding {
                        code: "broken_contract".to_string(),
                        message: "fatal".to_string(),
                        severity: "error".to_string(),
                    }],
                }],
            },
        );
        assert!(!report.passed);
        assert_eq!(report.failed_checks, vec!["plugin:acme".to_string()]);
    }

    #[test]
    fn strict_ignores_config_and_enables_every_gate() {
        let policy = CheckPolicy::strict();
        assert!(policy.fail_on_pending && policy.fail_on_checksum_mismatch && policy.fail_on_drift);
    }
}
