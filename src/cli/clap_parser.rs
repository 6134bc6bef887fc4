use crate::config::AppConfig;
use crate::error::ConfigError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "patient_reconcile",
    version,
    about = "Reconcile internal patient records against an authoritative registry",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Debug-level logging
    #[arg(long, short = 'v', global = true, env = "PATIENT_RECONCILE_VERBOSE")]
    pub verbose: bool,
    /// JSON config file; flags override its values
    #[arg(long, global = true, value_name = "FILE", env = "PATIENT_RECONCILE_CONFIG")]
    pub config: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Match internal records, write the updated export and audit outputs
    Reconcile(ReconcileArgs),
    /// Compute the merge plan for suffixed duplicates in an updated export
    MergePlan(MergePlanArgs),
    /// Submit the merge plan to the patient system API
    Merge(MergeArgs),
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Internal (imaging-system) CSV export
    #[arg(value_name = "INTERNAL")]
    pub internal: String,
    /// Authoritative (practice-management) CSV export
    #[arg(value_name = "AUTHORITATIVE")]
    pub authoritative: String,
    /// Updated internal CSV (default: <INTERNAL>_updated.csv)
    #[arg(long, short = 'o', value_name = "OUT_PATH")]
    pub out: Option<String>,
    /// Per-record audit CSV
    #[arg(long = "audit-csv", value_name = "PATH")]
    pub audit_csv: Option<String>,
    /// Plain-text audit report
    #[arg(long, value_name = "PATH")]
    pub report: Option<String>,
    /// Minimum confidence (0-1) for applying a match (env: PATIENT_RECONCILE_THRESHOLD)
    #[arg(long = "confidence-threshold", value_name = "THRESHOLD", env = "PATIENT_RECONCILE_THRESHOLD")]
    pub confidence_threshold: Option<f64>,
    /// Separator between base identifier and duplicate suffix
    #[arg(long = "suffix-separator", value_name = "SEP")]
    pub suffix_separator: Option<String>,
    /// Qualifier token stripped from names (repeatable, replaces the defaults)
    #[arg(long = "suffix-token", value_name = "TOKEN")]
    pub suffix_tokens: Vec<String>,
    /// Only report; do not write updated records
    #[arg(long = "audit-only")]
    pub audit_only: bool,
}

#[derive(Args, Debug)]
pub struct MergePlanArgs {
    /// Updated internal CSV
    #[arg(value_name = "UPDATED")]
    pub updated: String,
    #[arg(long, value_name = "SEP")]
    pub separator: Option<String>,
    /// Merge plan CSV (default: <UPDATED>_merge_plan.csv)
    #[arg(long, short = 'o', value_name = "OUT_PATH")]
    pub out: Option<String>,
    /// Unresolved groups CSV (default: <UPDATED>_unresolved.csv)
    #[arg(long, value_name = "PATH")]
    pub unresolved: Option<String>,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Updated internal CSV
    #[arg(value_name = "UPDATED")]
    pub updated: String,
    /// Bearer token (env: PATIENT_RECONCILE_TOKEN)
    #[arg(long, env = "PATIENT_RECONCILE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// API host (env: PATIENT_RECONCILE_HOST)
    #[arg(long, env = "PATIENT_RECONCILE_HOST")]
    pub hostname: Option<String>,
    /// API port (env: PATIENT_RECONCILE_PORT)
    #[arg(long, env = "PATIENT_RECONCILE_PORT")]
    pub port: Option<u16>,
    #[arg(long, value_name = "SEP")]
    pub separator: Option<String>,
    /// Log the plan without calling the API
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied, validated.
    pub fn to_app_config(&self) -> Result<AppConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => AppConfig::from_json_file(path)?,
            None => AppConfig::default(),
        };
        match &self.command {
            Command::Reconcile(a) => {
                if let Some(t) = a.confidence_threshold {
                    cfg.matching.confidence_threshold = t;
                }
                if let Some(sep) = &a.suffix_separator {
                    cfg.matching.suffix_separator = sep.clone();
                }
                if !a.suffix_tokens.is_empty() {
                    cfg.matching.known_suffix_tokens =
                        a.suffix_tokens.iter().map(|t| t.trim().to_uppercase()).collect();
                }
                if a.out.is_some() {
                    cfg.export.out_path = a.out.clone();
                }
                if a.audit_csv.is_some() {
                    cfg.export.audit_csv_path = a.audit_csv.clone();
                }
                if a.report.is_some() {
                    cfg.export.report_path = a.report.clone();
                }
                cfg.export.audit_only |= a.audit_only;
            }
            Command::MergePlan(a) => {
                if let Some(sep) = &a.separator {
                    cfg.matching.suffix_separator = sep.clone();
                }
            }
            Command::Merge(a) => {
                if let Some(sep) = &a.separator {
                    cfg.matching.suffix_separator = sep.clone();
                }
                if let Some(token) = &a.token {
                    cfg.merge.token = token.clone();
                }
                if let Some(host) = &a.hostname {
                    cfg.merge.hostname = host.clone();
                }
                if let Some(port) = a.port {
                    cfg.merge.port = port;
                }
                if !a.dry_run && cfg.merge.token.trim().is_empty() {
                    return Err(ConfigError::MissingField { field: "merge.token" });
                }
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
