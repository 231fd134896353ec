//! Permission / approval engine (spec §4.5). Grounded on `safety.rs`'s
//! `SafetyCheck::{AutoApprove,AskUser,Reject}` tri-state and
//! `approval_mode_cli_arg.rs`'s CLI/env enum plumbing, generalized from the
//! teacher's two hardcoded checks (exec safety, patch safety) into the
//! rule-list evaluator spec §4.5 describes: tool + command/command_glob/
//! skill_name matching, most-specific-first, deny-wins, persisted
//! per-project.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use wildmatch::WildMatch;

use crate::error::PermissionError;
use crate::storage::atomic_write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    Minimal,
    Trusted,
    FullAccess,
}

impl std::str::FromStr for ApprovalMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(ApprovalMode::Minimal),
            "trusted" => Ok(ApprovalMode::Trusted),
            "full-access" | "full_access" => Ok(ApprovalMode::FullAccess),
            _ => Err(()),
        }
    }
}

/// One level of the precedence chain (spec §4.5 / P5): cli > env > project >
/// default > startup > fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Cli,
    Env,
    Project,
    Default,
    Startup,
    Fallback,
}

impl ModeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeSource::Cli => "cli",
            ModeSource::Env => "env",
            ModeSource::Project => "project",
            ModeSource::Default => "default",
            ModeSource::Startup => "startup",
            ModeSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedMode {
    pub mode: ApprovalMode,
    pub source: ModeSource,
}

/// Resolves the active approval mode following spec §4.5's precedence list.
/// Invalid values at *any* level are fatal (spec §4.5, P5), so this returns
/// `Result` rather than silently falling through to the next level.
pub fn resolve_approval_mode(
    cli: Option<&str>,
    env: Option<&str>,
    project: Option<ApprovalMode>,
    default: Option<ApprovalMode>,
    startup: Option<ApprovalMode>,
) -> Result<ResolvedMode, PermissionError> {
    if let Some(v) = cli {
        return parse_required(v, "cli").map(|mode| ResolvedMode {
            mode,
            source: ModeSource::Cli,
        });
    }
    if let Some(v) = env {
        return parse_required(v, "env").map(|mode| ResolvedMode {
            mode,
            source: ModeSource::Env,
        });
    }
    if let Some(mode) = project {
        return Ok(ResolvedMode {
            mode,
            source: ModeSource::Project,
        });
    }
    if let Some(mode) = default {
        return Ok(ResolvedMode {
            mode,
            source: ModeSource::Default,
        });
    }
    if let Some(mode) = startup {
        return Ok(ResolvedMode {
            mode,
            source: ModeSource::Startup,
        });
    }
    Ok(ResolvedMode {
        mode: ApprovalMode::Minimal,
        source: ModeSource::Fallback,
    })
}

fn parse_required(value: &str, source_name: &'static str) -> Result<ApprovalMode, PermissionError> {
    value
        .parse()
        .map_err(|_| PermissionError::InvalidMode {
            value: value.to_string(),
            source_name,
        })
}

/// `{tool, command? | command_glob? | skill_name?}` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PermissionRule {
    pub tool: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub command_glob: Option<String>,
    #[serde(default)]
    pub skill_name: Option<String>,
    pub decision: RuleDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDecision {
    Allow,
    Deny,
}

/// Specificity, higher = evaluated first (most-specific-first, spec §4.5).
fn specificity(rule: &PermissionRule) -> u8 {
    if rule.command.is_some() || rule.skill_name.is_some() {
        2
    } else if rule.command_glob.is_some() {
        1
    } else {
        0
    }
}

fn rule_matches(rule: &PermissionRule, tool: &str, argv: &[String], skill_name: Option<&str>) -> bool {
    if rule.tool != tool {
        return false;
    }
    if let Some(cmd) = &rule.command {
        return argv.first().map(|s| s.as_str()) == Some(cmd.as_str());
    }
    if let Some(glob) = &rule.command_glob {
        let joined = argv.join(" ");
        return WildMatch::new(glob).matches(&joined);
    }
    if let Some(name) = &rule.skill_name {
        return skill_name == Some(name.as_str());
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
    AskUser,
}

/// Built-in rules for each mode: `minimal` asks for every write-sensitive
/// tool, `trusted` auto-allows bash/edit/write, `full-access` allows
/// everything including previously-denied tools.
fn builtin_decision(mode: ApprovalMode, tool: &str) -> Decision {
    let write_sensitive = matches!(tool, "bash" | "write" | "edit");
    match mode {
        ApprovalMode::FullAccess => Decision::Allow,
        ApprovalMode::Trusted if !write_sensitive => Decision::Allow,
        ApprovalMode::Trusted => Decision::AskUser,
        ApprovalMode::Minimal if !write_sensitive => Decision::Allow,
        ApprovalMode::Minimal => Decision::AskUser,
    }
}

pub struct PermissionEngine {
    mode: ApprovalMode,
    global_rules: Vec<PermissionRule>,
    project_rules: Vec<PermissionRule>,
    session_rules: Vec<PermissionRule>,
}

impl PermissionEngine {
    pub fn new(mode: ApprovalMode, global_rules: Vec<PermissionRule>, project_rules: Vec<PermissionRule>) -> Self {
        Self {
            mode,
            global_rules,
            project_rules,
            session_rules: Vec::new(),
        }
    }

    /// Evaluates the effective ordered rule list: built-ins for the active
    /// mode, then global, then project, then session-remembered decisions
    /// (spec §4.5). Deny wins over allow at the same specificity; rules are
    /// checked most-specific-first across all sources combined.
    pub fn evaluate(&self, tool: &str, argv: &[String], skill_name: Option<&str>) -> Decision {
        let mut candidates: Vec<&PermissionRule> = self
            .global_rules
            .iter()
            .chain(self.project_rules.iter())
            .chain(self.session_rules.iter())
            .filter(|r| rule_matches(r, tool, argv, skill_name))
            .collect();

        candidates.sort_by(|a, b| specificity(b).cmp(&specificity(a)));

        if let Some(top_specificity) = candidates.first().map(|r| specificity(r)) {
            let tied: Vec<&&PermissionRule> = candidates
                .iter()
                .take_while(|r| specificity(r) == top_specificity)
                .collect();
            if tied.iter().any(|r| r.decision == RuleDecision::Deny) {
                return Decision::Deny(format!("denied by rule for tool {tool}"));
            }
            if tied.iter().any(|r| r.decision == RuleDecision::Allow) {
                return Decision::Allow;
            }
        }

        builtin_decision(self.mode, tool)
    }

    pub fn remember_session_rule(&mut self, rule: PermissionRule) {
        self.session_rules.push(rule);
    }

    /// Appends an allow rule to the project-level config and returns the
    /// updated list for the caller to persist via [`ProjectPolicyStore`].
    /// `remember=true` only takes effect when the mode is `trusted` or
    /// above (spec §4.5).
    pub fn remember_project_rule(&mut self, rule: PermissionRule) -> bool {
        if self.mode == ApprovalMode::Minimal {
            return false;
        }
        self.project_rules.push(rule.clone());
        true
    }

    pub fn project_rules(&self) -> &[PermissionRule] {
        &self.project_rules
    }
}

/// Per-project persisted policy, keyed by the canonical realpath of the
/// sandbox root (spec §4.5). Backed by an atomic `projects.json` write at
/// mode `0600`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProjectsFile {
    pub projects: HashMap<String, ProjectPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProjectPolicy {
    pub approval_mode: Option<ApprovalMode>,
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
}

pub struct ProjectPolicyStore {
    path: PathBuf,
}

impl ProjectPolicyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> Result<ProjectsFile, PermissionError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProjectsFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, file: &ProjectsFile) -> Result<(), PermissionError> {
        let bytes = serde_json::to_vec_pretty(file)?;
        atomic_write(&self.path, &bytes).await?;
        Ok(())
    }

    pub fn canonical_key(root: &Path) -> String {
        root.canonicalize()
            .unwrap_or_else(|_| root.to_path_buf())
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_env_and_project() {
        let resolved = resolve_approval_mode(
            Some("full-access"),
            Some("minimal"),
            Some(ApprovalMode::Trusted),
            None,
            None,
        )
        .expect("resolve");
        assert_eq!(resolved.mode, ApprovalMode::FullAccess);
        assert_eq!(resolved.source.as_str(), "cli");
    }

    #[test]
    fn invalid_cli_value_is_fatal() {
        let err = resolve_approval_mode(Some("bogus"), None, None, None, None)
            .expect_err("should be invalid");
        assert!(matches!(err, PermissionError::InvalidMode { .. }));
    }

    #[test]
    fn no_overrides_fall_back_to_minimal() {
        let resolved = resolve_approval_mode(None, None, None, None, None).expect("resolve");
        assert_eq!(resolved.mode, ApprovalMode::Minimal);
        assert_eq!(resolved.source.as_str(), "fallback");
    }

    #[test]
    fn deny_wins_over_allow_at_same_specificity() {
        let rules = vec![
            PermissionRule {
                tool: "bash".to_string(),
                command: Some("rm".to_string()),
                command_glob: None,
                skill_name: None,
                decision: RuleDecision::Allow,
            },
            PermissionRule {
                tool: "bash".to_string(),
                command: Some("rm".to_string()),
                command_glob: None,
                skill_name: None,
                decision: RuleDecision::Deny,
            },
        ];
        let engine = PermissionEngine::new(ApprovalMode::FullAccess, rules, Vec::new());
        let decision = engine.evaluate("bash", &["rm".to_string(), "-rf".to_string()], None);
        assert!(matches!(decision, Decision::Deny(_)));
    }

    #[test]
    fn more_specific_command_rule_beats_glob_rule() {
        let rules = vec![
            PermissionRule {
                tool: "bash".to_string(),
                command: None,
                command_glob: Some("git *".to_string()),
                skill_name: None,
                decision: RuleDecision::Deny,
            },
            PermissionRule {
                tool: "bash".to_string(),
                command: Some("git".to_string()),
                command_glob: None,
                skill_name: None,
                decision: RuleDecision::Allow,
            },
        ];
        let engine = PermissionEngine::new(ApprovalMode::FullAccess, rules, Vec::new());
        let decision = engine.evaluate("bash", &["git".to_string(), "status".to_string()], None);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn minimal_mode_asks_for_write_sensitive_tools() {
        let engine = PermissionEngine::new(ApprovalMode::Minimal, Vec::new(), Vec::new());
        assert_eq!(engine.evaluate("bash", &["ls".to_string()], None), Decision::AskUser);
        assert_eq!(engine.evaluate("read", &[], None), Decision::Allow);
    }
}
