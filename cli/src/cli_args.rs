//! Process entry point flags. Grounded on the teacher's `MultitoolCli` /
//! `SandboxPermissionOption` clap structs, trimmed to the knobs the run
//! orchestrator actually threads through `RuntimeEnv`/`PermissionEngine`
//! construction instead of the teacher's sandbox-policy/subcommand surface.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Local coding-agent runtime: JSON-RPC over stdio")]
pub struct Cli {
    /// Overrides the resolved approval mode (cli > env > project > default).
    #[arg(long, value_name = "MODE")]
    pub approval_mode: Option<String>,

    /// Overrides the sandbox root; defaults to the process CWD.
    #[arg(long, value_name = "PATH")]
    pub sandbox_root: Option<std::path::PathBuf>,

    /// Overrides `CODELIA_HOME` (default `~/.codelia`).
    #[arg(long, value_name = "PATH")]
    pub codelia_home: Option<std::path::PathBuf>,

    /// model provider to start with (e.g. "acme"), overridable later via `model.set`.
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// model name to start with, overridable later via `model.set`.
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,
}
