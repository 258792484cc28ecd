use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tagreg_sdk::BumpPart;

#[derive(Parser)]
#[command(
    name = "tagreg",
    about = "Artifact registry kept as git tags",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Run as if started in this repository
    #[arg(short = 'C', global = true, default_value = ".")]
    pub repo: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BumpArg {
    Major,
    Minor,
    Patch,
}

impl From<BumpArg> for BumpPart {
    fn from(arg: BumpArg) -> Self {
        match arg {
            BumpArg::Major => BumpPart::Major,
            BumpArg::Minor => BumpPart::Minor,
            BumpArg::Patch => BumpPart::Patch,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a version of an artifact at a commit
    Register(RegisterArgs),
    /// Withdraw a registered version
    Deregister(DeregisterArgs),
    /// Assign a version to a stage
    Assign(AssignArgs),
    /// Remove a version from a stage
    Unassign(UnassignArgs),
    /// Mark an artifact as deprecated
    Deprecate(DeprecateArgs),
    /// Show the greatest registered version
    Latest(LatestArgs),
    /// Show the version in a stage
    Which(WhichArgs),
    /// Show one artifact, or list all of them
    Show(ShowArgs),
    /// Show registry events
    History(HistoryArgs),
    /// Show the registry events behind a tag or commit
    CheckRef(CheckRefArgs),
    /// List known stages
    Stages,
    /// Check the registry tags for problems
    Doctor,
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct RegisterArgs {
    pub artifact: String,
    /// Revision to register
    #[arg(default_value = "HEAD")]
    pub rev: String,
    #[arg(long, conflicts_with = "bump")]
    pub version: Option<String>,
    #[arg(long, value_enum)]
    pub bump: Option<BumpArg>,
}

#[derive(Args)]
pub struct DeregisterArgs {
    pub artifact: String,
    pub version: String,
}

#[derive(Args)]
pub struct AssignArgs {
    pub artifact: String,
    pub stage: String,
    #[arg(long, conflicts_with = "rev")]
    pub version: Option<String>,
    #[arg(long)]
    pub rev: Option<String>,
    /// Version to register when the revision has none
    #[arg(long)]
    pub register_as: Option<String>,
    #[arg(long)]
    pub skip_registration: bool,
    /// Assign even if the version is already in the stage
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct UnassignArgs {
    pub artifact: String,
    pub stage: String,
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Args)]
pub struct DeprecateArgs {
    pub artifact: String,
}

#[derive(Args)]
pub struct LatestArgs {
    pub artifact: String,
    #[arg(long)]
    pub include_deregistered: bool,
}

#[derive(Args)]
pub struct WhichArgs {
    pub artifact: String,
    pub stage: String,
    /// Every version in the stage
    #[arg(long)]
    pub all: bool,
    /// Fail if the stage is empty
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub artifact: Option<String>,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub artifact: Option<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub oldest_first: bool,
}

#[derive(Args)]
pub struct CheckRefArgs {
    pub rev: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_register_defaults() {
        let cli = Cli::try_parse_from(["tagreg", "register", "rf"]).unwrap();
        if let Command::Register(args) = cli.command {
            assert_eq!(args.artifact, "rf");
            assert_eq!(args.rev, "HEAD");
            assert!(args.version.is_none());
            assert!(args.bump.is_none());
        } else { panic!("wrong command"); }
        assert_eq!(cli.repo, PathBuf::from("."));
    }

    #[test]
    fn parse_register_bump() {
        let cli = Cli::try_parse_from(["tagreg", "register", "rf", "main", "--bump", "minor"]).unwrap();
        if let Command::Register(args) = cli.command {
            assert_eq!(args.rev, "main");
            assert!(matches!(args.bump.map(BumpPart::from), Some(BumpPart::Minor)));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn version_and_bump_conflict() {
        assert!(Cli::try_parse_from([
            "tagreg", "register", "rf", "--version", "v1.0.0", "--bump", "major"
        ])
        .is_err());
    }

    #[test]
    fn parse_assign() {
        let cli = Cli::try_parse_from([
            "tagreg", "assign", "rf", "prod", "--rev", "abc1234", "--register-as", "v2.0.0", "--force",
        ])
        .unwrap();
        if let Command::Assign(args) = cli.command {
            assert_eq!(args.stage, "prod");
            assert_eq!(args.rev.as_deref(), Some("abc1234"));
            assert_eq!(args.register_as.as_deref(), Some("v2.0.0"));
            assert!(args.force);
            assert!(!args.skip_registration);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn assign_version_and_rev_conflict() {
        assert!(Cli::try_parse_from([
            "tagreg", "assign", "rf", "prod", "--version", "v1.0.0", "--rev", "HEAD"
        ])
        .is_err());
    }

    #[test]
    fn parse_which_strict() {
        let cli = Cli::try_parse_from(["tagreg", "which", "rf", "prod", "--strict"]).unwrap();
        if let Command::Which(args) = cli.command {
            assert!(args.strict);
            assert!(!args.all);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_check_ref() {
        let cli = Cli::try_parse_from(["tagreg", "check-ref", "rf@v1.0.0"]).unwrap();
        assert!(matches!(cli.command, Command::CheckRef(ref a) if a.rev == "rf@v1.0.0"));
    }

    #[test]
    fn parse_history_limit() {
        let cli = Cli::try_parse_from(["tagreg", "history", "-n", "5", "--oldest-first"]).unwrap();
        if let Command::History(args) = cli.command {
            assert_eq!(args.limit, Some(5));
            assert!(args.oldest_first);
            assert!(args.artifact.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_globals() {
        let cli = Cli::try_parse_from(["tagreg", "-C", "/tmp/repo", "--format", "json", "-v", "doctor"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/repo"));
        assert!(matches!(cli.format, OutputFormat::Json));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Doctor));
    }
}
