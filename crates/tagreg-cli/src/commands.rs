use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use serde::Serialize;
use tagreg_sdk::{
    AssignRequest, Event, GitRepository, HistoryOrder, Registry, RegistryConfig, StageChange,
    Version,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    if let Command::Config = cli.command {
        return cmd_config(&cli.repo, format);
    }
    let registry = Registry::open(&cli.repo)
        .with_context(|| format!("cannot open registry at {}", cli.repo.display()))?;

    match cli.command {
        Command::Register(args) => cmd_register(&registry, args, format),
        Command::Deregister(args) => {
            let version = registry.deregister(&args.artifact, &args.version)?;
            emit(format, &version, |v| {
                println!("{} Deregistered {} {}", "✓".green().bold(), v.artifact.to_string().bold(), v.version.yellow());
            })
        }
        Command::Assign(args) => cmd_assign(&registry, args, format),
        Command::Unassign(args) => {
            let change = registry.unassign(&args.artifact, &args.stage, args.version.as_deref())?;
            emit(format, &change, |c| print_change("Unassigned", c))
        }
        Command::Deprecate(args) => {
            let event = registry.deprecate(&args.artifact)?;
            emit(format, &event, |e| {
                println!("{} Deprecated {} ({})", "✓".green().bold(), e.artifact.to_string().bold(), e.ref_name.cyan());
            })
        }
        Command::Latest(args) => {
            let latest = registry.latest(&args.artifact, args.include_deregistered)?;
            emit(format, &latest, |v| match v {
                Some(v) => print_version(v),
                None => println!("{} has no registered versions", args.artifact.bold()),
            })
        }
        Command::Which(args) => cmd_which(&registry, args, format),
        Command::Show(args) => cmd_show(&registry, args, format),
        Command::History(args) => {
            let order = if args.oldest_first { HistoryOrder::OldestFirst } else { HistoryOrder::NewestFirst };
            let mut events = registry.history(args.artifact.as_deref(), order)?;
            if let Some(limit) = args.limit {
                events.truncate(limit);
            }
            emit(format, &events, |events| events.iter().for_each(print_event))
        }
        Command::CheckRef(args) => {
            let events = registry.check_ref(&args.rev);
            emit(format, &events, |events| {
                if events.is_empty() {
                    println!("No registry events at {}", args.rev.yellow());
                }
                events.iter().for_each(print_event);
            })
        }
        Command::Stages => {
            let stages = registry.stages()?;
            emit(format, &stages, |stages| {
                if stages.is_empty() {
                    println!("No stages.");
                }
                for stage in stages {
                    println!("{}", stage.to_string().green());
                }
            })
        }
        Command::Doctor => cmd_doctor(&registry, format),
        Command::Config => cmd_config(&cli.repo, format),
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn print_version(v: &Version) {
    let status = if v.is_registered() {
        "registered".green()
    } else if v.is_implicit() {
        "unregistered".dimmed()
    } else {
        "deregistered".red()
    };
    println!("{} {} [{}]", v.artifact.to_string().bold(), v.version.yellow().bold(), status);
    println!("  Commit: {}", v.commit.short().cyan());
    println!("  Author: {} <{}>", v.author, v.author_email);
    println!("  Created: {}", timestamp(&v.created_at));
    let stages: Vec<String> = v.active_stages().map(|s| s.to_string()).collect();
    if !stages.is_empty() {
        println!("  Stages: {}", stages.join(", ").green());
    }
}

fn print_event(e: &Event) {
    println!(
        "{}  {:<14} {}  {}",
        timestamp(&e.timestamp).dimmed(),
        e.kind.to_string().cyan(),
        e.ref_name.yellow(),
        e.author
    );
}

fn print_change(verb: &str, c: &StageChange) {
    if let Some(registration) = &c.registration {
        println!("{} Registered {}", "✓".green().bold(), registration.ref_name.yellow());
    }
    let stage = c.event.stage.as_ref().map(|s| s.to_string()).unwrap_or_default();
    println!(
        "{} {} {} {} {} ({})",
        "✓".green().bold(),
        verb,
        c.event.artifact.to_string().bold(),
        c.version.yellow(),
        stage.green(),
        c.event.ref_name.cyan()
    );
}

fn cmd_register(registry: &Registry<GitRepository>, args: RegisterArgs, format: OutputFormat) -> anyhow::Result<()> {
    let version = registry.register(
        &args.artifact,
        &args.rev,
        args.version.as_deref(),
        args.bump.map(Into::into),
    )?;
    emit(format, &version, |v| {
        println!("{} Registered {} {} at {}", "✓".green().bold(), v.artifact.to_string().bold(), v.version.yellow(), v.commit.short().cyan());
    })
}

fn cmd_assign(registry: &Registry<GitRepository>, args: AssignArgs, format: OutputFormat) -> anyhow::Result<()> {
    let request = AssignRequest {
        version: args.version,
        rev: args.rev,
        register_as: args.register_as,
        skip_registration: args.skip_registration,
        force: args.force,
    };
    let change = registry.assign(&args.artifact, &args.stage, &request)?;
    emit(format, &change, |c| print_change("Assigned", c))
}

fn cmd_which(registry: &Registry<GitRepository>, args: WhichArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.all {
        let versions = registry.which_all(&args.artifact, &args.stage)?;
        return emit(format, &versions, |versions| versions.iter().for_each(print_version));
    }
    if args.strict {
        let version = registry.require_which(&args.artifact, &args.stage)?;
        return emit(format, &version, print_version);
    }
    let version = registry.which(&args.artifact, &args.stage)?;
    emit(format, &version, |v| match v {
        Some(v) => print_version(v),
        None => println!("{} has no version in {}", args.artifact.bold(), args.stage.green()),
    })
}

fn cmd_show(registry: &Registry<GitRepository>, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(name) = args.artifact else {
        let artifacts = registry.artifacts()?;
        return emit(format, &artifacts, |artifacts| {
            if artifacts.is_empty() {
                println!("No artifacts registered.");
            }
            for a in artifacts {
                let latest = a.latest.as_deref().unwrap_or("-");
                let deprecated = if a.deprecated { " (deprecated)".red().to_string() } else { String::new() };
                println!("{} {}{}", a.name.to_string().bold(), latest.yellow(), deprecated);
                for (stage, versions) in &a.stages {
                    println!("  {}: {}", stage.to_string().green(), versions.join(", "));
                }
            }
        });
    };

    let artifact = registry.show(&name)?;
    emit(format, &artifact, |a| {
        let deprecated = if a.is_deprecated() { " (deprecated)".red().to_string() } else { String::new() };
        println!("Artifact {}{}", a.name.to_string().bold(), deprecated);
        for v in &a.versions {
            print_version(v);
        }
    })
}

fn cmd_doctor(registry: &Registry<GitRepository>, format: OutputFormat) -> anyhow::Result<()> {
    let report = registry.doctor()?;
    emit(format, &report, |r| {
        for v in &r.violations {
            let at = v.ref_name.as_deref().unwrap_or("-");
            println!("{} {:?} {}: {}", "✗".red().bold(), v.kind, at.yellow(), v.description);
        }
        if r.is_healthy() {
            println!("{} {} tags scanned, {} events, no issues.", "✓".green().bold(), r.tags_scanned, r.events);
        }
    })?;
    if !report.is_healthy() {
        bail!("{} problems found", report.violations.len());
    }
    Ok(())
}

fn cmd_config(repo: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = RegistryConfig::load(repo)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
