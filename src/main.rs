mod controls;
mod engine;
mod exec;
mod model;
mod nginx;
mod registry;
mod report;
#[cfg(test)]
mod test_helpers;

use crate::engine::{Orchestrator, Paths, RunContext};
use crate::exec::SystemCommandRunner;
use crate::registry::ControlRegistry;
use crate::report::{OutputFormat, Reporter, RunStatus};
use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "nginx-audit", version, about = "NGINX CIS benchmark audit and remediation CLI")]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,

    /// Only run these controls (comma separated ids, e.g. 2.4.1,2.4.3)
    #[arg(long)]
    controls: Option<String>,

    /// Apply automated remediation for failed controls (audits only by default)
    #[arg(long, default_value_t = false)]
    remediate: bool,

    /// Skip the confirmation prompt before remediating
    #[arg(long, default_value_t = false)]
    yes: bool,

    /// Print the audit result for a single control as JSON and exit
    #[arg(long, value_name = "ID")]
    report: Option<String>,

    /// Hard timeout for each external command (e.g. 30s, 2m)
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Worker threads for control execution; 0 means one per CPU
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Ports NGINX is allowed to listen on (comma separated)
    #[arg(long, default_value = "80,443")]
    authorized_ports: String,

    /// NGINX configuration root
    #[arg(long, default_value = "/etc/nginx")]
    prefix: PathBuf,

    /// Show PASS and SKIPPED results too
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Exit with code 2 if the aggregate outcome is FAIL
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let authorized_ports: Vec<u16> = cli
        .authorized_ports
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("invalid port `{s}`")))
        .collect::<anyhow::Result<_>>()?;

    if cli.remediate && !cli.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Apply remediations to this system?")
            .default(false)
            .interact()
            .context("confirmation prompt failed; pass --yes to skip it")?;
        if !confirmed {
            bail!("remediation not confirmed");
        }
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let jobs = if cli.jobs == 0 { num_cpus::get() } else { cli.jobs };
    let paths = Paths { conf_dir: cli.prefix.clone(), ..Paths::system() };
    let ctx = RunContext::new(Arc::new(SystemCommandRunner))
        .with_paths(paths)
        .with_auto_remediate(cli.remediate)
        .with_timeout(cli.timeout)
        .with_jobs(jobs)
        .with_authorized_ports(authorized_ports)
        .with_cancel(cancel);

    let mut registry = ControlRegistry::with_defaults();
    if let Some(filter) = &cli.controls {
        let ids: Vec<String> = filter
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        registry.retain(&ids)?;
    }

    let orchestrator = Orchestrator::new(ctx);

    if let Some(id) = &cli.report {
        println!("{}", orchestrator.report(&registry, id)?);
        return Ok(());
    }

    let run_report = orchestrator.run(&registry);
    Reporter::new(cli.verbose, cli.format.into()).print(&run_report);

    if cli.strict && run_report.summary.overall == RunStatus::Fail {
        std::process::exit(2);
    }
    Ok(())
}
