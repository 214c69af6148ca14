// dqcheck/src/commands/run.rs
//
// USE CASE: Execute a rule selection against a source.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use dqcheck_core::domain::rules::RuleId;
use dqcheck_core::domain::source::SourceDescriptor;

use super::render::{print_page, print_summary};
use super::{AppContext, print_json, read_document};

pub struct RunArgs {
    pub rules: Vec<RuleId>,
    pub source: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub fail_under: Option<f64>,
}

pub async fn execute(project_dir: &Path, args: RunArgs, json: bool) -> Result<()> {
    let start = std::time::Instant::now();
    let ctx = AppContext::load(project_dir)?;

    let descriptor = match (args.source, args.csv) {
        (Some(path), _) => read_document::<SourceDescriptor>(&path)?,
        (None, Some(csv)) => SourceDescriptor::csv(csv),
        (None, None) => bail!("either --source or --csv is required"),
    };

    if !json {
        println!("🚀 Running {} rule(s) on {}", args.rules.len(), descriptor);
    }

    // Ctrl-C stops between batches; the partial run is still recorded
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    let report = ctx
        .orchestrator
        .execute_run_with_first_page(&args.rules, &descriptor, cancel)
        .await?;

    if json {
        print_json(&report)?;
    } else {
        print_summary(&report.summary);
        if report.violations.pagination.total > 0 {
            println!("\n🔎 First violations:");
            print_page(&report.violations);
            println!(
                "   More with: dqcheck violations --session {} --page 2",
                report.session_id
            );
        }
        println!("\n✨ Done in {:.2?}", start.elapsed());
    }

    if let Some(min) = args.fail_under {
        if report.dq_score < min {
            bail!(
                "DQ score {:.2} is below the required {:.2}",
                report.dq_score,
                min
            );
        }
    }
    Ok(())
}
