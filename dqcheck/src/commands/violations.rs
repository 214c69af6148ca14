// dqcheck/src/commands/violations.rs
//
// USE CASE: Read back run records and violation pages.

use anyhow::Result;
use std::path::Path;

use dqcheck_core::domain::rules::RuleId;

use super::render::{kpi_table, print_page, print_summary};
use super::{AppContext, parse_session, print_json};

pub async fn page(
    project_dir: &Path,
    session: &str,
    page: u64,
    page_size: Option<u64>,
    json: bool,
) -> Result<()> {
    let session = parse_session(session)?;
    let ctx = AppContext::load(project_dir)?;
    let page = ctx.orchestrator.violations(session, page, page_size).await?;
    if json {
        print_json(&page)?;
    } else {
        print_page(&page);
    }
    Ok(())
}

pub async fn summary(project_dir: &Path, session: &str, json: bool) -> Result<()> {
    let session = parse_session(session)?;
    let ctx = AppContext::load(project_dir)?;
    let summary = ctx.orchestrator.summary(session).await?;
    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(())
}

pub async fn runs(project_dir: &Path, json: bool) -> Result<()> {
    let ctx = AppContext::load(project_dir)?;
    let runs = ctx.orchestrator.runs().await?;
    if json {
        print_json(&runs)?;
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs recorded yet.");
    }
    for run in &runs {
        println!(
            "{}  {}  {:>6.2}  {:<9}  {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.session_id,
            run.dq_score,
            run.status.to_string(),
            run.source
        );
    }
    Ok(())
}

pub async fn kpis(project_dir: &Path, rule: Option<RuleId>, json: bool) -> Result<()> {
    let ctx = AppContext::load(project_dir)?;
    let history = ctx.orchestrator.kpi_history(rule).await?;
    if json {
        print_json(&history)?;
    } else if history.is_empty() {
        println!("No KPI values recorded yet.");
    } else {
        println!("{}", kpi_table(&history));
    }
    Ok(())
}
