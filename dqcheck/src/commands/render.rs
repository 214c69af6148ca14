// dqcheck/src/commands/render.rs
//
// Human-facing tables. JSON output bypasses this module entirely.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use dqcheck_core::domain::rules::{Rule, RuleKind};
use dqcheck_core::domain::run::{KpiRecord, RunSummary};
use dqcheck_core::domain::violation::ViolationPage;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn or_dash(v: Option<&str>) -> String {
    v.unwrap_or("-").to_string()
}

/// One-line description of what the rule checks.
fn target(rule: &Rule) -> String {
    match &rule.kind {
        RuleKind::Mandatory { source_column } => format!("{} is present", source_column),
        RuleKind::Threshold {
            source_column,
            operator,
            threshold_value,
        } => format!("{} {} {}", source_column, operator, threshold_value),
        RuleKind::CrossColumn {
            source_column,
            target_column,
            operator,
        } => format!("{} {} {}", source_column, operator, target_column),
        RuleKind::TextComparison {
            source_column,
            target_column,
            comparison_type,
            ..
        } => format!(
            "{} ~ {} ({})",
            source_column,
            target_column,
            comparison_type.as_str()
        ),
        RuleKind::Pattern {
            source_column,
            pattern_type,
            ..
        } => format!("{} matches {}", source_column, pattern_type.as_str()),
        RuleKind::Range {
            source_column,
            min_value,
            max_value,
        } => format!(
            "{} in [{}, {}]",
            source_column,
            min_value.map_or("-inf".to_string(), |v| v.to_string()),
            max_value.map_or("+inf".to_string(), |v| v.to_string())
        ),
        RuleKind::Kpi {
            source_column,
            operator_type,
            operator,
            threshold_value,
        } => format!(
            "{}({}) {} {}",
            operator_type,
            source_column.as_deref().unwrap_or("*"),
            operator,
            threshold_value
        ),
        RuleKind::Aggregate {
            source_column,
            operator_type,
            operator,
            threshold_value,
        } => format!(
            "{}({}) {} {}",
            operator_type, source_column, operator, threshold_value
        ),
        RuleKind::Custom { rule_logic } => rule_logic.clone(),
    }
}

pub fn rules_table(rules: &[Rule]) -> Table {
    let mut t = table(vec!["ID", "Name", "Type", "Severity", "Active", "Check"]);
    for rule in rules {
        t.add_row(vec![
            rule.rule_id.to_string(),
            rule.name.clone(),
            rule.rule_type().to_string(),
            rule.severity.to_string(),
            if rule.is_active { "yes" } else { "no" }.to_string(),
            target(rule),
        ]);
    }
    t
}

pub fn outcomes_table(summary: &RunSummary) -> Table {
    let mut t = table(vec![
        "Rule", "Name", "Severity", "Checks", "Violations", "Errors", "Compliance", "Value", "",
    ]);
    for o in &summary.outcomes {
        t.add_row(vec![
            o.rule_id.to_string(),
            o.rule_name.clone(),
            o.severity.to_string(),
            o.checks.to_string(),
            o.violations.to_string(),
            o.evaluation_errors.to_string(),
            format!("{:.1}%", o.compliance * 100.0),
            o.aggregate_value.map_or("-".to_string(), format_value),
            if o.passed { "✅" } else { "❌" }.to_string(),
        ]);
    }
    t
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.4}", v)
    }
}

pub fn kpi_table(records: &[KpiRecord]) -> Table {
    let mut t = table(vec!["Recorded", "Session", "Rule", "Type", "Value", ""]);
    for r in records {
        t.add_row(vec![
            r.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.session_id.to_string(),
            format!("{} ({})", r.rule_name, r.rule_id),
            r.rule_type.to_string(),
            format_value(r.value),
            if r.passed { "✅" } else { "❌" }.to_string(),
        ]);
    }
    t
}

pub fn violations_table(page: &ViolationPage) -> Table {
    let mut t = table(vec![
        "Row", "Column", "Rule", "Type", "Actual", "Expected", "Severity",
    ]);
    for v in &page.items {
        t.add_row(vec![
            v.row_number.map_or("-".to_string(), |n| n.to_string()),
            or_dash(v.column_name.as_deref()),
            format!("{} ({})", v.rule_name, v.rule_id),
            v.violation_type.to_string(),
            or_dash(v.actual_value.as_deref()),
            or_dash(v.expected_value.as_deref()),
            v.severity.to_string(),
        ]);
    }
    t
}

pub fn print_summary(summary: &RunSummary) {
    println!("\n📊 Session {}", summary.session_id);
    println!("   Source:     {}", summary.source);
    println!("   Status:     {}", summary.status);
    println!(
        "   Records:    {}   Violations: {}   Evaluation errors: {}",
        summary.total_records_checked, summary.total_violations, summary.evaluation_errors
    );
    println!(
        "   Rules:      {} passed, {} failed",
        summary.rules_passed, summary.rules_failed
    );
    if !summary.skipped_rule_ids.is_empty() {
        let skipped: Vec<String> = summary.skipped_rule_ids.iter().map(|id| id.to_string()).collect();
        println!("   Skipped (inactive): {}", skipped.join(", "));
    }
    println!(
        "   DQ score:   {:.2} ({})",
        summary.dq_score, summary.assessment
    );
    println!("{}", outcomes_table(summary));

    if !summary.recommendations.is_empty() {
        println!("💡 Recommendations:");
        for rec in &summary.recommendations {
            println!("   • {}", rec);
        }
    }
}

pub fn print_page(page: &ViolationPage) {
    let p = &page.pagination;
    if page.items.is_empty() {
        println!("(no violations on this page)");
    } else {
        println!("{}", violations_table(page));
    }
    println!(
        "Page {}/{} · {} violations · {} per page",
        p.page,
        p.total_pages.max(1),
        p.total,
        p.page_size
    );
}
