// dqcheck/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dqcheck_core::domain::rules::RuleId;

#[derive(Parser)]
#[command(name = "dqcheck")]
#[command(about = "Business-rules data quality checks for CSV, Excel and SQL sources", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project directory (holds dqcheck.yaml and the state dir)
    #[arg(long, global = true, default_value = ".", env = "DQCHECK_PROJECT_DIR")]
    pub project_dir: PathBuf,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 📏 Manages rule definitions
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },

    /// 🚀 Runs rules against a data source
    Run {
        /// Rule ids, comma separated (ex: 1,2,5)
        #[arg(long, value_delimiter = ',', required = true)]
        rules: Vec<RuleId>,

        /// Source descriptor file (YAML or JSON)
        #[arg(long, conflicts_with = "csv", required_unless_present = "csv")]
        source: Option<PathBuf>,

        /// Shortcut for a CSV file with a header row
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Exit with an error when the score is below this value
        #[arg(long)]
        fail_under: Option<f64>,
    },

    /// 📄 Pages through the violations of a run
    Violations {
        #[arg(long)]
        session: String,

        #[arg(long, default_value = "1")]
        page: u64,

        /// Defaults to pagination.default_page_size
        #[arg(long)]
        page_size: Option<u64>,
    },

    /// 📊 Shows the summary of a run
    Summary {
        #[arg(long)]
        session: String,
    },

    /// 🗂️  Lists recorded runs, most recent first
    Runs,

    /// 📈 Shows the recorded KPI and aggregate values, oldest first
    Kpis {
        /// Only this rule
        #[arg(long)]
        rule: Option<RuleId>,
    },
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// Creates rules from a YAML/JSON file (one definition or a list)
    Create {
        #[arg(long)]
        file: PathBuf,
    },

    /// Applies a partial definition to an existing rule
    Update {
        id: RuleId,
        #[arg(long)]
        file: PathBuf,
    },

    /// Deactivates a rule (rules are never deleted)
    Deactivate { id: RuleId },

    /// Lists active rules
    List {
        /// Include inactive rules
        #[arg(long)]
        all: bool,
    },

    /// Shows one rule
    Show { id: RuleId },
}
