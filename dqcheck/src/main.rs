// dqcheck/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::run::RunArgs;
use dqcheck_core::{DqError, ErrorKind, ErrorResponse};

#[tokio::main]
async fn main() {
    // 1. Setup Logging (Tracing)
    // RUST_LOG=debug dqcheck run ... pour voir les détails
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Usage errors too, but --help and --version print as usual
        Err(e) if e.use_stderr() && json_requested() => {
            print_error(&ErrorResponse::new(ErrorKind::Validation, e.to_string().trim()));
            std::process::exit(2);
        }
        Err(e) => e.exit(),
    };
    let json = cli.json;

    if let Err(e) = dispatch(cli).await {
        if json {
            // Collaborators get the structured payload on stdout
            print_error(&error_response(&e));
        } else {
            eprintln!("❌ {:#}", e);
        }
        std::process::exit(1);
    }
}

fn json_requested() -> bool {
    std::env::args().skip(1).any(|arg| arg == "--json")
}

/// Engine errors keep their own class; anything else came from reading caller input.
fn error_response(e: &anyhow::Error) -> ErrorResponse {
    match e.chain().find_map(|cause| cause.downcast_ref::<DqError>()) {
        Some(err) => ErrorResponse::new(err.kind(), format!("{:#}", e)),
        None => ErrorResponse::new(ErrorKind::Validation, format!("{:#}", e)),
    }
}

fn print_error(response: &ErrorResponse) {
    match serde_json::to_string_pretty(response) {
        Ok(body) => println!("{}", body),
        Err(_) => eprintln!("❌ {}", response.message),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let project_dir = cli.project_dir;
    let json = cli.json;

    match cli.command {
        Commands::Rules { action } => commands::rules::execute(&project_dir, action, json),
        Commands::Run {
            rules,
            source,
            csv,
            fail_under,
        } => {
            let args = RunArgs {
                rules,
                source,
                csv,
                fail_under,
            };
            commands::run::execute(&project_dir, args, json).await
        }
        Commands::Violations {
            session,
            page,
            page_size,
        } => commands::violations::page(&project_dir, &session, page, page_size, json).await,
        Commands::Summary { session } => {
            commands::violations::summary(&project_dir, &session, json).await
        }
        Commands::Runs => commands::violations::runs(&project_dir, json).await,
        Commands::Kpis { rule } => commands::violations::kpis(&project_dir, rule, json).await,
    }
}
