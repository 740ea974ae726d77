use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
pub mod exit_codes;

use cli::args::Cli;
use cli::commands::dispatch;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let code = match dispatch(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e),
    };
    std::process::exit(code);
}

/// Logs go to stderr; stdout carries only command output.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn report_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ucp_hub::HubError>() {
        Some(hub_err) => {
            let report = hub_err.to_report();
            match serde_json::to_string_pretty(&report) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("error: {hub_err}"),
            }
            hub_err.exit_code()
        }
        None => {
            eprintln!("error: {err:#}");
            exit_codes::INTERNAL_ERROR
        }
    }
}
