use chrono::Utc;
use clap::{CommandFactory, Parser};
use tracing::{Level, error};

mod auth;
mod cli;
mod client;
mod error;

use auth::V4Signer;
use cli::Args;
use error::CliError;

fn init_tracing() {
    // Diagnostics go to stderr; stdout is reserved for the response payload.
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), CliError> {
    let params = cli::validate(args, Utc::now())?;
    let signer = V4Signer::new(format!("{}:{}", params.host, params.port));
    let envelope = client::build_envelope(&params, &signer, Utc::now())?;
    let body = client::dispatch(envelope, params.insecure, params.verbose).await?;
    print!("{}", client::render(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(err) = run(args).await {
        match &err {
            CliError::Remote { status, body } => {
                error!(status = *status, body = %body, "request failed with HTTP status");
            }
            other => error!("{other}"),
        }
        if err.needs_help() {
            eprint!("{}", Args::command().render_help());
        }
        std::process::exit(1);
    }
}
