//! resilient-client
//!
//! Issues requests through a hardened client built from a TOML file and/or
//! command-line flags, printing each response.
//!
//! ```text
//! resilient-client --config client.toml /health /users
//! resilient-client --base-address http://localhost:8080 -X POST --data '{"a":1}' /items
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use futures_util::future::join_all;
use hyper::Method;

use resilient_client::config::{load_config, ClientSettings};
use resilient_client::observability::logging;
use resilient_client::{CallError, Client, ClientBuilder, HttpResponse};

#[derive(Parser)]
#[command(name = "resilient-client")]
#[command(about = "Send HTTP requests through a retrying, circuit-breaking client", long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `client.base_address`
    #[arg(short, long)]
    base_address: Option<String>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Paths to request concurrently
    #[arg(required = true)]
    paths: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => ClientSettings::default(),
    };
    if let Some(base_address) = cli.base_address.clone() {
        settings.client.base_address = base_address;
    }

    logging::init(&settings.observability.log_level);

    let method = match Method::from_bytes(cli.method.to_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(err) => {
            eprintln!("Error: invalid method `{}`: {err}", cli.method);
            return ExitCode::FAILURE;
        }
    };

    let client = match ClientBuilder::from_config(&settings).build() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        base_address = %client.base_address(),
        requests = cli.paths.len(),
        "Sending requests"
    );

    let body = cli.data.clone().unwrap_or_default();
    let calls = cli
        .paths
        .iter()
        .map(|path| send(&client, method.clone(), path, body.clone()));
    let results = join_all(calls).await;

    let mut failed = false;
    for (path, result) in cli.paths.iter().zip(results) {
        match result {
            Ok(response) => print_response(path, &response),
            Err(err) => {
                failed = true;
                eprintln!("{path}: error ({}): {err}", err.kind());
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn send(
    client: &Client,
    method: Method,
    path: &str,
    body: String,
) -> Result<HttpResponse, CallError> {
    client.request(method, path, body).await
}

fn print_response(path: &str, response: &HttpResponse) {
    println!("{path}: {}", response.status());
    let body = String::from_utf8_lossy(response.body());
    if !body.is_empty() {
        println!("{body}");
    }
}
