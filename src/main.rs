//! dbmaster-pool - command line front-end for the pool core.
//!
//! Runs one query or one transaction against MySQL/MariaDB through the pool
//! registry and prints the JSON response envelope on stdout. Logs go to stderr.

use clap::Parser;
use dbmaster_pool::config::{Config, Work};
use dbmaster_pool::db::{QueryExecutor, global_registry};
use dbmaster_pool::error::DbError;
use dbmaster_pool::models::Response;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Serialize an envelope, returning whether it reports success.
fn render<T: Serialize>(response: Response<T>) -> (bool, String) {
    let success = response.success;
    let text = serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
        format!(r#"{{"success": false, "message": "Failed to serialize response: {e}"}}"#)
    });
    (success, text)
}

fn render_error(err: DbError) -> (bool, String) {
    render(Response::<()>::error(&err))
}

async fn run(config: &Config) -> (bool, String) {
    let (connection, options) = match config.connection() {
        Ok(v) => v,
        Err(msg) => return render_error(DbError::invalid_input(msg)),
    };
    let work = match config.work() {
        Ok(work) => work,
        Err(msg) => return render_error(DbError::invalid_input(msg)),
    };

    let pool = match global_registry()
        .obtain_pool(&connection, Some(&options))
        .await
    {
        Ok(pool) => pool,
        Err(e) => return render_error(e),
    };

    let executor = QueryExecutor::new();
    match work {
        Work::Query(request) => render(Response::from(
            executor.execute_request(pool.as_ref(), &request).await,
        )),
        Work::Transaction(statements) => render(Response::from(
            executor
                .execute_in_transaction(
                    pool.as_ref(),
                    &statements,
                    Some(config.timeout_duration()),
                )
                .await,
        )),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting dbmaster-pool v{}", env!("CARGO_PKG_VERSION"));

    let (success, output) = tokio::select! {
        outcome = run(&config) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            render_error(DbError::internal("Interrupted"))
        }
    };

    global_registry().shutdown_all().await;

    println!("{output}");
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
