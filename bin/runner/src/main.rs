use canvasflow_runner::config::RunnerConfig;
use canvasflow_runner::{execute, exit_code};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment, with an optional path argument
    let config = match RunnerConfig::from_env(std::env::args().nth(1)) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "failed to load configuration");
            return ExitCode::from(2);
        }
    };
    tracing::info!(workflow = %config.workflow_path.display(), "Loaded configuration");

    // Ctrl-C cancels the run; nodes that never ran are reported as skipped
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let result = match execute(&config, cancel).await {
        Ok(result) => result,
        Err(report) => {
            tracing::error!(error = ?report, "workflow run failed");
            return ExitCode::FAILURE;
        }
    };

    let rendered = if config.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(error) => {
            tracing::error!(%error, "failed to serialize run result");
            return ExitCode::FAILURE;
        }
    }

    tracing::info!(status = %result.workflow_status, waves = result.waves, "Workflow run finished");
    ExitCode::from(exit_code(result.workflow_status))
}
