use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod libs;
use libs::app::launch;
use libs::error::AppError;
use libs::kafka::KafkaClient;
use libs::settings::Settings;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                interrupt.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "no interrupt handler"),
        }
    });
    cancel
}

#[tokio::main]
async fn main() {
    let cancel = interrupt_token();
    let result = launch(
        std::env::args_os(),
        Settings::new,
        |settings: &Settings| {
            init_tracing(&settings.log.level);
            KafkaClient::new(settings.kafka.clone())
        },
        std::io::stdout(),
        &cancel,
    )
    .await;

    match result {
        Ok(()) => {}
        // tracing is not set up before arguments and settings are valid
        Err(e @ (AppError::Config(_) | AppError::Settings(_))) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.exit_code(), "consumer failed");
            std::process::exit(e.exit_code());
        }
    }
}
