use super::args::Args;
use super::error::AppError;
use super::kafka::ConsumerFactory;
use super::message::PrintHandler;
use super::orchestrator::Orchestrator;
use super::settings::Settings;
use config::ConfigError;
use std::ffi::OsString;
use std::io::Write;
use tokio_util::sync::CancellationToken;

/// Parse `argv`, load settings, then build the client and consume into `out`.
/// The factory is only built once arguments and settings are valid.
pub async fn launch<I, T, L, M, F, W>(
    argv: I,
    load_settings: L,
    make_factory: M,
    out: W,
    cancel: &CancellationToken,
) -> Result<(), AppError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    L: FnOnce() -> Result<Settings, ConfigError>,
    M: FnOnce(&Settings) -> F,
    F: ConsumerFactory,
    W: Write,
{
    let args = Args::parse_args(argv)?;
    let settings = load_settings()?;
    let factory = make_factory(&settings);
    let handler = PrintHandler::new(args.group.clone(), out);
    Orchestrator::new(args.group, factory)
        .run(&handler, cancel)
        .await
}
