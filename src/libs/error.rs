use config::ConfigError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Config(String),

    #[error("settings error: {0}")]
    Settings(#[from] ConfigError),

    #[error("connect failed: {0}")]
    Connect(#[source] BoxError),

    #[error("subscribe to '{topic}' failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: BoxError,
    },

    #[error("consumer stopped: {0}")]
    Run(#[source] BoxError),

    #[error("message handler failed: {0}")]
    Handler(#[source] BoxError),
}

impl AppError {
    /// Process exit status for this error.
    ///
    /// Configuration problems exit with 1, broker connection problems with 2,
    /// subscription problems with 3 and anything raised while consuming with 4.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Settings(_) => 1,
            AppError::Connect(_) => 2,
            AppError::Subscribe { .. } => 3,
            AppError::Run(_) | AppError::Handler(_) => 4,
        }
    }
}
