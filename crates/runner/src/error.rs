use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown sandbox: {0}")]
    UnknownSandbox(String),

    #[error("unknown command: {sandbox}.{command}")]
    UnknownCommand { sandbox: String, command: String },

    #[error("invalid source file: {}", .0.display())]
    InvalidFile(PathBuf),

    #[error(transparent)]
    Backend(#[from] sandbox_docker::BackendNotAvailable),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
