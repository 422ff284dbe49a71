use std::fmt::Display;

/// Broad class of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The execution machinery could not run the intended program.
    Infrastructure,
    /// The program ran past its deadline.
    Timeout,
    /// The program itself exited nonzero.
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("{stage}: {message}")]
    Execution { stage: &'static str, message: String },

    #[error("box {box_name} does not support version {version}")]
    UnsupportedVersion { box_name: String, version: String },

    #[error("code execution timeout")]
    Timeout,

    #[error("{message}")]
    Code { message: String },
}

impl ExecError {
    /// Infrastructure failure labelled with the stage that failed.
    pub fn execution(stage: &'static str, err: impl Display) -> Self {
        Self::Execution {
            stage,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Execution { .. } | Self::UnsupportedVersion { .. } => ErrorKind::Infrastructure,
            Self::Timeout => ErrorKind::Timeout,
            Self::Code { .. } => ErrorKind::Code,
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
