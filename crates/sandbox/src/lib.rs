mod config;
mod engine;
mod error;
mod types;

pub use config::{Action, BoxConfig, CommandConfig, StepConfig};
pub use engine::Engine;
pub use error::{ErrorKind, ExecError, Result};
pub use types::{Execution, Files, Request, generate_id};
