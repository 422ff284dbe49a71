//! Sandbox execution engine backed by the Docker CLI.
//!
//! [`DockerEngine`] runs a command's configured steps in throwaway
//! containers. Runtime calls go through an [`Invoker`] and post-timeout
//! container kills through a [`Spawner`], both replaceable for tests.

mod args;
mod command;
mod config;
mod engine;
mod files;
mod prerequisites;
mod spawn;

pub use args::{build_args, exec_args, expand_vars, run_args};
pub use command::{Invocation, Invoker, Outcome, Program, ProgramOutput};
pub use config::DockerConfig;
pub use engine::DockerEngine;
pub use files::{copy_files, write_file, write_files};
pub use prerequisites::{BackendNotAvailable, check_prerequisites};
pub use spawn::{Spawner, Task, TokioSpawner};
