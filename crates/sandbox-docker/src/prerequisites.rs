use std::path::Path;
use std::time::Duration;

use crate::command::{Invocation, Invoker, Outcome, Program};
use crate::config::DockerConfig;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_MAX_OUTPUT: usize = 4096;

#[derive(Debug, thiserror::Error)]
#[error("docker backend not available: {0}")]
pub struct BackendNotAvailable(pub String);

/// Verify the host can run sandboxes before serving any request.
///
/// Checks that the runtime binary resolves and its daemon answers, and that
/// the scratch base directory exists. Collects all failures into one error.
/// Returns the reported server version.
pub async fn check_prerequisites(config: &DockerConfig) -> Result<String, BackendNotAvailable> {
    let mut errors = Vec::new();

    let mut version = None;
    if check_binary(&config.binary, &mut errors) {
        version = check_server(config, &mut errors).await;
    }
    if let Some(dir) = &config.scratch_dir {
        check_dir(dir, "scratch dir", &mut errors);
    }

    if errors.is_empty() {
        Ok(version.unwrap_or_default())
    } else {
        Err(BackendNotAvailable(errors.join("; ")))
    }
}

fn check_binary(binary: &Path, errors: &mut Vec<String>) -> bool {
    match which::which(binary) {
        Ok(_) => true,
        Err(e) => {
            errors.push(format!("runtime binary {}: {e}", binary.display()));
            false
        }
    }
}

async fn check_server(config: &DockerConfig, errors: &mut Vec<String>) -> Option<String> {
    let output = Program
        .run(Invocation {
            id: "prerequisites".into(),
            program: config.binary.clone(),
            args: vec![
                "version".into(),
                "--format".into(),
                "{{.Server.Version}}".into(),
            ],
            stdin: None,
            timeout: VERSION_TIMEOUT,
            max_output: VERSION_MAX_OUTPUT,
        })
        .await;
    match output.outcome {
        Outcome::Success => Some(output.stdout.trim().to_string()),
        Outcome::TimedOut => {
            errors.push(format!("{} version timed out", config.binary.display()));
            None
        }
        Outcome::NonZeroExit(detail) | Outcome::Failed(detail) => {
            let stderr = output.stderr.trim();
            errors.push(format!("{} version failed: {detail} {stderr}", config.binary.display()));
            None
        }
    }
}

fn check_dir(path: &Path, label: &str, errors: &mut Vec<String>) {
    if !path.is_dir() {
        errors.push(format!("{label} not found: {}", path.display()));
    }
}
