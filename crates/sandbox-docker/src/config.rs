use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_BINARY: &str = "docker";
pub(crate) const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Container runtime binary, resolved through `PATH` when relative.
    pub binary: PathBuf,
    /// Deadline for the `kill` issued after a `run` step times out.
    pub kill_timeout: Duration,
    /// Parent of per-execution scratch directories. Defaults to the system
    /// temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            scratch_dir: None,
        }
    }
}
