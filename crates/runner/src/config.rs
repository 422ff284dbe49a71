use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sandbox::{Action, BoxConfig, CommandConfig, StepConfig};
use sandbox_docker::DockerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

const DEFAULT_BINARY: &str = "docker";
const DEFAULT_KILL_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub docker: DockerSection,
    #[serde(default)]
    pub boxes: BTreeMap<String, BoxConfig>,
    /// Commands keyed by sandbox name, then command name.
    #[serde(default)]
    pub commands: BTreeMap<String, BTreeMap<String, CommandConfig>>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSection {
    pub binary: PathBuf,
    /// Seconds allowed for `docker kill` after a step times out.
    pub kill_timeout: u64,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            kill_timeout: DEFAULT_KILL_TIMEOUT_SECS,
            scratch_dir: None,
        }
    }
}

/// Load and validate a runner config from a YAML file.
///
/// Relative box file patterns and the scratch dir are resolved against the
/// config file's parent directory.
pub async fn load(path: &Path) -> RunnerResult<RunnerConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: RunnerConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| RunnerError::Config(format!("parse {}: {e}", path.display())))?;
    if let Some(config_dir) = path.parent() {
        config.resolve_relative_paths(config_dir);
    }
    config.validate()?;
    Ok(config)
}

impl RunnerConfig {
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        for box_config in self.boxes.values_mut() {
            for pattern in &mut box_config.files {
                if Path::new(pattern.as_str()).is_relative() {
                    *pattern = config_dir.join(pattern.as_str()).display().to_string();
                }
            }
        }
        if let Some(dir) = &mut self.docker.scratch_dir
            && dir.is_relative()
        {
            *dir = config_dir.join(&*dir);
        }
    }

    fn validate(&self) -> RunnerResult<()> {
        for (name, box_config) in &self.boxes {
            if box_config.image.is_empty() {
                return Err(RunnerError::Config(format!("box {name}: image is required")));
            }
        }
        for (sandbox, commands) in &self.commands {
            for (name, command) in commands {
                let label = format!("{sandbox}.{name}");
                if command.steps.is_empty() {
                    return Err(RunnerError::Config(format!("command {label}: no steps")));
                }
                let steps = command
                    .before
                    .iter()
                    .chain(&command.steps)
                    .chain(&command.after);
                for step in steps {
                    self.validate_step(&label, step)?;
                }
            }
        }
        Ok(())
    }

    fn validate_step(&self, label: &str, step: &StepConfig) -> RunnerResult<()> {
        if step.box_name.is_empty() {
            return Err(RunnerError::Config(format!("command {label}: step without box")));
        }
        if step.action == Action::Run && !self.boxes.contains_key(&step.box_name) {
            return Err(RunnerError::Config(format!(
                "command {label}: unknown box {}",
                step.box_name
            )));
        }
        if step.command.is_empty() {
            return Err(RunnerError::Config(format!(
                "command {label}: empty command for box {}",
                step.box_name
            )));
        }
        if step.timeout.is_zero() || step.max_output == 0 {
            return Err(RunnerError::Config(format!(
                "command {label}: timeout and noutput must be positive"
            )));
        }
        Ok(())
    }

    pub fn docker_config(&self) -> DockerConfig {
        DockerConfig {
            binary: self.docker.binary.clone(),
            kill_timeout: Duration::from_secs(self.docker.kill_timeout),
            scratch_dir: self.docker.scratch_dir.clone(),
        }
    }

    /// Box configs in the shape the engines share between commands.
    pub fn box_map(&self) -> HashMap<String, BoxConfig> {
        self.boxes
            .iter()
            .map(|(name, b)| (name.clone(), b.clone()))
            .collect()
    }
}
