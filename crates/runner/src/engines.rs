use std::collections::BTreeMap;
use std::sync::Arc;

use sandbox::Engine;
use sandbox_docker::DockerEngine;

use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};

/// Engines keyed by sandbox name, then command name.
pub struct Engines {
    engines: BTreeMap<String, BTreeMap<String, Arc<dyn Engine>>>,
}

impl Engines {
    /// Build one Docker engine per configured command. All engines share
    /// the same box table and runtime settings.
    pub fn from_config(config: &RunnerConfig) -> Self {
        let docker = config.docker_config();
        let boxes = Arc::new(config.box_map());
        let engines = config
            .commands
            .iter()
            .map(|(sandbox, commands)| {
                let commands = commands
                    .iter()
                    .map(|(name, command)| {
                        let engine: Arc<dyn Engine> = Arc::new(DockerEngine::new(
                            docker.clone(),
                            Arc::clone(&boxes),
                            command.clone(),
                        ));
                        (name.clone(), engine)
                    })
                    .collect();
                (sandbox.clone(), commands)
            })
            .collect();
        Self { engines }
    }

    pub fn get(&self, sandbox: &str, command: &str) -> RunnerResult<Arc<dyn Engine>> {
        let commands = self
            .engines
            .get(sandbox)
            .ok_or_else(|| RunnerError::UnknownSandbox(sandbox.to_string()))?;
        commands
            .get(command)
            .cloned()
            .ok_or_else(|| RunnerError::UnknownCommand {
                sandbox: sandbox.to_string(),
                command: command.to_string(),
            })
    }

    /// `(sandbox, command)` pairs in sorted order.
    pub fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.engines.iter().flat_map(|(sandbox, commands)| {
            commands
                .keys()
                .map(move |command| (sandbox.as_str(), command.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use sandbox::{BoxConfig, CommandConfig, StepConfig};

    use super::*;

    fn config() -> RunnerConfig {
        let step = StepConfig {
            box_name: "python".into(),
            command: vec!["python".into(), "main.py".into()],
            ..StepConfig::default()
        };
        let command = CommandConfig {
            entry: Some("main.py".into()),
            steps: vec![step],
            ..CommandConfig::default()
        };
        RunnerConfig {
            docker: Default::default(),
            boxes: [(
                "python".to_string(),
                BoxConfig {
                    image: "codapi/python".into(),
                    ..BoxConfig::default()
                },
            )]
            .into_iter()
            .collect(),
            commands: [(
                "python".to_string(),
                [
                    ("run".to_string(), command.clone()),
                    ("test".to_string(), command),
                ]
                .into_iter()
                .collect(),
            )]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn lookup_known_command() {
        let engines = Engines::from_config(&config());
        assert!(engines.get("python", "run").is_ok());
        assert!(engines.get("python", "test").is_ok());
    }

    #[test]
    fn lookup_unknown_names() {
        let engines = Engines::from_config(&config());

        let err = engines.get("ruby", "run").err().unwrap();
        assert!(matches!(err, RunnerError::UnknownSandbox(ref s) if s == "ruby"));

        let err = engines.get("python", "lint").err().unwrap();
        assert_eq!(err.to_string(), "unknown command: python.lint");
    }

    #[test]
    fn names_are_sorted() {
        let engines = Engines::from_config(&config());
        let names: Vec<_> = engines.names().collect();
        assert_eq!(names, [("python", "run"), ("python", "test")]);
    }
}
