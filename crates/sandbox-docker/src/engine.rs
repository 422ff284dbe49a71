use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sandbox::{
    Action, BoxConfig, CommandConfig, Engine, ExecError, Execution, Files, Request, Result,
    StepConfig,
};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::args::build_args;
use crate::command::{Invocation, Invoker, Outcome, Program, ProgramOutput};
use crate::config::DockerConfig;
use crate::files::{copy_files, write_files};
use crate::spawn::{Spawner, TokioSpawner};

/// Capture limit for the post-timeout `kill` invocation.
const KILL_MAX_OUTPUT: usize = 4096;

/// Executes one sandbox command through the Docker CLI.
///
/// Every [`Engine::exec`] call works in its own scratch directory, which is
/// removed before the call returns. Steps run strictly in sequence: optional
/// `before`, the run steps, optional `after`.
pub struct DockerEngine {
    config: DockerConfig,
    boxes: Arc<HashMap<String, BoxConfig>>,
    command: CommandConfig,
    invoker: Arc<dyn Invoker>,
    spawner: Arc<dyn Spawner>,
}

impl DockerEngine {
    pub fn new(
        config: DockerConfig,
        boxes: Arc<HashMap<String, BoxConfig>>,
        command: CommandConfig,
    ) -> Self {
        Self {
            config,
            boxes,
            command,
            invoker: Arc::new(Program),
            spawner: Arc::new(TokioSpawner),
        }
    }

    /// Replace the process invoker used for every runtime call.
    #[must_use]
    pub fn with_invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = invoker;
        self
    }

    /// Replace the spawner that runs post-timeout kills.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    fn scratch_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sandbox-");
        match &self.config.scratch_dir {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
    }

    async fn run_steps(&self, request: &Request, dir: &Path) -> Execution {
        // Without an entry point the steps never read request files from disk.
        if let Some(entry) = self.command.entry()
            && let Err(e) = write_files(dir, &request.files, entry).await
        {
            return Execution::fail(
                &request.id,
                ExecError::execution("write files to temp dir", e),
            );
        }

        if let Some(before) = &self.command.before {
            let out = self.exec_step(before, request, dir, None).await;
            if !out.ok {
                return out;
            }
        }

        let Some((first, rest)) = self.command.steps.split_first() else {
            return Execution::fail(
                &request.id,
                ExecError::execution("execute code", "command has no steps"),
            );
        };
        let mut out = self
            .exec_step(first, request, dir, Some(&request.files))
            .await;
        // Later steps work on what the previous ones left in the directory.
        for step in rest {
            if !out.ok {
                break;
            }
            out = self.exec_step(step, request, dir, None).await;
        }

        if let Some(after) = &self.command.after {
            let after_out = self.exec_step(after, request, dir, None).await;
            if out.ok && !after_out.ok {
                return after_out;
            }
        }

        out
    }

    async fn exec_step(
        &self,
        step: &StepConfig,
        request: &Request,
        dir: &Path,
        files: Option<&Files>,
    ) -> Execution {
        let box_config = self.boxes.get(&step.box_name);
        if let Err(err) = validate_version(box_config, step, request) {
            return Execution::fail(&request.id, err);
        }

        if let Some(box_config) = box_config
            && let Err(e) = copy_box_files(box_config, dir).await
        {
            return Execution::fail(
                &request.id,
                ExecError::execution("copy files to temp dir", e),
            );
        }

        let args = match build_args(box_config, step, request, Some(dir)) {
            Ok(args) => args,
            Err(err) => return Execution::fail(&request.id, err),
        };
        debug!(id = %request.id, action = %step.action, ?args, "docker");

        let stdin = step
            .stdin
            .then(|| files.map(Files::concat).unwrap_or_default().into_bytes());
        let output = self
            .invoker
            .run(Invocation {
                id: request.id.clone(),
                program: self.config.binary.clone(),
                args,
                stdin,
                timeout: step.timeout,
                max_output: step.max_output,
            })
            .await;

        self.classify(step, &request.id, output)
    }

    /// Turn a raw program outcome into a typed execution result.
    fn classify(&self, step: &StepConfig, id: &str, output: ProgramOutput) -> Execution {
        match output.outcome {
            Outcome::Success => Execution::success(id, output.stdout, output.stderr),
            Outcome::TimedOut => {
                // Killing `docker run` leaves the container itself running.
                if step.action == Action::Run {
                    self.kill_container(id);
                }
                Execution::fail(id, ExecError::Timeout)
            }
            Outcome::NonZeroExit(detail) => {
                let combined = output.stdout + &output.stderr;
                let message = if combined.is_empty() {
                    detail
                } else {
                    format!("{combined} ({detail})")
                };
                Execution::code_failure(id, combined, ExecError::Code { message })
            }
            Outcome::Failed(message) => {
                Execution::fail(id, ExecError::execution("execute code", message))
            }
        }
    }

    /// Issue `docker kill <id>` in the background. The outcome is only logged.
    fn kill_container(&self, id: &str) {
        let invoker = Arc::clone(&self.invoker);
        let invocation = Invocation {
            id: id.to_owned(),
            program: self.config.binary.clone(),
            args: vec!["kill".into(), id.to_owned()],
            stdin: None,
            timeout: self.config.kill_timeout,
            max_output: KILL_MAX_OUTPUT,
        };
        self.spawner.spawn(Box::pin(async move {
            let id = invocation.id.clone();
            let output = invoker.run(invocation).await;
            match output.outcome {
                Outcome::Success => debug!(id = %id, "docker kill ok"),
                outcome => warn!(
                    id = %id,
                    ?outcome,
                    stderr = %output.stderr.trim(),
                    "docker kill failed"
                ),
            }
        }));
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn exec(&self, request: &Request) -> Execution {
        // The id names the container and is the only handle for killing it.
        if request.id.is_empty() {
            return Execution::fail(
                &request.id,
                ExecError::execution("validate request", "empty execution id"),
            );
        }
        let started = Instant::now();
        let scratch = match self.scratch_dir() {
            Ok(scratch) => scratch,
            Err(e) => {
                return Execution::fail(&request.id, ExecError::execution("create temp dir", e));
            }
        };

        let out = self.run_steps(request, scratch.path()).await;

        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(id = %request.id, path = %path.display(), error = %e, "failed to remove temp dir");
        }
        out.with_duration(started.elapsed())
    }
}

/// A request may only ask for a version its box supports, unless the step
/// pins one itself.
fn validate_version(
    box_config: Option<&BoxConfig>,
    step: &StepConfig,
    request: &Request,
) -> Result<()> {
    if step.pinned_version().is_some() {
        return Ok(());
    }
    let Some(version) = request.requested_version() else {
        return Ok(());
    };
    if box_config.is_some_and(|b| b.supports(version)) {
        Ok(())
    } else {
        Err(ExecError::UnsupportedVersion {
            box_name: step.box_name.clone(),
            version: version.to_owned(),
        })
    }
}

async fn copy_box_files(box_config: &BoxConfig, dir: &Path) -> io::Result<()> {
    for pattern in &box_config.files {
        copy_files(pattern, dir).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sandbox::ErrorKind;

    use super::*;

    fn versioned_box() -> BoxConfig {
        BoxConfig {
            image: "python".into(),
            versions: vec!["1.0".into(), "2.0".into()],
            ..BoxConfig::default()
        }
    }

    fn step() -> StepConfig {
        StepConfig {
            box_name: "python".into(),
            ..StepConfig::default()
        }
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let request = Request::new("python", "run").with_version("3.0");
        let err = validate_version(Some(&versioned_box()), &step(), &request).unwrap_err();
        assert_eq!(
            err,
            ExecError::UnsupportedVersion {
                box_name: "python".into(),
                version: "3.0".into(),
            }
        );
    }

    #[test]
    fn supported_or_missing_version_passes() {
        let b = versioned_box();
        let request = Request::new("python", "run").with_version("2.0");
        assert!(validate_version(Some(&b), &step(), &request).is_ok());
        let request = Request::new("python", "run");
        assert!(validate_version(Some(&b), &step(), &request).is_ok());
        let request = Request::new("python", "run").with_version("");
        assert!(validate_version(Some(&b), &step(), &request).is_ok());
    }

    #[test]
    fn pinned_version_skips_validation() {
        let pinned = StepConfig {
            version: Some("1.0".into()),
            ..step()
        };
        let request = Request::new("python", "run").with_version("3.0");
        assert!(validate_version(Some(&versioned_box()), &pinned, &request).is_ok());
    }

    #[test]
    fn version_without_box_is_rejected() {
        let request = Request::new("python", "run").with_version("1.0");
        assert!(validate_version(None, &step(), &request).is_err());
    }

    #[test]
    fn classify_outcomes() {
        let engine = DockerEngine::new(
            DockerConfig::default(),
            Arc::default(),
            CommandConfig::default(),
        );
        let exec_step = StepConfig {
            action: Action::Exec,
            ..step()
        };

        let out = engine.classify(&exec_step, "id", ProgramOutput::success("out", "err"));
        assert!(out.ok);
        assert_eq!((out.stdout.as_str(), out.stderr.as_str()), ("out", "err"));

        let out = engine.classify(&exec_step, "id", ProgramOutput::timed_out());
        assert_eq!(out.err, Some(ExecError::Timeout));

        let out = engine.classify(
            &exec_step,
            "id",
            ProgramOutput {
                stdout: "partial ".into(),
                stderr: "trace".into(),
                outcome: Outcome::NonZeroExit("exit status: 2".into()),
            },
        );
        assert_eq!(out.stdout, "");
        assert_eq!(out.stderr, "partial trace");
        assert_eq!(out.error_kind(), Some(ErrorKind::Code));
        assert_eq!(
            out.err.unwrap().to_string(),
            "partial trace (exit status: 2)"
        );

        let out = engine.classify(
            &exec_step,
            "id",
            ProgramOutput {
                stdout: String::new(),
                stderr: String::new(),
                outcome: Outcome::NonZeroExit("exit status: 1".into()),
            },
        );
        assert_eq!(out.err.unwrap().to_string(), "exit status: 1");

        let out = engine.classify(&exec_step, "id", ProgramOutput::failed("spawn docker: not found"));
        assert_eq!(out.error_kind(), Some(ErrorKind::Infrastructure));
        assert_eq!(
            out.err.unwrap().to_string(),
            "execute code: spawn docker: not found"
        );
    }
}
