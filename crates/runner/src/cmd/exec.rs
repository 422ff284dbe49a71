use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Args;
use sandbox::{Execution, Request};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::config;
use crate::engines::Engines;
use crate::error::{RunnerError, RunnerResult};

#[derive(Args)]
pub struct ExecArgs {
    /// Sandbox name, e.g. `python`
    sandbox: String,
    /// Command name within the sandbox, e.g. `run`
    command: String,
    /// Source files, staged under their base names. Reads the entry-point
    /// file from stdin when none are given.
    files: Vec<PathBuf>,
    /// Path to runner.yaml config file
    #[arg(long, short, env = "RUNNER_CONFIG")]
    config: PathBuf,
    /// Image version to run, must be listed in the box config
    #[arg(long = "version", value_name = "VERSION")]
    image_version: Option<String>,
    /// Print the execution as JSON instead of raw output
    #[arg(long)]
    json: bool,
}

pub async fn run_exec(args: ExecArgs) -> RunnerResult<ExitCode> {
    let runner_config = config::load(&args.config).await?;
    let engines = Engines::from_config(&runner_config);
    // Resolve names before reading any input.
    let engine = engines.get(&args.sandbox, &args.command)?;

    let request = build_request(&args).await?;
    info!(id = %request.id, sandbox = %request.sandbox, command = %request.command, "exec");

    let out = engine.exec(&request).await;
    match &out.err {
        None => info!(id = %out.id, duration_ms = out.duration.as_millis(), "exec ok"),
        Some(err) => warn!(
            id = %out.id,
            duration_ms = out.duration.as_millis(),
            kind = ?err.kind(),
            error = %err,
            "exec failed"
        ),
    }

    print_execution(&out, args.json)?;
    Ok(if out.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn build_request(args: &ExecArgs) -> RunnerResult<Request> {
    let mut request = Request::new(&args.sandbox, &args.command);
    if let Some(version) = &args.image_version {
        request = request.with_version(version);
    }

    if args.files.is_empty() {
        let mut source = String::new();
        tokio::io::stdin().read_to_string(&mut source).await?;
        return Ok(request.with_file("", source));
    }
    for path in &args.files {
        let (name, content) = read_source(path).await?;
        request = request.with_file(name, content);
    }
    Ok(request)
}

async fn read_source(path: &Path) -> RunnerResult<(String, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RunnerError::InvalidFile(path.to_path_buf()))?;
    let content = tokio::fs::read_to_string(path).await?;
    Ok((name.to_string(), content))
}

fn print_execution(out: &Execution, json: bool) -> RunnerResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(out)?);
        return Ok(());
    }
    if !out.stdout.is_empty() {
        print!("{}", out.stdout);
    }
    if !out.stderr.is_empty() {
        eprint!("{}", out.stderr);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(files: Vec<PathBuf>) -> ExecArgs {
        ExecArgs {
            sandbox: "python".into(),
            command: "run".into(),
            files,
            config: PathBuf::from("runner.yaml"),
            image_version: Some("3.12".into()),
            json: false,
        }
    }

    #[tokio::test]
    async fn files_keep_base_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.py");
        let util = dir.path().join("lib").join("util.py");
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(&main, "import util").unwrap();
        std::fs::write(&util, "x = 1").unwrap();

        let request = build_request(&args(vec![main, util])).await.unwrap();

        assert!(request.id.starts_with("python_run_"));
        assert_eq!(request.requested_version(), Some("3.12"));
        let files: Vec<_> = request.files.iter().collect();
        assert_eq!(files, [("main.py", "import util"), ("util.py", "x = 1")]);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_request(&args(vec![dir.path().join("nope.py")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Io(_)), "got: {err}");
    }

    #[tokio::test]
    async fn path_without_base_name_is_rejected() {
        let err = read_source(Path::new("/")).await.unwrap_err();
        assert!(matches!(err, RunnerError::InvalidFile(_)), "got: {err}");
    }
}
