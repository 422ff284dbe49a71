use std::path::PathBuf;

use clap::Args;
use sandbox_docker::check_prerequisites;
use tracing::info;

use crate::config;
use crate::engines::Engines;
use crate::error::RunnerResult;

#[derive(Args)]
pub struct CheckArgs {
    /// Path to runner.yaml config file
    #[arg(long, short, env = "RUNNER_CONFIG")]
    config: PathBuf,
}

/// Validate the config and the container runtime, then list what can run.
pub async fn run_check(args: CheckArgs) -> RunnerResult<()> {
    let runner_config = config::load(&args.config).await?;
    let docker = runner_config.docker_config();

    let version = check_prerequisites(&docker).await?;
    info!(binary = %docker.binary.display(), version = %version, "docker ready");

    let engines = Engines::from_config(&runner_config);
    for (sandbox, command) in engines.names() {
        println!("{sandbox} {command}");
    }
    Ok(())
}
