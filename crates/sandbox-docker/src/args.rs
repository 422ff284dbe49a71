//! Runtime command lines for sandbox steps.
//!
//! Everything here is a pure function of the configuration, the request and
//! the scratch directory path.

use std::path::Path;

use sandbox::{Action, BoxConfig, ExecError, Request, Result, StepConfig};

const NAME_VAR: &str = ":name";

/// Build the full argument list for one step, command template included.
///
/// `run` steps require a box; `exec` steps attach to the container named
/// after the box and need no box configuration.
pub fn build_args(
    box_config: Option<&BoxConfig>,
    step: &StepConfig,
    request: &Request,
    dir: Option<&Path>,
) -> Result<Vec<String>> {
    let mut args = match step.action {
        Action::Run => {
            let box_config = box_config.ok_or_else(|| {
                ExecError::execution("build arguments", format!("unknown box {}", step.box_name))
            })?;
            run_args(box_config, step, request, dir)
        }
        Action::Exec => exec_args(step),
    };
    args.extend(expand_vars(&step.command, &request.id));
    Ok(args)
}

/// `run` arguments: a fresh, named, auto-removed container.
pub fn run_args(
    box_config: &BoxConfig,
    step: &StepConfig,
    request: &Request,
    dir: Option<&Path>,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--name".into(),
        request.id.clone(),
        "--runtime".into(),
        box_config.runtime.clone(),
        "--cpus".into(),
        box_config.cpu.to_string(),
        "--memory".into(),
        format!("{}m", box_config.memory),
        "--network".into(),
        box_config.network.clone(),
        "--pids-limit".into(),
        box_config.nproc.to_string(),
        "--user".into(),
        step.user.clone(),
    ];
    if !box_config.writable {
        args.push("--read-only".into());
    }
    if step.stdin {
        args.push("--interactive".into());
    }
    if let Some(storage) = box_config.storage.as_deref().filter(|s| !s.is_empty()) {
        args.push("--storage-opt".into());
        args.push(format!("size={storage}"));
    }
    if let Some(dir) = dir {
        args.push("--volume".into());
        args.push(box_config.volume_spec(dir));
    }
    push_repeated(&mut args, "--tmpfs", &box_config.tmpfs);
    push_repeated(&mut args, "--cap-add", &box_config.cap_add);
    push_repeated(&mut args, "--cap-drop", &box_config.cap_drop);
    push_repeated(&mut args, "--ulimit", &box_config.ulimit);

    // step-pinned version > requested version > latest
    let version = step.pinned_version().or_else(|| request.requested_version());
    args.push(box_config.image_ref(version));
    args
}

/// `exec` arguments: attach to the long-running container named after the box.
pub fn exec_args(step: &StepConfig) -> Vec<String> {
    vec![
        "exec".into(),
        "--interactive".into(),
        "--user".into(),
        step.user.clone(),
        step.box_name.clone(),
    ]
}

/// Replace the first `:name` in every template token with `name`.
pub fn expand_vars(command: &[String], name: &str) -> Vec<String> {
    command
        .iter()
        .map(|arg| arg.replacen(NAME_VAR, name, 1))
        .collect()
}

fn push_repeated(args: &mut Vec<String>, flag: &str, values: &[String]) {
    for value in values {
        args.push(flag.to_string());
        args.push(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn python_box() -> BoxConfig {
        BoxConfig {
            image: "python".into(),
            cpu: 1,
            network: "none".into(),
            versions: vec!["3.11".into(), "3.12".into()],
            ..BoxConfig::default()
        }
    }

    fn run_step() -> StepConfig {
        StepConfig {
            box_name: "python".into(),
            command: vec!["python".into(), "main.py".into()],
            ..StepConfig::default()
        }
    }

    fn request() -> Request {
        Request {
            id: "python_run_abc123".into(),
            sandbox: "python".into(),
            command: "run".into(),
            ..Request::default()
        }
    }

    fn position(args: &[String], value: &str) -> usize {
        args.iter()
            .position(|a| a == value)
            .unwrap_or_else(|| panic!("{value} not in {args:?}"))
    }

    #[test]
    fn run_args_shape() {
        let dir = PathBuf::from("/tmp/scratch");
        let step = StepConfig {
            version: Some("3.12".into()),
            ..run_step()
        };
        let args = build_args(Some(&python_box()), &step, &request(), Some(&dir)).unwrap();
        assert_eq!(
            args,
            [
                "run",
                "--rm",
                "--name",
                "python_run_abc123",
                "--runtime",
                "runc",
                "--cpus",
                "1",
                "--memory",
                "64m",
                "--network",
                "none",
                "--pids-limit",
                "64",
                "--user",
                "sandbox",
                "--read-only",
                "--volume",
                "/tmp/scratch:/sandbox:ro",
                "python:3.12",
                "python",
                "main.py",
            ]
        );
    }

    #[test]
    fn network_and_cpus_precede_image() {
        let step = StepConfig {
            version: Some("3.12".into()),
            ..run_step()
        };
        let args = run_args(&python_box(), &step, &request(), None);
        let network = position(&args, "--network");
        let cpus = position(&args, "--cpus");
        let image = position(&args, "python:3.12");
        assert_eq!(args[network + 1], "none");
        assert_eq!(args[cpus + 1], "1");
        assert!(cpus < network && network < image);
    }

    #[test]
    fn writable_box_omits_read_only() {
        let writable = BoxConfig {
            writable: true,
            ..python_box()
        };
        let args = run_args(&writable, &run_step(), &request(), None);
        assert!(!args.iter().any(|a| a == "--read-only"));

        let args = run_args(&python_box(), &run_step(), &request(), None);
        assert!(args.iter().any(|a| a == "--read-only"));
    }

    #[test]
    fn stdin_step_is_interactive() {
        let step = StepConfig {
            stdin: true,
            ..run_step()
        };
        let args = run_args(&python_box(), &step, &request(), None);
        assert!(args.iter().any(|a| a == "--interactive"));

        let args = run_args(&python_box(), &run_step(), &request(), None);
        assert!(!args.iter().any(|a| a == "--interactive"));
    }

    #[test]
    fn no_dir_means_no_volume() {
        let args = run_args(&python_box(), &run_step(), &request(), None);
        assert!(!args.iter().any(|a| a == "--volume"));
    }

    #[test]
    fn optional_box_settings_in_order() {
        let b = BoxConfig {
            storage: Some("16m".into()),
            tmpfs: vec!["/tmp:rw,size=16m".into()],
            cap_add: vec!["CHOWN".into()],
            cap_drop: vec!["all".into()],
            ulimit: vec!["nofile=96".into(), "nproc=64".into()],
            ..python_box()
        };
        let args = run_args(&b, &run_step(), &request(), None);
        let tail: Vec<&str> = args
            .iter()
            .skip(position(&args, "--storage-opt"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            tail,
            [
                "--storage-opt",
                "size=16m",
                "--tmpfs",
                "/tmp:rw,size=16m",
                "--cap-add",
                "CHOWN",
                "--cap-drop",
                "all",
                "--ulimit",
                "nofile=96",
                "--ulimit",
                "nproc=64",
                "python",
            ]
        );
    }

    #[test]
    fn image_version_priority() {
        let b = python_box();
        let pinned = StepConfig {
            version: Some("3.11".into()),
            ..run_step()
        };
        let req = request().with_version("3.12");

        let args = run_args(&b, &pinned, &req, None);
        assert_eq!(args.last().unwrap(), "python:3.11");

        let args = run_args(&b, &run_step(), &req, None);
        assert_eq!(args.last().unwrap(), "python:3.12");

        let args = run_args(&b, &run_step(), &request(), None);
        assert_eq!(args.last().unwrap(), "python");
    }

    #[test]
    fn exec_args_shape() {
        let step = StepConfig {
            box_name: "postgres".into(),
            user: "postgres".into(),
            action: Action::Exec,
            command: vec!["psql".into(), "-d".into(), ":name".into()],
            ..StepConfig::default()
        };
        let args = build_args(None, &step, &request(), Some(Path::new("/tmp/x"))).unwrap();
        assert_eq!(
            args,
            [
                "exec",
                "--interactive",
                "--user",
                "postgres",
                "postgres",
                "psql",
                "-d",
                "python_run_abc123",
            ]
        );
    }

    #[test]
    fn run_without_box_is_an_error() {
        let err = build_args(None, &run_step(), &request(), None).unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.to_string().contains("unknown box python"), "{err}");
    }

    #[test]
    fn expand_vars_replaces_name() {
        let command = vec!["echo".to_string(), ":name".to_string()];
        assert_eq!(expand_vars(&command, "abc123"), ["echo", "abc123"]);
    }

    #[test]
    fn expand_vars_first_occurrence_per_token() {
        let command = vec![
            "create database :name".to_string(),
            "--db=:name,:name".to_string(),
            "plain".to_string(),
        ];
        assert_eq!(
            expand_vars(&command, "id1"),
            ["create database id1", "--db=id1,:name", "plain"]
        );
        // the template is untouched
        assert_eq!(command[0], "create database :name");
    }
}
