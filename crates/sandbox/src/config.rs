use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_RUNTIME: &str = "runc";
pub(crate) const DEFAULT_CPU: u32 = 1;
pub(crate) const DEFAULT_MEMORY_MB: u32 = 64;
pub(crate) const DEFAULT_NETWORK: &str = "none";
pub(crate) const DEFAULT_NPROC: u32 = 64;
pub(crate) const DEFAULT_VOLUME: &str = "%s:/sandbox:ro";

pub(crate) const DEFAULT_USER: &str = "sandbox";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_MAX_OUTPUT: usize = 4096;

/// Sandbox runtime action performed by a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Start a fresh, auto-removed container.
    #[default]
    Run,
    /// Attach to an already running container named after the box.
    Exec,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => f.write_str("run"),
            Self::Exec => f.write_str("exec"),
        }
    }
}

/// Resource envelope and isolation policy of a sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxConfig {
    pub image: String,
    pub runtime: String,
    pub cpu: u32,
    /// Memory limit in megabytes.
    pub memory: u32,
    pub network: String,
    pub writable: bool,
    /// Storage quota passed as `--storage-opt size=<storage>`.
    pub storage: Option<String>,
    /// Volume spec; the first `%s` is replaced with the scratch directory.
    pub volume: String,
    pub tmpfs: Vec<String>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub ulimit: Vec<String>,
    pub nproc: u32,
    /// Image tags a request may ask for.
    pub versions: Vec<String>,
    /// Glob patterns copied into every scratch directory.
    pub files: Vec<String>,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            runtime: DEFAULT_RUNTIME.to_string(),
            cpu: DEFAULT_CPU,
            memory: DEFAULT_MEMORY_MB,
            network: DEFAULT_NETWORK.to_string(),
            writable: false,
            storage: None,
            volume: DEFAULT_VOLUME.to_string(),
            tmpfs: Vec::new(),
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            ulimit: Vec::new(),
            nproc: DEFAULT_NPROC,
            versions: Vec::new(),
            files: Vec::new(),
        }
    }
}

impl BoxConfig {
    pub fn supports(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    pub fn volume_spec(&self, dir: &Path) -> String {
        self.volume.replacen("%s", &dir.display().to_string(), 1)
    }

    /// Image reference, tagged with `version` when one is given.
    pub fn image_ref(&self, version: Option<&str>) -> String {
        match version {
            Some(v) => format!("{}:{v}", self.image),
            None => self.image.clone(),
        }
    }
}

/// One configured invocation of the sandbox runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    #[serde(rename = "box")]
    pub box_name: String,
    pub user: String,
    pub action: Action,
    /// Deliver request files on stdin instead of the mounted scratch dir.
    pub stdin: bool,
    /// Command template; `:name` is replaced with the execution id.
    pub command: Vec<String>,
    #[serde(with = "secs")]
    pub timeout: Duration,
    #[serde(rename = "noutput")]
    pub max_output: usize,
    /// Pinned image version, takes priority over the request's.
    pub version: Option<String>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            box_name: String::new(),
            user: DEFAULT_USER.to_string(),
            action: Action::Run,
            stdin: false,
            command: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_output: DEFAULT_MAX_OUTPUT,
            version: None,
        }
    }
}

impl StepConfig {
    pub fn pinned_version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }
}

/// Step sequence executed for one sandbox command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// File name given to the request's unnamed file. When unset, request
    /// files are not written to the scratch directory.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub before: Option<StepConfig>,
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub after: Option<StepConfig>,
}

impl CommandConfig {
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref().filter(|e| !e.is_empty())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
