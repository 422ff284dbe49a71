use std::fmt;
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorKind, ExecError};

/// Ordered collection of named source files.
///
/// Iteration follows insertion order. It decides both the order in which
/// files are written to the scratch directory and the order in which their
/// contents are joined when piped to a sandboxed process. An empty name
/// stands for the command's entry-point file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Files {
    entries: Vec<(String, String)>,
}

impl Files {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing the content of an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        let content = content.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = content,
            None => self.entries.push((name, content)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }

    /// All file contents joined in order.
    pub fn concat(&self) -> String {
        self.entries.iter().map(|(_, c)| c.as_str()).collect()
    }
}

impl<N: Into<String>, C: Into<String>> FromIterator<(N, C)> for Files {
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut files = Files::new();
        for (name, content) in iter {
            files.insert(name, content);
        }
        files
    }
}

impl Serialize for Files {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, content) in &self.entries {
            map.serialize_entry(name, content)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Files {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FilesVisitor;

        impl<'de> Visitor<'de> for FilesVisitor {
            type Value = Files;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of file names to contents")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Files, A::Error> {
                let mut files = Files::new();
                while let Some((name, content)) = access.next_entry::<String, String>()? {
                    files.insert(name, content);
                }
                Ok(files)
            }
        }

        deserializer.deserialize_map(FilesVisitor)
    }
}

/// Generate a container-safe execution id: `<sandbox>_<command>_<8 hex>`.
pub fn generate_id(sandbox: &str, command: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let suffix = uuid.get(..8).unwrap_or(&uuid);
    format!("{sandbox}_{command}_{suffix}")
}

/// One inbound unit of work.
///
/// `id` doubles as the sandbox container name, so it must be unique among
/// concurrently running executions. A request deserialized without an id
/// gets a generated one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RequestFields")]
pub struct Request {
    pub id: String,
    pub sandbox: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub files: Files,
}

#[derive(Deserialize)]
struct RequestFields {
    #[serde(default)]
    id: String,
    sandbox: String,
    command: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    files: Files,
}

impl From<RequestFields> for Request {
    fn from(fields: RequestFields) -> Self {
        let id = if fields.id.is_empty() {
            generate_id(&fields.sandbox, &fields.command)
        } else {
            fields.id
        };
        Self {
            id,
            sandbox: fields.sandbox,
            command: fields.command,
            version: fields.version,
            files: fields.files,
        }
    }
}

impl Request {
    pub fn new(sandbox: impl Into<String>, command: impl Into<String>) -> Self {
        let sandbox = sandbox.into();
        let command = command.into();
        Self {
            id: generate_id(&sandbox, &command),
            sandbox,
            command,
            version: None,
            files: Files::new(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(name, content);
        self
    }

    /// Requested image version; an empty string means "latest".
    pub fn requested_version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }
}

/// Outcome of one step or of a whole pipeline.
///
/// Output fields are empty on infrastructure failures. On a code-level
/// failure `stderr` holds the program's combined output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub id: String,
    pub ok: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "error", serialize_with = "serialize_error")]
    pub err: Option<ExecError>,
}

impl Execution {
    pub fn success(id: &str, stdout: String, stderr: String) -> Self {
        Self {
            id: id.to_owned(),
            ok: true,
            duration: Duration::ZERO,
            stdout,
            stderr,
            err: None,
        }
    }

    pub fn fail(id: &str, err: ExecError) -> Self {
        Self {
            id: id.to_owned(),
            ok: false,
            duration: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            err: Some(err),
        }
    }

    /// Failure of the sandboxed program itself; keeps its combined output.
    pub fn code_failure(id: &str, output: String, err: ExecError) -> Self {
        Self {
            stderr: output,
            ..Self::fail(id, err)
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.err.as_ref().map(ExecError::kind)
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

fn serialize_error<S: Serializer>(
    err: &Option<ExecError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
