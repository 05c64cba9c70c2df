use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier the backend assigns to a process once it is spawned or
/// reattached. Survives window restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentProcessId(pub u32);

impl std::fmt::Display for PersistentProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PersistentProcessId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// A structured, possibly remote, location: `scheme://authority/path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUri {
    pub scheme: String,
    #[serde(default)]
    pub authority: String,
    pub path: String,
}

impl ResourceUri {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

/// Working directory of a terminal.
///
/// Serialized untagged: a JSON string is a plain local path, an object is a
/// structured resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cwd {
    Path(PathBuf),
    Resource(ResourceUri),
}

impl Cwd {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Cwd::Path(path.into())
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Cwd::Resource(_))
    }

    /// The path component, regardless of representation.
    pub fn path_string(&self) -> String {
        match self {
            Cwd::Path(p) => p.to_string_lossy().into_owned(),
            Cwd::Resource(uri) => uri.path.clone(),
        }
    }
}

impl std::fmt::Display for Cwd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cwd::Path(p) => write!(f, "{}", p.display()),
            Cwd::Resource(uri) => write!(f, "{}", uri),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// What kind of process a persisted terminal hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    /// A task runner process. Not reattached after a full restart.
    Task,
    Local,
}

/// Metadata letting an owner find its sessions again after reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectionProperties {
    pub owner_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ReconnectionProperties {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            data: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwd_plain_string_is_path() {
        let cwd: Cwd = serde_json::from_str(r#""/home/user/project""#).unwrap();
        assert_eq!(cwd, Cwd::path("/home/user/project"));
        assert!(!cwd.is_resource());
    }

    #[test]
    fn test_cwd_object_is_resource() {
        let cwd: Cwd = serde_json::from_str(
            r#"{"scheme":"vscode-remote","authority":"ssh-remote+box","path":"/srv/app"}"#,
        )
        .unwrap();
        assert_eq!(
            cwd,
            Cwd::Resource(ResourceUri::new("vscode-remote", "ssh-remote+box", "/srv/app"))
        );
        assert_eq!(cwd.path_string(), "/srv/app");
    }

    #[test]
    fn test_resource_display() {
        let uri = ResourceUri::new("file", "", "/tmp");
        assert_eq!(uri.to_string(), "file:///tmp");
    }

    #[test]
    fn test_persistent_process_id_is_transparent() {
        let json = serde_json::to_string(&PersistentProcessId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_process_type_wire_format() {
        assert_eq!(serde_json::to_string(&ProcessType::Task).unwrap(), r#""Task""#);
        let parsed: ProcessType = serde_json::from_str(r#""Local""#).unwrap();
        assert_eq!(parsed, ProcessType::Local);
    }
}
