//! Filesystem event model.
//!
//! Events are produced by an upstream monitor and are read-only here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of filesystem change an event describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IoEventType {
    Created,
    Removed,
    DirectoryCreated,
    DirectoryRemoved,
    Modified,
    /// Monitor-specific tag not covered above.
    Other(String),
}

impl IoEventType {
    /// Canonical tag, as exposed to templates.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Removed => "removed",
            Self::DirectoryCreated => "directory-created",
            Self::DirectoryRemoved => "directory-removed",
            Self::Modified => "modified",
            Self::Other(tag) => tag,
        }
    }
}

impl FromStr for IoEventType {
    type Err = std::convert::Infallible;

    /// Parses canonical tags and the chokidar-style aliases
    /// (`add`, `unlink`, `addDir`, `unlinkDir`, `change`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "created" | "add" => Self::Created,
            "removed" | "unlink" => Self::Removed,
            "directory-created" | "addDir" => Self::DirectoryCreated,
            "directory-removed" | "unlinkDir" => Self::DirectoryRemoved,
            "modified" | "change" => Self::Modified,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for IoEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for IoEventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IoEventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(tag.parse().unwrap_or(Self::Other(tag)))
    }
}

/// Filesystem metadata attached to an event.
///
/// All fields are optional so monitors can forward whatever they know.
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_directory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ms: Option<i64>,
}

impl FileStats {
    /// Stats carrying only a size.
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    /// Capture the stats of a real file.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: Some(metadata.len()),
            is_directory: Some(metadata.is_dir()),
            mode: file_mode(metadata),
            modified_ms: metadata.modified().ok().and_then(epoch_millis),
            accessed_ms: metadata.accessed().ok().and_then(epoch_millis),
            created_ms: metadata.created().ok().and_then(epoch_millis),
        }
    }
}

/// Compact unquoted form, e.g. `{size:100,isDirectory:false}`.
///
/// Contains no quote characters so it can be interpolated into a quoted
/// SQL literal.
impl fmt::Display for FileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<String> = Vec::new();
        if let Some(size) = self.size {
            fields.push(format!("size:{size}"));
        }
        if let Some(is_dir) = self.is_directory {
            fields.push(format!("isDirectory:{is_dir}"));
        }
        if let Some(mode) = self.mode {
            fields.push(format!("mode:{mode:o}"));
        }
        if let Some(ms) = self.modified_ms {
            fields.push(format!("modifiedMs:{ms}"));
        }
        if let Some(ms) = self.accessed_ms {
            fields.push(format!("accessedMs:{ms}"));
        }
        if let Some(ms) = self.created_ms {
            fields.push(format!("createdMs:{ms}"));
        }
        write!(f, "{{{}}}", fields.join(","))
    }
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> Option<u32> {
    None
}

fn epoch_millis(time: SystemTime) -> Option<i64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
}

/// A filesystem change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoEvent {
    pub event_type: IoEventType,
    pub full_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_stats: Option<FileStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_extra_info: Option<serde_json::Value>,
}

impl IoEvent {
    pub fn new(event_type: IoEventType, full_path: impl Into<String>) -> Self {
        Self {
            event_type,
            full_path: full_path.into(),
            optional_stats: None,
            optional_extra_info: None,
        }
    }

    #[must_use]
    pub fn with_stats(mut self, stats: FileStats) -> Self {
        self.optional_stats = Some(stats);
        self
    }

    #[must_use]
    pub fn with_extra_info(mut self, extra: serde_json::Value) -> Self {
        self.optional_extra_info = Some(extra);
        self
    }

    /// Directory containing the changed item, empty for a bare name.
    pub fn parent_path(&self) -> String {
        Path::new(&self.full_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File or directory name without any path information.
    pub fn filename(&self) -> String {
        Path::new(&self.full_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
