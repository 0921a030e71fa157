//! Directory descriptor (`tagsync.json`) that declares a directory's role.
//!
//! A directory whose descriptor has `"type": "dest"` is a backup destination
//! and must never be scanned as source data.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirRole {
    /// Backup destination
    Dest,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirDescriptor {
    #[serde(rename = "type")]
    pub role: DirRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl DirDescriptor {
    pub fn destination() -> Self {
        Self {
            role: DirRole::Dest,
            created: Some(Utc::now()),
        }
    }

    pub fn is_destination(&self) -> bool {
        self.role == DirRole::Dest
    }
}

/// Read the descriptor in `dir`, if any.
pub fn read_descriptor(dir: &Path, file_name: &str) -> Result<Option<DirDescriptor>> {
    let path = dir.join(file_name);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write a destination descriptor into `dir`, replacing any existing one.
pub fn mark_destination(dir: &Path, file_name: &str) -> Result<DirDescriptor> {
    let descriptor = DirDescriptor::destination();
    let payload = serde_json::to_string_pretty(&descriptor)?;
    fs::write(dir.join(file_name), format!("{payload}\n"))?;
    Ok(descriptor)
}
