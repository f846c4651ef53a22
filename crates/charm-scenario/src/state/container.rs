// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload containers and their simulated filesystems.
//!
//! Each container exposes only the paths under its mounts. Paths are absolute
//! and normalized before lookup; the mount location itself always exists as
//! a directory. Listings come out of `BTreeMap`/`BTreeSet` iteration and are
//! therefore sorted.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::pebble::{CheckInfo, LabeledLayer, Layer, Plan, ServiceStatus};

/// File bytes, base64 encoded in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileData(pub Vec<u8>);

impl From<&str> for FileData {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for FileData {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for FileData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for FileData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Storage mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Absolute mount point.
    pub location: String,
    /// Files by absolute path.
    #[serde(default)]
    pub files: BTreeMap<String, FileData>,
    /// Directories below the mount point, by absolute path.
    #[serde(default)]
    pub dirs: BTreeSet<String>,
}

impl Mount {
    /// An empty mount at `location`.
    pub fn new(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            location: normalize(&location).unwrap_or(location),
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
        }
    }

    /// Seed a file, creating its parent directories.
    pub fn with_file(mut self, path: &str, data: impl Into<FileData>) -> Self {
        if let Some(path) = normalize(path)
            && self.create_parents(&path).is_ok()
        {
            self.files.insert(path, data.into());
        }
        self
    }

    fn contains(&self, path: &str) -> bool {
        path == self.location
            || self.location == "/"
            || path
                .strip_prefix(self.location.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    fn is_dir(&self, path: &str) -> bool {
        path == self.location || self.dirs.contains(path)
    }

    /// Every ancestor inside the mount must be a directory or missing;
    /// nothing is created when one of them is a file.
    fn create_parents(&mut self, path: &str) -> Result<(), FsError> {
        let mut missing = Vec::new();
        let mut current = parent(path);
        while let Some(dir) = current {
            if !self.contains(dir) || self.is_dir(dir) {
                break;
            }
            if self.files.contains_key(dir) {
                return Err(FsError::invalid(dir, "not a directory"));
            }
            missing.push(dir.to_string());
            current = parent(dir);
        }
        self.dirs.extend(missing);
        Ok(())
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, FileKind, Option<usize>)> + 'a {
        let dirs = self
            .dirs
            .iter()
            .filter(move |d| parent(d) == Some(dir))
            .map(|d| (d.as_str(), FileKind::Directory, None));
        let files = self
            .files
            .iter()
            .filter(move |(f, _)| parent(f) == Some(dir))
            .map(|(f, data)| (f.as_str(), FileKind::File, Some(data.0.len())));
        dirs.chain(files)
    }
}

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// One entry from `list_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path.
    pub path: String,
    /// Final path component.
    pub name: String,
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes, for files.
    pub size: Option<usize>,
}

impl FileInfo {
    fn new(path: &str, kind: FileKind, size: Option<usize>) -> Self {
        Self {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            kind,
            size,
        }
    }
}

/// Filesystem failures, before the backend attaches the container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The path is unmounted or does not exist.
    NotFound(String),
    /// The operation is invalid for the path.
    Invalid {
        /// Path the operation was applied to.
        path: String,
        /// What went wrong.
        message: String,
    },
}

impl FsError {
    fn invalid(path: &str, message: &str) -> Self {
        Self::Invalid {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result of a mocked command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecOutput {
    /// Exit status.
    #[serde(default)]
    pub return_code: i32,
    /// Captured stdout.
    #[serde(default)]
    pub stdout: String,
    /// Captured stderr.
    #[serde(default)]
    pub stderr: String,
}

impl ExecOutput {
    /// A successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            return_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run.
    pub fn failed(return_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            return_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Canned output for any command starting with `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecMock {
    /// Command prefix.
    pub command: Vec<String>,
    /// Output returned.
    pub output: ExecOutput,
}

/// A workload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Whether Pebble answers.
    #[serde(default)]
    pub can_connect: bool,
    /// Layers in the order they were added.
    #[serde(default)]
    pub layers: Vec<LabeledLayer>,
    /// Current service states; services absent here are inactive.
    #[serde(default)]
    pub service_statuses: BTreeMap<String, ServiceStatus>,
    /// Mounts by name.
    #[serde(default)]
    pub mounts: BTreeMap<String, Mount>,
    /// Canned command output.
    #[serde(default)]
    pub exec_mocks: Vec<ExecMock>,
    /// Check states by name.
    #[serde(default)]
    pub check_infos: BTreeMap<String, CheckInfo>,
}

impl Container {
    /// A container Pebble cannot be reached in.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            can_connect: false,
            layers: Vec::new(),
            service_statuses: BTreeMap::new(),
            mounts: BTreeMap::new(),
            exec_mocks: Vec::new(),
            check_infos: BTreeMap::new(),
        }
    }

    /// Set connectivity.
    pub fn with_can_connect(mut self, can_connect: bool) -> Self {
        self.can_connect = can_connect;
        self
    }

    /// Append a layer.
    pub fn with_layer(mut self, label: impl Into<String>, layer: Layer) -> Self {
        self.layers.push(LabeledLayer {
            label: label.into(),
            layer,
        });
        self
    }

    /// Set a service's current state.
    pub fn with_service_status(mut self, name: impl Into<String>, status: ServiceStatus) -> Self {
        self.service_statuses.insert(name.into(), status);
        self
    }

    /// Add a mount.
    pub fn with_mount(mut self, name: impl Into<String>, mount: Mount) -> Self {
        self.mounts.insert(name.into(), mount);
        self
    }

    /// Register canned output for a command prefix.
    pub fn with_exec_mock<S: Into<String>>(
        mut self,
        command: impl IntoIterator<Item = S>,
        output: ExecOutput,
    ) -> Self {
        self.exec_mocks.push(ExecMock {
            command: command.into_iter().map(Into::into).collect(),
            output,
        });
        self
    }

    /// Set a check's state.
    pub fn with_check_info(mut self, info: CheckInfo) -> Self {
        self.check_infos.insert(info.name.clone(), info);
        self
    }

    /// The combined plan.
    pub fn plan(&self) -> Result<Plan, String> {
        Plan::from_layers(&self.layers)
    }

    /// Current state of a service.
    pub fn service_status(&self, name: &str) -> ServiceStatus {
        self.service_statuses.get(name).copied().unwrap_or_default()
    }

    /// Most specific exec mock for `command`.
    pub fn find_exec_mock(&self, command: &[String]) -> Option<&ExecMock> {
        self.exec_mocks
            .iter()
            .filter(|mock| command.starts_with(&mock.command))
            .max_by_key(|mock| mock.command.len())
    }

    fn mount_for(&self, path: &str) -> Option<&Mount> {
        self.mounts
            .values()
            .filter(|m| m.contains(path))
            .max_by_key(|m| m.location.len())
    }

    fn mount_for_mut(&mut self, path: &str) -> Option<&mut Mount> {
        self.mounts
            .values_mut()
            .filter(|m| m.contains(path))
            .max_by_key(|m| m.location.len())
    }

    /// Write a file.
    pub fn push(&mut self, path: &str, data: &[u8], make_dirs: bool) -> Result<(), FsError> {
        let path = normalize(path).ok_or_else(|| FsError::invalid(path, "path must be absolute"))?;
        let mount = self
            .mount_for_mut(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        if mount.is_dir(&path) {
            return Err(FsError::invalid(&path, "is a directory"));
        }
        let parent_dir = parent(&path).unwrap_or("/");
        if !mount.is_dir(parent_dir) {
            if mount.files.contains_key(parent_dir) {
                return Err(FsError::invalid(parent_dir, "not a directory"));
            }
            if !make_dirs {
                return Err(FsError::NotFound(parent_dir.to_string()));
            }
            mount.create_parents(&path)?;
        }
        mount.files.insert(path, FileData(data.to_vec()));
        Ok(())
    }

    /// Read a file.
    pub fn pull(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = normalize(path).ok_or_else(|| FsError::invalid(path, "path must be absolute"))?;
        let mount = self
            .mount_for(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        if let Some(data) = mount.files.get(&path) {
            return Ok(data.0.clone());
        }
        if mount.is_dir(&path) {
            return Err(FsError::invalid(&path, "is a directory"));
        }
        Err(FsError::NotFound(path))
    }

    /// List a directory, or describe a single file.
    pub fn list_files(&self, path: &str) -> Result<Vec<FileInfo>, FsError> {
        let path = normalize(path).ok_or_else(|| FsError::invalid(path, "path must be absolute"))?;
        let mount = self
            .mount_for(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        if let Some(data) = mount.files.get(&path) {
            return Ok(vec![FileInfo::new(&path, FileKind::File, Some(data.0.len()))]);
        }
        if !mount.is_dir(&path) {
            return Err(FsError::NotFound(path));
        }
        Ok(mount
            .children(&path)
            .map(|(p, kind, size)| FileInfo::new(p, kind, size))
            .collect())
    }

    /// Create a directory.
    pub fn make_dir(&mut self, path: &str, make_parents: bool) -> Result<(), FsError> {
        let path = normalize(path).ok_or_else(|| FsError::invalid(path, "path must be absolute"))?;
        let mount = self
            .mount_for_mut(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        if mount.files.contains_key(&path) {
            return Err(FsError::invalid(&path, "file exists"));
        }
        if mount.is_dir(&path) {
            return if make_parents {
                Ok(())
            } else {
                Err(FsError::invalid(&path, "directory exists"))
            };
        }
        let parent_dir = parent(&path).unwrap_or("/");
        if !mount.is_dir(parent_dir) {
            if !make_parents {
                return Err(FsError::NotFound(parent_dir.to_string()));
            }
            mount.create_parents(&path)?;
        }
        mount.dirs.insert(path);
        Ok(())
    }

    /// Remove a file or directory.
    pub fn remove_path(&mut self, path: &str, recursive: bool) -> Result<(), FsError> {
        let path = normalize(path).ok_or_else(|| FsError::invalid(path, "path must be absolute"))?;
        let mount = self
            .mount_for_mut(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        if mount.files.remove(&path).is_some() {
            return Ok(());
        }
        if path == mount.location {
            return Err(FsError::invalid(&path, "cannot remove a mount point"));
        }
        if !mount.dirs.contains(&path) {
            return Err(FsError::NotFound(path));
        }
        let prefix = format!("{path}/");
        let has_children = mount.dirs.iter().any(|d| d.starts_with(&prefix))
            || mount.files.keys().any(|f| f.starts_with(&prefix));
        if has_children && !recursive {
            return Err(FsError::invalid(&path, "directory not empty"));
        }
        mount.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
        mount.files.retain(|f, _| !f.starts_with(&prefix));
        Ok(())
    }
}

/// Normalize an absolute path: collapse `//` and `.`, drop trailing `/`.
/// Returns `None` for relative paths or paths escaping the root.
pub fn normalize(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            p => parts.push(p),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}
