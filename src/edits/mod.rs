//! Applies parsed edit segments through the file-system collaborator.
//!
//! Effects fire as soon as a completed assistant message parses; there is
//! no confirmation step and no transactionality across one message's
//! segments. One segment failing never blocks or rolls back another.

use crate::protocol::Segment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

/// File-system collaborator. Writes always carry the full replacement
/// content, never a diff.
#[async_trait]
pub trait FileBridge: Send + Sync {
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    async fn delete_file(&self, path: &Path) -> Result<()>;
}

/// Supplies the currently indexed project root used to resolve relative
/// edit paths.
pub trait ProjectIndex: Send + Sync {
    fn project_root(&self) -> PathBuf;
}

/// Direct std::fs implementation used by the desktop client.
pub struct LocalFiles;

#[async_trait]
impl FileBridge for LocalFiles {
    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory for {}", path.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))
    }
}

/// Fixed project root, set when the client indexes a directory.
pub struct StaticProjectRoot(pub PathBuf);

impl ProjectIndex for StaticProjectRoot {
    fn project_root(&self) -> PathBuf {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStatus {
    Applying,
    Done,
    Error(String),
}

/// Per-segment outcome for one assistant message. Transient: kept only for
/// the lifetime of rendering that message, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReport {
    /// Index of the segment within the parsed message.
    pub segment_index: usize,
    pub path: PathBuf,
    pub status: EditStatus,
}

pub struct EditApplier {
    files: std::sync::Arc<dyn FileBridge>,
    index: std::sync::Arc<dyn ProjectIndex>,
}

impl EditApplier {
    pub fn new(
        files: std::sync::Arc<dyn FileBridge>,
        index: std::sync::Arc<dyn ProjectIndex>,
    ) -> Self {
        Self { files, index }
    }

    /// Absolute paths are used verbatim; relative paths resolve against the
    /// indexed project root.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.index.project_root().join(candidate)
        }
    }

    /// Apply every non-prose segment independently, reporting each status
    /// transition through `on_update`. Failures are isolated per segment.
    pub async fn apply(
        &self,
        segments: &[Segment],
        mut on_update: impl FnMut(&EditReport),
    ) -> Vec<EditReport> {
        let mut reports = Vec::new();

        for (segment_index, segment) in segments.iter().enumerate() {
            let (path, effect) = match segment {
                Segment::Prose { .. } => continue,
                Segment::Write { path, content, .. } => {
                    let resolved = self.resolve_path(path);
                    (resolved.clone(), Effect::Write(resolved, content.clone()))
                }
                Segment::Delete { path, .. } => {
                    let resolved = self.resolve_path(path);
                    (resolved.clone(), Effect::Delete(resolved))
                }
            };

            let mut report = EditReport {
                segment_index,
                path,
                status: EditStatus::Applying,
            };
            on_update(&report);

            let outcome = match &effect {
                Effect::Write(target, content) => self.files.write_file(target, content).await,
                Effect::Delete(target) => self.files.delete_file(target).await,
            };

            report.status = match outcome {
                Ok(()) => EditStatus::Done,
                Err(error) => EditStatus::Error(format!("{error:#}")),
            };
            on_update(&report);
            reports.push(report);
        }

        reports
    }
}

enum Effect {
    Write(PathBuf, String),
    Delete(PathBuf),
}
