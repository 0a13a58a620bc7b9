//! Artifact sinks.
//!
//! Both sinks redact text before storing it; nothing written through an
//! [`ArtifactSink`] can carry a secret the redaction rules recognise.

use async_trait::async_trait;
use landit_core::artifact::{ArtifactEntry, ArtifactSink};
use landit_core::{Error, JobId, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Redactor;

/// Validate a relative artifact path.
fn check_relative(path: &str) -> Result<&Path> {
    let rel = Path::new(path);
    if path.is_empty() {
        return Err(Error::InvalidInput("artifact path is empty".to_string()));
    }
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::InvalidInput(format!(
            "artifact path must be relative without '..': {path}"
        )));
    }
    Ok(rel)
}

fn with_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stores artifacts under `<root>/<job-id>/`.
pub struct FsArtifactSink {
    root: PathBuf,
    redactor: Arc<Redactor>,
}

impl FsArtifactSink {
    pub fn new(root: impl Into<PathBuf>, redactor: Arc<Redactor>) -> Self {
        Self {
            root: root.into(),
            redactor,
        }
    }

    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    async fn prepare(&self, job_id: JobId, path: &str) -> Result<PathBuf> {
        let full = self.job_dir(job_id).join(check_relative(path)?);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(full)
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn append(&self, job_id: JobId, path: &str, text: &str) -> Result<()> {
        let full = self.prepare(job_id, path).await?;
        let text = with_newline(&self.redactor.redact(text));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn write(&self, job_id: JobId, path: &str, text: &str) -> Result<()> {
        let full = self.prepare(job_id, path).await?;
        let text = self.redactor.redact(text);
        // Write then rename so readers never see a half-written report.
        let mut tmp_name = full.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".landit-tmp");
        let tmp = full.with_file_name(tmp_name);
        tokio::fs::write(&tmp, text.as_bytes()).await?;
        tokio::fs::rename(&tmp, &full).await?;
        Ok(())
    }

    async fn list(&self, job_id: JobId) -> Result<Vec<ArtifactEntry>> {
        let base = self.job_dir(job_id);
        if !tokio::fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut pending = vec![base.clone()];
        while let Some(dir) = pending.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let bytes = tokio::fs::read(&path).await?;
                    let rel = path
                        .strip_prefix(&base)
                        .map_err(|e| Error::Internal(e.to_string()))?;
                    entries.push(ArtifactEntry {
                        path: rel.to_string_lossy().replace('\\', "/"),
                        size: bytes.len() as u64,
                        checksum: checksum(&bytes),
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

/// Keeps artifacts in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryArtifactSink {
    redactor: Redactor,
    files: Mutex<HashMap<JobId, BTreeMap<String, String>>>,
}

impl MemoryArtifactSink {
    /// Contents of one artifact, if present.
    pub async fn read(&self, job_id: JobId, path: &str) -> Option<String> {
        let files = self.files.lock().await;
        files.get(&job_id).and_then(|job| job.get(path)).cloned()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn append(&self, job_id: JobId, path: &str, text: &str) -> Result<()> {
        check_relative(path)?;
        let text = with_newline(&self.redactor.redact(text));
        let mut files = self.files.lock().await;
        files
            .entry(job_id)
            .or_default()
            .entry(path.to_string())
            .or_default()
            .push_str(&text);
        Ok(())
    }

    async fn write(&self, job_id: JobId, path: &str, text: &str) -> Result<()> {
        check_relative(path)?;
        let text = self.redactor.redact(text);
        let mut files = self.files.lock().await;
        files
            .entry(job_id)
            .or_default()
            .insert(path.to_string(), text);
        Ok(())
    }

    async fn list(&self, job_id: JobId) -> Result<Vec<ArtifactEntry>> {
        let files = self.files.lock().await;
        Ok(files
            .get(&job_id)
            .map(|job| {
                job.iter()
                    .map(|(path, text)| ArtifactEntry {
                        path: path.clone(),
                        size: text.len() as u64,
                        checksum: checksum(text.as_bytes()),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
