//! Storage for uploaded payment proofs.
//!
//! The lifecycle only keeps the returned reference; where the bytes live is up
//! to the [`ProofStore`] implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "pdf"];

#[derive(Debug, Error)]
pub enum ProofStoreError {
    #[error("proof file is empty")]
    Empty,

    #[error("unsupported proof file type: {0}")]
    UnsupportedType(String),

    #[error("proof storage failed: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ProofStore: Send + Sync + 'static {
    /// Persist `bytes` for `order_id` and return a reference to them.
    async fn store(&self, order_id: Uuid, file_name: Option<&str>, bytes: &[u8]) -> Result<String, ProofStoreError>;

    /// Remove a stored proof. Missing proofs are not an error.
    async fn discard(&self, reference: &str) -> Result<(), ProofStoreError>;
}

/// Proofs as files under one directory.
#[derive(Debug, Clone)]
pub struct LocalProofStore {
    root: PathBuf,
}

impl LocalProofStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    fn path_of(&self, reference: &str) -> Option<PathBuf> {
        let name = Path::new(reference).file_name()?;
        Some(self.root.join(name))
    }
}

fn extension_of(file_name: Option<&str>) -> Result<String, ProofStoreError> {
    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ProofStoreError::UnsupportedType(if ext.is_empty() { "(none)".into() } else { ext }))
    }
}

#[async_trait]
impl ProofStore for LocalProofStore {
    async fn store(&self, order_id: Uuid, file_name: Option<&str>, bytes: &[u8]) -> Result<String, ProofStoreError> {
        if bytes.is_empty() {
            return Err(ProofStoreError::Empty);
        }
        let ext = extension_of(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let name = format!("{order_id}-{}.{ext}", Uuid::new_v4().simple());
        tokio::fs::write(self.root.join(&name), bytes).await?;
        tracing::debug!(order_id = %order_id, file = %name, size = bytes.len(), "stored payment proof");
        Ok(name)
    }

    async fn discard(&self, reference: &str) -> Result<(), ProofStoreError> {
        let Some(path) = self.path_of(reference) else { return Ok(()) };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
