use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Durable storage for the bearer credential.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<String>>;
    fn store(&mut self, credential: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default)]
    access_token: Option<String>,
}

/// Keeps the credential in a small JSON file so it survives restarts.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let stored: StoredCredential = serde_json::from_str(&contents)?;
        Ok(stored.access_token.filter(|t| !t.is_empty()))
    }

    fn store(&mut self, credential: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredCredential {
            access_token: Some(credential.to_string()),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credential: Option<String>,
}

impl MemoryCredentialStore {
    pub fn new(credential: Option<String>) -> Self {
        Self { credential }
    }

    #[inline]
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.credential.clone())
    }

    fn store(&mut self, credential: &str) -> Result<()> {
        self.credential = Some(credential.to_string());
        Ok(())
    }
}
