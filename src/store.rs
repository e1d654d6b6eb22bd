use crate::error::StoreError;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fs::{self, create_dir_all};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

const UPLOADS_FILE: &str = "uploads.json";
const FEEDBACK_FILE: &str = "feedback.json";
const ANONYMOUS: &str = "Anonymous";

/// A CSV stored for a user
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UploadedFile {
    pub id: Uuid,
    pub username: String,
    /// Sanitized name under the uploads directory
    pub filename: String,
    pub filepath: PathBuf,
    pub submitted_at: DateTime<Utc>,
}

/// A visitor's feedback submission
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Feedback {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub feedback_text: String,
    pub submitted_at: DateTime<Utc>,
}

/// JSON-file record store for uploads and feedback
///
/// Records are kept in memory and every mutation rewrites the backing
/// file while the write lock is held.
#[derive(Debug)]
pub struct Database {
    dir: PathBuf,
    uploads: RwLock<Vec<UploadedFile>>,
    feedback: RwLock<Vec<Feedback>>,
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)?;
    Ok(())
}

/// Empty or whitespace-only optional form fields count as absent
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Database {
    /// Open the store in `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        create_dir_all(&dir)?;

        let uploads: Vec<UploadedFile> = read_records(&dir.join(UPLOADS_FILE))?;
        let feedback: Vec<Feedback> = read_records(&dir.join(FEEDBACK_FILE))?;
        debug!(
            "opened record store {} ({} uploads, {} feedback)",
            dir.display(),
            uploads.len(),
            feedback.len()
        );

        Ok(Self {
            dir,
            uploads: RwLock::new(uploads),
            feedback: RwLock::new(feedback),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record a stored upload for `username`
    pub fn record_upload(
        &self,
        username: &str,
        filename: &str,
        filepath: &Path,
    ) -> Result<UploadedFile, StoreError> {
        let record = UploadedFile {
            id: Uuid::new_v4(),
            username: username.to_string(),
            filename: filename.to_string(),
            filepath: filepath.to_path_buf(),
            submitted_at: Utc::now(),
        };

        let mut uploads = self.uploads.write().unwrap_or_else(|e| e.into_inner());
        uploads.push(record.clone());
        if let Err(e) = write_records(&self.dir.join(UPLOADS_FILE), uploads.as_slice()) {
            uploads.pop();
            return Err(e);
        }

        info!("recorded upload {} for {}", filename, username);
        Ok(record)
    }

    /// Most recently recorded upload of `username`
    pub fn latest_upload(&self, username: &str) -> Option<UploadedFile> {
        let uploads = self.uploads.read().unwrap_or_else(|e| e.into_inner());
        uploads
            .iter()
            .rev()
            .find(|u| u.username == username)
            .cloned()
    }

    /// All uploads of `username`, newest first
    pub fn uploads_for(&self, username: &str) -> Vec<UploadedFile> {
        let uploads = self.uploads.read().unwrap_or_else(|e| e.into_inner());
        uploads
            .iter()
            .rev()
            .filter(|u| u.username == username)
            .cloned()
            .collect()
    }

    /// Store a feedback submission
    ///
    /// A missing name is recorded as "Anonymous"; the email is optional.
    pub fn add_feedback(
        &self,
        text: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Feedback, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::EmptyFeedback);
        }

        let entry = Feedback {
            id: Uuid::new_v4(),
            name: non_blank(name).unwrap_or_else(|| ANONYMOUS.to_string()),
            email: non_blank(email),
            feedback_text: text.to_string(),
            submitted_at: Utc::now(),
        };

        let mut feedback = self.feedback.write().unwrap_or_else(|e| e.into_inner());
        feedback.push(entry.clone());
        if let Err(e) = write_records(&self.dir.join(FEEDBACK_FILE), feedback.as_slice()) {
            feedback.pop();
            return Err(e);
        }

        info!("recorded feedback from {}", entry.name);
        Ok(entry)
    }

    pub fn feedback(&self) -> Vec<Feedback> {
        self.feedback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
