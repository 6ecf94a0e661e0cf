//! Local gallery of enrolled face embeddings, stored as a JSON array.

use crate::types::{Embedding, EnrolledFace};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write gallery {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed gallery {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Enrolled faces backed by a file.
#[derive(Debug)]
pub struct Gallery {
    path: PathBuf,
    faces: Vec<EnrolledFace>,
}

impl Gallery {
    /// Load the gallery at `path`. A missing file is an empty gallery.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, GalleryError> {
        let path = path.into();
        let faces = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| GalleryError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(GalleryError::Read { path, source }),
        };
        tracing::debug!(path = %path.display(), faces = faces.len(), "gallery loaded");
        Ok(Self { path, faces })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn faces(&self) -> &[EnrolledFace] {
        &self.faces
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Add an identity and persist the gallery.
    pub fn enroll(&mut self, label: &str, embedding: Embedding) -> Result<&EnrolledFace, GalleryError> {
        self.faces.push(EnrolledFace {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            embedding,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.save() {
            self.faces.pop();
            return Err(e);
        }
        let face = &self.faces[self.faces.len() - 1];
        tracing::info!(id = %face.id, label, "face added to gallery");
        Ok(face)
    }

    fn save(&self) -> Result<(), GalleryError> {
        let write_err = |source| GalleryError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        let json = serde_json::to_vec_pretty(&self.faces).map_err(|source| GalleryError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Gallery::load(dir.path().join("faces.json")).unwrap();
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_enroll_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("faces.json");

        let mut gallery = Gallery::load(&path).unwrap();
        let id = gallery
            .enroll("alice", Embedding { values: vec![1.0, 0.0], model_version: None })
            .unwrap()
            .id
            .clone();

        let reloaded = Gallery::load(&path).unwrap();
        assert_eq!(reloaded.faces().len(), 1);
        assert_eq!(reloaded.faces()[0].id, id);
        assert_eq!(reloaded.faces()[0].label, "alice");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(Gallery::load(&path), Err(GalleryError::Parse { .. })));
    }
}
