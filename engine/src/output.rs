use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::image_model::{Image, Model};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Couldn't create output directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Couldn't write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Couldn't serialize metadata for {module_id}: {source}")]
    Serialize {
        module_id: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AssetMetadata {
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub model: Model,
}

#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    pub module_id: String,
    pub image: Image,
    pub metadata: AssetMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// The `<moduleId>.json` file written next to each image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub module_id: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenAsset {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Writes results into one output directory. Every file goes to a temp file first and is then
/// renamed into place, so readers never see a half-written image.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    outdir: PathBuf,
}

impl OutputWriter {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
        }
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn write_asset(&self, asset: &GeneratedAsset) -> Result<WrittenAsset, OutputError> {
        self.ensure_dir()?;

        let extension = asset.image.extension();
        let image_name = format!("{}.{extension}", asset.module_id);
        let image_path = self.outdir.join(&image_name);
        self.write_atomic(&image_path, &asset.image.data)?;
        self.remove_stale_images(&asset.module_id, Some(extension));

        let record = MetadataRecord {
            module_id: asset.module_id.clone(),
            prompt: asset.metadata.prompt.clone(),
            created_at: asset.metadata.created_at,
            status: Status::Success,
            model: asset.metadata.model.to_string(),
            image: Some(image_name),
            error: None,
        };
        let metadata_path = self.write_record(&record)?;

        Ok(WrittenAsset {
            image_path,
            metadata_path,
        })
    }

    pub fn write_failure(
        &self,
        module_id: &str,
        prompt: &str,
        model: Model,
        created_at: DateTime<Utc>,
        error: &str,
    ) -> Result<PathBuf, OutputError> {
        self.ensure_dir()?;
        self.remove_stale_images(module_id, None);

        self.write_record(&MetadataRecord {
            module_id: module_id.into(),
            prompt: prompt.into(),
            created_at,
            status: Status::Failed,
            model: model.to_string(),
            image: None,
            error: Some(error.into()),
        })
    }

    fn write_record(&self, record: &MetadataRecord) -> Result<PathBuf, OutputError> {
        let json = serde_json::to_vec_pretty(record).map_err(|source| OutputError::Serialize {
            module_id: record.module_id.clone(),
            source,
        })?;
        let path = self.outdir.join(format!("{}.json", record.module_id));
        self.write_atomic(&path, &json)?;
        Ok(path)
    }

    fn ensure_dir(&self) -> Result<(), OutputError> {
        fs::create_dir_all(&self.outdir).map_err(|source| OutputError::CreateDir {
            path: self.outdir.clone(),
            source,
        })
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
        let write_err = |source| OutputError::Write {
            path: path.into(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.outdir).map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// A previous run may have left an image for this module under another extension.
    fn remove_stale_images(&self, module_id: &str, keep: Option<&str>) {
        for extension in Image::EXTENSIONS {
            if Some(extension) == keep {
                continue;
            }
            let path = self.outdir.join(format!("{module_id}.{extension}"));
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Couldn't remove stale {}: {e}", path.display());
                }
            }
        }
    }
}
