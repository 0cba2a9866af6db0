use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::{ImagePayload, ImageStore};

/// Content-addressed image store on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageStore for LocalImageStore {
    fn store(&self, image: &ImagePayload, metadata: &Map<String, Value>) -> Result<String> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let digest = image.sha256_hex();
        let stem = &digest[..16];
        let image_path = self.root.join(format!("{stem}.{}", image.extension()));
        fs::write(&image_path, &image.bytes)
            .with_context(|| format!("failed to write {}", image_path.display()))?;

        let mut sidecar = metadata.clone();
        sidecar.insert("sha256".to_string(), Value::String(digest.clone()));
        sidecar.insert(
            "mime_type".to_string(),
            Value::String(image.mime_type.clone()),
        );
        let sidecar_path = self.root.join(format!("{stem}.json"));
        fs::write(&sidecar_path, serde_json::to_string_pretty(&sidecar)?)
            .with_context(|| format!("failed to write {}", sidecar_path.display()))?;

        let absolute = fs::canonicalize(&image_path).unwrap_or(image_path);
        Ok(format!("file://{}", absolute.to_string_lossy()))
    }
}
