use anyhow::{Context, Result};
use masto_ref::PostId;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

pub fn default_path() -> Option<PathBuf> {
    simple_home_dir::home_dir().map(|home| home.join(".masto-archive").join("last-id"))
}

/// Reads the bookmarked post id. A missing file means no bookmark yet.
pub async fn read(path: &Path) -> Result<Option<PostId>> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let id = contents.trim();
            Ok((!id.is_empty()).then(|| PostId::new(id)))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read bookmark {}", path.display()))
        }
    }
}

pub async fn write(path: &Path, id: &PostId) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, id.as_str())
        .await
        .with_context(|| format!("Failed to write bookmark {}", path.display()))
}
