//! Product image uploads kept on local disk and served under [`PUBLIC_PREFIX`].

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

pub const PUBLIC_PREFIX: &str = "/uploads";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported image type. Use jpg, png, gif or webp.")]
    UnsupportedType,
    #[error("Image is larger than 5 MB.")]
    TooLarge,
    #[error("Image file is empty.")]
    Empty,
    #[error("not a stored image: {0}")]
    ForeignUrl(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Stores the bytes under a fresh name and returns the public URL.
    pub async fn upload_image(&self, file_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let extension = image_extension(file_name)?;
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(StorageError::TooLarge);
        }

        self.ensure_root().await?;
        let stored_name = format!("{}.{extension}", Uuid::new_v4());
        tokio::fs::write(self.root.join(&stored_name), bytes).await?;
        log::info!("Stored image {stored_name} ({} bytes)", bytes.len());
        Ok(format!("{PUBLIC_PREFIX}/{stored_name}"))
    }

    /// Removes a previously uploaded image. An already missing file is fine.
    pub async fn delete_image(&self, url: &str) -> Result<(), StorageError> {
        let name = stored_name(url).ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => {
                log::info!("Removed image {name}");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Image {name} was already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub fn image_extension(file_name: &str) -> Result<&'static str, StorageError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or(StorageError::UnsupportedType)?;
    ALLOWED_EXTENSIONS
        .into_iter()
        .find(|allowed| *allowed == extension)
        .ok_or(StorageError::UnsupportedType)
}

fn stored_name(url: &str) -> Option<&str> {
    let name = url.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
    let valid = !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.starts_with('.')
        && image_extension(name).is_ok();
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_store;

    #[test]
    fn only_image_extensions_are_accepted() {
        assert_eq!(image_extension("photo.JPG").unwrap(), "jpg");
        assert_eq!(image_extension("a.b.webp").unwrap(), "webp");
        assert!(matches!(image_extension("notes.txt"), Err(StorageError::UnsupportedType)));
        assert!(matches!(image_extension("noext"), Err(StorageError::UnsupportedType)));
    }

    #[tokio::test]
    async fn upload_then_delete_round_trips_through_disk() {
        let store = temp_store();
        let url = store.upload_image("comb.png", b"not really a png").await.unwrap();
        assert!(url.starts_with("/uploads/") && url.ends_with(".png"));

        let path = store.root().join(url.trim_start_matches("/uploads/"));
        assert!(path.exists());

        store.delete_image(&url).await.unwrap();
        assert!(!path.exists());
        store.delete_image(&url).await.unwrap();
    }

    #[tokio::test]
    async fn oversized_and_empty_files_are_rejected() {
        let store = temp_store();
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(matches!(store.upload_image("big.jpg", &big).await, Err(StorageError::TooLarge)));
        assert!(matches!(store.upload_image("empty.jpg", &[]).await, Err(StorageError::Empty)));
    }

    #[tokio::test]
    async fn urls_outside_the_upload_prefix_are_refused() {
        let store = temp_store();
        for url in ["/static/app.css", "/uploads/../secret.png", "https://cdn.example/x.png"] {
            assert!(matches!(store.delete_image(url).await, Err(StorageError::ForeignUrl(_))));
        }
    }
}
