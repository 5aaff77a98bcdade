// src/utils/uploads.rs

use std::{
    io,
    path::{Path, PathBuf},
};

use uuid::Uuid;

const PERMITTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Directory holding uploaded image files.
///
/// The database row is authoritative; files are written before the row is
/// inserted and removed on a best-effort basis after it is deleted.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under `filename` and returns the stored path.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Removes a stored file. Failures are logged, never returned.
    pub async fn remove(&self, file_path: &str) {
        match tokio::fs::remove_file(file_path).await {
            Ok(()) => tracing::debug!(file_path, "image file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(error = %e, file_path, "failed to delete image file from filesystem"),
        }
    }
}

/// Lower-cased extension of an uploaded filename, if it is a permitted image type.
pub fn image_extension(original_filename: &str) -> Option<String> {
    let ext = Path::new(original_filename).extension()?.to_str()?.to_ascii_lowercase();
    PERMITTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Unique stored filename for an image of `post_id`.
pub fn generate_filename(post_id: i64, ext: &str) -> String {
    format!("{}_{}.{}", post_id, Uuid::new_v4().simple(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_normalised_and_checked() {
        assert_eq!(image_extension("Holiday.JPG").as_deref(), Some("jpg"));
        assert_eq!(image_extension("a.b.webp").as_deref(), Some("webp"));
        assert_eq!(image_extension("notes.txt"), None);
        assert_eq!(image_extension("no_extension"), None);
    }

    #[test]
    fn generated_filenames_are_unique() {
        let a = generate_filename(4, "png");
        let b = generate_filename(4, "png");
        assert_ne!(a, b);
        assert!(a.starts_with("4_") && a.ends_with(".png"));
    }

    #[tokio::test]
    async fn save_then_remove() {
        let dir = UploadDir::new(std::env::temp_dir().join(format!("blog-api-{}", Uuid::new_v4())));
        let path = dir.save("1_test.png", b"fake png").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"fake png");

        dir.remove(&path).await;
        assert!(tokio::fs::metadata(&path).await.is_err());

        // A second removal of a missing file is silently ignored.
        dir.remove(&path).await;
        let _ = tokio::fs::remove_dir(dir.root()).await;
    }
}
