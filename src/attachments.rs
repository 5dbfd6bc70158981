//! Upload side-channel: writes attachment files under `<data_dir>/uploads/<kind>/`
//! and removes them again when their record goes away.

use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::constants::UPLOAD_ROOT;
use crate::error::{ResourceError, ResourceResult};
use crate::resource::{MediaCategory, ResourceSchema};
use crate::store::StoreError;

/// Attempts at finding an unused filename before giving up
const MAX_NAME_ATTEMPTS: usize = 5;

/// Longest extension carried over from the uploaded filename
const MAX_EXTENSION_LEN: usize = 10;

pub struct AttachmentStore {
    data_dir: PathBuf,
}

impl AttachmentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Directory served as `/uploads`
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOAD_ROOT)
    }

    /// Persist one uploaded file for `schema` and return its relative path.
    ///
    /// Nothing is written when the content type is outside the resource's category.
    pub async fn store(
        &self,
        schema: &ResourceSchema,
        bytes: &[u8],
        original_name: &str,
        mime_type_hint: &str,
    ) -> ResourceResult<String> {
        let Some(attachment) = &schema.attachment else {
            return Err(ResourceError::Validation(format!(
                "{} does not accept uploads",
                schema.kind
            )));
        };
        if !attachment.media.accepts(mime_type_hint) {
            return Err(ResourceError::UnsupportedMediaType {
                kind: schema.kind.clone(),
                mime_type: mime_type_hint.to_string(),
                expected: match attachment.media {
                    MediaCategory::Image => "image",
                    MediaCategory::Video => "video",
                },
            });
        }
        if bytes.is_empty() {
            return Err(ResourceError::Validation("Uploaded file is empty".to_string()));
        }

        let dir = self.upload_dir().join(&schema.kind);
        fs::create_dir_all(&dir).await.map_err(StoreError::from)?;

        let extension = sanitized_extension(original_name);
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = generate_filename(&extension);
            let path = dir.join(&filename);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("Upload name collision on {}, retrying", path.display());
                    continue;
                }
                Err(e) => return Err(StoreError::from(e).into()),
            };

            if let Err(e) = write_fully(&mut file, bytes).await {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!("Failed to remove partial upload {}: {}", path.display(), cleanup);
                }
                return Err(StoreError::from(e).into());
            }

            let relative = format!("{}/{}/{}", UPLOAD_ROOT, schema.kind, filename);
            info!("Stored {} byte upload for {} at {}", bytes.len(), schema.kind, relative);
            return Ok(relative);
        }

        Err(StoreError::Io(std::io::Error::other(format!(
            "could not find a free upload name in {}",
            dir.display()
        )))
        .into())
    }

    /// Best-effort removal of a system-managed file.
    ///
    /// Returns whether a file was removed. Failures are logged, never returned.
    pub async fn delete(&self, relative_path: &str) -> bool {
        if !is_managed(relative_path) {
            debug!("Not removing unmanaged attachment path '{}'", relative_path);
            return false;
        }
        let path = self.data_dir.join(relative_path.trim_start_matches('/'));
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed attachment {}", relative_path);
                true
            }
            Err(e) => {
                warn!("Failed to remove attachment {}: {}", path.display(), e);
                false
            }
        }
    }
}

async fn write_fully(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// `{millis}-{random}{ext}`
fn generate_filename(extension: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}{}", Utc::now().timestamp_millis(), suffix, extension)
}

/// Lowercased `.ext` of the uploaded name, or empty when it has none usable.
fn sanitized_extension(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return String::new();
    }
    format!(".{}", ext.to_ascii_lowercase())
}

/// Whether `path` points inside the managed upload root (and cannot escape it).
pub fn is_managed(path: &str) -> bool {
    if path.contains('\\') {
        return false;
    }
    let path = Path::new(path.strip_prefix('/').unwrap_or(path));
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(root)) if root == UPLOAD_ROOT => {}
        _ => return false,
    }
    let mut rest = 0;
    for component in components {
        match component {
            Component::Normal(_) => rest += 1,
            _ => return false,
        }
    }
    rest >= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::default_catalogue;

    fn schema(kind: &str) -> ResourceSchema {
        default_catalogue()
            .into_iter()
            .find(|s| s.kind == kind)
            .unwrap()
    }

    #[test]
    fn test_is_managed() {
        assert!(is_managed("uploads/courses/1-2.png"));
        assert!(is_managed("/uploads/courses/1-2.png"));
        assert!(!is_managed("uploads"));
        assert!(!is_managed("uploads/../secret.txt"));
        assert!(!is_managed("uploads/courses/../../etc/passwd"));
        assert!(!is_managed("https://cdn.example.org/a.png"));
        assert!(!is_managed("static/a.png"));
        assert!(!is_managed("uploads\\courses\\a.png"));
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension("Photo.JPG"), ".jpg");
        assert_eq!(sanitized_extension("clip.tar.gz"), ".gz");
        assert_eq!(sanitized_extension("noext"), "");
        assert_eq!(sanitized_extension("weird.p$p"), "");
    }

    #[test]
    fn test_generated_filename_shape() {
        let name = generate_filename(".png");
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert!(rest.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_store_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());

        let relative = store
            .store(&schema("gallery"), b"png-bytes", "sunset.PNG", "image/png")
            .await
            .unwrap();
        assert!(relative.starts_with("uploads/gallery/"));
        assert!(relative.ends_with(".png"));
        assert!(!Path::new(&relative).is_absolute());
        assert_eq!(std::fs::read(dir.path().join(&relative)).unwrap(), b"png-bytes");

        assert!(store.delete(&relative).await);
        assert!(!dir.path().join(&relative).exists());
        // second removal is swallowed
        assert!(!store.delete(&relative).await);
    }

    #[tokio::test]
    async fn test_store_rejects_wrong_category_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());

        let err = store
            .store(&schema("courses"), b"hello", "notes.txt", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnsupportedMediaType { .. }));
        assert!(!store.upload_dir().exists());

        let err = store
            .store(&schema("our-story"), b"img", "a.png", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnsupportedMediaType { .. }));
    }

    #[tokio::test]
    async fn test_store_rejects_resources_without_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());
        let err = store
            .store(&schema("faqs"), b"x", "a.png", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_ignores_unmanaged_paths() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, b"keep").unwrap();

        let store = AttachmentStore::new(dir.path().join("data"));
        assert!(!store.delete("uploads/../../keep.txt").await);
        assert!(outside.exists());
    }
}
