use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A scratch video file that is deleted when the request is done with it.
pub struct TempVideo {
    path: Option<PathBuf>,
}

impl TempVideo {
    /// Reserves a unique path in `dir`. The file itself is created by
    /// whoever writes to it first.
    pub fn new(dir: &Path, suffix: &str) -> Self {
        let name = format!("gaitpose-{}{}", uuid::Uuid::new_v4(), suffix);
        Self {
            path: Some(dir.join(name)),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub async fn remove(mut self) {
        if let Some(path) = self.path.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file")
                }
            }
        }
    }
}

impl Drop for TempVideo {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
