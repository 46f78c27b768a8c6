use std::path::PathBuf;

/// Workspace-rooted object store. Buckets are directories, keys are relative
/// paths inside a bucket. Failures here are infrastructure errors and abort
/// the running job.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    pub fn get_text(&self, bucket: &str, key: &str) -> anyhow::Result<String> {
        let path = self.object_path(bucket, key);
        let bytes =
            std::fs::read(&path).map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)
            .map_err(|e| anyhow::anyhow!("write {}: {}", path.display(), e))?;
        Ok(())
    }
}
