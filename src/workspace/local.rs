use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;
use url::Url;

use super::{Collection, File, Resource, Workspace};
use crate::error::Result;

/// Maps resources to paths under a base directory on the local filesystem.
/// Grounded on `workspace.py`'s `FileSystemWorkspace` (`os.makedirs`,
/// `os.path.join`).
pub struct FileSystemWorkspace {
    base: PathBuf,
    base_url: Url,
}

impl FileSystemWorkspace {
    pub fn new(url: &Url) -> Result<Self> {
        Ok(Self {
            base: PathBuf::from(url.path()),
            base_url: url.clone(),
        })
    }

    fn path_for(&self, r: &Resource) -> PathBuf {
        let mut p = self.base.clone();
        for part in r.parts() {
            p.push(part);
        }
        p
    }
}

#[async_trait]
impl Workspace for FileSystemWorkspace {
    async fn ensure_collection(&self, c: &Collection) -> Result<()> {
        let path = self.path_for(c.resource());
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn create_collection(&self, c: &Collection) -> Result<()> {
        // Local filesystem directory creation is inherently idempotent and
        // ancestor-creating; same call as ensure_collection.
        self.ensure_collection(c).await
    }

    async fn delete_collection(&self, c: &Collection) -> Result<()> {
        let path = self.path_for(c.resource());
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "delete_collection: directory already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, r: &Resource) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(r)).await?)
    }

    async fn read(&self, f: &File) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(f.resource())).await?)
    }

    async fn write(&self, f: &File, content: &[u8]) -> Result<()> {
        let path = self.path_for(f.resource());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write to a sibling temp file then rename, so a reader never
        // observes a partially written sentinel.
        let tmp = path.with_extension("tmp-write");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn absolute_uri(&self, r: &Resource) -> Url {
        let mut url = self.base_url.clone();
        let mut path = url.path().trim_end_matches('/').to_string();
        for part in r.parts() {
            path.push('/');
            path.push_str(part);
        }
        if r.is_collection() {
            path.push('/');
        }
        url.set_path(&path);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Resource as R;

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("file://{}", dir.path().display())).unwrap();
        let ws = FileSystemWorkspace::new(&url).unwrap();
        let c = R::collection(["a", "b"]);
        ws.ensure_collection(&c).await.unwrap();
        ws.ensure_collection(&c).await.unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("file://{}", dir.path().display())).unwrap();
        let ws = FileSystemWorkspace::new(&url).unwrap();
        let f = R::file(["x.json"]);
        ws.write(&f, b"{}").await.unwrap();
        assert_eq!(ws.read(&f).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn delete_missing_collection_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("file://{}", dir.path().display())).unwrap();
        let ws = FileSystemWorkspace::new(&url).unwrap();
        let c = R::collection(["never-created"]);
        ws.delete_collection(&c).await.unwrap();
    }
}
