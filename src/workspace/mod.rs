//! Uniform file/directory operations over a local filesystem or a WebDAV
//! endpoint, addressed by a rooted tree of value-object resources.
//!
//! Grounded on the original implementation's `transcoding/workspace.py`
//! (`Resource`/`Collection`/`File`/`Workspace`), translated into an async
//! trait object so the Orchestrator can hold `Arc<dyn Workspace>` without
//! caring which backend it talks to.

mod local;
mod webdav;

pub use local::FileSystemWorkspace;
pub use webdav::WebDavWorkspace;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{Result, WorkerError};

/// A path-component tuple rooted at a workspace base URI. Resources carry no
/// identity across workspaces -- two `Collection`s with the same parts in two
/// different workspaces are unrelated values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    parts: Vec<String>,
    is_collection: bool,
}

impl Resource {
    pub fn collection(parts: impl IntoIterator<Item = impl Into<String>>) -> Collection {
        Collection(Resource {
            parts: parts.into_iter().map(Into::into).collect(),
            is_collection: true,
        })
    }

    pub fn file(parts: impl IntoIterator<Item = impl Into<String>>) -> File {
        File(Resource {
            parts: parts.into_iter().map(Into::into).collect(),
            is_collection: false,
        })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn basename(&self) -> Option<&str> {
        self.parts.last().map(|s| s.as_str())
    }

    pub fn is_collection(&self) -> bool {
        self.is_collection
    }
}

/// A directory-like resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection(Resource);

impl Collection {
    pub fn root() -> Self {
        Collection(Resource {
            parts: Vec::new(),
            is_collection: true,
        })
    }

    /// `self / "child"` -- descend into a sub-collection.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        let mut parts = self.0.parts.clone();
        parts.push(name.into());
        Collection(Resource {
            parts,
            is_collection: true,
        })
    }

    /// `self // "name.ext"` -- a file inside this collection.
    pub fn file(&self, name: impl Into<String>) -> File {
        let mut parts = self.0.parts.clone();
        parts.push(name.into());
        File(Resource {
            parts,
            is_collection: false,
        })
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }
}

/// A file-like resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File(Resource);

impl File {
    pub fn resource(&self) -> &Resource {
        &self.0
    }

    pub fn basename(&self) -> &str {
        self.0.basename().unwrap_or_default()
    }
}

/// Backend-agnostic workspace operations. All mutation contracts are
/// idempotent where the spec requires it (`ensure_collection`).
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Create `c` and every missing ancestor; idempotent.
    async fn ensure_collection(&self, c: &Collection) -> Result<()>;

    /// Create exactly `c` (ancestors assumed to already exist); same
    /// idempotency contract as `ensure_collection` for a single level.
    async fn create_collection(&self, c: &Collection) -> Result<()>;

    /// Recursive delete. A missing directory is not an error (logged warning
    /// by the caller, not by this trait).
    async fn delete_collection(&self, c: &Collection) -> Result<()>;

    async fn exists(&self, r: &Resource) -> Result<bool>;

    async fn read(&self, f: &File) -> Result<Vec<u8>>;

    async fn write(&self, f: &File, content: &[u8]) -> Result<()>;

    /// Deterministic absolute URI for `r`, trailing slash iff collection.
    fn absolute_uri(&self, r: &Resource) -> Url;
}

/// Dispatch on URI scheme: `file://` -> local, `dav://`/`davs://` -> WebDAV.
/// Unknown scheme fails immediately, never silently defaults. `connect_timeout`
/// and `request_timeout` (`WorkerConfig`'s fields of the same name) only
/// apply to the WebDAV backend; the local backend ignores them.
pub fn open_workspace(
    base: &str,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Arc<dyn Workspace>> {
    let url = Url::parse(base).map_err(|e| WorkerError::Config(e.to_string()))?;
    match url.scheme() {
        "file" => Ok(Arc::new(FileSystemWorkspace::new(&url)?)),
        "dav" | "davs" => Ok(Arc::new(WebDavWorkspace::new(
            &url,
            connect_timeout,
            request_timeout,
        )?)),
        other => Err(WorkerError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_file_descend_accumulates_parts() {
        let root = Collection::root();
        let sub = root.collection("sources");
        let f = sub.file("source.json");
        assert_eq!(f.resource().parts(), &["sources", "source.json"]);
    }

    #[test]
    fn unknown_scheme_fails() {
        let err = open_workspace(
            "ftp://example.com/x",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, WorkerError::UnsupportedScheme(_)));
    }
}
