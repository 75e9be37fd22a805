use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::warn;
use url::Url;

use super::{Collection, Resource, Workspace};
use crate::error::{Result, WorkerError};

/// Maps resources to a remote HTTP endpoint using MKCOL/DELETE/HEAD/GET/PUT.
/// Grounded on `workspace.py`'s `WebDAVWorkspace` (`_mkcol`, `create_collection`
/// walking `c.parts` mkcol'ing each intermediate collection).
pub struct WebDavWorkspace {
    base: Url,
    client: Client,
}

impl WebDavWorkspace {
    pub fn new(url: &Url, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(WorkerError::Transport)?;
        Ok(Self {
            base: url.clone(),
            client,
        })
    }

    fn url_for(&self, r: &Resource, trailing_slash: bool) -> Url {
        let mut url = self.base.clone();
        let mut path = url.path().trim_end_matches('/').to_string();
        for part in r.parts() {
            path.push('/');
            path.push_str(part);
        }
        if trailing_slash {
            path.push('/');
        }
        url.set_path(&path);
        url
    }

    async fn mkcol(&self, url: &Url) -> Result<()> {
        let resp = self
            .client
            .request(reqwest::Method::from_bytes(b"MKCOL").unwrap(), url.clone())
            .send()
            .await
            .map_err(WorkerError::Transport)?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            // 409 Conflict: a parent exists as a non-collection resource.
            StatusCode::CONFLICT => Err(WorkerError::Config(format!(
                "mkcol conflict at {url}: parent exists as a non-collection resource"
            ))),
            status if status.is_server_error() => Err(WorkerError::Config(format!(
                "mkcol transient failure at {url}: {status}"
            ))),
            status => Err(WorkerError::Config(format!(
                "mkcol failed at {url}: {status}"
            ))),
        }
    }
}

#[async_trait]
impl Workspace for WebDavWorkspace {
    async fn ensure_collection(&self, c: &Collection) -> Result<()> {
        // Walk from the root, mkcol'ing every intermediate collection; a 405
        // (already exists) at any level is success, not failure.
        let mut prefix: Vec<String> = Vec::new();
        for part in c.resource().parts() {
            prefix.push(part.clone());
            let r = Resource::collection(prefix.clone()).resource().clone();
            let url = self.url_for(&r, true);
            self.mkcol(&url).await?;
        }
        if c.resource().parts().is_empty() {
            self.mkcol(&self.base.clone()).await?;
        }
        Ok(())
    }

    async fn create_collection(&self, c: &Collection) -> Result<()> {
        let url = self.url_for(c.resource(), true);
        self.mkcol(&url).await
    }

    async fn delete_collection(&self, c: &Collection) -> Result<()> {
        let url = self.url_for(c.resource(), true);
        let resp = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(WorkerError::Transport)?;
        if resp.status() == StatusCode::NOT_FOUND {
            warn!(%url, "delete_collection: collection already absent");
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(WorkerError::Config(format!(
                "delete failed at {url}: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn exists(&self, r: &Resource) -> Result<bool> {
        let url = self.url_for(r, r.is_collection());
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(WorkerError::Transport)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(WorkerError::Config(format!("unexpected HEAD status {s}"))),
        }
    }

    async fn read(&self, f: &super::File) -> Result<Vec<u8>> {
        let url = self.url_for(f.resource(), false);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(WorkerError::Transport)?
            .error_for_status()
            .map_err(WorkerError::Transport)?;
        Ok(resp.bytes().await.map_err(WorkerError::Transport)?.to_vec())
    }

    async fn write(&self, f: &super::File, content: &[u8]) -> Result<()> {
        let url = self.url_for(f.resource(), false);
        self.client
            .put(url)
            .body(content.to_vec())
            .send()
            .await
            .map_err(WorkerError::Transport)?
            .error_for_status()
            .map_err(WorkerError::Transport)?;
        Ok(())
    }

    fn absolute_uri(&self, r: &Resource) -> Url {
        self.url_for(r, r.is_collection())
    }
}
