//! HTTP retrieval of sidecars and artifacts.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use stowage_core::hash::ContentHasher;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ResolveError, ResolveResult};

/// Maximum number of HTTP redirects to follow.
const MAX_REDIRECTS: usize = 10;

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// GET-only HTTP client shared by every resolver task.
///
/// Holds no per-request state; cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given connection timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] if the TLS backend cannot be
    /// initialised.
    pub fn new(connect_timeout: Duration) -> ResolveResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("stowage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResolveError::Client {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> ResolveResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ResolveError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Fetch a small text resource, trimmed.
    ///
    /// # Errors
    ///
    /// Returns a transport or status error.
    pub async fn fetch_text(&self, url: &str) -> ResolveResult<String> {
        debug!(url, "Fetching");
        let response = self.get(url).await?;
        let text = response
            .text()
            .await
            .map_err(|source| ResolveError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(text.trim().to_string())
    }

    /// Stream `url` into the file at `dest`, returning the SHA-1 of the
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Returns a transport or status error, or an I/O error writing `dest`.
    pub async fn download(&self, url: &str, dest: &Path) -> ResolveResult<String> {
        debug!(url, dest = %dest.display(), "Downloading");
        let response = self.get(url).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ResolveError::io(dest, e))?;
        let mut hasher = ContentHasher::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ResolveError::Transport {
                url: url.to_string(),
                source,
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| ResolveError::io(dest, e))?;
        }
        file.flush().await.map_err(|e| ResolveError::io(dest, e))?;
        file.sync_all()
            .await
            .map_err(|e| ResolveError::io(dest, e))?;

        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::hash::sha1_hex;
    use stowage_test::MockRepository;
    use stowage_core::Dependency;

    const SHA: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    #[tokio::test]
    async fn non_success_status_is_error() {
        let repo = MockRepository::start().await;
        let transport = HttpTransport::new(DEFAULT_CONNECT_TIMEOUT).unwrap();
        let dep = Dependency::new("g", "a", "1", None, SHA).unwrap();

        let err = transport
            .fetch_text(&dep.sha1_url(&repo.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn text_is_trimmed() {
        let repo = MockRepository::start().await;
        let dep = Dependency::new("g", "a", "1", None, SHA).unwrap();
        repo.serve_sidecar(&dep, &format!("\n  {SHA}  a-1.jar\n")).await;

        let transport = HttpTransport::new(DEFAULT_CONNECT_TIMEOUT).unwrap();
        let text = transport.fetch_text(&dep.sha1_url(&repo.url())).await.unwrap();
        assert_eq!(text, format!("{SHA}  a-1.jar"));
    }

    #[tokio::test]
    async fn download_hashes_what_it_writes() {
        let repo = MockRepository::start().await;
        let body = vec![7u8; 100_000];
        let dep = repo.publish("g", "a", "1", None, &body).await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a.jar");
        let transport = HttpTransport::new(DEFAULT_CONNECT_TIMEOUT).unwrap();
        let hash = transport.download(&dep.jar_url(&repo.url()), &dest).await.unwrap();

        assert_eq!(hash, sha1_hex(&body));
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }
}
