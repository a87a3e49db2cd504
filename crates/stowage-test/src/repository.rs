//! A fake Maven repository served over HTTP.

use std::sync::Mutex;

use httpmock::prelude::*;
use httpmock::Mock;
use stowage_core::Dependency;
use stowage_core::hash::sha1_hex;

/// Path prefix under which artifacts are published.
const REPOSITORY_ROOT: &str = "/maven2";

/// Maven-layout repository backed by an [`httpmock::MockServer`].
///
/// Every request the server answers is counted, so tests can prove that a
/// warm cache performs no network calls. Unknown paths answer `404`.
pub struct MockRepository {
    server: MockServer,
    mocks: Mutex<Vec<usize>>,
}

impl std::fmt::Debug for MockRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRepository")
            .field("url", &self.url())
            .finish_non_exhaustive()
    }
}

impl MockRepository {
    /// Start a repository with nothing published.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start_async().await,
            mocks: Mutex::new(Vec::new()),
        }
    }

    /// Base URL to list in a manifest.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url(REPOSITORY_ROOT)
    }

    /// Publish `jar` with a correct sidecar and return the matching
    /// dependency declaration.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are invalid.
    pub async fn publish(
        &self,
        group: &str,
        artifact: &str,
        version: &str,
        classifier: Option<&str>,
        jar: &[u8],
    ) -> Dependency {
        let dependency = Dependency::new(
            group,
            artifact,
            version,
            classifier.map(String::from),
            sha1_hex(jar),
        )
        .expect("valid test coordinates");
        self.serve(&dependency, &format!("{}  {artifact}.jar\n", sha1_hex(jar)), jar)
            .await;
        dependency
    }

    /// Serve an arbitrary sidecar text and artifact body for `dependency`.
    pub async fn serve(&self, dependency: &Dependency, sidecar: &str, jar: &[u8]) {
        self.serve_sidecar(dependency, sidecar).await;
        let path = self.artifact_path(dependency);
        let body = jar.to_vec();
        let mock = self
            .server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("content-type", "application/java-archive")
                    .body(body);
            })
            .await;
        self.track(&mock);
    }

    /// Serve only a sidecar for `dependency`; the artifact itself 404s.
    pub async fn serve_sidecar(&self, dependency: &Dependency, sidecar: &str) {
        let path = format!("{}.sha1", self.artifact_path(dependency));
        let body = sidecar.to_string();
        let mock = self
            .server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200).body(body);
            })
            .await;
        self.track(&mock);
    }

    /// Answer every request for `dependency` with `status`.
    pub async fn fail(&self, dependency: &Dependency, status: u16) {
        let prefix = self.artifact_path(dependency);
        let mock = self
            .server
            .mock_async(|when, then| {
                when.method(GET).path_contains(prefix);
                then.status(status);
            })
            .await;
        self.track(&mock);
    }

    /// Total requests answered by published endpoints.
    pub async fn hits(&self) -> usize {
        let ids = self.mocks.lock().expect("mock ids").clone();
        let mut total = 0usize;
        for id in ids {
            total = total.saturating_add(Mock::new(id, &self.server).hits_async().await);
        }
        total
    }

    fn artifact_path(&self, dependency: &Dependency) -> String {
        format!("{REPOSITORY_ROOT}/{}", dependency.repository_path())
    }

    fn track(&self, mock: &Mock<'_>) {
        self.mocks.lock().expect("mock ids").push(mock.id);
    }
}
