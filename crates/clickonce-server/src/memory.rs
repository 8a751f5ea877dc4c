use crate::fixture::Fixture;
use clickonce_remote::{Fetched, RemoteError, Transport};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// In-memory deployment host implementing [`Transport`].
///
/// Serves a [`Fixture`] below a base URL without touching the network and
/// records every requested URL.
pub struct MemoryHost {
    base: Url,
    files: Mutex<HashMap<String, Vec<u8>>>,
    redirects: HashMap<String, Url>,
    requests: Mutex<Vec<String>>,
}

impl MemoryHost {
    /// Panics if `base` is not an absolute URL; this is test tooling.
    pub fn new(base: &str) -> Self {
        Self {
            base: Url::parse(base).expect("valid base URL"),
            files: Mutex::new(HashMap::new()),
            redirects: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_fixture(base: &str, fixture: &Fixture) -> Self {
        let host = Self::new(base);
        for (path, content) in fixture.files() {
            host.insert(path, content);
        }
        host
    }

    /// Redirect requests for `from` to `to`, both relative to the base URL.
    #[must_use]
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        let from = self.url(from);
        let to = self.url(to);
        self.redirects.insert(from.to_string(), to);
        self
    }

    pub fn insert(&self, path: &str, content: &[u8]) {
        let url = self.url(path);
        self.files
            .lock()
            .expect("host lock poisoned")
            .insert(url.to_string(), content.to_vec());
    }

    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        let url = self.url(path);
        self.files
            .lock()
            .expect("host lock poisoned")
            .remove(url.as_str())
    }

    /// Absolute URL of a server-relative path.
    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).expect("valid relative path")
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("host lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("host lock poisoned").len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().expect("host lock poisoned").clear();
    }
}

impl Transport for MemoryHost {
    fn fetch(&self, url: &Url) -> Result<Fetched, RemoteError> {
        self.requests
            .lock()
            .expect("host lock poisoned")
            .push(url.to_string());

        let final_url = self.redirects.get(url.as_str()).unwrap_or(url);
        let body = self
            .files
            .lock()
            .expect("host lock poisoned")
            .get(final_url.as_str())
            .cloned();

        Ok(match body {
            Some(body) => Fetched {
                status: 200,
                url: final_url.clone(),
                body,
            },
            None => Fetched {
                status: 404,
                url: final_url.clone(),
                body: Vec::new(),
            },
        })
    }
}
