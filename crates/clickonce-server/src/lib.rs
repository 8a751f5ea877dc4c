//! Static host for ClickOnce deployments.
//!
//! Serves a published deployment tree from a directory over HTTP, the way a
//! plain web server exposes `Tool.application`, `Application Files/...` and
//! `.deploy` payloads. The [`TestServer`] helper starts it on a random port for
//! integration testing; [`MemoryHost`] serves the same [`fixture::Fixture`]
//! without a socket.

pub mod fixture;
pub mod memory;

pub use fixture::{EntrySpec, Fixture, ManifestXml};
pub use memory::MemoryHost;

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info};

/// A deployment tree on disk plus optional redirects.
pub struct DeploymentRoot {
    root: PathBuf,
    redirects: HashMap<String, String>,
}

impl DeploymentRoot {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            redirects: HashMap::new(),
        }
    }

    /// Answer requests for the URL path `from` (for example
    /// `/latest/Tool.application`) with a 302 to `to`.
    #[must_use]
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_owned(), to.to_owned());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto a file below the root.
    ///
    /// Segments are percent-decoded; `.`/`..` segments and segments that
    /// decode to a separator are refused.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let path = url_path.split(['?', '#']).next().unwrap_or_default();
        let mut resolved = self.root.clone();
        let mut depth = 0;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(segment).decode_utf8().ok()?;
            if decoded == "." || decoded == ".." || decoded.contains(['/', '\\']) {
                return None;
            }
            resolved.push(&*decoded);
            depth += 1;
        }
        (depth > 0).then_some(resolved)
    }

    fn read(&self, url_path: &str) -> Option<Vec<u8>> {
        let path = self.resolve(url_path)?;
        if !path.is_file() {
            return None;
        }
        fs::read(path).ok()
    }
}

fn respond_status(req: tiny_http::Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn respond_octet(req: tiny_http::Request, data: Vec<u8>) {
    let response = Response::from_data(data);
    let _ = match Header::from_bytes("Content-Type", "application/octet-stream") {
        Ok(header) => req.respond(response.with_header(header)),
        Err(()) => req.respond(response),
    };
}

fn respond_redirect(req: tiny_http::Request, location: &str) {
    let response = Response::empty(302);
    let _ = match Header::from_bytes("Location", location) {
        Ok(header) => req.respond(response.with_header(header)),
        Err(()) => req.respond(response.with_status_code(500)),
    };
}

/// Handle a single HTTP request against `root`.
pub fn handle_request(root: &DeploymentRoot, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    if method != Method::Get && method != Method::Head {
        respond_status(req, 405, "method not allowed");
        return;
    }

    if let Some(location) = root.redirects.get(&url) {
        debug!("{url} -> {location}");
        respond_redirect(req, location);
        return;
    }

    match root.read(&url) {
        Some(data) => {
            info!("GET {url}: {} bytes", data.len());
            respond_octet(req, data);
        }
        None => respond_status(req, 404, "not found"),
    }
}

/// A test helper serving a deployment tree on `127.0.0.1` at a random port
/// from a background thread. Every request path is recorded. Dropping the
/// server stops it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub root: PathBuf,
    requests: Arc<Mutex<Vec<String>>>,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn start(root: PathBuf) -> Self {
        Self::start_with(DeploymentRoot::new(root))
    }

    pub fn start_with(deployment: DeploymentRoot) -> Self {
        fs::create_dir_all(deployment.root()).expect("failed to create deployment root");
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");
        let root = deployment.root().to_path_buf();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                log.lock()
                    .expect("request log poisoned")
                    .push(request.url().to_owned());
                handle_request(&deployment, request);
            }
        });

        Self {
            url,
            port,
            root,
            requests,
            server,
            handle: Some(handle),
        }
    }

    /// Absolute URL for a server-relative path, percent-encoded.
    pub fn url_for(&self, path: &str) -> String {
        let base = url::Url::parse(&format!("{}/", self.url)).expect("valid server URL");
        base.join(path).expect("valid relative path").to_string()
    }

    /// Request paths seen so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("request log poisoned").len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
