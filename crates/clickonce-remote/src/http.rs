use crate::{Fetched, HttpConfig, RemoteError, Transport};
use std::io::Read;
use ureq::ResponseExt;
use url::Url;

/// Blocking HTTP transport.
///
/// Redirects are followed and the final location is reported in
/// [`Fetched::url`], which is what relative manifest paths resolve against.
/// Error statuses are returned as data instead of `Err`.
pub struct HttpTransport {
    config: HttpConfig,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        Self { config, agent }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(HttpConfig::default())
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &Url) -> Result<Fetched, RemoteError> {
        tracing::debug!("GET {url}");
        let mut req = self
            .agent
            .get(url.as_str())
            .header("User-Agent", &self.config.user_agent);
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = req
            .call()
            .map_err(|e| RemoteError::Http(format!("GET {url}: {e}")))?;

        let status = resp.status().as_u16();
        let final_url = Url::parse(&resp.get_uri().to_string()).unwrap_or_else(|_| url.clone());

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(format!("reading {url}: {e}")))?;
        tracing::debug!("GET {url} -> {status} ({} bytes)", body.len());

        Ok(Fetched {
            status,
            url: final_url,
            body,
        })
    }
}
