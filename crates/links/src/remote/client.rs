//! Link service HTTP client
//!
//! Binds the `LinksRemote` operations to the service's REST endpoints.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::time::Duration;

use log::debug;

use super::api::{LinkList, PushRegistrationBody, RemoteLink};
use super::{BearerToken, LinksRemote, RemoteError};

/// Agent with a global per-request timeout
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Map a ureq failure onto the remote error classes
fn classify(error: ureq::Error) -> RemoteError {
    match error {
        ureq::Error::StatusCode(status) => RemoteError::from_status(status, "request failed"),
        other => RemoteError::Transient(other.to_string()),
    }
}

fn decode_error(error: ureq::Error) -> RemoteError {
    RemoteError::Decode(error.to_string())
}

/// HTTP client for the link service
pub struct HttpLinksClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpLinksClient {
    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            agent: build_agent(timeout),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn links_url(&self) -> String {
        format!("{}/links", self.base_url)
    }

    fn link_url(&self, sha: &str) -> String {
        format!("{}/links/{}", self.base_url, urlencoding::encode(sha))
    }
}

impl LinksRemote for HttpLinksClient {
    fn list_links(
        &self,
        token: &BearerToken,
        show_deleted: bool,
        timestamp_min: Option<&str>,
    ) -> Result<LinkList, RemoteError> {
        debug!(
            "GET /links showDeleted={} timestampMin={:?}",
            show_deleted, timestamp_min
        );
        let mut request = self
            .agent
            .get(&self.links_url())
            .header("Authorization", &token.header_value())
            .query("showDeleted", if show_deleted { "true" } else { "false" });
        if let Some(min) = timestamp_min {
            request = request.query("timestampMin", min);
        }

        let mut response = request.call().map_err(classify)?;
        response.body_mut().read_json().map_err(decode_error)
    }

    fn get_link(&self, token: &BearerToken, sha: &str) -> Result<RemoteLink, RemoteError> {
        let mut response = self
            .agent
            .get(&self.link_url(sha))
            .header("Authorization", &token.header_value())
            .call()
            .map_err(classify)?;
        response.body_mut().read_json().map_err(decode_error)
    }

    fn add_link(
        &self,
        token: &BearerToken,
        link: &RemoteLink,
        push_id: Option<&str>,
    ) -> Result<RemoteLink, RemoteError> {
        debug!("POST /links sha={}", link.sha);
        let mut request = self
            .agent
            .post(&self.links_url())
            .header("Authorization", &token.header_value());
        if let Some(push_id) = push_id {
            request = request.query("regid", push_id);
        }

        let mut response = request.send_json(link).map_err(classify)?;
        response.body_mut().read_json().map_err(decode_error)
    }

    fn delete_link(
        &self,
        token: &BearerToken,
        sha: &str,
        push_id: Option<&str>,
    ) -> Result<(), RemoteError> {
        debug!("DELETE /links/{}", sha);
        let mut request = self
            .agent
            .delete(&self.link_url(sha))
            .header("Authorization", &token.header_value());
        if let Some(push_id) = push_id {
            request = request.query("regid", push_id);
        }

        match request.call() {
            Ok(_) => Ok(()),
            // Already gone on the remote
            Err(ureq::Error::StatusCode(404)) => {
                debug!("Link {} already absent on the remote", sha);
                Ok(())
            }
            Err(e) => Err(classify(e)),
        }
    }

    fn register_push(&self, token: &BearerToken, push_id: &str) -> Result<(), RemoteError> {
        self.agent
            .post(&format!("{}/registergcm", self.base_url))
            .header("Authorization", &token.header_value())
            .send_json(&PushRegistrationBody {
                regid: push_id.to_string(),
            })
            .map_err(classify)?;
        Ok(())
    }
}
