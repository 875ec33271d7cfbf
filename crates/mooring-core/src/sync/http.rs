//! reqwest client for the remote authority's `/sync/*` routes.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{Entity, EntityKind, QueueItem};
use crate::util::compact_text;

use super::remote::{PushRequest, PushResponse, RemoteAuthority, Snapshot};

/// HTTP implementation of [`RemoteAuthority`].
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpRemote {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let config = config.normalized()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url,
            auth_token: config.auth_token,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match self.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_snapshot(&self, url: &str) -> Result<Snapshot> {
        let response = self.get(url).send().await?;
        let snapshot: Snapshot = decode(response).await?;
        if snapshot.timestamp.trim().is_empty() {
            return Err(Error::Remote {
                status: StatusCode::OK.as_u16(),
                message: "snapshot did not include a timestamp".to_string(),
            });
        }
        Ok(snapshot)
    }
}

impl RemoteAuthority for HttpRemote {
    async fn bootstrap(&self) -> Result<Snapshot> {
        tracing::debug!(base_url = %self.base_url, "Requesting bootstrap snapshot");
        self.fetch_snapshot(&self.url("/sync/bootstrap")).await
    }

    async fn pull(&self, since: &str) -> Result<Snapshot> {
        tracing::debug!(base_url = %self.base_url, since, "Requesting delta");
        let url = format!(
            "{}?since={}",
            self.url("/sync/pull"),
            urlencoding::encode(since)
        );
        self.fetch_snapshot(&url).await
    }

    async fn fetch_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let url = format!(
            "{}?entity={}&id={}",
            self.url("/sync/pull"),
            kind.collection(),
            urlencoding::encode(id)
        );
        let response = self.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn push(&self, actions: &[QueueItem]) -> Result<PushResponse> {
        tracing::debug!(base_url = %self.base_url, count = actions.len(), "Pushing queued actions");
        let response = self
            .authorize(self.client.post(self.url("/sync/push")))
            .json(&PushRequest { actions })
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Remote {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        });
    }
    Ok(response.json::<T>().await?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_error_prefers_message_field() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"bad_request","message":"since is malformed"}"#,
        );
        assert_eq!(message, "since is malformed");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_or_reason() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "  upstream down "),
            "upstream down"
        );
        assert_eq!(
            parse_api_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }

    #[test]
    fn remote_debug_redacts_token() {
        let remote = HttpRemote::new(
            RemoteConfig::new("https://api.example.com/").with_auth_token("secret"),
        )
        .unwrap();
        assert_eq!(remote.base_url(), "https://api.example.com");
        let debug = format!("{remote:?}");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(matches!(
            HttpRemote::new(RemoteConfig::new("ftp://example.com")),
            Err(Error::Config(_))
        ));
    }
}
