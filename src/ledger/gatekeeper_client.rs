// src/ledger/gatekeeper_client.rs
//! HTTP client for a gatekeeper node.
//!
//! Provides a [`Ledger`] implementation over the gatekeeper REST API:
//! - `POST   /did`         create
//! - `GET    /did/{did}`   resolve (`?asof=<RFC 3339>` for point-in-time)
//! - `POST   /did/{did}`   update
//! - `DELETE /did/{did}`   delete
//! - `GET    /version`     protocol version
//!
//! Transport failures map to [`Error::LedgerUnavailable`]; a non-success
//! status on a mutation maps to [`Error::RejectedTransaction`].

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::models::did::DidResolution;
use crate::models::operation::Operation;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// The gatekeeper answers a create with either `{"did": ...}` or the bare DID.
#[derive(Deserialize)]
#[serde(untagged)]
enum CreateDidReply {
    Wrapped { did: String },
    Bare(String),
}

/// Thread-safe gatekeeper client (reqwest pools connections internally).
#[derive(Clone)]
pub struct GatekeeperClient {
    client: Client,
    base_url: String,
}

impl GatekeeperClient {
    /// Creates a client for the gatekeeper at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - e.g. "http://localhost:3000"
    /// * `timeout` - Per-request timeout; the keymaster itself never retries
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(GatekeeperClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        GatekeeperClient::new(&settings.gatekeeper_url, settings.request_timeout())
    }

    fn did_url(&self, did: &str) -> String {
        format!("{}/did/{}", self.base_url, did)
    }

    /// Gatekeeper protocol version.
    pub async fn get_version(&self) -> Result<u32> {
        let response = self
            .client
            .get(format!("{}/version", self.base_url))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Turns a non-success response into [`Error::RejectedTransaction`].
async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::RejectedTransaction(format!("{}: {}", status, body)))
}

#[async_trait]
impl Ledger for GatekeeperClient {
    async fn create_did(&self, operation: &Operation) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/did", self.base_url))
            .json(operation)
            .send()
            .await?;

        let reply: CreateDidReply = check_status(response).await?.json().await?;
        Ok(match reply {
            CreateDidReply::Wrapped { did } => did,
            CreateDidReply::Bare(did) => did,
        })
    }

    async fn resolve_did(&self, did: &str, asof: Option<DateTime<Utc>>) -> Result<DidResolution> {
        let mut request = self.client.get(self.did_url(did));
        if let Some(asof) = asof {
            request = request.query(&[("asof", asof.to_rfc3339_opts(SecondsFormat::Nanos, true))]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(did.to_string()));
        }

        let response = check_status(response)
            .await
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;
        Ok(response.json().await?)
    }

    async fn update_did(&self, operation: &Operation) -> Result<bool> {
        let did = operation
            .did
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("update has no DID".into()))?;

        let response = self
            .client
            .post(self.did_url(did))
            .json(operation)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    async fn delete_did(&self, operation: &Operation) -> Result<bool> {
        let did = operation
            .did
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("delete has no DID".into()))?;

        let response = self
            .client
            .delete(self.did_url(did))
            .json(operation)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};
    use serde_json::json;

    fn client() -> GatekeeperClient {
        GatekeeperClient::new(&mockito::server_url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_create_did_accepts_wrapped_reply() {
        let _m = mock("POST", "/did")
            .match_body(Matcher::PartialJson(json!({"op": "delete"})))
            .with_header("content-type", "application/json")
            .with_body(r#"{"did":"did:mdip:created"}"#)
            .create();

        let did = client()
            .create_did(&Operation::delete("did:mdip:placeholder"))
            .await
            .unwrap();
        assert_eq!(did, "did:mdip:created");
    }

    #[tokio::test]
    async fn test_resolve_did_parses_document() {
        let _m = mock("GET", "/did/did:mdip:resolved")
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "@context": "https://w3id.org/did-resolution/v1",
                    "didDocument": { "id": "did:mdip:resolved" },
                    "didDocumentMetadata": {
                        "created": "2024-03-01T12:00:00Z",
                        "mdip": { "version": 1, "type": "asset", "registry": "local" },
                        "data": { "x": 1 }
                    }
                })
                .to_string(),
            )
            .create();

        let doc = client().resolve_did("did:mdip:resolved", None).await.unwrap();
        assert_eq!(doc.asset_data(), Some(&json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_resolve_missing_did_is_not_found() {
        let _m = mock("GET", "/did/did:mdip:missing").with_status(404).create();

        let result = client().resolve_did("did:mdip:missing", None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejected_delete() {
        let _m = mock("DELETE", "/did/did:mdip:rejected")
            .with_status(500)
            .with_body("Invalid signature")
            .create();

        let result = client().delete_did(&Operation::delete("did:mdip:rejected")).await;
        match result {
            Err(Error::RejectedTransaction(msg)) => assert!(msg.contains("Invalid signature")),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_update_returns_ledger_verdict() {
        let _m = mock("POST", "/did/did:mdip:updated")
            .with_header("content-type", "application/json")
            .with_body("true")
            .create();

        let mut op = Operation::delete("did:mdip:updated");
        op.op = crate::models::operation::OperationType::Update;
        tokio_test::assert_ok!(client().update_did(&op).await);
    }

    #[tokio::test]
    async fn test_unreachable_gatekeeper() {
        let client = GatekeeperClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let result = client.resolve_did("did:mdip:any", None).await;
        assert!(matches!(result, Err(Error::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_version() {
        let _m = mock("GET", "/version").with_body("1").create();
        assert_eq!(client().get_version().await.unwrap(), 1);
    }
}
