//! Signed JSON client shared by the LTS and SWR APIs

use crate::signer::{self, DATE_HEADER, Signer, SigningRequest};
use ams_cloud::{CloudError, OutcomeClassifier, RemoteError, RemoteOutcome, Result};
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf8";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client that signs every request and classifies error bodies
#[derive(Debug, Clone)]
pub struct SignedClient {
    client: reqwest::Client,
    base_url: String,
    host: String,
    signer: Signer,
    classifier: OutcomeClassifier,
}

impl SignedClient {
    /// `base_url` is scheme plus host, e.g. `https://lts.cn-east-3.myhuaweicloud.com`
    pub fn new(base_url: &str, signer: Signer, classifier: OutcomeClassifier) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| CloudError::Transport(format!("invalid endpoint {}: {}", base_url, e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(CloudError::Transport(format!(
                    "endpoint {} has no host",
                    base_url
                )));
            }
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
            signer,
            classifier,
        })
    }

    /// Send one request
    ///
    /// 200/201 carry a body, 204 carries none, anything else is parsed as a
    /// vendor error and classified.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<RemoteOutcome<Option<Vec<u8>>>> {
        let body = match body {
            Some(value) => serde_json::to_vec(&value)
                .map_err(|e| CloudError::Decode(format!("encode body for {}: {}", path, e)))?,
            None => Vec::new(),
        };

        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| CloudError::Transport(format!("invalid url {}: {}", path, e)))?;
        if !query.is_empty() {
            url.set_query(Some(&signer::canonical_query(query)));
        }

        let signature = self.signer.sign(
            &SigningRequest {
                method: method.as_str(),
                host: &self.host,
                path,
                query,
                content_type: JSON_CONTENT_TYPE,
                body: &body,
            },
            Utc::now(),
        )?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(DATE_HEADER, signature.sdk_date)
            .header(AUTHORIZATION, signature.authorization);
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CloudError::Transport(format!("{} {}: {}", method, path, e)))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CloudError::Transport(format!("{} {}: read body: {}", method, path, e)))?;

        match status {
            200 | 201 => Ok(RemoteOutcome::Success(Some(bytes.to_vec()))),
            204 => Ok(RemoteOutcome::Success(None)),
            _ => {
                let error = RemoteError::parse(status, &bytes);
                tracing::debug!(%method, path, %error, "Vendor API returned an error");
                Ok(self.classifier.classify(error))
            }
        }
    }

    /// Send and decode a JSON success body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<RemoteOutcome<T>> {
        match self.send(method, path, query, body).await?.split() {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .map(RemoteOutcome::Success)
                .map_err(|e| CloudError::Decode(format!("{}: {}", path, e))),
            Ok(None) => Err(CloudError::Decode(format!(
                "{}: expected a response body",
                path
            ))),
            Err(failure) => Ok(failure),
        }
    }

    /// Send and ignore any success body
    pub async fn send_unit(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
    ) -> Result<RemoteOutcome<()>> {
        Ok(self.send(method, path, query, None).await?.map(|_| ()))
    }
}
