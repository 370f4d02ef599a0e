//! SWR (Software Repository for Containers) API

use crate::http::SignedClient;
use crate::signer::Signer;
use ams_cloud::{CloudError, OutcomeClassifier, OutcomeKind, RemoteOutcome, RepoTag, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Method;
use serde::Deserialize;

/// SWR reports a missing repository by status only
const SWR_CODES: OutcomeClassifier =
    OutcomeClassifier::new(&[]).with_statuses(&[(404, OutcomeKind::NotFound)]);

const IMAGE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Registry operations used by the controller
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Number of images in the repository
    async fn image_count(&self, namespace: &str, repository: &str) -> Result<RemoteOutcome<i64>>;

    /// Tags ordered by update time, newest first
    async fn list_tags(
        &self,
        namespace: &str,
        repository: &str,
        limit: u32,
        offset: u32,
    ) -> Result<RemoteOutcome<Vec<RepoTag>>>;
}

#[derive(Deserialize)]
struct ShowRepositoryResponse {
    #[serde(default)]
    num_images: i64,
}

#[derive(Deserialize)]
struct TagEntry {
    #[serde(default)]
    image_id: String,
    #[serde(rename = "Tag")]
    tag: String,
    #[serde(default)]
    repo_id: i64,
    created: String,
    updated: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    digest: String,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, IMAGE_TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| CloudError::Decode(format!("image time {}: {}", value, e)))
}

impl TryFrom<TagEntry> for RepoTag {
    type Error = CloudError;

    fn try_from(entry: TagEntry) -> Result<Self> {
        Ok(RepoTag {
            created_at: parse_time(&entry.created)?,
            updated_at: parse_time(&entry.updated)?,
            image_id: entry.image_id,
            tag: entry.tag,
            repo_id: entry.repo_id,
            size: entry.size,
            digest: entry.digest,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpSwrApi {
    client: SignedClient,
}

impl HttpSwrApi {
    pub fn new(base_url: &str, signer: Signer) -> Result<Self> {
        Ok(Self {
            client: SignedClient::new(base_url, signer, SWR_CODES)?,
        })
    }
}

#[async_trait]
impl RegistryApi for HttpSwrApi {
    async fn image_count(&self, namespace: &str, repository: &str) -> Result<RemoteOutcome<i64>> {
        let path = format!("/v2/manage/namespaces/{}/repos/{}", namespace, repository);
        let outcome: RemoteOutcome<ShowRepositoryResponse> =
            self.client.send_json(Method::GET, &path, &[], None).await?;
        Ok(outcome.map(|repo| repo.num_images))
    }

    async fn list_tags(
        &self,
        namespace: &str,
        repository: &str,
        limit: u32,
        offset: u32,
    ) -> Result<RemoteOutcome<Vec<RepoTag>>> {
        let path = format!(
            "/v2/manage/namespaces/{}/repos/{}/tags",
            namespace, repository
        );
        let query = [
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
            ("order_column".to_string(), "updated_at".to_string()),
            ("order_type".to_string(), "desc".to_string()),
        ];
        let outcome: RemoteOutcome<Vec<TagEntry>> =
            self.client.send_json(Method::GET, &path, &query, None).await?;

        match outcome.split() {
            Ok(entries) => entries
                .into_iter()
                .map(RepoTag::try_from)
                .collect::<Result<Vec<_>>>()
                .map(RemoteOutcome::Success),
            Err(failure) => Ok(failure),
        }
    }
}
