//! Idempotent create / recover / delete of LTS log streams and mapping rules
//!
//! LTS offers create and delete but no lookup by name. Duplicates are only
//! reported through error codes, so every create falls back to a listing scan
//! when the vendor answers "already exists". The stream ID is persisted before
//! the dependent rule is created.

use crate::lts::{LtsApi, MappingRule};
use ams_cloud::{Alert, AlertSink, CloudError, RemoteOutcome, Result};
use ams_core::{LogStreamRecord, LogStreamStore, StreamKey};
use std::sync::Arc;

const ASSOCIATED_STREAM_CATEGORY: &str = "deleteLogStream";

#[derive(Clone)]
pub struct ProvisioningProtocol {
    api: Arc<dyn LtsApi>,
    streams: Arc<dyn LogStreamStore>,
    alerts: Arc<dyn AlertSink>,
}

impl ProvisioningProtocol {
    pub fn new(
        api: Arc<dyn LtsApi>,
        streams: Arc<dyn LogStreamStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            api,
            streams,
            alerts,
        }
    }

    /// Ensure a stream exists for `key` and its ID is stored locally
    ///
    /// A stored record wins; otherwise the stream is created, or recovered by
    /// name from the group listing when it already exists remotely.
    pub async fn ensure_stream(
        &self,
        key: &StreamKey,
        log_group_id: &str,
        stream_name: &str,
        ttl_in_days: Option<u32>,
    ) -> Result<LogStreamRecord> {
        if let Some(record) = self.streams.find_stream(key).await? {
            tracing::debug!(stream_id = %record.stream_id, "Log stream of {} already recorded", key);
            return Ok(record);
        }

        let stream_id = match self
            .api
            .create_stream(log_group_id, stream_name, ttl_in_days)
            .await?
        {
            RemoteOutcome::Success(id) => id,
            RemoteOutcome::AlreadyExists(error) => {
                tracing::info!(%error, "Log stream {} already exists, recovering its ID", stream_name);
                self.recover_stream_id(log_group_id, stream_name).await?
            }
            RemoteOutcome::NotFound(error)
            | RemoteOutcome::Associated(error)
            | RemoteOutcome::Other(error) => return Err(CloudError::Remote(error)),
        };

        // must land before any rule referencing the stream is created
        let record = LogStreamRecord::new(key.clone(), stream_name, stream_id);
        self.streams.save_stream(record.clone()).await?;
        tracing::info!(stream_id = %record.stream_id, "Recorded log stream {}", stream_name);
        Ok(record)
    }

    async fn recover_stream_id(&self, log_group_id: &str, stream_name: &str) -> Result<String> {
        let streams = self.api.list_streams(log_group_id).await?.into_result()?;
        streams
            .into_iter()
            .find(|s| s.log_stream_name == stream_name)
            .map(|s| s.log_stream_id)
            .ok_or_else(|| CloudError::RecoveryFailed {
                resource: "log stream",
                name: stream_name.to_string(),
            })
    }

    /// Ensure the mapping rule feeding `record`'s stream exists and store its ID
    pub async fn ensure_rule(
        &self,
        record: &LogStreamRecord,
        rule: &MappingRule,
        log_group_name: &str,
    ) -> Result<String> {
        let rule_id = match self.api.create_rule(rule).await? {
            RemoteOutcome::Success(id) => id,
            RemoteOutcome::AlreadyExists(error) => {
                tracing::info!(%error, "Mapping rule {} already exists, recovering its ID", rule.rule_name);
                self.recover_rule_id(record, log_group_name).await?
            }
            RemoteOutcome::NotFound(error)
            | RemoteOutcome::Associated(error)
            | RemoteOutcome::Other(error) => return Err(CloudError::Remote(error)),
        };

        self.streams.set_rule_id(&record.key, &rule_id).await?;
        Ok(rule_id)
    }

    async fn recover_rule_id(&self, record: &LogStreamRecord, log_group_name: &str) -> Result<String> {
        let rules = self
            .api
            .list_rules(log_group_name, &record.stream_name)
            .await?
            .into_result()?;
        rules
            .into_iter()
            .find(|rule| rule.targets_stream(&record.stream_id))
            .map(|rule| rule.rule_id)
            .ok_or_else(|| CloudError::RecoveryFailed {
                resource: "mapping rule",
                name: record.stream_name.clone(),
            })
    }

    /// Delete the rule, then the stream, then the local record
    ///
    /// Missing remote resources count as deleted. A stream blocked by an
    /// associated transfer is reported to the alert sink and the local record
    /// is dropped anyway.
    pub async fn teardown(&self, key: &StreamKey, log_group_id: &str) -> Result<()> {
        let Some(record) = self.streams.find_stream(key).await? else {
            tracing::debug!("No log stream recorded for {}", key);
            return Ok(());
        };

        if let Some(rule_id) = &record.rule_id {
            match self.api.delete_rule(rule_id).await? {
                RemoteOutcome::Success(()) => {}
                RemoteOutcome::NotFound(_) => {
                    tracing::debug!(rule_id = %rule_id, "Mapping rule already gone");
                }
                RemoteOutcome::AlreadyExists(error)
                | RemoteOutcome::Associated(error)
                | RemoteOutcome::Other(error) => return Err(CloudError::Remote(error)),
            }
        }

        match self.api.delete_stream(log_group_id, &record.stream_id).await? {
            RemoteOutcome::Success(()) => {}
            RemoteOutcome::NotFound(_) => {
                tracing::debug!(stream_id = %record.stream_id, "Log stream already gone");
            }
            RemoteOutcome::Associated(error) => {
                tracing::error!(
                    stream_id = %record.stream_id,
                    %error,
                    "Log stream is associated with a transfer and was left behind"
                );
                self.alerts.capture(
                    Alert::new(ASSOCIATED_STREAM_CATEGORY, &error)
                        .with("stream_id", record.stream_id.clone()),
                );
            }
            RemoteOutcome::AlreadyExists(error) | RemoteOutcome::Other(error) => {
                return Err(CloudError::Remote(error));
            }
        }

        self.streams.delete_stream(key).await?;
        Ok(())
    }
}
