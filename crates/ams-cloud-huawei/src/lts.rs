//! LTS (Log Tank Service) API

use crate::http::SignedClient;
use crate::signer::Signer;
use ams_cloud::{
    ClusterConfig, CloudError, OutcomeClassifier, OutcomeKind, RemoteOutcome, Result,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// LTS error codes the provisioning protocol reacts to
pub const LTS_CODES: OutcomeClassifier = OutcomeClassifier::new(&[
    // duplicate log stream name
    ("LTS.0205", OutcomeKind::AlreadyExists),
    // stream is referenced by a log transfer
    ("LTS.0207", OutcomeKind::Associated),
    ("LTS.0208", OutcomeKind::NotFound),
    // duplicate AOM mapping rule name
    ("LTS.0740", OutcomeKind::AlreadyExists),
    // invalid (missing) mapping rule ID
    ("LTS.0745", OutcomeKind::NotFound),
]);

const DEPLOYMENT_TAG_ALL: &str = "__ALL_DEPLOYMENTS__";
const FILE_NAME_TAG_ALL: &str = "__ALL_FILES__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStream {
    pub log_stream_id: String,
    pub log_stream_name: String,
}

/// Stream a mapping rule forwards into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStream {
    #[serde(default)]
    pub target_log_group_id: String,
    #[serde(default)]
    pub target_log_group_name: String,
    #[serde(default)]
    pub target_log_stream_id: String,
    #[serde(default)]
    pub target_log_stream_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    pub file_name: String,
    #[serde(default)]
    pub log_stream_info: TargetStream,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployments: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub files: Vec<RuleFile>,
}

/// AOM to LTS mapping rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub rule_name: String,
    pub rule_info: RuleInfo,
}

impl MappingRule {
    /// Rule collecting every file of `container_name` in `namespace` into the
    /// given stream
    pub fn for_container(
        rule_name: impl Into<String>,
        cluster: &ClusterConfig,
        namespace: impl Into<String>,
        container_name: impl Into<String>,
        stream_id: &str,
        stream_name: &str,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            rule_info: RuleInfo {
                cluster_id: cluster.cluster_id.clone(),
                cluster_name: cluster.cluster_name_in_vendor.clone(),
                deployments: vec![DEPLOYMENT_TAG_ALL.to_string()],
                container_name: container_name.into(),
                namespace: namespace.into(),
                files: vec![RuleFile {
                    file_name: FILE_NAME_TAG_ALL.to_string(),
                    // both ID and name are required for the rule to bind
                    log_stream_info: TargetStream {
                        target_log_group_id: cluster.log_group_id.clone(),
                        target_log_group_name: cluster.log_group_name.clone(),
                        target_log_stream_id: stream_id.to_string(),
                        target_log_stream_name: stream_name.to_string(),
                    },
                }],
            },
        }
    }
}

/// Listed mapping rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRuleEntry {
    pub rule_id: String,
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub rule_info: RuleInfo,
}

impl MappingRuleEntry {
    pub fn targets_stream(&self, stream_id: &str) -> bool {
        self.rule_info
            .files
            .iter()
            .any(|file| file.log_stream_info.target_log_stream_id == stream_id)
    }
}

/// LTS operations used by the provisioning protocol
#[async_trait]
pub trait LtsApi: Send + Sync {
    /// Returns the new stream ID
    async fn create_stream(
        &self,
        log_group_id: &str,
        stream_name: &str,
        ttl_in_days: Option<u32>,
    ) -> Result<RemoteOutcome<String>>;

    async fn list_streams(&self, log_group_id: &str) -> Result<RemoteOutcome<Vec<LogStream>>>;

    async fn delete_stream(&self, log_group_id: &str, stream_id: &str)
    -> Result<RemoteOutcome<()>>;

    /// Returns the new rule ID
    async fn create_rule(&self, rule: &MappingRule) -> Result<RemoteOutcome<String>>;

    async fn list_rules(
        &self,
        log_group_name: &str,
        stream_name: &str,
    ) -> Result<RemoteOutcome<Vec<MappingRuleEntry>>>;

    async fn delete_rule(&self, rule_id: &str) -> Result<RemoteOutcome<()>>;
}

#[derive(Serialize)]
struct CreateStreamRequest<'a> {
    log_stream_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_in_days: Option<u32>,
}

#[derive(Deserialize)]
struct CreateStreamResponse {
    log_stream_id: String,
}

#[derive(Deserialize)]
struct ListStreamsResponse {
    #[serde(default)]
    log_streams: Vec<LogStream>,
}

#[derive(Serialize)]
struct CreateRuleRequest<'a> {
    #[serde(flatten)]
    rule: &'a MappingRule,
    project_id: &'a str,
}

#[derive(Deserialize)]
struct CreatedRule {
    rule_id: String,
}

/// LTS over HTTPS with AK/SK signing
#[derive(Debug, Clone)]
pub struct HttpLtsApi {
    client: SignedClient,
    project_id: String,
}

impl HttpLtsApi {
    pub fn new(base_url: &str, project_id: impl Into<String>, signer: Signer) -> Result<Self> {
        Ok(Self {
            client: SignedClient::new(base_url, signer, LTS_CODES)?,
            project_id: project_id.into(),
        })
    }

    fn streams_path(&self, log_group_id: &str) -> String {
        format!("/v2/{}/groups/{}/streams", self.project_id, log_group_id)
    }

    fn rules_path(&self) -> String {
        format!("/v2/{}/lts/aom-mapping", self.project_id)
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| CloudError::Decode(e.to_string()))
}

#[async_trait]
impl LtsApi for HttpLtsApi {
    async fn create_stream(
        &self,
        log_group_id: &str,
        stream_name: &str,
        ttl_in_days: Option<u32>,
    ) -> Result<RemoteOutcome<String>> {
        let body = to_body(&CreateStreamRequest {
            log_stream_name: stream_name,
            ttl_in_days,
        })?;
        let outcome: RemoteOutcome<CreateStreamResponse> = self
            .client
            .send_json(Method::POST, &self.streams_path(log_group_id), &[], Some(body))
            .await?;
        Ok(outcome.map(|created| created.log_stream_id))
    }

    async fn list_streams(&self, log_group_id: &str) -> Result<RemoteOutcome<Vec<LogStream>>> {
        let outcome: RemoteOutcome<ListStreamsResponse> = self
            .client
            .send_json(Method::GET, &self.streams_path(log_group_id), &[], None)
            .await?;
        Ok(outcome.map(|list| list.log_streams))
    }

    async fn delete_stream(
        &self,
        log_group_id: &str,
        stream_id: &str,
    ) -> Result<RemoteOutcome<()>> {
        let path = format!("{}/{}", self.streams_path(log_group_id), stream_id);
        self.client.send_unit(Method::DELETE, &path, &[]).await
    }

    async fn create_rule(&self, rule: &MappingRule) -> Result<RemoteOutcome<String>> {
        let body = to_body(&CreateRuleRequest {
            rule,
            project_id: &self.project_id,
        })?;
        let query = [("isBatch".to_string(), "false".to_string())];
        // the response is an array even for a single rule
        let outcome: RemoteOutcome<Vec<CreatedRule>> = self
            .client
            .send_json(Method::POST, &self.rules_path(), &query, Some(body))
            .await?;

        match outcome.split() {
            Ok(mut created) if created.len() == 1 => {
                Ok(RemoteOutcome::Success(created.remove(0).rule_id))
            }
            Ok(created) => Err(CloudError::Decode(format!(
                "unexpected aom-mapping response length({})",
                created.len()
            ))),
            Err(failure) => Ok(failure),
        }
    }

    async fn list_rules(
        &self,
        log_group_name: &str,
        stream_name: &str,
    ) -> Result<RemoteOutcome<Vec<MappingRuleEntry>>> {
        let query = [
            ("log_group_name".to_string(), log_group_name.to_string()),
            ("log_stream_name".to_string(), stream_name.to_string()),
        ];
        self.client
            .send_json(Method::GET, &self.rules_path(), &query, None)
            .await
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<RemoteOutcome<()>> {
        let query = [("id".to_string(), rule_id.to_string())];
        self.client
            .send_unit(Method::DELETE, &self.rules_path(), &query)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_body_shape() {
        let cluster = ClusterConfig {
            cluster_id: "cid".into(),
            cluster_name_in_vendor: "cce-zeus".into(),
            log_group_id: "gid".into(),
            log_group_name: "gname".into(),
            region: "cn-east-3".into(),
        };
        let rule = MappingRule::for_container("AMS-log-p-a-stg-zeus", &cluster, "stg", "p-a", "sid", "sname");
        let body = serde_json::to_value(CreateRuleRequest {
            rule: &rule,
            project_id: "proj",
        })
        .unwrap();

        assert_eq!(body["rule_name"], "AMS-log-p-a-stg-zeus");
        assert_eq!(body["project_id"], "proj");
        assert_eq!(body["rule_info"]["cluster_name"], "cce-zeus");
        assert_eq!(body["rule_info"]["deployments"][0], "__ALL_DEPLOYMENTS__");
        assert_eq!(body["rule_info"]["files"][0]["file_name"], "__ALL_FILES__");
        assert_eq!(
            body["rule_info"]["files"][0]["log_stream_info"]["target_log_stream_id"],
            "sid"
        );
    }

    #[test]
    fn test_create_stream_omits_missing_ttl() {
        let body = serde_json::to_value(CreateStreamRequest {
            log_stream_name: "s",
            ttl_in_days: None,
        })
        .unwrap();
        assert!(body.get("ttl_in_days").is_none());
    }

    #[test]
    fn test_entry_targets_stream() {
        let entry: MappingRuleEntry = serde_json::from_value(serde_json::json!({
            "rule_id": "r1",
            "rule_info": {"files": [{"file_name": "__ALL_FILES__",
                "log_stream_info": {"target_log_stream_id": "s1"}}]}
        }))
        .unwrap();
        assert!(entry.targets_stream("s1"));
        assert!(!entry.targets_stream("s2"));
    }
}
