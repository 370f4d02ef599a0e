//! Huawei Cloud controller

use crate::lts::{HttpLtsApi, LtsApi, MappingRule};
use crate::naming;
use crate::protocol::ProvisioningProtocol;
use crate::signer::Signer;
use crate::swr::{HttpSwrApi, RegistryApi};
use ams_cloud::{
    AlertSink, CloudError, ClusterMap, LogStoreUrls, RemoteOutcome, RepoTagPage, RepoTagsQuery,
    Result, VendorController, VendorName,
};
use ams_core::{AppDetail, LogStreamStore, ProjectDetail, StreamKey, Task, TeamDetail};
use async_trait::async_trait;
use std::sync::Arc;

/// Static settings of the Huawei controller
#[derive(Debug, Clone)]
pub struct HuaweiSettings {
    /// Region project ID, part of every LTS path
    pub project_id: String,
    pub disable_log_config: bool,
    pub console_url: String,
    pub stream_name_prefix: String,
    pub registry_namespace: String,
}

impl Default for HuaweiSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            disable_log_config: false,
            console_url: "https://console.huaweicloud.com".to_string(),
            stream_name_prefix: String::new(),
            registry_namespace: "qt-apps".to_string(),
        }
    }
}

pub struct HuaweiController {
    settings: HuaweiSettings,
    clusters: ClusterMap,
    protocol: ProvisioningProtocol,
    streams: Arc<dyn LogStreamStore>,
    registry: Arc<dyn RegistryApi>,
}

fn endpoint_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

impl HuaweiController {
    pub fn new(
        settings: HuaweiSettings,
        clusters: ClusterMap,
        lts: Arc<dyn LtsApi>,
        registry: Arc<dyn RegistryApi>,
        streams: Arc<dyn LogStreamStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            protocol: ProvisioningProtocol::new(lts, streams.clone(), alerts),
            settings,
            clusters,
            streams,
            registry,
        }
    }

    /// Build a controller talking to LTS and SWR over HTTPS
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        settings: HuaweiSettings,
        clusters: ClusterMap,
        access_key_id: &str,
        access_key_secret: &str,
        log_endpoint: &str,
        registry_endpoint: &str,
        streams: Arc<dyn LogStreamStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self> {
        let signer = Signer::new(access_key_id, access_key_secret);
        let lts = HttpLtsApi::new(
            &endpoint_url(log_endpoint),
            settings.project_id.clone(),
            signer.clone(),
        )?;
        let registry = HttpSwrApi::new(&endpoint_url(registry_endpoint), signer)?;

        Ok(Self::new(
            settings,
            clusters,
            Arc::new(lts),
            Arc::new(registry),
            streams,
            alerts,
        ))
    }

    fn stream_name(&self, project: &ProjectDetail, app: &AppDetail, env: &str, cluster: &str) -> String {
        naming::stream_name(
            &self.settings.stream_name_prefix,
            &project.name,
            &app.name,
            env,
            cluster,
        )
    }
}

#[async_trait]
impl VendorController for HuaweiController {
    fn name(&self) -> VendorName {
        VendorName::Huawei
    }

    fn region(&self) -> &str {
        &self.settings.project_id
    }

    async fn apply_log_config(
        &self,
        project: &ProjectDetail,
        app: &AppDetail,
        task: &Task,
        _team: &TeamDetail,
    ) -> Result<()> {
        if self.settings.disable_log_config {
            return Err(CloudError::LogConfigDisabled(self.name().to_string()));
        }

        let cluster = self.clusters.get(&task.env_name, &task.cluster_name)?;
        let key = StreamKey::new(&app.id, &task.cluster_name, &task.env_name);
        let stream_name = self.stream_name(project, app, &task.env_name, &task.cluster_name);

        let record = self
            .protocol
            .ensure_stream(&key, &cluster.log_group_id, &stream_name, app.log_ttl_in_days)
            .await?;

        let namespace = task.effective_namespace();
        let rule = MappingRule::for_container(
            naming::rule_name(&project.name, &app.name, namespace, &task.cluster_name),
            cluster,
            namespace,
            app.container_name(project),
            &record.stream_id,
            &record.stream_name,
        );
        let rule_id = self
            .protocol
            .ensure_rule(&record, &rule, &cluster.log_group_name)
            .await?;

        tracing::info!(
            stream_id = %record.stream_id,
            rule_id = %rule_id,
            "Log config applied for {}",
            key
        );
        Ok(())
    }

    async fn delete_log_config(&self, cluster: &str, env: &str, app_id: &str) -> Result<()> {
        let config = self.clusters.get(env, cluster)?;
        self.protocol
            .teardown(&StreamKey::new(app_id, cluster, env), &config.log_group_id)
            .await
    }

    async fn ensure_log_index(&self, cluster: &str, env: &str, app: &AppDetail) -> Result<()> {
        // LTS structuring does not fit the current log format
        tracing::info!(
            "Log index phase skipped for app {} in cluster {} and env {}",
            app.id,
            cluster,
            env
        );
        Ok(())
    }

    async fn apply_log_dump(&self, cluster: &str, env: &str, app_id: &str) -> Result<()> {
        tracing::info!(
            "Log dump create phase skipped for app {} in cluster {} and env {}",
            app_id,
            cluster,
            env
        );
        Ok(())
    }

    async fn delete_log_dump(&self, cluster: &str, env: &str, app_id: &str) -> Result<()> {
        tracing::info!(
            "Log dump delete phase skipped for app {} in cluster {} and env {}",
            app_id,
            cluster,
            env
        );
        Ok(())
    }

    async fn get_log_store_url(
        &self,
        cluster: &str,
        project: &ProjectDetail,
        app: &AppDetail,
        env: &str,
    ) -> Result<LogStoreUrls> {
        let config = self.clusters.get(env, cluster)?;
        let key = StreamKey::new(&app.id, cluster, env);
        let Some(record) = self.streams.find_stream(&key).await? else {
            return Ok(LogStoreUrls::default());
        };

        // the console filters by topicId; topicName is only displayed
        let url = format!(
            "{}/lts/?region={}#/cts/logEventsLeftMenu/events?groupId={}&groupName={}&topicId={}&topicName={}&epsId=0",
            self.settings.console_url,
            config.region,
            config.log_group_id,
            config.log_group_name,
            record.stream_id,
            self.stream_name(project, app, env, cluster),
        );

        Ok(LogStoreUrls {
            project_url: url.clone(),
            url,
        })
    }

    async fn get_repo_tags(&self, query: &RepoTagsQuery) -> Result<RepoTagPage> {
        let namespace = &self.settings.registry_namespace;

        // a missing repository must not fail image builds
        let total = match self
            .registry
            .image_count(namespace, &query.project_name)
            .await?
        {
            RemoteOutcome::Success(count) if count > 0 => count,
            RemoteOutcome::Success(_) | RemoteOutcome::NotFound(_) => {
                return Ok(RepoTagPage::default());
            }
            RemoteOutcome::AlreadyExists(error)
            | RemoteOutcome::Associated(error)
            | RemoteOutcome::Other(error) => return Err(CloudError::Remote(error)),
        };

        let tags = self
            .registry
            .list_tags(namespace, &query.project_name, query.size, query.offset())
            .await?
            .into_result()?;

        Ok(RepoTagPage {
            tags,
            total: usize::try_from(total).unwrap_or_default(),
        })
    }
}
