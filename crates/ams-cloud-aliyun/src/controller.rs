use ams_cloud::{
    CloudError, LogStoreUrls, RepoTagPage, RepoTagsQuery, Result, VendorController, VendorName,
};
use ams_core::{AppDetail, ProjectDetail, Task, TeamDetail};
use async_trait::async_trait;

/// Envs served by the production SLS project
const PRODUCTION_ENVS: [&str; 2] = ["prd", "pre"];

#[derive(Debug, Clone)]
pub struct AliyunSettings {
    pub region_id: String,
    pub disable_log_config: bool,
    pub sls_console_url: String,
    pub log_project_stg: String,
    pub log_project_prd: String,
}

impl Default for AliyunSettings {
    fn default() -> Self {
        Self {
            region_id: String::new(),
            disable_log_config: false,
            sls_console_url: "https://sls.console.aliyun.com".to_string(),
            log_project_stg: String::new(),
            log_project_prd: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AliyunController {
    settings: AliyunSettings,
}

impl AliyunController {
    pub fn new(settings: AliyunSettings) -> Self {
        Self { settings }
    }

    fn log_project(&self, env: &str) -> &str {
        if PRODUCTION_ENVS.contains(&env) {
            &self.settings.log_project_prd
        } else {
            &self.settings.log_project_stg
        }
    }

    fn log_store_url(&self, env: &str, log_store: &str, filter: &[(&str, String)]) -> String {
        let base = format!(
            "{}/lognext/project/{}/logsearch/{}",
            self.settings.sls_console_url,
            self.log_project(env),
            log_store
        );
        if filter.is_empty() {
            return base;
        }

        let query = filter
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join(" and ");
        format!("{}?queryString={}", base, query)
    }

    fn unsupported(&self, operation: &'static str) -> CloudError {
        CloudError::unsupported(self.name(), operation)
    }

    fn disabled_or_unsupported(&self, operation: &'static str) -> CloudError {
        if self.settings.disable_log_config {
            CloudError::LogConfigDisabled(self.name().to_string())
        } else {
            self.unsupported(operation)
        }
    }
}

#[async_trait]
impl VendorController for AliyunController {
    fn name(&self) -> VendorName {
        VendorName::Aliyun
    }

    fn region(&self) -> &str {
        &self.settings.region_id
    }

    async fn apply_log_config(
        &self,
        _project: &ProjectDetail,
        _app: &AppDetail,
        _task: &Task,
        _team: &TeamDetail,
    ) -> Result<()> {
        Err(self.disabled_or_unsupported("apply_log_config"))
    }

    async fn delete_log_config(&self, _cluster: &str, _env: &str, _app_id: &str) -> Result<()> {
        Err(self.disabled_or_unsupported("delete_log_config"))
    }

    async fn ensure_log_index(&self, _cluster: &str, _env: &str, _app: &AppDetail) -> Result<()> {
        Err(self.unsupported("ensure_log_index"))
    }

    async fn apply_log_dump(&self, _cluster: &str, _env: &str, _app_id: &str) -> Result<()> {
        Err(self.unsupported("apply_log_dump"))
    }

    async fn delete_log_dump(&self, _cluster: &str, _env: &str, _app_id: &str) -> Result<()> {
        Err(self.unsupported("delete_log_dump"))
    }

    async fn get_log_store_url(
        &self,
        _cluster: &str,
        project: &ProjectDetail,
        app: &AppDetail,
        env: &str,
    ) -> Result<LogStoreUrls> {
        let app_store = app
            .log_store_names
            .get(env)
            .map(String::as_str)
            .unwrap_or_default();

        Ok(LogStoreUrls {
            url: self.log_store_url(env, app_store, &[]),
            project_url: self.log_store_url(
                env,
                &project.log_store_name,
                &[("_container_name_", app.container_name(project))],
            ),
        })
    }

    async fn get_repo_tags(&self, _query: &RepoTagsQuery) -> Result<RepoTagPage> {
        Err(self.unsupported("get_repo_tags"))
    }
}
