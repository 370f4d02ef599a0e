//! 設定からコントロールプレーンを組み立てる

use ams_cloud::{AlertSink, ClusterMap, TracingAlertSink, VendorController, VendorName};
use ams_cloud_aliyun::{AliyunController, AliyunSettings};
use ams_cloud_huawei::{HuaweiController, HuaweiSettings};
use ams_config::{AmsConfig, ConsumerGroupConfig, VendorConfig};
use ams_controlplane::{
    AppOpHandler, ApprovalHandler, BusEventPublisher, ConsumerGroup, DryRunApplier,
    ExecutorPolicy, InProcessBus, MessageHandler, Scheduler, SchedulerSettings, Services,
    TransitionExecutor, VendorRegistry,
};
use ams_core::{LogStreamStore, MemoryStore, StateFile};
use anyhow::Context;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 未設定時に最終状態イベントを発行するトピック
const DEFAULT_APP_OP_TOPIC: &str = "ams-app-op";

pub struct Daemon {
    store: MemoryStore,
    state: Option<StateFile>,
    bus: Arc<InProcessBus>,
    executor: Arc<TransitionExecutor>,
    scheduler: Arc<Scheduler>,
    app_op: ConsumerGroupConfig,
    approval: ConsumerGroupConfig,
}

impl Daemon {
    pub async fn build(config: &AmsConfig) -> anyhow::Result<Self> {
        let state = config.state_file.as_ref().map(StateFile::new);
        let store = match &state {
            Some(state) => {
                let snapshot = state
                    .load()
                    .await
                    .with_context(|| format!("Failed to load state file {}", state.path().display()))?;
                info!(
                    path = %state.path().display(),
                    tasks = snapshot.tasks.len(),
                    streams = snapshot.streams.len(),
                    "State loaded"
                );
                MemoryStore::from_snapshot(snapshot)
            }
            None => MemoryStore::new(),
        };

        let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink);
        let vendors = build_vendors(config, Arc::new(store.clone()), alerts.clone())?;
        info!(routes = vendors.len(), "Vendor controllers ready");

        let bus = Arc::new(InProcessBus::new(config.consumers.partitions));
        let app_op_topic = config
            .consumers
            .app_op
            .topics
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_APP_OP_TOPIC);
        let events = Arc::new(BusEventPublisher::new(bus.clone(), app_op_topic));

        let services = Services::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            vendors,
            Arc::new(DryRunApplier),
            events,
            alerts,
        );
        let executor = Arc::new(TransitionExecutor::new(
            services,
            ExecutorPolicy::from(&config.scheduler),
        ));
        let scheduler = Arc::new(Scheduler::new(
            executor.clone(),
            SchedulerSettings::from(&config.scheduler),
        ));

        Ok(Self {
            store,
            state,
            bus,
            executor,
            scheduler,
            app_op: config.consumers.app_op.clone(),
            approval: config.consumers.approval.clone(),
        })
    }

    /// `shutdown` まで動かし、最後に状態を保存する
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut components = JoinSet::new();
        components.spawn(Arc::clone(&self.scheduler).run(shutdown.clone()));

        let handlers: [(&ConsumerGroupConfig, Arc<dyn MessageHandler>); 2] = [
            (&self.app_op, Arc::new(AppOpHandler::new(self.executor.clone()))),
            (&self.approval, Arc::new(ApprovalHandler::new(self.executor.clone()))),
        ];
        for (group, handler) in handlers {
            let consumer = ConsumerGroup::new(
                group.group_id.clone(),
                group.topics.clone(),
                self.bus.clone(),
                handler,
            );
            let shutdown = shutdown.clone();
            components.spawn(async move {
                let group_id = consumer.group_id().to_string();
                if let Err(err) = consumer.run(shutdown).await {
                    error!(%group_id, error = %err, "Consumer group failed");
                }
            });
        }

        info!("AMS daemon running");
        while let Some(joined) = components.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Component task aborted");
            }
        }

        self.save_state().await
    }

    async fn save_state(&self) -> anyhow::Result<()> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        let snapshot = self.store.snapshot().await;
        state
            .save(&snapshot)
            .await
            .with_context(|| format!("Failed to save state file {}", state.path().display()))?;
        info!(path = %state.path().display(), tasks = snapshot.tasks.len(), "State saved");
        Ok(())
    }
}

/// 設定されたベンダーごとにコントローラを1つ作り、担当クラスタへ割り当てる
pub fn build_vendors(
    config: &AmsConfig,
    streams: Arc<dyn LogStreamStore>,
    alerts: Arc<dyn AlertSink>,
) -> anyhow::Result<VendorRegistry> {
    let mut registry = VendorRegistry::new();

    for vendor in &config.vendors {
        let controller: Arc<dyn VendorController> = match vendor.name {
            VendorName::Huawei => Arc::new(
                huawei_controller(config, vendor, streams.clone(), alerts.clone())
                    .context("Failed to build Huawei controller")?,
            ),
            VendorName::Aliyun => Arc::new(AliyunController::new(AliyunSettings {
                region_id: vendor.region_id.clone(),
                disable_log_config: vendor.disable_log_config,
                sls_console_url: config.console.aliyun_sls_console_url.clone(),
                log_project_stg: config.console.aliyun_log_project_stg.clone(),
                log_project_prd: config.console.aliyun_log_project_prd.clone(),
            })),
        };

        for (env, cluster) in config.clusters_of(vendor.name) {
            registry.register(env, cluster.name.clone(), controller.clone());
        }
    }

    Ok(registry)
}

fn huawei_controller(
    config: &AmsConfig,
    vendor: &VendorConfig,
    streams: Arc<dyn LogStreamStore>,
    alerts: Arc<dyn AlertSink>,
) -> ams_cloud::Result<HuaweiController> {
    let mut clusters = ClusterMap::new();
    for (env, cluster) in config.clusters_of(VendorName::Huawei) {
        clusters.insert(env, cluster.name.clone(), cluster.vendor_settings.clone());
    }

    let settings = HuaweiSettings {
        project_id: vendor.region_id.clone(),
        disable_log_config: vendor.disable_log_config,
        console_url: config.console.huawei_console_url.clone(),
        stream_name_prefix: config.console.stream_name_prefix.clone(),
        registry_namespace: vendor.registry_namespace.clone(),
    };

    HuaweiController::connect(
        settings,
        clusters,
        &vendor.access_key_id,
        &vendor.access_key_secret,
        &vendor.log_endpoint,
        &vendor.registry_endpoint,
        streams,
        alerts,
    )
}
