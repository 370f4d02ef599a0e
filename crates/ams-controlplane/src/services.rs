//! スケジューラ・エグゼキュータ・コンシューマに渡す共有コラボレータ

use crate::events::EventPublisher;
use crate::locks::TaskLocks;
use crate::vendors::VendorRegistry;
use crate::workload::WorkloadApplier;
use ams_cloud::AlertSink;
use ams_core::{AppCatalog, TaskStore};
use std::sync::Arc;

/// 起動時に1度だけ組み立て、各コンポーネントへクローンして渡す
#[derive(Clone)]
pub struct Services {
    pub tasks: Arc<dyn TaskStore>,
    pub catalog: Arc<dyn AppCatalog>,
    pub vendors: Arc<VendorRegistry>,
    pub applier: Arc<dyn WorkloadApplier>,
    pub events: Arc<dyn EventPublisher>,
    pub alerts: Arc<dyn AlertSink>,
    pub locks: TaskLocks,
}

impl Services {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        catalog: Arc<dyn AppCatalog>,
        vendors: VendorRegistry,
        applier: Arc<dyn WorkloadApplier>,
        events: Arc<dyn EventPublisher>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            tasks,
            catalog,
            vendors: Arc::new(vendors),
            applier,
            events,
            alerts,
            locks: TaskLocks::new(),
        }
    }
}
