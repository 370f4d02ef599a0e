//! クラスタからベンダーコントローラへの振り分け

use crate::error::{ControlPlaneError, Result};
use ams_cloud::VendorController;
use std::collections::HashMap;
use std::sync::Arc;

/// (環境, クラスタ) ごとの担当コントローラ (起動時に確定)
#[derive(Default, Clone)]
pub struct VendorRegistry {
    routes: HashMap<(String, String), Arc<dyn VendorController>>,
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        env: impl Into<String>,
        cluster: impl Into<String>,
        controller: Arc<dyn VendorController>,
    ) {
        self.routes.insert((env.into(), cluster.into()), controller);
    }

    pub fn with(
        mut self,
        env: impl Into<String>,
        cluster: impl Into<String>,
        controller: Arc<dyn VendorController>,
    ) -> Self {
        self.register(env, cluster, controller);
        self
    }

    pub fn controller(&self, env: &str, cluster: &str) -> Result<Arc<dyn VendorController>> {
        self.routes
            .get(&(env.to_string(), cluster.to_string()))
            .cloned()
            .ok_or_else(|| ControlPlaneError::VendorNotConfigured {
                env: env.to_string(),
                cluster: cluster.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<String> = self
            .routes
            .iter()
            .map(|((env, cluster), c)| format!("{}/{}={}", env, cluster, c.name()))
            .collect();
        routes.sort();
        f.debug_struct("VendorRegistry")
            .field("routes", &routes)
            .finish()
    }
}
