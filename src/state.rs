use std::sync::Arc;

use crate::access::AccessGate;
use crate::config::AppConfig;
use crate::database::Store;
use crate::features::{FeatureFlags, SecretFlags};

/// Shared handles injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub flags: Arc<dyn FeatureFlags>,
    pub gate: AccessGate,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        let flags = Arc::new(SecretFlags::new(store.clone()));
        Self::with_flags(store, flags, config)
    }

    pub fn with_flags(store: Arc<dyn Store>, flags: Arc<dyn FeatureFlags>, config: AppConfig) -> Self {
        Self {
            gate: AccessGate::new(store.clone()),
            store,
            flags,
            config: Arc::new(config),
        }
    }
}
