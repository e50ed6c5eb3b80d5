use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::config::{self, TaggerConfig};
use crate::context::ContextStore;
use crate::error::Result;
use crate::interceptor::{ComponentId, DataAccessInterceptor, ServiceInterceptor};
use crate::listener::TaggingListener;
use crate::metrics::TaggerMetrics;
use crate::unit_of_work::UnitOfWorkManager;

/// Entry point wiring the store, the interceptors and the listener together.
///
/// All parts share one configuration handle, so [`Tagger::reload`] takes
/// effect on the next intercepted call or notification.
pub struct Tagger {
    config: Arc<ArcSwap<TaggerConfig>>,
    metrics: Arc<TaggerMetrics>,
    store: Arc<ContextStore>,
    listener: Arc<TaggingListener>,
}

impl Tagger {
    pub fn new(config: TaggerConfig, manager: Arc<dyn UnitOfWorkManager>) -> Result<Self> {
        Self::with_metrics(config, manager, Arc::new(TaggerMetrics::new()))
    }

    pub fn with_metrics(
        config: TaggerConfig,
        manager: Arc<dyn UnitOfWorkManager>,
        metrics: Arc<TaggerMetrics>,
    ) -> Result<Self> {
        config::validate(&config)?;

        let config = Arc::new(ArcSwap::from_pointee(config));
        let store = Arc::new(ContextStore::with_parts(
            manager,
            metrics.clone(),
            config.clone(),
        ));
        let listener = Arc::new(TaggingListener::new(config.clone(), metrics.clone())?);

        Ok(Self {
            config,
            metrics,
            store,
            listener,
        })
    }

    pub fn service(&self, component: impl Into<ComponentId>) -> ServiceInterceptor {
        ServiceInterceptor::new(component, self.store.clone())
    }

    pub fn data_access(&self, component: impl Into<ComponentId>) -> DataAccessInterceptor {
        DataAccessInterceptor::new(component, self.store.clone())
    }

    pub fn listener(&self) -> Arc<TaggingListener> {
        self.listener.clone()
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<TaggerMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> Arc<TaggerConfig> {
        self.config.load_full()
    }

    /// Swaps in a new configuration. An invalid one is rejected and the
    /// current configuration stays in place.
    pub fn reload(&self, config: TaggerConfig) -> Result<()> {
        config::validate(&config)?;
        self.config.store(Arc::new(config));
        self.listener.reload()?;
        info!("Tagger configuration reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::current_tag;
    use crate::error::TaggerError;
    use crate::unit_of_work::NoUnitOfWork;

    #[test]
    fn test_interceptors_share_the_store() {
        let tagger = Tagger::new(TaggerConfig::default(), Arc::new(NoUnitOfWork)).unwrap();
        let svc = tagger.service("serviceA");
        let repo = tagger.data_access(ComponentId::new("repoA"));

        let tag = svc.run("methodX", || repo.run("find", current_tag));
        assert_eq!(tag.unwrap().as_str(), "serviceA.methodX.repoA.find");
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = TaggerConfig::default();
        config.listener.tracked_kinds = vec!["(unclosed".to_string()];
        let result = Tagger::new(config, Arc::new(NoUnitOfWork));
        assert!(matches!(result, Err(TaggerError::Config(_))));
    }

    #[test]
    fn test_reload_switches_behaviour_and_keeps_old_on_error() {
        let tagger = Tagger::new(TaggerConfig::default(), Arc::new(NoUnitOfWork)).unwrap();
        let svc = tagger.service("serviceA");

        let mut disabled = TaggerConfig::default();
        disabled.enabled = false;
        tagger.reload(disabled).unwrap();
        assert!(svc.run("methodX", current_tag).is_none());

        let mut broken = TaggerConfig::default();
        broken.logging.level = String::new();
        assert!(tagger.reload(broken).is_err());
        assert!(!tagger.config().enabled);
    }
}
