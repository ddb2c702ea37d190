//! Operations context over a temporary state directory

use fman_config::Config;
use fman_events::{AppEvent, EventReceiver};
use fman_ops::{ConfigurationInfo, FeatureInfo, OpsContextBuilder, OpsCtx};
use fman_site::SiteRegistry;
use fman_state::LocalSite;
use fman_types::Activity;
use std::sync::Mutex;
use tempfile::TempDir;

pub struct TestEnvironment {
    pub state: TempDir,
    pub ctx: OpsCtx,
    receiver: Mutex<EventReceiver>,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::open(TempDir::new().unwrap(), config).await
    }

    async fn open(state: TempDir, config: Config) -> Self {
        let (tx, rx) = fman_events::channel();
        let registry = SiteRegistry::new();
        let local = LocalSite::open_with(
            state.path(),
            config.history.max_history_count,
            registry.clone(),
            Some(tx.clone()),
        )
        .await
        .unwrap()
        .with_environment(config.environment());
        let ctx = OpsContextBuilder::new()
            .with_local_site(local)
            .with_registry(registry)
            .with_event_sender(tx)
            .with_config(config)
            .build()
            .unwrap();
        Self {
            state,
            ctx,
            receiver: Mutex::new(rx),
        }
    }

    /// Simulate a process restart over the same state directory
    pub async fn reopen(self) -> Self {
        let config = self.ctx.config.clone();
        let state = self.state;
        drop(self.ctx);
        Self::open(state, config).await
    }

    /// Events emitted since the last call
    pub fn drain_events(&self) -> Vec<AppEvent> {
        let mut receiver = self.receiver.lock().unwrap();
        let mut events = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            events.push(message.event);
        }
        events
    }

    pub async fn features(&self) -> Vec<FeatureInfo> {
        fman_ops::list_features(&self.ctx, None).await.unwrap()
    }

    /// `id_version` of every configured feature, sorted
    pub async fn configured(&self) -> Vec<String> {
        self.features()
            .await
            .into_iter()
            .filter(|f| f.configured)
            .map(|f| format!("{}_{}", f.id, f.version))
            .collect()
    }

    /// History entries, oldest first, without preserved configurations
    pub async fn history(&self) -> Vec<ConfigurationInfo> {
        fman_ops::history(&self.ctx)
            .await
            .into_iter()
            .filter(|c| !c.preserved)
            .collect()
    }

    pub async fn current_id(&self) -> String {
        self.history()
            .await
            .into_iter()
            .find(|c| c.current)
            .map(|c| c.id)
            .unwrap()
    }

    /// Activities across the retained history, oldest first
    pub async fn activities(&self) -> Vec<Activity> {
        self.history()
            .await
            .into_iter()
            .flat_map(|c| c.activities)
            .collect()
    }
}
