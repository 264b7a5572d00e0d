//! Integration test common infrastructure.
//!
//! Starts an engine wired to an in-memory enforcer and a channel notifier so
//! tests can assert on both sides of the engine.

use ipac_ng::{ChannelNotifier, Engine, EngineConfig, Notification, RecordingEnforcer};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct TestEngine {
    pub engine: Engine,
    pub enforcer: Arc<RecordingEnforcer>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestEngine {
    /// Start an engine whose scheduler never fires during a test.
    pub fn start(config: EngineConfig) -> Self {
        let enforcer = Arc::new(RecordingEnforcer::new());
        let (notifier, notifications) = ChannelNotifier::channel();
        let engine = Engine::start(
            EngineConfig {
                cleanup_interval_seconds: 3600,
                ..config
            },
            enforcer.clone(),
            Some(Arc::new(notifier)),
        )
        .expect("engine should start");
        Self {
            engine,
            enforcer,
            notifications,
        }
    }

    /// Notifications delivered so far.
    #[allow(dead_code)]
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}
