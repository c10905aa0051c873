//! Host event bus - named events delivered to scoped listeners

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const BUS_CAPACITY: usize = 64;

/// A named event emitted by the host process
#[derive(Debug, Clone)]
pub struct HostEvent {
    pub name: String,
    /// Listeners must not rely on the payload
    pub payload: Option<Value>,
}

/// Process-wide event bus
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<HostEvent>>,
    runtime: Handle,
}

impl EventBus {
    /// Create a bus bound to the current tokio runtime
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx, runtime }
    }

    /// Emit a named event to every registered listener
    pub fn emit(&self, name: &str, payload: Option<Value>) {
        let event = Arc::new(HostEvent {
            name: name.to_string(),
            payload,
        });
        match self.tx.send(event) {
            Ok(receivers) => trace!("Emitted '{}' to {} listener(s)", name, receivers),
            Err(_) => debug!("Emitted '{}' with no listeners", name),
        }
    }

    /// Register a listener for events named `name`.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or stopped. The handler runs on the bus task and should hand
    /// long work off to its own task.
    pub fn listen<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        // Subscribe before spawning so events emitted right after `listen`
        // returns are not lost.
        let mut rx = self.tx.subscribe();
        let name = name.to_string();
        let task_name = name.clone();

        let task = self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.name == task_name => {
                        trace!("Delivering '{}'", event.name);
                        handler(&event);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Listener for '{}' lagged, {} event(s) dropped", task_name, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        debug!("Registered listener for '{}'", name);
        Subscription {
            name,
            task: Some(task),
        }
    }

    /// Number of live listeners across all event names
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Scoped listener registration, released on drop
pub struct Subscription {
    name: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn event_name(&self) -> &str {
        &self.name
    }

    /// Deregister the listener
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Released listener for '{}'", self.name);
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn listener_only_sees_its_own_event_name() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = bus.listen("restart_clash", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit("restart_clash", None);
        bus.emit("something_else", None);
        bus.emit("restart_clash", Some(serde_json::json!({ "ignored": true })));
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_subscription_releases_listener() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus.listen("restart_clash", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.listener_count(), 1);

        drop(sub);
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.emit("restart_clash", None);
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn emit_without_listeners_is_harmless() {
        let bus = EventBus::new();
        bus.emit("restart_clash", None);
        assert_eq!(bus.listener_count(), 0);
    }
}
