//! Push subscription.
//!
//! Periodically pulls the watched documents from a [`PushSource`] and hands
//! the resulting events to the session's `on_event` entry point. A fetch
//! returns the whole sensor collection every time, so a [`ChangeFilter`]
//! narrows it down to the documents that actually changed: one history
//! sample per device update, not per poll. Fetch failures are logged and
//! skipped; the session keeps its last known state.

use crate::backend::PushSource;
use crate::domain::SensorKey;
use crate::inbound::InboundEvent;
use crate::session::SessionHandle;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Last sensor document seen per sensor type.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last: BTreeMap<SensorKey, Value>,
}

impl ChangeFilter {
    /// Expand collection reads into one `SensorChanged` per new or modified
    /// document. Control documents and single changes pass through.
    pub fn apply(&mut self, events: Vec<InboundEvent>) -> Vec<InboundEvent> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            match event {
                InboundEvent::SensorDocuments(docs) => {
                    for doc in docs {
                        if self.remember(&doc) {
                            out.push(InboundEvent::SensorChanged(doc));
                        }
                    }
                }
                InboundEvent::SensorChanged(doc) => {
                    self.remember(&doc);
                    out.push(InboundEvent::SensorChanged(doc));
                }
                other => out.push(other),
            }
        }
        out
    }

    /// true when `doc` differs from the last one stored for its sensor.
    /// documents of unknown type are never new.
    fn remember(&mut self, doc: &Value) -> bool {
        let Some(key) = doc
            .get("type")
            .and_then(Value::as_str)
            .and_then(SensorKey::from_wire)
        else {
            return false;
        };
        if self.last.get(&key) == Some(doc) {
            return false;
        }
        self.last.insert(key, doc.clone());
        true
    }
}

/// Handle to a running poll loop. Dropping it also stops the loop.
#[derive(Debug, Default)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// A subscription that was never started. `unsubscribe` on it is a no-op.
    pub fn inactive() -> Self {
        Self { task: None }
    }

    pub fn start<S: PushSource>(
        source: Arc<S>,
        session: SessionHandle,
        interval: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut failing = false;
            let mut changes = ChangeFilter::default();

            loop {
                ticker.tick().await;

                let events = match source.fetch().await {
                    Ok(events) => {
                        if failing {
                            tracing::info!("subscription recovered");
                            failing = false;
                        }
                        events
                    }
                    Err(e) => {
                        // log the first failure of a streak at warn, the rest at debug
                        if failing {
                            tracing::debug!("fetch still failing: {:#}", e);
                        } else {
                            tracing::warn!("fetch failed, keeping last state: {:#}", e);
                            failing = true;
                        }
                        continue;
                    }
                };

                for event in changes.apply(events) {
                    if session.on_event(event).await.is_err() {
                        tracing::debug!("session gone, stopping subscription");
                        return;
                    }
                }
            }
        });

        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop delivering events. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("subscription stopped");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::domain::ActuatorKey;
    use crate::session::{self, SessionOptions};
    use anyhow::Result;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySource {
        calls: AtomicUsize,
    }

    impl PushSource for FlakySource {
        async fn fetch(&self) -> Result<Vec<InboundEvent>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                anyhow::bail!("connection reset");
            }
            Ok(vec![InboundEvent::SensorChanged(
                json!({"type": "temp", "value": n as f64, "status": "Normal"}),
            )])
        }
    }

    #[test]
    fn teardown_without_start_is_fine() {
        let mut sub = Subscription::inactive();
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn filter_passes_only_changed_documents() {
        let mut filter = ChangeFilter::default();
        let poll = |temp: f64| {
            vec![
                InboundEvent::SensorDocuments(vec![
                    json!({"type": "temp", "value": temp, "status": "Normal"}),
                    json!({"type": "ph", "value": 6.8, "status": "Normal"}),
                    json!({"type": "mystery", "value": 1}),
                ]),
                InboundEvent::ControlDocument(serde_json::Map::new()),
            ]
        };

        let first = filter.apply(poll(22.0));
        assert_eq!(first.len(), 3);
        assert!(matches!(first[2], InboundEvent::ControlDocument(_)));

        // nothing moved: only the control document comes through
        let again = filter.apply(poll(22.0));
        assert_eq!(again.len(), 1);
        assert!(matches!(again[0], InboundEvent::ControlDocument(_)));

        let moved = filter.apply(poll(30.0));
        assert_eq!(moved.len(), 2);
        match &moved[0] {
            InboundEvent::SensorChanged(doc) => assert_eq!(doc["value"], 30.0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_polls_leave_history_alone() {
        let backend = MemoryBackend::new();
        let temp = |v: f64| vec![json!({"type": "temp", "value": v, "status": "Normal"})];
        backend.set_sensors(temp(22.0));
        let (handle, _task) = session::spawn(Arc::new(backend.clone()), SessionOptions::default());
        let source = Arc::new(backend.clone());
        let _sub = Subscription::start(source, handle.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        backend.set_sensors(temp(30.0));
        tokio::time::sleep(Duration::from_secs(1)).await;
        backend.set_sensors(temp(22.0));

        // plenty of polls with nothing new
        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.flush().await.unwrap();

        let view = handle.snapshot().await;
        assert_eq!(view.received, 3);
        let mut expected = vec![22.0; 18];
        expected.extend([30.0, 22.0]);
        assert_eq!(view.card(SensorKey::Temperature).unwrap().series, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_into_session() {
        let backend = MemoryBackend::demo();
        backend.set_control(ActuatorKey::Led, true);
        let (handle, _task) = session::spawn(Arc::new(backend.clone()), SessionOptions::default());

        let source = Arc::new(backend);
        let mut sub = Subscription::start(source, handle.clone(), Duration::from_secs(1));
        assert!(sub.is_active());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.flush().await.unwrap();

        let view = handle.snapshot().await;
        assert_eq!(view.switch(ActuatorKey::Led), Some(true));
        let temp = view.card(SensorKey::Temperature).unwrap();
        assert_eq!(temp.value, Some(22.5));
        assert_eq!(temp.series.len(), 20);
        // three polls, one sample per sensor
        assert_eq!(view.received, 5);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        let received = handle.snapshot().await.received;
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.flush().await.unwrap();
        assert_eq!(handle.snapshot().await.received, received);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_do_not_stop_the_loop() {
        let backend = MemoryBackend::new();
        let (handle, _task) = session::spawn(Arc::new(backend), SessionOptions::default());
        let source = Arc::new(FlakySource { calls: AtomicUsize::new(0) });

        let _sub = Subscription::start(source.clone(), handle.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(4500)).await;
        handle.flush().await.unwrap();

        // ticks at 0..=4 -> calls 0, 2, 4 succeed
        assert!(source.calls.load(Ordering::SeqCst) >= 5);
        let view = handle.snapshot().await;
        assert_eq!(view.received, 3);
        assert_eq!(view.card(SensorKey::Temperature).unwrap().value, Some(4.0));
    }
}
