//! Continuous observation of a single, possibly late, target.
//!
//! The watch runs in two stages. While the target is missing, a discovery
//! task awaits [`Watcher::wait_for_element`]. Once it resolves, the task
//! subscribes to the element itself. The transition is guarded by the
//! handle: a handle cancelled during discovery aborts the task, and a
//! subscription attached after cancellation is released on the spot.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::callback::RecordCallback;
use crate::dom::{MutationRecord, Selector};
use crate::error::Result;
use crate::handle::{Resource, WatchHandle};
use crate::identifiers::ElementId;

use super::core::{arm_timeout, current_runtime, watch_element};
use super::{ObserveOptions, Watcher};

// ============================================================================
// Watcher - Single Target Observation
// ============================================================================

impl Watcher {
    /// Observes mutations of the element matching `selector`.
    ///
    /// `callback` runs once per record, in production order, with the
    /// observed element. If the element is missing, observation starts when
    /// it first appears. The returned handle is live immediately; cancelling
    /// it before the element appears means the watch never starts.
    ///
    /// A configured timeout counts from this call. When it fires the watch
    /// (or the pending discovery) is cancelled, then `on_timeout` runs.
    /// Without a timeout, a selector that never matches keeps the handle
    /// pending until it is cancelled.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`](crate::Error::InvalidArgument) if the kinds fail validation
    /// - [`Error::InvalidSelector`](crate::Error::InvalidSelector) from the provider
    /// - [`Error::InvalidRoot`](crate::Error::InvalidRoot) from the provider
    /// - [`Error::RuntimeUnavailable`](crate::Error::RuntimeUnavailable) outside a tokio runtime
    ///
    /// # Example
    ///
    /// ```ignore
    /// let handle = watcher.observe_selector(
    ///     "#price",
    ///     |_, record| println!("price node changed: {:?}", record.kind),
    ///     ObserveOptions::new()
    ///         .with_kinds(MutationKindSet::new().with_character_data(true))
    ///         .with_timeout(Duration::from_secs(5))
    ///         .on_timeout(|| println!("price never showed up")),
    /// )?;
    /// ```
    pub fn observe_selector<F>(
        &self,
        selector: impl Into<Selector>,
        callback: F,
        options: ObserveOptions,
    ) -> Result<WatchHandle>
    where
        F: Fn(&ElementId, &MutationRecord) + Send + Sync + 'static,
    {
        let selector = selector.into();
        options.kinds.validate()?;
        let runtime = current_runtime()?;

        let present = match &selector {
            Selector::Element(id) => Some(*id),
            Selector::Css(query) => self.inner.dom.query_selector(&self.inner.root, query)?,
        };

        let handle = WatchHandle::new("observe_selector");
        let callback: RecordCallback = Arc::new(callback);
        arm_timeout(&runtime, &handle, &options);

        if let Some(element) = present {
            match watch_element(
                self.inner.dom.as_ref(),
                element,
                &options.kinds,
                callback,
                vec![handle.clone()],
            ) {
                Ok(subscription) => handle.attach(Resource::Subscription(subscription)),
                Err(e) => {
                    handle.cancel();
                    return Err(e);
                }
            }
            return Ok(handle);
        }

        debug!(watch_id = %handle.id(), %selector, "Target missing, waiting for it");

        let watcher = self.clone();
        let stage_handle = handle.clone();
        let kinds = options.kinds;
        let discovery = runtime.spawn(async move {
            let element = match watcher.wait_for_element(selector).await {
                Ok(element) => element,
                Err(e) => {
                    warn!(watch_id = %stage_handle.id(), error = %e, "Target discovery failed");
                    stage_handle.cancel();
                    return;
                }
            };

            if stage_handle.is_cancelled() {
                return;
            }

            match watch_element(
                watcher.inner.dom.as_ref(),
                element,
                &kinds,
                callback,
                vec![stage_handle.clone()],
            ) {
                Ok(subscription) => stage_handle.attach(Resource::Subscription(subscription)),
                Err(e) => {
                    warn!(watch_id = %stage_handle.id(), error = %e, "Failed to watch target");
                    stage_handle.cancel();
                }
            }
        });
        handle.attach(Resource::Task(discovery.abort_handle()));

        Ok(handle)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::{Instant, sleep};

    use crate::dom::{MemoryDocument, MutationKind, MutationKindSet};
    use crate::error::Error;

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    type Seen = Arc<Mutex<Vec<(ElementId, MutationRecord)>>>;

    fn recorder() -> (Seen, impl Fn(&ElementId, &MutationRecord) + Send + Sync + 'static) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |el: &ElementId, record: &MutationRecord| {
            sink.lock().push((*el, record.clone()));
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delivered_once_per_record_in_order() {
        let doc = MemoryDocument::new();
        let target = doc.append_new(doc.body(), "div", &[("id", "target")]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let options =
            ObserveOptions::new().with_kinds(MutationKindSet::new().with_attribute_old_value(true));
        let _handle = watcher.observe_selector("#target", callback, options).unwrap();

        for value in ["a", "b", "c", "d", "e"] {
            doc.set_attribute(target, "data-step", value).unwrap();
        }
        settle().await;

        let seen = seen.lock();
        assert!(seen.iter().all(|(el, r)| *el == target && r.kind == MutationKind::Attributes));
        let previous: Vec<Option<&str>> =
            seen.iter().map(|(_, r)| r.old_value.as_deref()).collect();
        assert_eq!(previous, vec![None, Some("a"), Some("b"), Some("c"), Some("d")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subtree_records_report_observed_element() {
        let doc = MemoryDocument::new();
        let target = doc.append_new(doc.body(), "section", &[]).unwrap();
        let inner = doc.append_new(target, "span", &[]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let _handle = watcher
            .observe_selector(target, callback, ObserveOptions::new())
            .unwrap();
        doc.set_attribute(inner, "title", "x").unwrap();
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, target);
        assert_eq!(seen[0].1.target, inner);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_captured_batch() {
        let doc = MemoryDocument::new();
        let target = doc.append_new(doc.body(), "div", &[("id", "target")]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let handle = watcher
            .observe_selector("#target", callback, ObserveOptions::new())
            .unwrap();

        doc.set_attribute(target, "class", "x").unwrap();
        handle.cancel();
        settle().await;

        assert!(seen.lock().is_empty());
        assert_eq!(doc.subscription_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_target_is_bound_on_appearance() {
        let doc = MemoryDocument::new();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let handle = watcher
            .observe_selector(".variant", callback, ObserveOptions::new())
            .unwrap();
        settle().await;
        assert!(!handle.is_cancelled());

        let variant = doc.append_new(doc.body(), "div", &[("class", "variant")]).unwrap();
        settle().await;
        assert!(seen.lock().is_empty());

        doc.set_text(variant, "ignored without characterData").unwrap();
        doc.set_attribute(variant, "hidden", "").unwrap();
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, variant);
        assert_eq!(seen[0].1.attribute_name.as_deref(), Some("hidden"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_appearance_prevents_watch() {
        let doc = MemoryDocument::new();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let handle = watcher
            .observe_selector("#late", callback, ObserveOptions::new())
            .unwrap();
        settle().await;
        assert_eq!(doc.subscription_count(), 1);

        handle.cancel();
        settle().await;
        assert_eq!(doc.subscription_count(), 0);

        let late = doc.append_new(doc.body(), "div", &[("id", "late")]).unwrap();
        settle().await;
        doc.set_attribute(late, "class", "x").unwrap();
        settle().await;

        assert!(seen.lock().is_empty());
        assert_eq!(doc.subscription_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_on_missing_target() {
        let doc = MemoryDocument::new();
        let watcher = Watcher::new(doc.clone());
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_at = Arc::clone(&fired);
        let start = Instant::now();

        let handle = watcher
            .observe_selector(
                "#never",
                |_, _| {},
                ObserveOptions::new()
                    .with_timeout(Duration::from_millis(100))
                    .on_timeout(move || fired_at.lock().push(Instant::now())),
            )
            .unwrap();

        sleep(Duration::from_millis(99)).await;
        assert!(fired.lock().is_empty());

        sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.lock().len(), 1);
        assert_eq!(fired.lock()[0] - start, Duration::from_millis(100));
        assert!(handle.is_cancelled());
        assert_eq!(doc.subscription_count(), 0);

        handle.cancel();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_from_call_and_stops_found_watch() {
        let doc = MemoryDocument::new();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();
        let timeouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&timeouts);

        let handle = watcher
            .observe_selector(
                "#slow",
                callback,
                ObserveOptions::new()
                    .with_timeout(Duration::from_millis(100))
                    .on_timeout(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        sleep(Duration::from_millis(60)).await;
        let slow = doc.append_new(doc.body(), "div", &[("id", "slow")]).unwrap();
        settle().await;
        doc.set_attribute(slow, "class", "a").unwrap();
        settle().await;
        assert_eq!(seen.lock().len(), 1);

        sleep(Duration::from_millis(50)).await;
        assert!(handle.is_cancelled());
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);

        doc.set_attribute(slow, "class", "b").unwrap();
        settle().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_cancel_beats_timeout() {
        let watcher = Watcher::new(MemoryDocument::new());
        let timeouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&timeouts);

        let handle = watcher
            .observe_selector(
                "#never",
                |_, _| {},
                ObserveOptions::new()
                    .with_timeout(Duration::from_millis(100))
                    .on_timeout(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        handle.cancel();
        sleep(Duration::from_millis(300)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_keeps_delivering() {
        let doc = MemoryDocument::new();
        let target = doc.append_new(doc.body(), "div", &[("id", "target")]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = watcher
            .observe_selector(
                "#target",
                move |_, _| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first record handler failed");
                    }
                },
                ObserveOptions::new(),
            )
            .unwrap();

        doc.set_attribute(target, "a", "1").unwrap();
        doc.set_attribute(target, "b", "1").unwrap();
        settle().await;
        doc.set_attribute(target, "c", "1").unwrap();
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_invalid_kinds() {
        let watcher = Watcher::new(MemoryDocument::new());
        let err = watcher
            .observe_selector(
                "#x",
                |_, _| {},
                ObserveOptions::new().with_kinds(
                    MutationKindSet::new()
                        .with_child_list(false)
                        .with_attributes(false),
                ),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_requires_runtime() {
        let watcher = Watcher::new(MemoryDocument::new());
        let err = watcher
            .observe_selector("#x", |_, _| {}, ObserveOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable));
    }
}
