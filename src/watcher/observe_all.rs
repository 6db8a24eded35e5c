//! Continuous observation of every element matching a selector.
//!
//! A root watch re-queries the selector on every child-list or attribute
//! batch and reconciles the result against an index of per-element watches. Each
//! per-element watch is a child [`WatchHandle`]; its records are gated on
//! both the child and the observer handle.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::callback::RecordCallback;
use crate::dom::{BatchSink, Dom, MutationKindSet, MutationRecord, Root, Selector};
use crate::error::Result;
use crate::handle::{Cancel, Resource, WatchHandle};
use crate::identifiers::ElementId;

use super::core::{arm_timeout, current_runtime, watch_element};
use super::{ObserveOptions, Watcher};

// ============================================================================
// Types
// ============================================================================

/// Per-element watches keyed by element.
type WatchIndex = Arc<Mutex<FxHashMap<ElementId, WatchHandle>>>;

// ============================================================================
// SelectorsWatch
// ============================================================================

/// Handle of a multi-target observation.
///
/// Cancelling it tears down the root watch and every per-element watch.
#[derive(Clone)]
pub struct SelectorsWatch {
    handle: WatchHandle,
    tracked: WatchIndex,
}

impl fmt::Debug for SelectorsWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorsWatch")
            .field("handle", &self.handle)
            .field("watched", &self.watched_count())
            .finish()
    }
}

impl SelectorsWatch {
    /// Returns the handle controlling the whole observation.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    /// Returns the elements currently watched, in ID order.
    #[must_use]
    pub fn watched(&self) -> Vec<ElementId> {
        let mut elements: Vec<ElementId> = self.tracked.lock().keys().copied().collect();
        elements.sort_unstable();
        elements
    }

    /// Returns the number of elements currently watched.
    #[inline]
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.tracked.lock().len()
    }

    /// Stops the root watch and every per-element watch. Idempotent.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Returns `true` once the observation is stopped.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl Cancel for SelectorsWatch {
    fn cancel(&self) {
        SelectorsWatch::cancel(self);
    }

    fn is_cancelled(&self) -> bool {
        SelectorsWatch::is_cancelled(self)
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Brings the watch index in line with the current match set.
struct Reconciler {
    dom: Weak<dyn Dom>,
    root: Root,
    selector: Selector,
    kinds: MutationKindSet,
    callback: RecordCallback,
    retain_unmatched: bool,
    parent: WatchHandle,
    tracked: WatchIndex,
}

impl Reconciler {
    fn reconcile(&self) -> Result<()> {
        let Some(dom) = self.dom.upgrade() else {
            return Ok(());
        };

        // Held for the whole pass so concurrent batches cannot double-watch.
        let mut tracked = self.tracked.lock();
        if self.parent.is_cancelled() {
            return Ok(());
        }

        let matches = match &self.selector {
            Selector::Element(id) => vec![*id],
            Selector::Css(query) => dom.query_selector_all(&self.root, query)?,
        };

        if !self.retain_unmatched {
            tracked.retain(|element, child| {
                let keep = matches.contains(element);
                if !keep {
                    debug!(watch_id = %self.parent.id(), %element, "Element no longer matches");
                    child.cancel();
                }
                keep
            });
        }

        for element in matches {
            if tracked.contains_key(&element) {
                continue;
            }

            let child = WatchHandle::new("observe_selectors");
            let subscription = watch_element(
                dom.as_ref(),
                element,
                &self.kinds,
                Arc::clone(&self.callback),
                vec![self.parent.clone(), child.clone()],
            )?;
            child.attach(Resource::Subscription(subscription));
            tracked.insert(element, child);
        }

        trace!(watch_id = %self.parent.id(), watched = tracked.len(), "Reconciled");
        Ok(())
    }
}

// ============================================================================
// Watcher - Multi Target Observation
// ============================================================================

impl Watcher {
    /// Observes every element matching `selector`, now and later.
    ///
    /// Each matching element gets its own watch, created once and reported
    /// exactly like [`Watcher::observe_selector`]. Elements are discovered
    /// on child-list and attribute changes anywhere under the root, so an
    /// element that gains a matching class is picked up. An element that stops
    /// matching keeps its watch unless
    /// [`ObserveOptions::with_retain_unmatched`] turned that off.
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
    /// let rows = watcher.observe_selectors(
    ///     "tr.order",
    ///     |row, record| println!("{row}: {:?}", record.attribute_name),
    ///     ObserveOptions::new(),
    /// )?;
    /// println!("watching {} rows", rows.watched_count());
    /// rows.cancel();
    /// ```
    pub fn observe_selectors<F>(
        &self,
        selector: impl Into<Selector>,
        callback: F,
        options: ObserveOptions,
    ) -> Result<SelectorsWatch>
    where
        F: Fn(&ElementId, &MutationRecord) + Send + Sync + 'static,
    {
        let selector = selector.into();
        options.kinds.validate()?;
        let runtime = current_runtime()?;

        let handle = WatchHandle::new("observe_selectors");
        let tracked: WatchIndex = Arc::new(Mutex::new(FxHashMap::default()));

        let teardown = Arc::clone(&tracked);
        handle.attach(Resource::Hook(Box::new(move || {
            let children: Vec<WatchHandle> =
                teardown.lock().drain().map(|(_, child)| child).collect();
            for child in children {
                child.cancel();
            }
        })));
        arm_timeout(&runtime, &handle, &options);

        debug!(
            watch_id = %handle.id(),
            %selector,
            root = %self.inner.root,
            "Observing all matches"
        );

        let resolved = matches!(selector, Selector::Element(_));
        let reconciler = Arc::new(Reconciler {
            dom: Arc::downgrade(&self.inner.dom),
            root: self.inner.root,
            selector,
            kinds: options.kinds,
            callback: Arc::new(callback),
            retain_unmatched: options.retain_unmatched,
            parent: handle.clone(),
            tracked: Arc::clone(&tracked),
        });

        if !resolved {
            let sink_reconciler = Arc::clone(&reconciler);
            let sink: BatchSink = Arc::new(move |_records: Vec<MutationRecord>| {
                if let Err(e) = sink_reconciler.reconcile() {
                    warn!(watch_id = %sink_reconciler.parent.id(), error = %e, "Reconcile failed");
                }
            });
            match self.inner.dom.observe(&self.inner.root, &MutationKindSet::new(), sink) {
                Ok(subscription) => handle.attach(Resource::Subscription(subscription)),
                Err(e) => {
                    handle.cancel();
                    return Err(e);
                }
            }
        }

        if let Err(e) = reconciler.reconcile() {
            handle.cancel();
            return Err(e);
        }

        Ok(SelectorsWatch { handle, tracked })
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

    use tokio::time::sleep;

    use crate::dom::MemoryDocument;
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
    async fn test_each_new_match_gets_one_independent_watch() {
        let doc = MemoryDocument::new();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let watch = watcher
            .observe_selectors(".item", callback, ObserveOptions::new())
            .unwrap();
        assert_eq!(watch.watched_count(), 0);

        let mut items = Vec::new();
        for _ in 0..3 {
            items.push(doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap());
            settle().await;
        }
        assert_eq!(watch.watched(), items);
        assert_eq!(doc.subscription_count(), 4);

        for (index, item) in items.iter().enumerate() {
            doc.set_attribute(*item, "data-state", &index.to_string()).unwrap();
            settle().await;
        }

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        for (index, (element, record)) in seen.iter().enumerate() {
            assert_eq!(*element, items[index]);
            assert_eq!(record.target, items[index]);
            assert_eq!(record.attribute_name.as_deref(), Some("data-state"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attribute_change_brings_element_into_match() {
        let doc = MemoryDocument::new();
        let item = doc.append_new(doc.body(), "div", &[]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let watch = watcher
            .observe_selectors(".item", callback, ObserveOptions::new())
            .unwrap();
        assert_eq!(watch.watched_count(), 0);

        doc.set_attribute(item, "class", "item").unwrap();
        settle().await;
        assert_eq!(watch.watched(), vec![item]);
        assert!(seen.lock().is_empty());

        doc.set_attribute(item, "title", "watched").unwrap();
        settle().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_matches_are_watched_immediately() -> anyhow::Result<()> {
        let doc = MemoryDocument::new();
        let a = doc.append_new(doc.body(), "li", &[])?;
        let b = doc.append_new(doc.body(), "li", &[])?;
        let watcher = Watcher::new(doc.clone());

        let watch = watcher.observe_selectors("li", |_, _| {}, ObserveOptions::new())?;
        assert_eq!(watch.watched(), vec![a, b]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rematch_does_not_duplicate_watch() {
        let doc = MemoryDocument::new();
        let item = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let watch = watcher
            .observe_selectors(".item", callback, ObserveOptions::new())
            .unwrap();

        doc.append_new(doc.body(), "p", &[]).unwrap();
        settle().await;
        doc.append_new(doc.body(), "p", &[]).unwrap();
        settle().await;
        assert_eq!(watch.watched_count(), 1);
        assert_eq!(doc.subscription_count(), 2);

        doc.set_attribute(item, "title", "once").unwrap();
        settle().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_tears_down_everything() {
        let doc = MemoryDocument::new();
        let a = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let b = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();

        let watch = watcher
            .observe_selectors(".item", callback, ObserveOptions::new())
            .unwrap();
        assert_eq!(doc.subscription_count(), 3);

        doc.set_attribute(a, "title", "captured").unwrap();
        watch.cancel();
        assert!(watch.is_cancelled());
        assert_eq!(watch.watched_count(), 0);
        assert_eq!(doc.subscription_count(), 0);

        doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        doc.set_attribute(b, "title", "after").unwrap();
        settle().await;

        assert!(seen.lock().is_empty());
        assert_eq!(watch.watched_count(), 0);
        watch.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_all_watches() {
        let doc = MemoryDocument::new();
        let item = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let watcher = Watcher::new(doc.clone());
        let (seen, callback) = recorder();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let watch = watcher
            .observe_selectors(
                ".item",
                callback,
                ObserveOptions::new()
                    .with_timeout(Duration::from_millis(100))
                    .on_timeout(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(watch.is_cancelled());
        assert_eq!(watch.watched_count(), 0);

        doc.set_attribute(item, "title", "late").unwrap();
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_element_is_retained_by_default() {
        let doc = MemoryDocument::new();
        let item = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let watcher = Watcher::new(doc.clone());

        let watch = watcher
            .observe_selectors(".item", |_, _| {}, ObserveOptions::new())
            .unwrap();

        doc.remove_attribute(item, "class").unwrap();
        doc.append_new(doc.body(), "p", &[]).unwrap();
        settle().await;

        assert_eq!(watch.watched(), vec![item]);
        assert_eq!(doc.subscription_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_element_is_dropped_when_not_retained() {
        let doc = MemoryDocument::new();
        let item = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let keep = doc.append_new(doc.body(), "div", &[("class", "item")]).unwrap();
        let watcher = Watcher::new(doc.clone());

        let watch = watcher
            .observe_selectors(
                ".item",
                |_, _| {},
                ObserveOptions::new().with_retain_unmatched(false),
            )
            .unwrap();

        doc.remove_attribute(item, "class").unwrap();
        settle().await;

        assert_eq!(watch.watched(), vec![keep]);
        assert_eq!(doc.subscription_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_element_skips_root_watch() {
        let doc = MemoryDocument::new();
        let item = doc.append_new(doc.body(), "div", &[]).unwrap();
        let watcher = Watcher::new(doc.clone());

        let watch = watcher
            .observe_selectors(item, |_, _| {}, ObserveOptions::new())
            .unwrap();
        assert_eq!(watch.watched(), vec![item]);
        assert_eq!(doc.subscription_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_selector_leaves_nothing_behind() {
        let doc = MemoryDocument::new();
        let watcher = Watcher::new(doc.clone());

        let err = watcher
            .observe_selectors("div[", |_, _| {}, ObserveOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));
        assert_eq!(doc.subscription_count(), 0);
    }
}
