//! One-shot element waits.
//!
//! Both waits check the root synchronously first and only subscribe to
//! child-list changes when nothing matches yet, checking once more right
//! after subscribing. They never time out on their own; the `*_timeout`
//! variants race the wait against a tokio timer.
//! Dropping a wait future releases its subscription.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::dom::{BatchSink, Dom, MutationKindSet, MutationRecord, Root, Selector};
use crate::error::{Error, Result};
use crate::identifiers::ElementId;

use super::Watcher;

// ============================================================================
// Types
// ============================================================================

/// Query run on every check; `None` means "not there yet".
type Lookup<T> = fn(&dyn Dom, &Root, &str) -> Result<Option<T>>;

fn lookup_one(dom: &dyn Dom, root: &Root, query: &str) -> Result<Option<ElementId>> {
    dom.query_selector(root, query)
}

fn lookup_all(dom: &dyn Dom, root: &Root, query: &str) -> Result<Option<Vec<ElementId>>> {
    let found = dom.query_selector_all(root, query)?;
    Ok((!found.is_empty()).then_some(found))
}

// ============================================================================
// Watcher - Element Waits
// ============================================================================

impl Watcher {
    /// Waits until an element matching `selector` exists under the root.
    ///
    /// Resolves without yielding if the selector is an element or already
    /// matches. Otherwise re-queries on every batch of child-list changes
    /// and resolves with the first match in document order.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSelector`] / [`Error::InvalidRoot`] from the provider
    /// - [`Error::RuntimeUnavailable`] if it has to subscribe outside a runtime
    ///
    /// # Example
    ///
    /// ```ignore
    /// let widget = watcher.wait_for_element("#chat-widget").await?;
    /// ```
    pub async fn wait_for_element(&self, selector: impl Into<Selector>) -> Result<ElementId> {
        match selector.into() {
            Selector::Element(id) => Ok(id),
            Selector::Css(query) => self.wait_for_match(query, lookup_one).await,
        }
    }

    /// Waits until at least one element matches, returning every match.
    ///
    /// Elements added after resolution are not reported.
    ///
    /// # Errors
    ///
    /// Same as [`Watcher::wait_for_element`].
    pub async fn wait_for_elements(
        &self,
        selector: impl Into<Selector>,
    ) -> Result<Vec<ElementId>> {
        match selector.into() {
            Selector::Element(id) => Ok(vec![id]),
            Selector::Css(query) => self.wait_for_match(query, lookup_all).await,
        }
    }

    /// [`Watcher::wait_for_element`] bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Also returns [`Error::Timeout`] if nothing matched in time.
    pub async fn wait_for_element_timeout(
        &self,
        selector: impl Into<Selector>,
        limit: Duration,
    ) -> Result<ElementId> {
        let selector = selector.into();
        let operation = format!("wait_for_element({selector})");
        timeout(limit, self.wait_for_element(selector))
            .await
            .map_err(|_| Error::timeout(operation, limit.as_millis() as u64))?
    }

    /// [`Watcher::wait_for_elements`] bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Also returns [`Error::Timeout`] if nothing matched in time.
    pub async fn wait_for_elements_timeout(
        &self,
        selector: impl Into<Selector>,
        limit: Duration,
    ) -> Result<Vec<ElementId>> {
        let selector = selector.into();
        let operation = format!("wait_for_elements({selector})");
        timeout(limit, self.wait_for_elements(selector))
            .await
            .map_err(|_| Error::timeout(operation, limit.as_millis() as u64))?
    }
}

// ============================================================================
// Watcher - Internal
// ============================================================================

impl Watcher {
    async fn wait_for_match<T>(&self, query: String, lookup: Lookup<T>) -> Result<T>
    where
        T: Send + 'static,
    {
        let dom = &self.inner.dom;
        let root = self.inner.root;

        if let Some(found) = lookup(dom.as_ref(), &root, &query)? {
            debug!(selector = %query, %root, "Element already present");
            return Ok(found);
        }

        debug!(selector = %query, %root, "Waiting for element");

        let (tx, rx) = oneshot::channel::<T>();
        let pending = Arc::new(Mutex::new(Some(tx)));
        let tx = Arc::clone(&pending);
        let weak_dom = Arc::downgrade(dom);
        let sink_query = query.clone();

        let sink: BatchSink = Arc::new(move |_records: Vec<MutationRecord>| {
            let Some(dom) = weak_dom.upgrade() else {
                return;
            };
            let mut slot = tx.lock();
            if slot.is_none() {
                return;
            }
            match lookup(dom.as_ref(), &root, &sink_query) {
                Ok(Some(found)) => {
                    if let Some(tx) = slot.take() {
                        let _ = tx.send(found);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(selector = %sink_query, error = %e, "Re-query failed"),
            }
        });

        let subscription = dom.observe(&root, &MutationKindSet::discovery(), sink)?;

        // An insertion between the first check and the registration has no
        // record on this subscription, so check once more.
        let settled = {
            let mut slot = pending.lock();
            if slot.is_none() {
                None
            } else {
                let found = lookup(dom.as_ref(), &root, &query)?;
                if found.is_some() {
                    slot.take();
                }
                found
            }
        };
        let found = match settled {
            Some(found) => found,
            None => rx.await?,
        };
        subscription.disconnect();

        debug!(selector = %query, %root, "Element appeared");
        Ok(found)
    }
}

// ============================================================================
// Tests
// ============================================================================
