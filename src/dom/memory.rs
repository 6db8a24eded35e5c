//! In-memory document provider.
//!
//! [`MemoryDocument`] is a small element tree with attribute, text and
//! child-list mutations, selector queries, and platform-like change
//! notification: records produced during one synchronous run are collected
//! per subscription and delivered together from a spawned task.
//!
//! # Example
//!
//! ```ignore
//! use element_watch::{MemoryDocument, Watcher};
//!
//! let document = MemoryDocument::new();
//! let watcher = Watcher::new(document.clone());
//!
//! let list = document.append_new(document.body(), "ul", &[("id", "results")])?;
//! document.append_new(list, "li", &[("class", "item")])?;
//!
//! let items = watcher.wait_for_elements("#results > li").await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{ElementId, SubscriptionId};

use super::matcher::{NodeView, SelectorList};
use super::{BatchSink, Dom, MutationKindSet, MutationRecord, Root, Subscription};

// ============================================================================
// Types
// ============================================================================

/// One element in the tree.
#[derive(Debug)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    /// `None` while detached.
    parent: Option<Root>,
    children: Vec<ElementId>,
}

/// A live observer registration.
struct Registration {
    target: Root,
    kinds: MutationKindSet,
    sink: BatchSink,
}

/// A record captured for a subscription, waiting for delivery.
struct Pending {
    subscription_id: SubscriptionId,
    sink: BatchSink,
    record: MutationRecord,
}

/// Mutable document state.
struct DocumentState {
    nodes: FxHashMap<ElementId, Node>,
    body: ElementId,
    next_element: u64,
    registrations: FxHashMap<SubscriptionId, Registration>,
    pending: Vec<Pending>,
    flush_scheduled: bool,
    runtime: Option<Handle>,
}

/// Shared document internals.
struct DocumentInner {
    state: Mutex<DocumentState>,
    next_subscription: AtomicU64,
}

/// A scheduled delivery. Dropped without running (runtime shut down before
/// polling it), it clears the scheduled flag so the next mutation schedules
/// again.
struct FlushTask {
    inner: Arc<DocumentInner>,
    done: bool,
}

impl FlushTask {
    fn run(mut self) {
        self.done = true;
        self.inner.flush();
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        if !self.done {
            self.inner.state.lock().flush_scheduled = false;
        }
    }
}

// ============================================================================
// MemoryDocument
// ============================================================================

/// An in-memory [`Dom`] implementation.
///
/// Cloning yields another handle to the same document. A fresh document
/// holds a single `body` element.
#[derive(Clone)]
pub struct MemoryDocument {
    inner: Arc<DocumentInner>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryDocument")
            .field("elements", &state.nodes.len())
            .field("subscriptions", &state.registrations.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Creates a document containing an empty `body`.
    #[must_use]
    pub fn new() -> Self {
        let body = ElementId::new(1);
        let mut nodes = FxHashMap::default();
        nodes.insert(
            body,
            Node {
                tag: "body".to_string(),
                attributes: Vec::new(),
                text: String::new(),
                parent: Some(Root::Document),
                children: Vec::new(),
            },
        );

        Self {
            inner: Arc::new(DocumentInner {
                state: Mutex::new(DocumentState {
                    nodes,
                    body,
                    next_element: 2,
                    registrations: FxHashMap::default(),
                    pending: Vec::new(),
                    flush_scheduled: false,
                    runtime: None,
                }),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }
}

// ============================================================================
// MemoryDocument - Readers
// ============================================================================

impl MemoryDocument {
    /// Returns the `body` element.
    #[inline]
    #[must_use]
    pub fn body(&self) -> ElementId {
        self.inner.state.lock().body
    }

    /// Returns `true` if `id` exists (attached or not).
    #[must_use]
    pub fn exists(&self, id: ElementId) -> bool {
        self.inner.state.lock().nodes.contains_key(&id)
    }

    /// Returns `true` if `id` is connected to the document.
    #[must_use]
    pub fn is_attached(&self, id: ElementId) -> bool {
        self.inner.state.lock().is_attached(id)
    }

    /// Returns the lowercase tag name of `id`.
    #[must_use]
    pub fn tag_name(&self, id: ElementId) -> Option<String> {
        self.inner.state.lock().nodes.get(&id).map(|n| n.tag.clone())
    }

    /// Returns the value of attribute `name` on `id`.
    #[must_use]
    pub fn attribute(&self, id: ElementId, name: &str) -> Option<String> {
        NodeView::attribute(&*self.inner.state.lock(), id, name).map(str::to_string)
    }

    /// Returns the text of `id`.
    #[must_use]
    pub fn text(&self, id: ElementId) -> Option<String> {
        self.inner.state.lock().nodes.get(&id).map(|n| n.text.clone())
    }

    /// Returns the parent element of `id`.
    #[must_use]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.inner.state.lock().parent_element(id)
    }

    /// Returns the children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.inner
            .state
            .lock()
            .nodes
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().registrations.len()
    }
}

// ============================================================================
// MemoryDocument - Mutators
// ============================================================================

impl MemoryDocument {
    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> ElementId {
        let mut state = self.inner.state.lock();
        let id = ElementId::new(state.next_element);
        state.next_element += 1;
        state.nodes.insert(
            id,
            Node {
                tag: tag.to_ascii_lowercase(),
                attributes: Vec::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    /// Creates an element with `attributes` and appends it to `parent`.
    ///
    /// Produces a single child-list record.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryDocument::append_child`].
    pub fn append_new(
        &self,
        parent: ElementId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Result<ElementId> {
        let id = self.create_element(tag);
        {
            let mut state = self.inner.state.lock();
            let node = state.node_mut(id)?;
            node.attributes = attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
        }
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Appends `child` to `parent`, moving it if it is already attached.
    ///
    /// # Errors
    ///
    /// - [`Error::ElementNotFound`] if either element is unknown
    /// - [`Error::InvalidArgument`] if `child` is `parent` or one of its ancestors
    pub fn append_child(&self, parent: ElementId, child: ElementId) -> Result<()> {
        self.mutate(|state| {
            state.node(parent)?;
            state.node(child)?;
            if child == parent || state.is_ancestor(child, parent) {
                return Err(Error::invalid_argument(format!(
                    "cannot append {child} inside itself"
                )));
            }
            if child == state.body {
                return Err(Error::invalid_argument("the body cannot be moved"));
            }

            state.detach(child);
            state.node_mut(parent)?.children.push(child);
            state.node_mut(child)?.parent = Some(Root::Element(parent));
            state.record(MutationRecord::child_list(parent, vec![child], Vec::new()));
            Ok(())
        })
    }

    /// Detaches `child` from its parent. Detached elements are a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::ElementNotFound`] if `child` is unknown
    /// - [`Error::InvalidArgument`] if `child` is the body
    pub fn remove(&self, child: ElementId) -> Result<()> {
        self.mutate(|state| {
            state.node(child)?;
            if child == state.body {
                return Err(Error::invalid_argument("the body cannot be removed"));
            }
            state.detach(child);
            Ok(())
        })
    }

    /// Sets attribute `name` on `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementNotFound`] if `id` is unknown.
    pub fn set_attribute(&self, id: ElementId, name: &str, value: &str) -> Result<()> {
        self.mutate(|state| {
            let node = state.node_mut(id)?;
            let old = match node.attributes.iter_mut().find(|(k, _)| k == name) {
                Some((_, current)) => Some(mem::replace(current, value.to_string())),
                None => {
                    node.attributes.push((name.to_string(), value.to_string()));
                    None
                }
            };
            state.record(MutationRecord::attribute(id, name, old));
            Ok(())
        })
    }

    /// Removes attribute `name` from `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementNotFound`] if `id` is unknown.
    pub fn remove_attribute(&self, id: ElementId, name: &str) -> Result<()> {
        self.mutate(|state| {
            let node = state.node_mut(id)?;
            let Some(index) = node.attributes.iter().position(|(k, _)| k == name) else {
                return Ok(());
            };
            let (_, old) = node.attributes.remove(index);
            state.record(MutationRecord::attribute(id, name, Some(old)));
            Ok(())
        })
    }

    /// Replaces the text of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementNotFound`] if `id` is unknown.
    pub fn set_text(&self, id: ElementId, text: &str) -> Result<()> {
        self.mutate(|state| {
            let node = state.node_mut(id)?;
            let old = mem::replace(&mut node.text, text.to_string());
            state.record(MutationRecord::character_data(id, Some(old)));
            Ok(())
        })
    }
}

// ============================================================================
// MemoryDocument - Internal
// ============================================================================

impl MemoryDocument {
    /// Runs `change` under the lock, then schedules delivery if needed.
    fn mutate<T>(&self, change: impl FnOnce(&mut DocumentState) -> Result<T>) -> Result<T> {
        let (result, runtime) = {
            let mut state = self.inner.state.lock();
            let result = change(&mut state);
            (result, state.take_flush_request())
        };

        if let Some(runtime) = runtime {
            let task = FlushTask {
                inner: Arc::clone(&self.inner),
                done: false,
            };
            runtime.spawn(async move { task.run() });
        }

        result
    }
}

impl DocumentInner {
    /// Delivers every captured record, one batch per subscription.
    fn flush(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            mem::take(&mut state.pending)
        };

        let mut batches: Vec<(SubscriptionId, BatchSink, Vec<MutationRecord>)> = Vec::new();
        for Pending {
            subscription_id,
            sink,
            record,
        } in pending
        {
            match batches.iter_mut().find(|(id, _, _)| *id == subscription_id) {
                Some((_, _, records)) => records.push(record),
                None => batches.push((subscription_id, sink, vec![record])),
            }
        }

        for (subscription_id, sink, records) in batches {
            trace!(%subscription_id, records = records.len(), "Delivering mutation batch");
            sink(records);
        }
    }

    fn disconnect(weak: &Weak<Self>, id: SubscriptionId) {
        if let Some(inner) = weak.upgrade() {
            inner.state.lock().registrations.remove(&id);
            trace!(subscription_id = %id, "Subscription disconnected");
        }
    }
}

impl DocumentState {
    fn node(&self, id: ElementId) -> Result<&Node> {
        self.nodes.get(&id).ok_or_else(|| Error::element_not_found(id))
    }

    fn node_mut(&mut self, id: ElementId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::element_not_found(id))
    }

    fn is_attached(&self, id: ElementId) -> bool {
        let mut current = id;
        loop {
            match self.nodes.get(&current).and_then(|n| n.parent) {
                Some(Root::Document) => return true,
                Some(Root::Element(parent)) => current = parent,
                None => return false,
            }
        }
    }

    /// Returns `true` if `ancestor` is a proper ancestor of `id`.
    fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = self.parent_element(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_element(parent);
        }
        false
    }

    fn covers(&self, registration: &Registration, target: ElementId) -> bool {
        match registration.target {
            Root::Element(observed) if observed == target => true,
            _ if !registration.kinds.subtree => false,
            Root::Document => self.is_attached(target),
            Root::Element(observed) => self.is_ancestor(observed, target),
        }
    }

    /// Unlinks `child` from its parent, recording the removal.
    fn detach(&mut self, child: ElementId) {
        let Some(Root::Element(parent)) = self.nodes.get(&child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        self.record(MutationRecord::child_list(parent, Vec::new(), vec![child]));
    }

    /// Captures `record` for every registration that observes it.
    fn record(&mut self, record: MutationRecord) {
        let mut captured = Vec::new();
        for (id, registration) in &self.registrations {
            if !registration
                .kinds
                .accepts(record.kind, record.attribute_name.as_deref())
                || !self.covers(registration, record.target)
            {
                continue;
            }

            let mut copy = record.clone();
            if !registration.kinds.wants_old_value(record.kind) {
                copy.old_value = None;
            }
            captured.push(Pending {
                subscription_id: *id,
                sink: Arc::clone(&registration.sink),
                record: copy,
            });
        }
        captured.sort_by_key(|p| p.subscription_id);
        self.pending.extend(captured);
    }

    fn take_flush_request(&mut self) -> Option<Handle> {
        if self.pending.is_empty() || self.flush_scheduled {
            return None;
        }
        // Prefer the runtime doing the mutation; the stored one may be gone.
        let runtime = Handle::try_current().ok().or_else(|| self.runtime.clone())?;
        self.flush_scheduled = true;
        Some(runtime)
    }

    fn check_root(&self, root: &Root) -> Result<()> {
        match root {
            Root::Document => Ok(()),
            Root::Element(id) if self.nodes.contains_key(id) => Ok(()),
            Root::Element(id) => Err(Error::invalid_root(*id)),
        }
    }

    /// Descendants of `root` in document order.
    fn descendants(&self, root: &Root) -> Vec<ElementId> {
        let mut stack: Vec<ElementId> = match root {
            Root::Document => vec![self.body],
            Root::Element(id) => self
                .nodes
                .get(id)
                .map(|n| n.children.iter().rev().copied().collect())
                .unwrap_or_default(),
        };

        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn query(&self, root: &Root, selector: &str) -> Result<(SelectorList, Vec<ElementId>)> {
        let parsed =
            SelectorList::parse(selector).map_err(|e| Error::invalid_selector(selector, e))?;
        self.check_root(root)?;
        Ok((parsed, self.descendants(root)))
    }
}

impl NodeView for DocumentState {
    fn tag_name(&self, id: ElementId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.tag.as_str())
    }

    fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.nodes
            .get(&id)?
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn parent_element(&self, id: ElementId) -> Option<ElementId> {
        match self.nodes.get(&id)?.parent {
            Some(Root::Element(parent)) => Some(parent),
            _ => None,
        }
    }
}

// ============================================================================
// Dom Implementation
// ============================================================================

impl Dom for MemoryDocument {
    fn query_selector(&self, root: &Root, selector: &str) -> Result<Option<ElementId>> {
        let state = self.inner.state.lock();
        let (parsed, candidates) = state.query(root, selector)?;
        Ok(candidates
            .into_iter()
            .find(|id| parsed.matches(&*state, *id)))
    }

    fn query_selector_all(&self, root: &Root, selector: &str) -> Result<Vec<ElementId>> {
        let state = self.inner.state.lock();
        let (parsed, candidates) = state.query(root, selector)?;
        Ok(candidates
            .into_iter()
            .filter(|id| parsed.matches(&*state, *id))
            .collect())
    }

    fn observe(
        &self,
        target: &Root,
        kinds: &MutationKindSet,
        sink: BatchSink,
    ) -> Result<Subscription> {
        kinds.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;

        let id = SubscriptionId::new(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        {
            let mut state = self.inner.state.lock();
            state.check_root(target)?;
            state.runtime = Some(runtime);
            state.registrations.insert(
                id,
                Registration {
                    target: *target,
                    kinds: kinds.clone(),
                    sink,
                },
            );
        }
        trace!(subscription_id = %id, %target, "Subscription registered");

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, move || {
            DocumentInner::disconnect(&weak, id);
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
