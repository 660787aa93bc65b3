//! Update requests from store listeners to the UI context.
//!
//! Listeners installed by the renderer may fire on any thread, so they never
//! touch the document themselves. They enqueue an [`UpdateRequest`] and the
//! application drains the queue on its own context.

use tokio::sync::mpsc;

/// Work for the UI context, scoped as narrowly as the directive allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRequest {
    /// Re-render the whole component (store-backed loops and ranges).
    Rerender { component_id: String },
    /// Refresh every `data-store="<binding>"` span. The value is read from
    /// the store when the request is applied, never carried along, so a
    /// request that was queued late cannot write an outdated value.
    StoreBinding { component_id: String, binding: String },
    /// Refresh every `data-signal="<name>"` span from the component's signal.
    SignalBinding { component_id: String, name: String },
    /// Re-evaluate one `data-condition` block.
    Condition { component_id: String, condition_id: String },
}

impl UpdateRequest {
    pub fn component_id(&self) -> &str {
        match self {
            UpdateRequest::Rerender { component_id }
            | UpdateRequest::StoreBinding { component_id, .. }
            | UpdateRequest::SignalBinding { component_id, .. }
            | UpdateRequest::Condition { component_id, .. } => component_id,
        }
    }

    /// Whether `self` makes `other` redundant when both are pending.
    fn supersedes(&self, other: &UpdateRequest) -> bool {
        match (self, other) {
            (UpdateRequest::Rerender { component_id: a }, _) => a == other.component_id(),
            (
                UpdateRequest::StoreBinding { component_id: a, binding: x },
                UpdateRequest::StoreBinding { component_id: b, binding: y },
            ) => a == b && x == y,
            (
                UpdateRequest::SignalBinding { component_id: a, name: x },
                UpdateRequest::SignalBinding { component_id: b, name: y },
            ) => a == b && x == y,
            (
                UpdateRequest::Condition { component_id: a, condition_id: x },
                UpdateRequest::Condition { component_id: b, condition_id: y },
            ) => a == b && x == y,
            _ => false,
        }
    }
}

pub type UpdateReceiver = mpsc::UnboundedReceiver<UpdateRequest>;

/// Sending half of the update queue, cloned into every listener.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<UpdateRequest>,
}

impl UpdateSender {
    pub fn send(&self, request: UpdateRequest) {
        if self.tx.send(request).is_err() {
            tracing::debug!("update queue closed, dropping request");
        }
    }
}

/// Create an update queue.
pub fn update_channel() -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSender { tx }, rx)
}

/// Collapse a batch of pending requests. Repeated point updates of one span
/// or block collapse into one, and a re-render absorbs the point updates of
/// its component.
pub(crate) fn coalesce(batch: Vec<UpdateRequest>) -> Vec<UpdateRequest> {
    let mut out: Vec<UpdateRequest> = Vec::with_capacity(batch.len());
    for request in batch {
        if out.iter().any(|queued| matches!(queued, UpdateRequest::Rerender { .. }) && queued.supersedes(&request)) {
            continue;
        }
        out.retain(|queued| !request.supersedes(queued));
        out.push(request);
    }
    out
}
