//! One-at-a-time presentation of `Display` actions.
//!
//! Entries wait in FIFO order. Exactly one is shown at a time; dismissing it
//! fires `UiDone` for its request and for every waiting entry with a similar
//! action, then shows the next.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::clients::RequestDescriptor;
use crate::gate::actions::PendingAction;
use crate::gate::GateInner;
use crate::lifecycle::LifecycleEvent;

/// A `Display` action waiting to be shown, paired with its request.
#[derive(Clone, Debug)]
pub struct PendingActionEntry {
    descriptor: RequestDescriptor,
    action: PendingAction,
}

impl PendingActionEntry {
    pub(crate) const fn new(descriptor: RequestDescriptor, action: PendingAction) -> Self {
        Self { descriptor, action }
    }

    /// Returns the action.
    #[must_use]
    pub const fn action(&self) -> &PendingAction {
        &self.action
    }

    /// Returns the request the action belongs to.
    #[must_use]
    pub const fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }
}

#[derive(Default)]
pub(crate) struct UiQueue {
    current: Option<(u64, PendingActionEntry)>,
    waiting: VecDeque<PendingActionEntry>,
    next_token: u64,
}

/// Handed to [`Presenter::present`](crate::Presenter::present); dismissing
/// it advances the queue.
///
/// Dismissing a handle whose entry is no longer current does nothing.
pub struct DismissHandle {
    gate: Weak<GateInner>,
    token: u64,
}

impl DismissHandle {
    /// Reports that the user dismissed the action.
    pub fn dismiss(self) {
        if let Some(gate) = self.gate.upgrade() {
            gate.on_dismissed(self.token);
        }
    }
}

impl fmt::Debug for DismissHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DismissHandle")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl GateInner {
    pub(crate) fn enqueue_display(&self, entry: PendingActionEntry) {
        self.ui.lock().waiting.push_back(entry);
    }

    /// Shows the next waiting entry if nothing is showing.
    pub(crate) fn advance_ui(self: &Arc<Self>) {
        loop {
            let (token, entry) = {
                let mut ui = self.ui.lock();
                if ui.current.is_some() {
                    return;
                }
                let Some(entry) = ui.waiting.pop_front() else {
                    return;
                };
                ui.next_token += 1;
                let token = ui.next_token;
                ui.current = Some((token, entry.clone()));
                (token, entry)
            };

            let handle = DismissHandle {
                gate: Arc::downgrade(self),
                token,
            };
            if self.presenter.present(&entry.action, handle) {
                return;
            }

            // No presentation context: drain the entry without showing it.
            let still_current = {
                let mut ui = self.ui.lock();
                if ui.current.as_ref().is_some_and(|(t, _)| *t == token) {
                    ui.current = None;
                    true
                } else {
                    false
                }
            };
            if still_current {
                self.emitter.emit(&entry.descriptor, &LifecycleEvent::UiDone);
            }
        }
    }

    fn on_dismissed(self: &Arc<Self>, token: u64) {
        let (entry, similar) = {
            let mut ui = self.ui.lock();
            match ui.current.take() {
                Some((current, entry)) if current == token => {
                    let (similar, rest): (VecDeque<_>, VecDeque<_>) = ui
                        .waiting
                        .drain(..)
                        .partition(|waiting| waiting.action.is_similar_to(&entry.action));
                    ui.waiting = rest;
                    (entry, similar)
                }
                other => {
                    ui.current = other;
                    return;
                }
            }
        };

        tracing::debug!(
            action = %entry.action.name,
            collapsed = similar.len(),
            "pending action dismissed"
        );
        self.emitter.emit(&entry.descriptor, &LifecycleEvent::UiDone);
        for waiting in &similar {
            self.emitter.emit(&waiting.descriptor, &LifecycleEvent::UiDone);
        }

        self.advance_ui();
    }

    /// Drops every waiting entry. The entry on screen stays until dismissed.
    pub(crate) fn clear_waiting_displays(&self) {
        self.ui.lock().waiting.clear();
    }

    pub(crate) fn waiting_display_count(&self) -> usize {
        let ui = self.ui.lock();
        ui.waiting.len() + usize::from(ui.current.is_some())
    }
}
