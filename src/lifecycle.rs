//! Per-request lifecycle events and the listeners that receive them.
//!
//! Every admitted request sees exactly one `Started` first and exactly one
//! `Finally`. Between them comes one terminal event: `Completed`, `Error` or
//! `Aborted`. `UiDone` follows `Finally` once any user-facing consequence of
//! the request has been shown and dismissed.
//!
//! # Example
//!
//! ```rust
//! use request_gate::{Callbacks, EventKind, LifecycleEvent};
//!
//! let callbacks = Callbacks::new()
//!     .on_completed(|_, body| {
//!         println!("loaded: {body:?}");
//!         Ok(())
//!     })
//!     .on_error(|_, error| {
//!         eprintln!("failed: {error}");
//!         Ok(())
//!     });
//! # let _ = callbacks;
//! assert_eq!(LifecycleEvent::Finally.kind(), EventKind::Finally);
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clients::{RequestDescriptor, RequestError, RequestId, ResponseBody};
use crate::presentation::{Diagnostic, Diagnostics};

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A lifecycle event of one request.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    /// The request was admitted.
    Started,
    /// The request succeeded with a decoded body.
    Completed(ResponseBody),
    /// The request failed.
    Error(RequestError),
    /// The request was canceled or swept by a process-wide abort.
    Aborted,
    /// The request left the gate.
    Finally,
    /// Any user-facing consequence of the request has been dismissed.
    UiDone,
}

impl LifecycleEvent {
    /// Returns the event's kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Started => EventKind::Started,
            Self::Completed(_) => EventKind::Completed,
            Self::Error(_) => EventKind::Error,
            Self::Aborted => EventKind::Aborted,
            Self::Finally => EventKind::Finally,
            Self::UiDone => EventKind::UiDone,
        }
    }
}

/// The kind of a [`LifecycleEvent`], without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`LifecycleEvent::Started`].
    Started,
    /// See [`LifecycleEvent::Completed`].
    Completed,
    /// See [`LifecycleEvent::Error`].
    Error,
    /// See [`LifecycleEvent::Aborted`].
    Aborted,
    /// See [`LifecycleEvent::Finally`].
    Finally,
    /// See [`LifecycleEvent::UiDone`].
    UiDone,
}

/// Receives lifecycle events for the requests it is attached to.
///
/// A returned error or a panic is contained: it is reported to
/// [`Diagnostics`] and does not affect the gate or other requests.
pub trait RequestListener: Send + Sync {
    /// Handles `event` for request `id`.
    ///
    /// # Errors
    ///
    /// Any error is reported and otherwise ignored.
    fn on_event(&self, id: RequestId, event: &LifecycleEvent) -> Result<(), ListenerError>;
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl RequestListener for NoopListener {
    fn on_event(&self, _id: RequestId, _event: &LifecycleEvent) -> Result<(), ListenerError> {
        Ok(())
    }
}

type Callback = Box<dyn Fn(RequestId) -> Result<(), ListenerError> + Send + Sync>;
type BodyCallback =
    Box<dyn Fn(RequestId, &ResponseBody) -> Result<(), ListenerError> + Send + Sync>;
type ErrorCallback =
    Box<dyn Fn(RequestId, &RequestError) -> Result<(), ListenerError> + Send + Sync>;

/// Listener built from per-event closures. Unset events are ignored.
#[derive(Default)]
pub struct Callbacks {
    started: Option<Callback>,
    completed: Option<BodyCallback>,
    error: Option<ErrorCallback>,
    aborted: Option<Callback>,
    finally: Option<Callback>,
    ui_done: Option<Callback>,
}

impl Callbacks {
    /// Creates an empty set of callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `Started` callback.
    #[must_use]
    pub fn on_started(
        mut self,
        f: impl Fn(RequestId) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) -> Self {
        self.started = Some(Box::new(f));
        self
    }

    /// Sets the `Completed` callback.
    #[must_use]
    pub fn on_completed(
        mut self,
        f: impl Fn(RequestId, &ResponseBody) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) -> Self {
        self.completed = Some(Box::new(f));
        self
    }

    /// Sets the `Error` callback.
    #[must_use]
    pub fn on_error(
        mut self,
        f: impl Fn(RequestId, &RequestError) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the `Aborted` callback.
    #[must_use]
    pub fn on_aborted(
        mut self,
        f: impl Fn(RequestId) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) -> Self {
        self.aborted = Some(Box::new(f));
        self
    }

    /// Sets the `Finally` callback.
    #[must_use]
    pub fn on_finally(
        mut self,
        f: impl Fn(RequestId) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) -> Self {
        self.finally = Some(Box::new(f));
        self
    }

    /// Sets the `UiDone` callback.
    #[must_use]
    pub fn on_ui_done(
        mut self,
        f: impl Fn(RequestId) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) -> Self {
        self.ui_done = Some(Box::new(f));
        self
    }
}

impl RequestListener for Callbacks {
    fn on_event(&self, id: RequestId, event: &LifecycleEvent) -> Result<(), ListenerError> {
        let simple = match event {
            LifecycleEvent::Completed(body) => {
                return self.completed.as_ref().map_or(Ok(()), |f| f(id, body));
            }
            LifecycleEvent::Error(error) => {
                return self.error.as_ref().map_or(Ok(()), |f| f(id, error));
            }
            LifecycleEvent::Started => &self.started,
            LifecycleEvent::Aborted => &self.aborted,
            LifecycleEvent::Finally => &self.finally,
            LifecycleEvent::UiDone => &self.ui_done,
        };
        simple.as_ref().map_or(Ok(()), |f| f(id))
    }
}

/// Listener that forwards every event to a channel.
///
/// Useful for driving request outcomes from async code.
///
/// # Example
///
/// ```rust
/// use request_gate::ChannelListener;
///
/// let (listener, mut events) = ChannelListener::new();
/// # let _ = (&listener, &mut events);
/// ```
#[derive(Clone, Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<(RequestId, LifecycleEvent)>,
}

impl ChannelListener {
    /// Creates a listener and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(RequestId, LifecycleEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RequestListener for ChannelListener {
    fn on_event(&self, id: RequestId, event: &LifecycleEvent) -> Result<(), ListenerError> {
        self.tx
            .send((id, event.clone()))
            .map_err(|_| "lifecycle event receiver dropped".into())
    }
}

/// Delivers events to request listeners, containing listener failures.
#[derive(Clone)]
pub(crate) struct Emitter {
    diagnostics: Arc<dyn Diagnostics>,
}

impl Emitter {
    pub(crate) fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { diagnostics }
    }

    pub(crate) fn emit(&self, descriptor: &RequestDescriptor, event: &LifecycleEvent) {
        let id = descriptor.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            descriptor.listener().on_event(id, event)
        }));

        let message = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error.to_string(),
            Err(payload) => format!("listener panicked: {}", panic_message(payload.as_ref())),
        };

        self.report(
            descriptor,
            "listener",
            format!("{:?} callback failed: {message}", event.kind()),
        );
    }

    /// Emits `Aborted` then `Finally`.
    pub(crate) fn aborted(&self, descriptor: &RequestDescriptor) {
        self.emit(descriptor, &LifecycleEvent::Aborted);
        self.emit(descriptor, &LifecycleEvent::Finally);
    }

    /// Emits `Error` then `Finally`.
    pub(crate) fn failed(&self, descriptor: &RequestDescriptor, error: RequestError) {
        self.emit(descriptor, &LifecycleEvent::Error(error));
        self.emit(descriptor, &LifecycleEvent::Finally);
    }

    pub(crate) fn report(
        &self,
        descriptor: &RequestDescriptor,
        context: &'static str,
        message: String,
    ) {
        self.diagnostics.report(&Diagnostic {
            request_id: Some(descriptor.id()),
            url: Some(descriptor.url().to_string()),
            cancel_tag: descriptor.cancel_tag().map(String::from),
            context,
            message,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
