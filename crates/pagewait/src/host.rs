//! PageHost - Abstract Page Automation Boundary
//!
//! Everything pagewait needs from a browser automation engine, and nothing
//! more: in-page evaluation, the engine's own condition-polling primitive,
//! and a stream of network events.
//!
//! # Implementations
//!
//! - `ChromiumPage` - CDP via chromiumoxide (feature `browser`)
//! - [`MockPage`] - scripted responses for unit testing

use crate::request_log::ResourceType;
use crate::result::{PageWaitError, PageWaitResult};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Network activity reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A request was issued
    Request {
        /// Host request identifier
        request_id: String,
        /// Request URL
        url: String,
        /// Resource category
        resource_type: ResourceType,
    },
    /// A response arrived for an earlier request
    Response {
        /// Host request identifier
        request_id: String,
        /// HTTP status code
        status: u16,
    },
}

impl NetworkEvent {
    /// Shorthand for a request event
    pub fn request(
        request_id: impl Into<String>,
        url: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self::Request {
            request_id: request_id.into(),
            url: url.into(),
            resource_type,
        }
    }

    /// Shorthand for a response event
    pub fn response(request_id: impl Into<String>, status: u16) -> Self {
        Self::Response {
            request_id: request_id.into(),
            status,
        }
    }
}

/// Abstract page handle for automation engines
#[async_trait]
pub trait PageHost: Send + Sync {
    /// Evaluate an expression in the page and return its JSON value.
    ///
    /// Promises are awaited. An exception thrown in the page is an error.
    async fn evaluate(&self, script: &str) -> PageWaitResult<serde_json::Value>;

    /// Poll `script` in the page until it is truthy, using the engine's own
    /// polling. Fails with [`PageWaitError::Timeout`] after `timeout`.
    async fn wait_for_function(&self, script: &str, timeout: Duration) -> PageWaitResult<()>;

    /// Stream of request and response events for this page
    async fn network_events(&self) -> PageWaitResult<BoxStream<'static, NetworkEvent>>;
}

type EvaluateHandler = Box<dyn FnMut(&str) -> PageWaitResult<serde_json::Value> + Send>;
type WaitHandler = Box<dyn FnMut(&str, Duration) -> PageWaitResult<()> + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock page for unit testing
///
/// Evaluations return queued results first, then fall back to the handler
/// installed with [`MockPage::on_evaluate`], then to `null`. Waits succeed
/// unless a handler says otherwise. Network events are injected with
/// [`MockPage::emit`].
pub struct MockPage {
    queued: Mutex<VecDeque<PageWaitResult<serde_json::Value>>>,
    evaluate_handler: Mutex<Option<EvaluateHandler>>,
    wait_handler: Mutex<Option<WaitHandler>>,
    scripts: Mutex<Vec<String>>,
    waits: Mutex<Vec<(String, Duration)>>,
    sender: mpsc::UnboundedSender<NetworkEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<NetworkEvent>>>,
}

impl std::fmt::Debug for MockPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPage")
            .field("scripts", &lock(&self.scripts).len())
            .field("waits", &lock(&self.waits).len())
            .finish_non_exhaustive()
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPage {
    /// Create a new mock page
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            queued: Mutex::new(VecDeque::new()),
            evaluate_handler: Mutex::new(None),
            wait_handler: Mutex::new(None),
            scripts: Mutex::new(Vec::new()),
            waits: Mutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Queue the result of the next evaluation
    pub fn push_evaluate_result(&self, result: PageWaitResult<serde_json::Value>) {
        lock(&self.queued).push_back(result);
    }

    /// Answer evaluations with `handler` once the queue is empty
    pub fn on_evaluate<F>(&self, handler: F)
    where
        F: FnMut(&str) -> PageWaitResult<serde_json::Value> + Send + 'static,
    {
        *lock(&self.evaluate_handler) = Some(Box::new(handler));
    }

    /// Answer `wait_for_function` calls with `handler`
    pub fn on_wait_for_function<F>(&self, handler: F)
    where
        F: FnMut(&str, Duration) -> PageWaitResult<()> + Send + 'static,
    {
        *lock(&self.wait_handler) = Some(Box::new(handler));
    }

    /// Emit a network event to the subscriber
    pub fn emit(&self, event: NetworkEvent) {
        // no subscriber left means the facade is gone; nothing to deliver to
        let _ = self.sender.send(event);
    }

    /// Scripts passed to `evaluate`, in call order
    #[must_use]
    pub fn evaluated_scripts(&self) -> Vec<String> {
        lock(&self.scripts).clone()
    }

    /// Scripts and timeouts passed to `wait_for_function`, in call order
    #[must_use]
    pub fn waited_functions(&self) -> Vec<(String, Duration)> {
        lock(&self.waits).clone()
    }

    /// Check if any evaluated script contains `fragment`
    #[must_use]
    pub fn was_evaluated(&self, fragment: &str) -> bool {
        lock(&self.scripts).iter().any(|s| s.contains(fragment))
    }
}

#[async_trait]
impl PageHost for MockPage {
    async fn evaluate(&self, script: &str) -> PageWaitResult<serde_json::Value> {
        lock(&self.scripts).push(script.to_string());
        if let Some(result) = lock(&self.queued).pop_front() {
            return result;
        }
        match lock(&self.evaluate_handler).as_mut() {
            Some(handler) => handler(script),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn wait_for_function(&self, script: &str, timeout: Duration) -> PageWaitResult<()> {
        lock(&self.waits).push((script.to_string(), timeout));
        match lock(&self.wait_handler).as_mut() {
            Some(handler) => handler(script, timeout),
            None => Ok(()),
        }
    }

    async fn network_events(&self) -> PageWaitResult<BoxStream<'static, NetworkEvent>> {
        let receiver = lock(&self.receiver)
            .take()
            .ok_or_else(|| PageWaitError::Host {
                message: "network events already subscribed".to_string(),
            })?;
        Ok(futures::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }
}
