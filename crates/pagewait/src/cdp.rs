//! Chrome DevTools Protocol host.
//!
//! [`ChromiumPage`] implements [`PageHost`] over a chromiumoxide page.
//! Evaluations go through `Runtime.evaluate` with promise awaiting, the
//! condition wait runs as an in-page polling promise, and network events
//! come from the `Network.requestWillBeSent` / `Network.responseReceived`
//! listeners.

use crate::host::{NetworkEvent, PageHost};
use crate::request_log::ResourceType;
use crate::result::{PageWaitError, PageWaitResult};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;

/// Rejection reason used by the in-page wait when its deadline passes
const WAIT_TIMEOUT_MARKER: &str = "__pagewait_wait_timeout__";

/// In-page polling period for `wait_for_function`
const IN_PAGE_POLL_MS: u64 = 50;

/// Extra time the Rust side grants the in-page wait before giving up
const HOST_TIMEOUT_SLACK: Duration = Duration::from_secs(2);

fn map_cdp_error(e: CdpError) -> PageWaitError {
    match e {
        CdpError::JavascriptException(details) => PageWaitError::Evaluation {
            message: details
                .exception
                .as_ref()
                .and_then(|ex| ex.description.clone())
                .unwrap_or_else(|| details.text.clone()),
        },
        other => PageWaitError::Host {
            message: other.to_string(),
        },
    }
}

/// Wrap `predicate` (an expression) in a promise that polls it until truthy.
///
/// The predicate's value is awaited, so a function returning a promise is
/// judged by what the promise resolves to.
fn polling_script(predicate: &str, timeout: Duration) -> String {
    format!(
        r#"new Promise((resolve, reject) => {{
  const deadline = performance.now() + {timeout_ms};
  const tick = async () => {{
    let ok;
    try {{ ok = !!(await ({predicate})); }} catch (e) {{ reject(e); return; }}
    if (ok) {{ resolve(true); return; }}
    if (performance.now() >= deadline) {{ reject(new Error("{WAIT_TIMEOUT_MARKER}")); return; }}
    setTimeout(tick, {IN_PAGE_POLL_MS});
  }};
  tick();
}})"#,
        timeout_ms = timeout.as_millis(),
    )
}

/// A chromiumoxide page usable as a [`PageHost`]
#[derive(Debug, Clone)]
pub struct ChromiumPage {
    inner: CdpPage,
}

impl ChromiumPage {
    /// Wrap an existing CDP page
    #[must_use]
    pub const fn new(page: CdpPage) -> Self {
        Self { inner: page }
    }

    /// Underlying CDP page
    #[must_use]
    pub const fn page(&self) -> &CdpPage {
        &self.inner
    }

    /// Navigate to a URL and wait for the load to finish
    pub async fn goto(&self, url: &str) -> PageWaitResult<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| PageWaitError::Host {
                message: format!("navigation to {url} failed: {e}"),
            })?;
        Ok(())
    }
}

#[async_trait]
impl PageHost for ChromiumPage {
    async fn evaluate(&self, script: &str) -> PageWaitResult<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|message| PageWaitError::Host { message })?;
        let result = self
            .inner
            .evaluate_expression(params)
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for_function(&self, script: &str, timeout: Duration) -> PageWaitResult<()> {
        let polling = polling_script(script, timeout);
        match tokio::time::timeout(timeout + HOST_TIMEOUT_SLACK, self.evaluate(&polling)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(PageWaitError::Evaluation { message })) if message.contains(WAIT_TIMEOUT_MARKER) => {
                Err(PageWaitError::timeout(format!(
                    "Waiting failed: {}ms exceeded",
                    timeout.as_millis()
                )))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PageWaitError::timeout(format!(
                "Waiting failed: {}ms exceeded",
                timeout.as_millis()
            ))),
        }
    }

    async fn network_events(&self) -> PageWaitResult<BoxStream<'static, NetworkEvent>> {
        let requests = self
            .inner
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(map_cdp_error)?
            .map(|event| NetworkEvent::Request {
                request_id: event.request_id.inner().clone(),
                url: event.request.url.clone(),
                resource_type: event
                    .r#type
                    .as_ref()
                    .map_or(ResourceType::Other(String::new()), |kind| {
                        ResourceType::parse(kind.as_ref())
                    }),
            });
        let responses = self
            .inner
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(map_cdp_error)?
            .map(|event| NetworkEvent::Response {
                request_id: event.request_id.inner().clone(),
                status: u16::try_from(event.response.status).unwrap_or(0),
            });
        Ok(futures::stream::select(requests, responses).boxed())
    }
}
