//! Page extensions facade
//!
//! [`PageExtensions`] binds to one page, records every network request the
//! page issues, and offers terse waits, getters and page tweaks on top of a
//! [`PageHost`].
//!
//! Resource and font waits scan the request log through [`poll_for`]. Every
//! other wait hands a page-context predicate to the host's own polling.
//!
//! # Example
//!
//! ```ignore
//! let ext = PageExtensions::new(page, ExtensionsConfig::default()).await?;
//! ext.reset_resource_requests();
//! page.goto("http://localhost:8080/").await?;
//! ext.wait_for_resource("main.js", None).await?;
//! ext.wait_until_exists_and_visible("#app", None).await?;
//! let title = ext.get_text("h1").await?;
//! ```

use crate::config::ExtensionsConfig;
use crate::host::{NetworkEvent, PageHost};
use crate::poll::{poll_for, PollConfig};
use crate::request_log::{ObservedRequest, RequestLog, ResourceType};
use crate::result::{PageWaitError, PageWaitResult};
use crate::script::PageFunction;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timeout message of [`PageExtensions::wait_for_resource`]
pub const RESOURCE_TIMEOUT_MESSAGE: &str = "Timeout waiting for resource match.";

/// Id of the style element injected by [`PageExtensions::turn_off_animations`]
pub const NO_ANIMATIONS_STYLE_ID: &str = "pagewait-no-animations";

const FONTS_READY_INSTALL: &str = r#"(() => {
  window.__pagewaitFontsReady = false;
  document.fonts.ready.then(() => { window.__pagewaitFontsReady = true; });
  return document.fonts.status === "loaded";
})()"#;

const FONTS_READY_READ: &str = "window.__pagewaitFontsReady === true";

const VISIBLE_FN: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  if (!el) return false;
  const box = el.getBoundingClientRect();
  return box.width > 0 && box.height > 0;
}"#;

const HIDDEN_FN: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  if (!el) return true;
  const box = el.getBoundingClientRect();
  return !(box.width > 0 && box.height > 0);
}"#;

const VISIBLE_CONTENT_FN: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  if (!el) return false;
  const box = el.getBoundingClientRect();
  return box.width > 0 && box.height > 0 && (el.textContent || "").trim().length > 0;
}"#;

const NO_VISIBLE_CONTENT_FN: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  if (!el) return true;
  const box = el.getBoundingClientRect();
  return !(box.width > 0 && box.height > 0 && (el.textContent || "").trim().length > 0);
}"#;

const NTH_ATTRIBUTE_FN: &str = r#"(sel, nth, attr) => {
  const el = document.querySelectorAll(sel)[nth - 1];
  return !!el && el.hasAttribute(attr);
}"#;

const NTH_ATTRIBUTE_VALUE_FN: &str = r#"(sel, nth, attr, value) => {
  const el = document.querySelectorAll(sel)[nth - 1];
  return !!el && el.getAttribute(attr) === value;
}"#;

const ELEMENT_COUNT_FN: &str = "(sel, count) => document.querySelectorAll(sel).length === count";

const DOCUMENT_TITLE_FN: &str = "(title) => document.title === title";

const URL_FN: &str = "(pattern) => new RegExp(pattern).test(window.location.href)";

const PROPERTY_FN: &str = r#"(sel, prop) => {
  const el = document.querySelector(sel);
  if (!el) throw new Error("no element matches selector");
  if (!(prop in el)) throw new Error("element has no such property");
  return el[prop];
}"#;

const FOCUSED_FN: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  return !!el && document.activeElement === el;
}"#;

const NO_ANIMATIONS_FN: &str = r#"(id) => {
  if (!document.getElementById(id)) {
    const style = document.createElement("style");
    style.id = id;
    style.textContent = "*, *::before, *::after { transition: none !important; animation: none !important; }";
    (document.head || document.documentElement).appendChild(style);
  }
  if (window.jQuery && window.jQuery.fx) window.jQuery.fx.off = true;
  return true;
}"#;

const FAST_FORWARD_FN: &str = r#"(ms) => {
  const previous = Date.now;
  Date.now = () => previous() + ms;
  return Date.now();
}"#;

/// Apply one network event to a request log
fn record_event(log: &RequestLog, event: NetworkEvent) {
    match event {
        NetworkEvent::Request {
            request_id,
            url,
            resource_type,
        } => {
            tracing::trace!(%url, %resource_type, "request observed");
            log.push(ObservedRequest::new(request_id, url, resource_type));
        }
        NetworkEvent::Response { request_id, status } => {
            if !log.record_status(&request_id, status) {
                tracing::trace!(%request_id, status, "response ahead of its request, status held");
            }
        }
    }
}

/// Lazily installed page probe for `document.fonts.ready`.
///
/// Lives for one font wait; the first check installs the hook, later
/// checks only read the flag, and a `true` reading is cached.
///
/// The flags are atomics only so the wait future stays `Send`; each probe
/// belongs to a single wait, so relaxed ordering is enough.
#[derive(Debug, Default)]
struct FontReadyProbe {
    installed: AtomicBool,
    ready: AtomicBool,
}

impl FontReadyProbe {
    async fn is_ready<H: PageHost + ?Sized>(&self, host: &H) -> PageWaitResult<bool> {
        if self.ready.load(Ordering::Relaxed) {
            return Ok(true);
        }
        let script = if self.installed.swap(true, Ordering::Relaxed) {
            FONTS_READY_READ
        } else {
            FONTS_READY_INSTALL
        };
        let ready = host.evaluate(script).await?.as_bool().unwrap_or(false);
        if ready {
            self.ready.store(true, Ordering::Relaxed);
        }
        Ok(ready)
    }
}

/// Host network events, shared by the subscription task and resets
type EventStream = Arc<Mutex<BoxStream<'static, NetworkEvent>>>;

fn lock_events(events: &EventStream) -> MutexGuard<'_, BoxStream<'static, NetworkEvent>> {
    events.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record events until the host stream ends.
///
/// Events are taken and recorded under the stream lock, so a reset never
/// runs between receiving an event and logging it.
async fn drive_subscription(events: EventStream, log: RequestLog) {
    futures::future::poll_fn(|cx| {
        let mut stream = lock_events(&events);
        loop {
            match stream.poll_next_unpin(cx) {
                Poll::Ready(Some(event)) => record_event(&log, event),
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::Pending => return Poll::Pending,
            }
        }
    })
    .await;
    tracing::debug!("network event stream ended");
}

/// Wait, retrieval and manipulation helpers bound to one page
pub struct PageExtensions<H: PageHost + ?Sized> {
    host: Arc<H>,
    config: ExtensionsConfig,
    requests: RequestLog,
    events: EventStream,
    subscription: JoinHandle<()>,
}

impl<H: PageHost + ?Sized> std::fmt::Debug for PageExtensions<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageExtensions")
            .field("config", &self.config)
            .field("requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}

impl<H: PageHost + ?Sized> Drop for PageExtensions<H> {
    fn drop(&mut self) {
        self.subscription.abort();
    }
}

impl<H: PageHost + ?Sized> PageExtensions<H> {
    /// Bind to `host` and start recording its network requests.
    ///
    /// Must be called inside a tokio runtime; the subscription runs as a
    /// spawned task until the facade is dropped.
    pub async fn new(host: Arc<H>, config: ExtensionsConfig) -> PageWaitResult<Self> {
        let requests = RequestLog::new();
        let events: EventStream = Arc::new(Mutex::new(host.network_events().await?));
        let subscription = tokio::spawn(drive_subscription(Arc::clone(&events), requests.clone()));

        tracing::debug!(
            default_timeout_ms = config.default_timeout_ms,
            "page extensions attached"
        );
        Ok(Self {
            host,
            config,
            requests,
            events,
            subscription,
        })
    }

    /// Bind with a custom default timeout and otherwise default config
    pub async fn with_default_timeout(host: Arc<H>, timeout_ms: u64) -> PageWaitResult<Self> {
        Self::new(host, ExtensionsConfig::new().with_default_timeout(timeout_ms)).await
    }

    /// Underlying page host
    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &ExtensionsConfig {
        &self.config
    }

    fn timeout_or_default(&self, timeout_ms: Option<u64>) -> u64 {
        timeout_ms.unwrap_or(self.config.default_timeout_ms)
    }

    // =========================================================================
    // Request tracking
    // =========================================================================

    /// Record a network event. The subscription task calls this for every
    /// event the host emits.
    pub fn observe(&self, event: NetworkEvent) {
        record_event(&self.requests, event);
    }

    /// Forget every recorded request.
    ///
    /// Events the host delivered before the call but the subscription has
    /// not logged yet are discarded too. The log survives navigations, so
    /// call this around each `goto`.
    pub fn reset_resource_requests(&self) {
        let mut events = lock_events(&self.events);
        let mut undelivered = 0usize;
        while let Some(Some(_)) = events.next().now_or_never() {
            undelivered += 1;
        }
        tracing::debug!(
            dropped = self.requests.len(),
            undelivered,
            "resetting request log"
        );
        self.requests.clear();
    }

    /// Snapshot of recorded requests in issue order
    #[must_use]
    pub fn requests(&self) -> Vec<ObservedRequest> {
        self.requests.snapshot()
    }

    /// Wait until the first recorded request whose URL contains `pattern`
    /// has a 200 or 304 response.
    ///
    /// Resolves without polling when the log already satisfies the match.
    pub async fn wait_for_resource(
        &self,
        pattern: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let timeout_ms = self.timeout_or_default(timeout_ms);
        if self.requests.is_responded(pattern) {
            tracing::debug!(pattern, "resource already responded");
            return Ok(());
        }

        tracing::debug!(pattern, timeout_ms, "waiting for resource");
        let config = PollConfig::new(RESOURCE_TIMEOUT_MESSAGE)
            .with_interval_ms(self.config.resource_poll_interval_ms)
            .with_timeout_ms(timeout_ms);
        let log = &self.requests;
        poll_for(&config, || std::future::ready(Ok(log.is_responded(pattern)))).await
    }

    /// Wait until exactly `count` font requests have succeeded and the
    /// page reports its fonts ready.
    pub async fn wait_for_loaded_web_font_count_to_be(
        &self,
        count: usize,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let timeout_ms = self.timeout_or_default(timeout_ms);
        tracing::debug!(count, timeout_ms, "waiting for web fonts");

        let config = PollConfig::new(format!("Timeout waiting for {count} web fonts to load."))
            .with_interval_ms(self.config.resource_poll_interval_ms)
            .with_timeout_ms(timeout_ms);
        let probe = FontReadyProbe::default();
        poll_for(&config, || self.fonts_loaded(count, &probe)).await
    }

    async fn fonts_loaded(&self, count: usize, probe: &FontReadyProbe) -> PageWaitResult<bool> {
        let loaded = self.requests.successful_count(&ResourceType::Font);
        if loaded != count {
            tracing::trace!(loaded, count, "font count mismatch");
            return Ok(false);
        }
        probe.is_ready(self.host.as_ref()).await
    }

    // =========================================================================
    // Delegating waits
    // =========================================================================

    async fn wait_until(
        &self,
        function: PageFunction,
        timeout_ms: Option<u64>,
        waiting_for: &str,
    ) -> PageWaitResult<()> {
        let timeout_ms = self.timeout_or_default(timeout_ms);
        tracing::debug!(timeout_ms, "waiting for {waiting_for}");
        self.host
            .wait_for_function(&function.call(), Duration::from_millis(timeout_ms))
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PageWaitError::timeout(format!("Timeout waiting for {waiting_for}."))
                } else {
                    e
                }
            })
    }

    /// Wait until `function` returns a truthy value in the page
    pub async fn wait_for_function(
        &self,
        function: PageFunction,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        self.wait_until(function, timeout_ms, "function").await
    }

    /// Wait until `selector` matches an element with a non-empty layout box
    pub async fn wait_until_exists_and_visible(
        &self,
        selector: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let function = PageFunction::new(VISIBLE_FN).arg(selector);
        self.wait_until(function, timeout_ms, &format!("'{selector}' to be visible"))
            .await
    }

    /// Wait until `selector` is missing or has an empty layout box
    pub async fn wait_while_exists_and_visible(
        &self,
        selector: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let function = PageFunction::new(HIDDEN_FN).arg(selector);
        self.wait_until(function, timeout_ms, &format!("'{selector}' to be hidden"))
            .await
    }

    /// Wait until `selector` is visible and has non-blank text
    pub async fn wait_until_selector_has_visible_content(
        &self,
        selector: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let function = PageFunction::new(VISIBLE_CONTENT_FN).arg(selector);
        self.wait_until(
            function,
            timeout_ms,
            &format!("'{selector}' to have visible content"),
        )
        .await
    }

    /// Wait until `selector` no longer shows non-blank text
    pub async fn wait_while_selector_has_visible_content(
        &self,
        selector: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let function = PageFunction::new(NO_VISIBLE_CONTENT_FN).arg(selector);
        self.wait_until(
            function,
            timeout_ms,
            &format!("'{selector}' to lose visible content"),
        )
        .await
    }

    /// Wait until the `nth` (1-indexed) match of `selector` has `attribute`
    pub async fn wait_for_nth_selector_attribute(
        &self,
        selector: &str,
        nth: usize,
        attribute: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        check_nth(nth)?;
        let function = PageFunction::new(NTH_ATTRIBUTE_FN)
            .arg(selector)
            .arg(nth)
            .arg(attribute);
        self.wait_until(
            function,
            timeout_ms,
            &format!("'{selector}' #{nth} to have attribute '{attribute}'"),
        )
        .await
    }

    /// Wait until the first match of `selector` has `attribute`
    pub async fn wait_for_selector_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        self.wait_for_nth_selector_attribute(selector, 1, attribute, timeout_ms)
            .await
    }

    /// Wait until the `nth` (1-indexed) match of `selector` has
    /// `attribute` equal to `value`
    pub async fn wait_for_nth_selector_attribute_value(
        &self,
        selector: &str,
        nth: usize,
        attribute: &str,
        value: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        check_nth(nth)?;
        let function = PageFunction::new(NTH_ATTRIBUTE_VALUE_FN)
            .arg(selector)
            .arg(nth)
            .arg(attribute)
            .arg(value);
        self.wait_until(
            function,
            timeout_ms,
            &format!("'{selector}' #{nth} to have {attribute}=\"{value}\""),
        )
        .await
    }

    /// Wait until the first match of `selector` has `attribute` equal to `value`
    pub async fn wait_for_selector_attribute_value(
        &self,
        selector: &str,
        attribute: &str,
        value: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        self.wait_for_nth_selector_attribute_value(selector, 1, attribute, value, timeout_ms)
            .await
    }

    /// Wait until `selector` matches exactly `count` elements
    pub async fn wait_for_element_count(
        &self,
        selector: &str,
        count: usize,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let function = PageFunction::new(ELEMENT_COUNT_FN)
            .arg(selector)
            .arg(count);
        self.wait_until(
            function,
            timeout_ms,
            &format!("{count} elements matching '{selector}'"),
        )
        .await
    }

    /// Wait until `document.title` equals `title`
    pub async fn wait_for_document_title(
        &self,
        title: &str,
        timeout_ms: Option<u64>,
    ) -> PageWaitResult<()> {
        let function = PageFunction::new(DOCUMENT_TITLE_FN).arg(title);
        self.wait_until(function, timeout_ms, &format!("document title '{title}'"))
            .await
    }

    /// Wait until the page URL matches the JavaScript regex `pattern`
    pub async fn wait_for_url(&self, pattern: &str, timeout_ms: Option<u64>) -> PageWaitResult<()> {
        let function = PageFunction::new(URL_FN).arg(pattern);
        self.wait_until(function, timeout_ms, &format!("URL matching /{pattern}/"))
            .await
    }

    /// Sleep for exactly `ms` milliseconds
    pub async fn wait_for(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// `value` of the first element matching `selector`
    pub async fn get_value(&self, selector: &str) -> PageWaitResult<serde_json::Value> {
        self.get_property_value(selector, "value").await
    }

    /// `textContent` of the first element matching `selector`
    pub async fn get_text(&self, selector: &str) -> PageWaitResult<serde_json::Value> {
        self.get_property_value(selector, "textContent").await
    }

    /// Read `property` of the first element matching `selector`.
    ///
    /// A missing element or property fails with
    /// [`PageWaitError::PropertyAccess`]; host transport errors pass through.
    pub async fn get_property_value(
        &self,
        selector: &str,
        property: &str,
    ) -> PageWaitResult<serde_json::Value> {
        let function = PageFunction::new(PROPERTY_FN).arg(selector).arg(property);
        self.host
            .evaluate(&function.call())
            .await
            .map_err(|e| match e {
                PageWaitError::Evaluation { message } => PageWaitError::PropertyAccess {
                    selector: selector.to_string(),
                    property: property.to_string(),
                    message,
                },
                other => other,
            })
    }

    /// Whether the first element matching `selector` is the active element
    pub async fn is_element_focused(&self, selector: &str) -> PageWaitResult<bool> {
        let function = PageFunction::new(FOCUSED_FN).arg(selector);
        let focused = self.host.evaluate(&function.call()).await?;
        Ok(focused.as_bool().unwrap_or(false))
    }

    // =========================================================================
    // Page manipulation
    // =========================================================================

    /// Disable CSS transitions and animations (and jQuery effects).
    /// Repeated calls leave a single style element.
    pub async fn turn_off_animations(&self) -> PageWaitResult<()> {
        let function = PageFunction::new(NO_ANIMATIONS_FN).arg(NO_ANIMATIONS_STYLE_ID);
        self.host.evaluate(&function.call()).await?;
        Ok(())
    }

    /// Shift the page's `Date.now` forward by `ms`.
    ///
    /// Offsets compound: each call builds on the already shifted clock.
    pub async fn fast_forward_time(&self, ms: u64) -> PageWaitResult<()> {
        tracing::debug!(ms, "fast-forwarding page clock");
        let function = PageFunction::new(FAST_FORWARD_FN).arg(ms);
        self.host.evaluate(&function.call()).await?;
        Ok(())
    }

    /// Run `function` in the page and return its JSON result
    pub async fn evaluate(&self, function: PageFunction) -> PageWaitResult<serde_json::Value> {
        self.host.evaluate(&function.call()).await
    }
}

fn check_nth(nth: usize) -> PageWaitResult<()> {
    if nth == 0 {
        return Err(PageWaitError::InvalidArgument {
            message: "nth is 1-indexed and must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::host::MockPage;
    use serde_json::json;
    use tokio::time::Instant;

    async fn attach(page: &Arc<MockPage>) -> PageExtensions<MockPage> {
        PageExtensions::new(Arc::clone(page), ExtensionsConfig::default())
            .await
            .unwrap()
    }

    fn responded(ext: &PageExtensions<MockPage>, id: &str, url: &str, kind: ResourceType, status: u16) {
        ext.observe(NetworkEvent::request(id, url, kind));
        ext.observe(NetworkEvent::response(id, status));
    }

    mod resource_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_already_responded_resolves_without_polling() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            responded(&ext, "1", "https://a.test/main.js", ResourceType::Script, 200);

            let start = Instant::now();
            ext.wait_for_resource("main", Some(1_000)).await.unwrap();
            assert_eq!(start.elapsed(), Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_resource_times_out() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;

            let start = Instant::now();
            let err = ext.wait_for_resource("missing", Some(200)).await.unwrap_err();
            let elapsed = start.elapsed();

            assert_eq!(err.to_string(), RESOURCE_TIMEOUT_MESSAGE);
            assert!(elapsed >= Duration::from_millis(200));
            assert!(elapsed <= Duration::from_millis(300));
        }

        #[tokio::test(start_paused = true)]
        async fn test_pending_then_responded() {
            let page = Arc::new(MockPage::new());
            let ext = Arc::new(attach(&page).await);
            ext.observe(NetworkEvent::request("1", "https://a.test/data.json", ResourceType::Fetch));

            let responder = {
                let ext = Arc::clone(&ext);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    ext.observe(NetworkEvent::response("1", 304));
                })
            };

            ext.wait_for_resource("data.json", Some(1_000)).await.unwrap();
            responder.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_status_never_counts() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            responded(&ext, "1", "https://a.test/api", ResourceType::Xhr, 500);
            responded(&ext, "2", "https://a.test/api", ResourceType::Xhr, 200);

            let err = ext.wait_for_resource("api", Some(300)).await.unwrap_err();
            assert!(err.is_timeout());
        }

        #[tokio::test(start_paused = true)]
        async fn test_reset_forgets_matches() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            responded(&ext, "1", "https://a.test/main.js", ResourceType::Script, 200);
            ext.wait_for_resource("main", Some(100)).await.unwrap();

            ext.reset_resource_requests();

            assert!(ext.requests().is_empty());
            let err = ext.wait_for_resource("main", Some(100)).await.unwrap_err();
            assert!(err.is_timeout());
        }

        #[tokio::test(start_paused = true)]
        async fn test_reset_discards_undelivered_events() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            page.emit(NetworkEvent::request("1", "https://old.test/main.js", ResourceType::Script));
            page.emit(NetworkEvent::response("1", 200));

            ext.reset_resource_requests();

            let err = ext.wait_for_resource("main.js", Some(200)).await.unwrap_err();
            assert!(err.is_timeout());
            assert!(ext.requests().is_empty());

            page.emit(NetworkEvent::request("2", "https://new.test/main.js", ResourceType::Script));
            page.emit(NetworkEvent::response("2", 200));
            ext.wait_for_resource("main.js", Some(500)).await.unwrap();
            assert_eq!(ext.requests()[0].url, "https://new.test/main.js");
        }

        #[tokio::test]
        async fn test_reset_twice_equals_once() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            responded(&ext, "1", "u", ResourceType::Font, 200);
            ext.reset_resource_requests();
            ext.reset_resource_requests();
            assert!(ext.requests().is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_default_timeout_applies() {
            let page = Arc::new(MockPage::new());
            let ext = PageExtensions::with_default_timeout(Arc::clone(&page), 400)
                .await
                .unwrap();

            let start = Instant::now();
            ext.wait_for_resource("nothing", None).await.unwrap_err();
            assert!(start.elapsed() >= Duration::from_millis(400));
            assert!(start.elapsed() < Duration::from_millis(600));
        }
    }

    mod font_tests {
        use super::*;

        /// Page whose evaluations never settle
        struct UnresponsivePage;

        #[async_trait::async_trait]
        impl PageHost for UnresponsivePage {
            async fn evaluate(&self, _script: &str) -> PageWaitResult<serde_json::Value> {
                std::future::pending().await
            }

            async fn wait_for_function(&self, _script: &str, _timeout: Duration) -> PageWaitResult<()> {
                std::future::pending().await
            }

            async fn network_events(&self) -> PageWaitResult<BoxStream<'static, NetworkEvent>> {
                Ok(futures::stream::pending().boxed())
            }
        }

        fn install_count(page: &MockPage) -> usize {
            page.evaluated_scripts()
                .iter()
                .filter(|s| s.contains("document.fonts.ready"))
                .count()
        }

        #[tokio::test(start_paused = true)]
        async fn test_two_fonts_and_ready_probe() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| Ok(json!(true)));
            let ext = attach(&page).await;
            responded(&ext, "1", "a.woff2", ResourceType::Font, 200);
            responded(&ext, "2", "b.woff2", ResourceType::Font, 200);

            ext.wait_for_loaded_web_font_count_to_be(2, Some(1_000))
                .await
                .unwrap();
            assert_eq!(install_count(&page), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_one_font_times_out() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| Ok(json!(true)));
            let ext = attach(&page).await;
            responded(&ext, "1", "a.woff2", ResourceType::Font, 200);

            let err = ext
                .wait_for_loaded_web_font_count_to_be(2, Some(1_000))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert!(err.to_string().contains('2'));
            assert_eq!(install_count(&page), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_installed_once_then_read() {
            let page = Arc::new(MockPage::new());
            // install and first two reads say not ready
            page.push_evaluate_result(Ok(json!(false)));
            page.push_evaluate_result(Ok(json!(false)));
            page.push_evaluate_result(Ok(json!(false)));
            page.on_evaluate(|_| Ok(json!(true)));
            let ext = attach(&page).await;
            responded(&ext, "1", "a.woff", ResourceType::Font, 304);

            ext.wait_for_loaded_web_font_count_to_be(1, Some(2_000))
                .await
                .unwrap();

            let scripts = page.evaluated_scripts();
            assert_eq!(scripts.len(), 4);
            assert_eq!(install_count(&page), 1);
            assert!(scripts[1..].iter().all(|s| s == FONTS_READY_READ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_extra_fonts_do_not_match() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| Ok(json!(true)));
            let ext = attach(&page).await;
            responded(&ext, "1", "a.woff", ResourceType::Font, 200);
            responded(&ext, "2", "b.woff", ResourceType::Font, 200);
            responded(&ext, "3", "c.woff", ResourceType::Font, 200);

            let err = ext
                .wait_for_loaded_web_font_count_to_be(2, Some(300))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }

        #[tokio::test(start_paused = true)]
        async fn test_unresponsive_probe_times_out() {
            let ext = PageExtensions::new(Arc::new(UnresponsivePage), ExtensionsConfig::default())
                .await
                .unwrap();
            ext.observe(NetworkEvent::request("1", "a.woff2", ResourceType::Font));
            ext.observe(NetworkEvent::response("1", 200));

            let start = Instant::now();
            let err = ext
                .wait_for_loaded_web_font_count_to_be(1, Some(500))
                .await
                .unwrap_err();

            assert_eq!(err.to_string(), "Timeout waiting for 1 web fonts to load.");
            assert_eq!(start.elapsed(), Duration::from_millis(500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_font_wait_runs_on_spawned_task() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| Ok(json!(true)));
            let ext = Arc::new(attach(&page).await);
            responded(&ext, "1", "a.woff2", ResourceType::Font, 200);

            let waiter = {
                let ext = Arc::clone(&ext);
                tokio::spawn(async move { ext.wait_for_loaded_web_font_count_to_be(1, Some(500)).await })
            };
            waiter.await.unwrap().unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_error_propagates() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| {
                Err(PageWaitError::Host {
                    message: "target closed".to_string(),
                })
            });
            let ext = attach(&page).await;
            responded(&ext, "1", "a.woff", ResourceType::Font, 200);

            let err = ext
                .wait_for_loaded_web_font_count_to_be(1, Some(1_000))
                .await
                .unwrap_err();
            assert!(matches!(err, PageWaitError::Host { .. }));
        }
    }

    mod delegation_tests {
        use super::*;

        #[tokio::test]
        async fn test_visible_wait_uses_default_timeout() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.wait_until_exists_and_visible("#app", None).await.unwrap();

            let waits = page.waited_functions();
            assert_eq!(waits.len(), 1);
            assert!(waits[0].0.contains("getBoundingClientRect"));
            assert!(waits[0].0.ends_with(r##"("#app")"##));
            assert_eq!(waits[0].1, Duration::from_millis(5_000));
        }

        #[tokio::test]
        async fn test_explicit_timeout_overrides_default() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.wait_for_document_title("Home", Some(250)).await.unwrap();
            assert_eq!(page.waited_functions()[0].1, Duration::from_millis(250));
        }

        #[tokio::test]
        async fn test_host_timeout_gets_operation_message() {
            let page = Arc::new(MockPage::new());
            page.on_wait_for_function(|_, _| Err(PageWaitError::timeout("waiting failed")));
            let ext = attach(&page).await;

            let err = ext
                .wait_for_element_count("li.todo", 3, Some(10))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert_eq!(
                err.to_string(),
                "Timeout waiting for 3 elements matching 'li.todo'."
            );
        }

        #[tokio::test]
        async fn test_non_timeout_host_errors_pass_through() {
            let page = Arc::new(MockPage::new());
            page.on_wait_for_function(|_, _| {
                Err(PageWaitError::Evaluation {
                    message: "SyntaxError: bad selector".to_string(),
                })
            });
            let ext = attach(&page).await;

            let err = ext
                .wait_while_exists_and_visible("div[", None)
                .await
                .unwrap_err();
            assert!(matches!(err, PageWaitError::Evaluation { .. }));
        }

        #[tokio::test]
        async fn test_selector_attribute_is_first_match() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.wait_for_selector_attribute("input", "disabled", None)
                .await
                .unwrap();
            ext.wait_for_selector_attribute_value("a", "href", "/home", None)
                .await
                .unwrap();

            let waits = page.waited_functions();
            assert!(waits[0].0.ends_with(r#"("input", 1, "disabled")"#));
            assert!(waits[1].0.ends_with(r#"("a", 1, "href", "/home")"#));
        }

        #[tokio::test]
        async fn test_nth_attribute_value_arguments() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.wait_for_nth_selector_attribute_value("li", 3, "class", "done", None)
                .await
                .unwrap();
            let waits = page.waited_functions();
            assert!(waits[0].0.contains("getAttribute(attr) === value"));
            assert!(waits[0].0.ends_with(r#"("li", 3, "class", "done")"#));
        }

        #[tokio::test]
        async fn test_nth_zero_rejected() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            let err = ext
                .wait_for_nth_selector_attribute("li", 0, "class", None)
                .await
                .unwrap_err();
            assert!(matches!(err, PageWaitError::InvalidArgument { .. }));
            assert!(page.waited_functions().is_empty());
        }

        #[tokio::test]
        async fn test_content_waits() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.wait_until_selector_has_visible_content(".toast", None)
                .await
                .unwrap();
            ext.wait_while_selector_has_visible_content(".toast", None)
                .await
                .unwrap();
            let waits = page.waited_functions();
            assert!(waits.iter().all(|(s, _)| s.contains("textContent")));
            assert!(waits[1].0.contains("return !("));
        }

        #[tokio::test]
        async fn test_url_and_custom_function() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.wait_for_url(r"/done\?id=\d+$", None).await.unwrap();
            ext.wait_for_function(PageFunction::new("() => window.ready === true"), Some(50))
                .await
                .unwrap();

            let waits = page.waited_functions();
            assert!(waits[0].0.contains("new RegExp(pattern)"));
            assert!(waits[0].0.contains(r#""/done\\?id=\\d+$""#));
            assert_eq!(waits[1].0, "(() => window.ready === true)()");
        }

        #[tokio::test(start_paused = true)]
        async fn test_wait_for_sleeps_exactly() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            let start = Instant::now();
            ext.wait_for(1_234).await;
            assert_eq!(start.elapsed(), Duration::from_millis(1_234));
        }
    }

    mod getter_tests {
        use super::*;

        #[tokio::test]
        async fn test_get_value_and_text() {
            let page = Arc::new(MockPage::new());
            page.push_evaluate_result(Ok(json!("hello")));
            page.push_evaluate_result(Ok(json!("Title")));
            let ext = attach(&page).await;

            assert_eq!(ext.get_value("#name").await.unwrap(), json!("hello"));
            assert_eq!(ext.get_text("h1").await.unwrap(), json!("Title"));

            let scripts = page.evaluated_scripts();
            assert!(scripts[0].ends_with(r##"("#name", "value")"##));
            assert!(scripts[1].ends_with(r#"("h1", "textContent")"#));
        }

        #[tokio::test]
        async fn test_missing_element_names_selector_and_property() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| {
                Err(PageWaitError::Evaluation {
                    message: "Error: no element matches selector".to_string(),
                })
            });
            let ext = attach(&page).await;

            let err = ext
                .get_property_value("#ghost", "checked")
                .await
                .unwrap_err();
            match &err {
                PageWaitError::PropertyAccess {
                    selector, property, ..
                } => {
                    assert_eq!(selector, "#ghost");
                    assert_eq!(property, "checked");
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(err.to_string().contains("#ghost"));
            assert!(err.to_string().contains("checked"));
        }

        #[tokio::test]
        async fn test_host_errors_not_wrapped() {
            let page = Arc::new(MockPage::new());
            page.on_evaluate(|_| {
                Err(PageWaitError::Host {
                    message: "page closed".to_string(),
                })
            });
            let ext = attach(&page).await;
            let err = ext.get_text("h1").await.unwrap_err();
            assert!(matches!(err, PageWaitError::Host { .. }));
        }

        #[tokio::test]
        async fn test_is_element_focused() {
            let page = Arc::new(MockPage::new());
            page.push_evaluate_result(Ok(json!(true)));
            page.push_evaluate_result(Ok(json!(false)));
            let ext = attach(&page).await;

            assert!(ext.is_element_focused("#search").await.unwrap());
            assert!(!ext.is_element_focused("#other").await.unwrap());
            assert!(page.was_evaluated("document.activeElement === el"));
        }
    }

    mod manipulation_tests {
        use super::*;

        #[tokio::test]
        async fn test_turn_off_animations_targets_style_id() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.turn_off_animations().await.unwrap();
            ext.turn_off_animations().await.unwrap();

            let scripts = page.evaluated_scripts();
            assert_eq!(scripts.len(), 2);
            assert!(scripts[0].contains("getElementById(id)"));
            assert!(scripts[0].ends_with(&format!("(\"{NO_ANIMATIONS_STYLE_ID}\")")));
        }

        #[tokio::test]
        async fn test_fast_forward_wraps_previous_clock() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.fast_forward_time(60_000).await.unwrap();

            let scripts = page.evaluated_scripts();
            assert!(scripts[0].contains("const previous = Date.now"));
            assert!(scripts[0].ends_with("(60000)"));
        }

        #[tokio::test]
        async fn test_evaluate_returns_json() {
            let page = Arc::new(MockPage::new());
            page.push_evaluate_result(Ok(json!({"w": 800})));
            let ext = attach(&page).await;
            let value = ext
                .evaluate(PageFunction::new("() => ({ w: innerWidth })"))
                .await
                .unwrap();
            assert_eq!(value, json!({"w": 800}));
        }
    }

    mod subscription_tests {
        use super::*;

        #[tokio::test]
        async fn test_response_without_request_adds_no_entry() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            ext.observe(NetworkEvent::response("42", 200));
            assert!(ext.requests().is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_response_before_request_still_counts() {
            let page = Arc::new(MockPage::new());
            let ext = attach(&page).await;
            page.emit(NetworkEvent::response("9", 200));
            page.emit(NetworkEvent::request("9", "https://a.test/late.css", ResourceType::Stylesheet));

            ext.wait_for_resource("late.css", Some(500)).await.unwrap();
            assert_eq!(ext.requests()[0].status, Some(200));
        }

        #[tokio::test]
        async fn test_second_facade_on_same_mock_fails() {
            let page = Arc::new(MockPage::new());
            let _ext = attach(&page).await;
            let second = PageExtensions::new(Arc::clone(&page), ExtensionsConfig::default()).await;
            assert!(second.is_err());
        }
    }
}
