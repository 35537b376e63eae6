//! pagewait: polling waits and page helpers for browser end-to-end tests
//!
//! A thin layer over a page automation engine that makes UI tests terse:
//! waits on network resources, web fonts, selectors, attributes, titles and
//! URLs; shortcuts for reading element values; and page tweaks such as
//! disabling animations or fast-forwarding the page clock.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageExtensions (one per page)                                │
//! │                                                               │
//! │   network events ──► RequestLog ──► poll_for ──► resource /   │
//! │   (subscription)                                font waits    │
//! │                                                               │
//! │   PageFunction ──► PageHost::wait_for_function ──► selector / │
//! │                                               title/url waits │
//! ├──────────────────────────────────────────────────────────────┤
//! │  PageHost: ChromiumPage (feature `browser`) │ MockPage        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The request log is never cleared automatically. Call
//! [`PageExtensions::reset_resource_requests`] around every navigation.

#![warn(missing_docs)]

mod config;
mod extensions;
mod host;
mod poll;
mod request_log;
mod result;
mod script;

#[cfg(feature = "browser")]
mod cdp;

pub use config::{ExtensionsConfig, DEFAULT_TIMEOUT_MS, ENV_DEFAULT_TIMEOUT, ENV_POLL_INTERVAL};
pub use extensions::{PageExtensions, NO_ANIMATIONS_STYLE_ID, RESOURCE_TIMEOUT_MESSAGE};
pub use host::{MockPage, NetworkEvent, PageHost};
pub use poll::{poll_for, PollConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_TIMEOUT_MS};
pub use request_log::{ObservedRequest, RequestLog, ResourceType};
pub use result::{PageWaitError, PageWaitResult};
pub use script::PageFunction;

#[cfg(feature = "browser")]
pub use cdp::ChromiumPage;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        poll_for, ExtensionsConfig, MockPage, NetworkEvent, ObservedRequest, PageExtensions,
        PageFunction, PageHost, PageWaitError, PageWaitResult, PollConfig, ResourceType,
    };

    #[cfg(feature = "browser")]
    pub use super::ChromiumPage;
}
