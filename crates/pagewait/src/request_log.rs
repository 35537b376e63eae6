//! Request log
//!
//! Ordered, append-only record of the network requests a page issued since
//! the last reset. Entries are never removed individually; the only
//! destructive operation is [`RequestLog::clear`].
//!
//! The log does not notice navigations. Callers reset it when the page
//! moves to a new document.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// =============================================================================
// RESOURCE TYPE
// =============================================================================

/// Category the host assigned to a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Top-level or frame document
    Document,
    /// CSS stylesheet
    Stylesheet,
    /// Image
    Image,
    /// Audio or video
    Media,
    /// Web font
    Font,
    /// Script
    Script,
    /// Text track (subtitles)
    TextTrack,
    /// XMLHttpRequest
    Xhr,
    /// fetch()
    Fetch,
    /// Server-sent events
    EventSource,
    /// WebSocket handshake
    WebSocket,
    /// Web app manifest
    Manifest,
    /// Anything else the host reports
    Other(String),
}

impl ResourceType {
    /// Parse a host category tag, ignoring case
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "media" => Self::Media,
            "font" => Self::Font,
            "script" => Self::Script,
            "texttrack" => Self::TextTrack,
            "xhr" => Self::Xhr,
            "fetch" => Self::Fetch,
            "eventsource" => Self::EventSource,
            "websocket" => Self::WebSocket,
            "manifest" => Self::Manifest,
            _ => Self::Other(tag.to_string()),
        }
    }

    /// Lowercase tag for this category
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "document",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Media => "media",
            Self::Font => "font",
            Self::Script => "script",
            Self::TextTrack => "texttrack",
            Self::Xhr => "xhr",
            Self::Fetch => "fetch",
            Self::EventSource => "eventsource",
            Self::WebSocket => "websocket",
            Self::Manifest => "manifest",
            Self::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// OBSERVED REQUEST
// =============================================================================

/// A request seen on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRequest {
    /// Host identifier used to attach the response
    pub request_id: String,
    /// Request URL
    pub url: String,
    /// Resource category
    pub resource_type: ResourceType,
    /// Response status, `None` until the response arrives
    pub status: Option<u16>,
}

impl ObservedRequest {
    /// Create a request with no response yet
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            resource_type,
            status: None,
        }
    }

    /// Set the response status
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// 200 and 304 are the only successful terminal statuses
    #[must_use]
    pub const fn is_successful(&self) -> bool {
        matches!(self.status, Some(200 | 304))
    }
}

// =============================================================================
// REQUEST LOG
// =============================================================================

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<ObservedRequest>,
    /// Statuses whose response arrived before the matching request
    early_statuses: HashMap<String, u16>,
}

/// Shared, ordered log of observed requests
///
/// Clones share the same underlying buffer, so a subscription task can
/// append while the owning facade reads.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    state: Arc<Mutex<LogState>>,
}

impl RequestLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // entries stay valid even if a writer panicked mid-push
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a request in issue order.
    ///
    /// A status recorded earlier for the same id is applied on arrival.
    pub fn push(&self, mut request: ObservedRequest) {
        let mut state = self.lock();
        if let Some(status) = state.early_statuses.remove(&request.request_id) {
            if request.status.is_none() {
                request.status = Some(status);
            }
        }
        state.entries.push(request);
    }

    /// Attach a response status to the first entry with `request_id`.
    ///
    /// Returns `false` when no such entry exists yet. The status is then
    /// held until a request with that id is pushed, or the log is cleared.
    pub fn record_status(&self, request_id: &str, status: u16) -> bool {
        let mut state = self.lock();
        if let Some(entry) = state.entries.iter_mut().find(|r| r.request_id == request_id) {
            entry.status = Some(status);
            return true;
        }
        state.early_statuses.insert(request_id.to_string(), status);
        false
    }

    /// Drop every entry and every held status
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.early_statuses.clear();
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Copy of all entries in log order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ObservedRequest> {
        self.lock().entries.clone()
    }

    /// First entry whose URL contains `pattern` (plain substring)
    #[must_use]
    pub fn first_match(&self, pattern: &str) -> Option<ObservedRequest> {
        self.lock()
            .entries
            .iter()
            .find(|r| r.url.contains(pattern))
            .cloned()
    }

    /// Whether the first URL match has a successful response.
    ///
    /// Later matches are never consulted: a failed or pending first match
    /// keeps this `false` even if a later request for the same pattern
    /// succeeded.
    #[must_use]
    pub fn is_responded(&self, pattern: &str) -> bool {
        self.lock()
            .entries
            .iter()
            .find(|r| r.url.contains(pattern))
            .is_some_and(ObservedRequest::is_successful)
    }

    /// Number of successful entries of the given category
    #[must_use]
    pub fn successful_count(&self, resource_type: &ResourceType) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|r| &r.resource_type == resource_type && r.is_successful())
            .count()
    }
}
