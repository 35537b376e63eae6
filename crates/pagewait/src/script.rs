//! Page function builder
//!
//! Turns a JavaScript function source plus serializable arguments into an
//! expression the host can evaluate in the page context. Arguments are
//! always JSON-encoded, so selectors and attribute values never need manual
//! quoting.

use crate::result::PageWaitResult;
use serde::Serialize;

/// A JavaScript function and the arguments it will be called with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFunction {
    source: String,
    args: Vec<serde_json::Value>,
}

impl PageFunction {
    /// Wrap a function source such as `"(sel) => !!document.querySelector(sel)"`
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            args: Vec::new(),
        }
    }

    /// Append an already-encoded argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append any serializable argument
    pub fn try_arg<T: Serialize>(mut self, value: &T) -> PageWaitResult<Self> {
        self.args.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Function source as given
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Arguments in call order
    #[must_use]
    pub fn args(&self) -> &[serde_json::Value] {
        &self.args
    }

    /// Render `(<source>)(<args>)`
    #[must_use]
    pub fn call(&self) -> String {
        let args = self
            .args
            .iter()
            .map(serde_json::Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("({})({})", self.source, args)
    }
}

impl std::fmt::Display for PageFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.call())
    }
}
