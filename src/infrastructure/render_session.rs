//! Rendering session abstraction
//!
//! A session is one browser tab driven by the scraper. The core only needs a
//! handful of operations; the concrete DevTools adapter lives in
//! `chromium_session`, a scripted fake is used in tests.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a rendering session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("script evaluation failed: {reason}")]
    Script { reason: String },

    #[error("element '{selector}' is not interactable: {reason}")]
    ElementNotInteractable { selector: String, reason: String },

    #[error("rendering session disconnected: {reason}")]
    Disconnected { reason: String },
}

impl SessionError {
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn script(reason: impl Into<String>) -> Self {
        Self::Script {
            reason: reason.into(),
        }
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    /// Whether retrying on the same session can help
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Disconnected { .. })
    }
}

/// Reference to the `index`-th element matching `selector` at lookup time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

/// One browser tab. All calls are bounded by the implementation's timeouts.
#[async_trait]
pub trait RenderSession: Send {
    /// Navigate and wait for the navigation to commit
    async fn load(&mut self, url: &str) -> Result<(), SessionError>;

    /// Address after redirects
    async fn current_address(&mut self) -> Result<String, SessionError>;

    /// Serialized live DOM
    async fn current_markup(&mut self) -> Result<String, SessionError>;

    /// Evaluate a script expression and return its JSON value (`null` for undefined)
    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, SessionError>;

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError>;

    async fn scroll_by(&mut self, dx: i64, dy: i64) -> Result<(), SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    /// Best effort; sessions that cannot override the user agent ignore it
    async fn set_user_agent(&mut self, _user_agent: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Quote `value` as a JavaScript string literal
pub fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Returns `document.readyState`
pub const READY_STATE_SCRIPT: &str = "document.readyState";

/// Center the element in the viewport; evaluates to whether it exists
pub fn scroll_into_view_script(element: &ElementHandle) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll({})[{}]; \
         if (el) {{ el.scrollIntoView({{block: 'center'}}); }} return !!el; }})()",
        js_string(&element.selector),
        element.index
    )
}

/// DOM-level click, used when a native click is rejected
pub fn click_script(element: &ElementHandle) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll({})[{}]; \
         if (!el) {{ throw new Error('element vanished'); }} el.click(); return true; }})()",
        js_string(&element.selector),
        element.index
    )
}

/// Scroll the first existing element of `selectors` into view
pub fn scroll_first_into_view_script(selectors: &[&str]) -> String {
    let list = selectors
        .iter()
        .map(|s| js_string(s))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "(() => {{ const el = [{list}].map(s => document.querySelector(s)).find(Boolean); \
         if (el) {{ el.scrollIntoView({{block: 'center', inline: 'nearest'}}); }} return !!el; }})()"
    )
}
