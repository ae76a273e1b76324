//! DevTools-backed [`RenderSession`] attached to an already running browser.
//!
//! The browser is started and signed in by the operator (e.g. with
//! `--remote-debugging-port=9222`); this module never launches or closes it.

#[cfg(feature = "browser")]
use std::future::Future;
#[cfg(feature = "browser")]
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(feature = "browser")]
use anyhow::Context;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tracing::{debug, info};

use super::config::BrowserConfig;
use super::render_session::{ElementHandle, RenderSession, SessionError};

/// Resolve the DevTools websocket URL from an `http://host:port` endpoint
#[cfg(feature = "browser")]
async fn resolve_websocket_url(debugger_url: &str) -> Result<String> {
    if debugger_url.starts_with("ws://") || debugger_url.starts_with("wss://") {
        return Ok(debugger_url.to_string());
    }

    let version_url = format!("{}/json/version", debugger_url.trim_end_matches('/'));
    let resp: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .context("Failed to reach the browser's DevTools endpoint")?
        .json()
        .await
        .context("Failed to parse browser version info")?;

    resp.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))
}

/// One tab of a remote browser
#[cfg(feature = "browser")]
pub struct ChromiumSession {
    _browser: Browser,
    page: Page,
    request_timeout: Duration,
    handler_task: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "browser")]
impl ChromiumSession {
    /// Attach to the browser and open a fresh tab
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        info!("🧭 Connecting to browser at {}", config.debugger_url);

        let ws_url = resolve_websocket_url(&config.debugger_url).await?;
        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout,
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open a browser tab")?;

        info!("✅ Browser tab ready");
        Ok(Self {
            _browser: browser,
            page,
            request_timeout,
            handler_task,
        })
    }

    fn timeout_ms(&self) -> u64 {
        self.request_timeout.as_millis() as u64
    }

    /// Run a CDP call under the request timeout
    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, CdpError>> + Send,
        map_err: impl FnOnce(String) -> SessionError + Send,
    ) -> Result<T, SessionError> {
        if self.handler_task.is_finished() {
            return Err(SessionError::disconnected("DevTools connection closed"));
        }
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CdpError::Ws(e))) => Err(SessionError::disconnected(e.to_string())),
            Ok(Err(e)) => Err(map_err(e.to_string())),
            Err(_) => Err(SessionError::timeout(operation, self.timeout_ms())),
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl RenderSession for ChromiumSession {
    async fn load(&mut self, url: &str) -> Result<(), SessionError> {
        debug!("Navigating to {}", url);
        let page = self.page.clone();
        self.bounded(
            "navigation",
            async move { page.goto(url).await.map(|_| ()) },
            |reason| SessionError::navigation(url, reason),
        )
        .await
    }

    async fn current_address(&mut self) -> Result<String, SessionError> {
        let page = self.page.clone();
        let url = self
            .bounded("url lookup", async move { page.url().await }, SessionError::script)
            .await?;
        Ok(url.unwrap_or_default())
    }

    async fn current_markup(&mut self) -> Result<String, SessionError> {
        let page = self.page.clone();
        self.bounded("content snapshot", async move { page.content().await }, SessionError::script)
            .await
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, SessionError> {
        let page = self.page.clone();
        let script = script.to_string();
        let result = self
            .bounded(
                "script evaluation",
                async move { page.evaluate(script).await },
                SessionError::script,
            )
            .await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        let page = self.page.clone();
        let query = selector.to_string();
        let found = self
            .bounded(
                "element lookup",
                async move { page.find_elements(query).await },
                SessionError::script,
            )
            .await?;
        Ok((0..found.len())
            .map(|index| ElementHandle::new(selector, index))
            .collect())
    }

    async fn scroll_by(&mut self, dx: i64, dy: i64) -> Result<(), SessionError> {
        self.execute_script(&format!("window.scrollBy({dx}, {dy})"))
            .await
            .map(|_| ())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        let page = self.page.clone();
        let selector = element.selector.clone();
        let index = element.index;
        let not_interactable = |reason: String| SessionError::ElementNotInteractable {
            selector: element.selector.clone(),
            reason,
        };
        self.bounded(
            "click",
            async move {
                let elements = page.find_elements(selector).await?;
                match elements.get(index) {
                    Some(el) => el.click().await.map(|_| ()),
                    None => Err(CdpError::NotFound),
                }
            },
            not_interactable,
        )
        .await
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), SessionError> {
        let page = self.page.clone();
        let params = SetUserAgentOverrideParams::new(user_agent.to_string());
        self.bounded(
            "user agent override",
            async move { page.execute(params).await.map(|_| ()) },
            SessionError::script,
        )
        .await
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct ChromiumSession {
    _private: (),
}

#[cfg(not(feature = "browser"))]
fn not_compiled() -> SessionError {
    SessionError::disconnected(
        "Browser support not compiled. Rebuild with: cargo build --features browser",
    )
}

#[cfg(not(feature = "browser"))]
impl ChromiumSession {
    pub async fn connect(_config: &BrowserConfig) -> Result<Self> {
        Err(anyhow::anyhow!(not_compiled()))
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl RenderSession for ChromiumSession {
    async fn load(&mut self, _url: &str) -> Result<(), SessionError> {
        Err(not_compiled())
    }

    async fn current_address(&mut self) -> Result<String, SessionError> {
        Err(not_compiled())
    }

    async fn current_markup(&mut self) -> Result<String, SessionError> {
        Err(not_compiled())
    }

    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value, SessionError> {
        Err(not_compiled())
    }

    async fn find_elements(&mut self, _selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        Err(not_compiled())
    }

    async fn scroll_by(&mut self, _dx: i64, _dy: i64) -> Result<(), SessionError> {
        Err(not_compiled())
    }

    async fn click(&mut self, _element: &ElementHandle) -> Result<(), SessionError> {
        Err(not_compiled())
    }
}
