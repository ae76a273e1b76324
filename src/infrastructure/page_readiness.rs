//! Page readiness state machine
//!
//! Drives a [`RenderSession`] from navigation to a markup snapshot that is
//! safe to extract from:
//!
//! ```text
//! Loading ──► ContentCheck ──► GalleryInit ──► GalleryWait ──► Ready
//!    ▲  │           │
//!    └──┴───────────┘ (retry within the attempt budget, then Failed)
//! ```
//!
//! Only `Loading`/`ContentCheck` can fail an identifier. Gallery problems
//! degrade to `gallery_loaded = false`.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::config::ReadinessConfig;
use super::parsing::selectors::{detail, gallery};
use super::render_session::{
    ElementHandle, READY_STATE_SCRIPT, RenderSession, SessionError, click_script,
    scroll_first_into_view_script, scroll_into_view_script,
};

/// States of one readiness run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Loading,
    ContentCheck,
    GalleryInit,
    GalleryWait,
    Ready,
    Failed,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::ContentCheck => "content check",
            Self::GalleryInit => "gallery init",
            Self::GalleryWait => "gallery wait",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot taken in `Ready`
#[derive(Debug, Clone)]
pub struct ReadyPage {
    pub markup: String,
    pub address: String,
    pub gallery_loaded: bool,
    pub main_image_clicked: bool,
    /// Load attempts used (1-based)
    pub attempts: u32,
}

/// Terminal `Failed` outcomes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessFailure {
    #[error("page not ready after {attempts} attempt(s): {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },

    #[error("rendering session lost: {0}")]
    SessionLost(String),

    #[error("could not snapshot the rendered page: {0}")]
    Snapshot(String),
}

impl ReadinessFailure {
    /// Whether later identifiers can still succeed on the same session
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SessionLost(_))
    }
}

/// Why a single load attempt did not reach `ContentCheck` success
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptError {
    Session(SessionError),
    NoProductContent { address: String },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(e) => write!(f, "{e}"),
            Self::NoProductContent { address } => write!(f, "no product content at {address}"),
        }
    }
}

/// Runs the readiness state machine with the configured timeouts
#[derive(Debug, Clone, Default)]
pub struct PageReadinessController {
    config: ReadinessConfig,
}

impl PageReadinessController {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Bring `url` to `Ready`.
    ///
    /// `on_retry(attempt, reason)` is called for every failed load attempt,
    /// including the last one.
    pub async fn prepare<S>(
        &self,
        session: &mut S,
        url: &str,
        mut on_retry: impl FnMut(u32, &str) + Send,
    ) -> Result<ReadyPage, ReadinessFailure>
    where
        S: RenderSession + ?Sized,
    {
        let attempts = self.load_product_page(session, url, &mut on_retry).await?;

        debug!(state = %ReadinessState::GalleryInit, "Opening gallery");
        let main_image_clicked = self.init_gallery(session).await;
        if main_image_clicked {
            info!("   🔎 Main image clicked to initialize the gallery");
            sleep(Duration::from_millis(self.config.post_click_delay_ms)).await;
        } else {
            warn!("   ⚠️ Main image not clickable - waiting for the gallery anyway");
        }

        debug!(state = %ReadinessState::GalleryWait, "Waiting for gallery thumbnails");
        let gallery_loaded = self.wait_for_gallery(session).await?;
        if !gallery_loaded {
            warn!("   ⚠️ Gallery not confirmed loaded - continuing");
        }

        let markup = session
            .current_markup()
            .await
            .map_err(|e| ReadinessFailure::Snapshot(e.to_string()))?;
        let address = session
            .current_address()
            .await
            .unwrap_or_else(|_| url.to_string());

        debug!(state = %ReadinessState::Ready, attempts, gallery_loaded, "Page ready");
        Ok(ReadyPage {
            markup,
            address,
            gallery_loaded,
            main_image_clicked,
            attempts,
        })
    }

    /// `Loading` + `ContentCheck` with the shared attempt budget
    async fn load_product_page<S>(
        &self,
        session: &mut S,
        url: &str,
        on_retry: &mut (impl FnMut(u32, &str) + Send),
    ) -> Result<u32, ReadinessFailure>
    where
        S: RenderSession + ?Sized,
    {
        let budget = self.config.load_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=budget {
            info!("   Attempt {}: {}", attempt, url);
            match self.attempt_load(session, url).await {
                Ok(()) => {
                    info!("   ✅ Page loaded");
                    return Ok(attempt);
                }
                Err(AttemptError::Session(e)) if !e.is_recoverable() => {
                    debug!(state = %ReadinessState::Failed, "Session lost: {}", e);
                    return Err(ReadinessFailure::SessionLost(e.to_string()));
                }
                Err(e) => {
                    warn!("   Attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                    on_retry(attempt, &last_error);
                }
            }
        }

        debug!(state = %ReadinessState::Failed, "Attempt budget exhausted");
        Err(ReadinessFailure::AttemptsExhausted {
            attempts: budget,
            last_error,
        })
    }

    async fn attempt_load<S>(&self, session: &mut S, url: &str) -> Result<(), AttemptError>
    where
        S: RenderSession + ?Sized,
    {
        debug!(state = %ReadinessState::Loading, "Navigating");
        session.load(url).await.map_err(AttemptError::Session)?;
        self.wait_for_document_complete(session)
            .await
            .map_err(AttemptError::Session)?;
        sleep(self.config.settle_delay()).await;

        debug!(state = %ReadinessState::ContentCheck, "Checking for product content");
        let address = session.current_address().await.map_err(AttemptError::Session)?;
        let markup = session.current_markup().await.map_err(AttemptError::Session)?;
        if address.contains("/dp/") && markup.contains(detail::PRODUCT_TITLE_MARKER) {
            Ok(())
        } else {
            Err(AttemptError::NoProductContent { address })
        }
    }

    /// Poll `document.readyState` until `complete` or the load timeout
    async fn wait_for_document_complete<S>(&self, session: &mut S) -> Result<(), SessionError>
    where
        S: RenderSession + ?Sized,
    {
        let deadline = Instant::now() + self.config.ready_state_timeout();
        loop {
            match session.execute_script(READY_STATE_SCRIPT).await {
                Ok(state) if state.as_str() == Some("complete") => return Ok(()),
                Ok(_) => {}
                Err(e) if !e.is_recoverable() => return Err(e),
                // The document may be mid-navigation; keep polling
                Err(e) => debug!("readyState poll failed: {}", e),
            }
            if Instant::now() >= deadline {
                return Err(SessionError::timeout(
                    "document load",
                    self.config.ready_state_timeout_ms,
                ));
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Poll for `selector` for up to `window`; empty when it never appears
    async fn wait_for_elements<S>(
        &self,
        session: &mut S,
        selector: &str,
        window: Duration,
    ) -> Result<Vec<ElementHandle>, SessionError>
    where
        S: RenderSession + ?Sized,
    {
        let deadline = Instant::now() + window;
        loop {
            match session.find_elements(selector).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => {}
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => debug!("Lookup of '{}' failed: {}", selector, e),
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// `GalleryInit`: click the first main-image candidate that appears.
    ///
    /// A rejected native click falls back to a DOM click; if that fails too
    /// the next candidate is tried. Returns whether anything was clicked.
    async fn init_gallery<S>(&self, session: &mut S) -> bool
    where
        S: RenderSession + ?Sized,
    {
        let window = Duration::from_millis(self.config.main_image_wait_ms);
        for selector in gallery::MAIN_IMAGE {
            let target = match self.wait_for_elements(session, selector, window).await {
                Ok(found) => found.into_iter().next(),
                Err(e) => {
                    debug!("Main image lookup aborted: {}", e);
                    return false;
                }
            };
            let Some(target) = target else {
                continue;
            };

            if let Err(e) = session.execute_script(&scroll_into_view_script(&target)).await {
                debug!("scrollIntoView failed for '{}': {}", selector, e);
            }
            sleep(Duration::from_millis(self.config.scroll_pause_ms)).await;

            match session.click(&target).await {
                Ok(()) => return true,
                Err(e) => {
                    debug!("Native click on '{}' rejected ({}), trying DOM click", selector, e);
                    match session.execute_script(&click_script(&target)).await {
                        Ok(_) => return true,
                        Err(e) => debug!("DOM click on '{}' failed: {}", selector, e),
                    }
                }
            }
        }
        false
    }

    /// `GalleryWait`: poll rounds with scroll nudges, then one long wait.
    ///
    /// Only a lost session is an error; an absent gallery is `Ok(false)`.
    async fn wait_for_gallery<S>(&self, session: &mut S) -> Result<bool, ReadinessFailure>
    where
        S: RenderSession + ?Sized,
    {
        let lost = |e: SessionError| ReadinessFailure::SessionLost(e.to_string());
        let pause = Duration::from_millis(self.config.scroll_pause_ms);

        match session
            .execute_script(&scroll_first_into_view_script(gallery::SCROLL_TARGETS))
            .await
        {
            Err(e) if !e.is_recoverable() => return Err(lost(e)),
            Err(e) => debug!("Gallery scrollIntoView failed: {}", e),
            Ok(_) => {}
        }
        sleep(pause).await;

        let round_window = Duration::from_millis(self.config.gallery_poll_ms);
        for round in 1..=self.config.gallery_rounds {
            let found = self
                .wait_for_elements(session, gallery::RENDERED_MARKER, round_window)
                .await
                .map_err(lost)?;
            if !found.is_empty() {
                return Ok(true);
            }

            debug!("Gallery not rendered after round {}, nudging scroll", round);
            if let Err(e) = session.scroll_by(0, self.config.scroll_down_px).await {
                debug!("Scroll failed: {}", e);
            }
            sleep(pause).await;
            if let Err(e) = session.scroll_by(0, -self.config.scroll_up_px).await {
                debug!("Scroll failed: {}", e);
            }
            sleep(pause).await;
        }

        let final_window = Duration::from_millis(self.config.final_gallery_wait_ms);
        let found = self
            .wait_for_elements(session, gallery::RENDERED_MARKER, final_window)
            .await
            .map_err(lost)?;
        Ok(!found.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakePage, FakeRenderSession, GalleryReveal, LoadBehavior, gallery_rows};

    const URL: &str = "https://www.amazon.de/dp/B000TEST01/";

    fn gallery() -> String {
        gallery_rows(&[(0, "https://m.media-amazon.com/images/I/A._AC_US40_.jpg")])
    }

    fn controller() -> PageReadinessController {
        PageReadinessController::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt() {
        let mut session = FakeRenderSession::new().with_page(URL, FakePage::product("Lamp", gallery()));

        let page = controller().prepare(&mut session, URL, |_, _| {}).await.unwrap();

        assert_eq!(page.attempts, 1);
        assert!(page.gallery_loaded);
        assert!(page.main_image_clicked);
        assert!(page.markup.contains("ivRow"));
        assert_eq!(page.address, URL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_success_uses_second_attempt() {
        let page = FakePage::product("Lamp", gallery()).with_loads([
            LoadBehavior::Fail(SessionError::timeout("navigation", 12_000)),
            LoadBehavior::Ready,
        ]);
        let mut session = FakeRenderSession::new().with_page(URL, page);
        let mut retries = Vec::new();

        let ready = controller()
            .prepare(&mut session, URL, |attempt, reason| {
                retries.push((attempt, reason.to_string()))
            })
            .await
            .unwrap();

        assert_eq!(ready.attempts, 2);
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].0, 1);
        assert!(retries[0].1.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_fails() {
        let page = FakePage::product("Lamp", gallery())
            .with_loads([LoadBehavior::NeverComplete, LoadBehavior::NotProductPage]);
        let mut session = FakeRenderSession::new().with_page(URL, page);
        let mut retries = 0;

        let err = controller()
            .prepare(&mut session, URL, |_, _| retries += 1)
            .await
            .unwrap_err();

        assert_eq!(retries, 2);
        assert_eq!(session.loaded_urls.len(), 2);
        match err {
            ReadinessFailure::AttemptsExhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("no product content"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_fails_without_retry() {
        let page = FakePage::product("Lamp", gallery())
            .with_loads([LoadBehavior::Fail(SessionError::disconnected("socket closed"))]);
        let mut session = FakeRenderSession::new().with_page(URL, page);

        let err = controller().prepare(&mut session, URL, |_, _| {}).await.unwrap_err();

        assert!(matches!(err, ReadinessFailure::SessionLost(_)));
        assert!(!err.is_recoverable());
        assert_eq!(session.loaded_urls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gallery_revealed_by_click() {
        let page = FakePage::product("Lamp", gallery()).with_reveal(GalleryReveal::AfterClick);
        let mut session = FakeRenderSession::new().with_page(URL, page);

        let ready = controller().prepare(&mut session, URL, |_, _| {}).await.unwrap();

        assert!(ready.gallery_loaded);
        assert_eq!(session.native_clicks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_native_click_degrades_to_script_click() {
        let page = FakePage::product("Lamp", gallery())
            .with_reveal(GalleryReveal::AfterClick)
            .with_failing_native_click();
        let mut session = FakeRenderSession::new().with_page(URL, page);

        let ready = controller().prepare(&mut session, URL, |_, _| {}).await.unwrap();

        assert!(ready.main_image_clicked);
        assert!(ready.gallery_loaded);
        assert_eq!(session.native_clicks, 0);
        assert_eq!(session.script_clicks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gallery_revealed_by_scroll_nudges() {
        let page = FakePage::product("Lamp", gallery())
            .without_main_image()
            .with_reveal(GalleryReveal::AfterScrolls(2));
        let mut session = FakeRenderSession::new().with_page(URL, page);

        let ready = controller().prepare(&mut session, URL, |_, _| {}).await.unwrap();

        assert!(!ready.main_image_clicked);
        assert!(ready.gallery_loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_gallery_is_not_a_failure() {
        let page = FakePage::product("Lamp", gallery()).with_reveal(GalleryReveal::Never);
        let mut session = FakeRenderSession::new().with_page(URL, page);

        let ready = controller().prepare(&mut session, URL, |_, _| {}).await.unwrap();

        assert!(!ready.gallery_loaded);
        assert!(!ready.markup.contains("ivRow"));
        assert!(ready.markup.contains("productTitle"));
    }
}
