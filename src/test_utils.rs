//! Test utilities for the scraper
//!
//! Scripted stand-ins for the external collaborators (rendering session,
//! image source, spreadsheet sink) so pipeline behavior can be tested
//! without a browser, the network or the filesystem.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::infrastructure::image_fetcher::ImageSource;
use crate::infrastructure::parsing::selectors::gallery;
use crate::infrastructure::render_session::{
    ElementHandle, READY_STATE_SCRIPT, RenderSession, SessionError,
};
use crate::infrastructure::row_assembler::{ColumnSpec, SheetRow};
use crate::infrastructure::sheet_writer::{SheetSink, SinkError};

/// What a single `load` of a page does
#[derive(Debug, Clone)]
pub enum LoadBehavior {
    /// Loads and reaches `readyState == "complete"`
    Ready,
    /// `load` itself fails
    Fail(SessionError),
    /// Loads but never reports `complete`
    NeverComplete,
    /// Ends up on a non-product page (captcha, dog page, ...)
    NotProductPage,
}

/// When the immersive gallery shows up in the DOM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryReveal {
    Immediately,
    AfterClick,
    AfterScrolls(u32),
    Never,
}

/// Scripted page served by [`FakeRenderSession`]
#[derive(Debug, Clone)]
pub struct FakePage {
    /// Body markup without the gallery
    pub body: String,
    /// Gallery markup appended once revealed
    pub gallery: String,
    pub reveal: GalleryReveal,
    /// Consumed one per `load`; `Ready` once exhausted
    pub loads: VecDeque<LoadBehavior>,
    /// Main-image selector that resolves on this page
    pub main_image_selector: Option<&'static str>,
    pub native_click_fails: bool,
}

impl FakePage {
    /// Product page with a title and the given gallery rows
    pub fn product(title: &str, gallery: impl Into<String>) -> Self {
        Self {
            body: format!(r#"<span id="productTitle">{title}</span>"#),
            gallery: gallery.into(),
            reveal: GalleryReveal::Immediately,
            loads: VecDeque::new(),
            main_image_selector: Some(gallery::MAIN_IMAGE[0]),
            native_click_fails: false,
        }
    }

    pub fn with_body(mut self, extra: &str) -> Self {
        self.body.push_str(extra);
        self
    }

    pub fn with_reveal(mut self, reveal: GalleryReveal) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn with_loads(mut self, loads: impl IntoIterator<Item = LoadBehavior>) -> Self {
        self.loads = loads.into_iter().collect();
        self
    }

    pub fn without_main_image(mut self) -> Self {
        self.main_image_selector = None;
        self
    }

    pub fn with_failing_native_click(mut self) -> Self {
        self.native_click_fails = true;
        self
    }
}

/// In-memory [`RenderSession`] driven by [`FakePage`] scripts
#[derive(Debug, Default)]
pub struct FakeRenderSession {
    pages: HashMap<String, FakePage>,
    current_url: String,
    current: Option<LoadBehavior>,
    revealed: bool,
    scrolls_down: u32,
    pub loaded_urls: Vec<String>,
    pub native_clicks: u32,
    pub script_clicks: u32,
    pub user_agents: Vec<String>,
}

impl FakeRenderSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, page: FakePage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    fn page(&self) -> Option<&FakePage> {
        self.pages.get(&self.current_url)
    }

    fn reveal_if(&mut self, trigger: GalleryReveal) {
        if self.page().is_some_and(|p| p.reveal == trigger) {
            self.revealed = true;
        }
    }
}

#[async_trait]
impl RenderSession for FakeRenderSession {
    async fn load(&mut self, url: &str) -> Result<(), SessionError> {
        self.loaded_urls.push(url.to_string());
        self.current_url = url.to_string();
        self.revealed = false;
        self.scrolls_down = 0;

        let behavior = self
            .pages
            .get_mut(url)
            .and_then(|p| p.loads.pop_front())
            .unwrap_or(LoadBehavior::Ready);
        if let LoadBehavior::Fail(err) = &behavior {
            self.current = None;
            return Err(err.clone());
        }
        self.current = Some(behavior);
        self.reveal_if(GalleryReveal::Immediately);
        Ok(())
    }

    async fn current_address(&mut self) -> Result<String, SessionError> {
        match self.current {
            Some(LoadBehavior::NotProductPage) => {
                Ok("https://www.example.test/errors/validateCaptcha".to_string())
            }
            _ => Ok(self.current_url.clone()),
        }
    }

    async fn current_markup(&mut self) -> Result<String, SessionError> {
        if matches!(self.current, Some(LoadBehavior::NotProductPage) | None) {
            return Ok("<html><body>Enter the characters you see</body></html>".to_string());
        }
        let Some(page) = self.page() else {
            return Ok("<html><body></body></html>".to_string());
        };
        let gallery = if self.revealed { page.gallery.as_str() } else { "" };
        Ok(format!("<html><body>{}{}</body></html>", page.body, gallery))
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, SessionError> {
        if script == READY_STATE_SCRIPT {
            let state = match self.current {
                Some(LoadBehavior::NeverComplete) => "loading",
                _ => "complete",
            };
            return Ok(serde_json::Value::from(state));
        }
        if script.contains("el.click()") {
            self.script_clicks += 1;
            self.reveal_if(GalleryReveal::AfterClick);
            return Ok(serde_json::Value::Bool(true));
        }
        Ok(serde_json::Value::Null)
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        let hit = if selector == gallery::RENDERED_MARKER {
            self.revealed
        } else {
            self.page()
                .and_then(|p| p.main_image_selector)
                .is_some_and(|s| s == selector)
        };
        Ok(if hit {
            vec![ElementHandle::new(selector, 0)]
        } else {
            Vec::new()
        })
    }

    async fn scroll_by(&mut self, _dx: i64, dy: i64) -> Result<(), SessionError> {
        if dy > 0 {
            self.scrolls_down += 1;
            let scrolls = self.scrolls_down;
            if self
                .page()
                .is_some_and(|p| p.reveal == GalleryReveal::AfterScrolls(scrolls))
            {
                self.revealed = true;
            }
        }
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        if self.page().is_some_and(|p| p.native_click_fails) {
            return Err(SessionError::ElementNotInteractable {
                selector: element.selector.clone(),
                reason: "other element would receive the click".to_string(),
            });
        }
        self.native_clicks += 1;
        self.reveal_if(GalleryReveal::AfterClick);
        Ok(())
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), SessionError> {
        self.user_agents.push(user_agent.to_string());
        Ok(())
    }
}

/// Gallery rows with one thumbnail per `(position, url)`
pub fn gallery_rows(thumbs: &[(u32, &str)]) -> String {
    let inner: String = thumbs
        .iter()
        .map(|(pos, url)| {
            format!(
                r#"<div class="ivThumb" id="ivImage_{pos}"><div class="ivThumbImage" style="background: url(&quot;{url}&quot;);"></div></div>"#
            )
        })
        .collect();
    format!(r#"<div class="ivRow">{inner}</div>"#)
}

/// Encode a solid RGBA image in `format`
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let img = match format {
        ImageFormat::Jpeg | ImageFormat::Bmp => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
        _ => DynamicImage::ImageRgba8(img),
    };
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

/// [`ImageSource`] answering from a URL → bytes table
#[derive(Debug, Default, Clone)]
pub struct FakeImageSource {
    responses: HashMap<String, Vec<u8>>,
    pub requests: Arc<AtomicUsize>,
}

impl FakeImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.responses.insert(url.into(), bytes);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("HTTP 404 Not Found for {url}"))
    }
}

/// [`SheetSink`] that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySheet {
    pub headers: BTreeMap<u16, String>,
    pub widths: BTreeMap<u16, f64>,
    pub rows: Vec<SheetRow>,
    pub finished: bool,
}

impl MemorySheet {
    pub fn header_labels(&self) -> Vec<&str> {
        self.headers.values().map(String::as_str).collect()
    }
}

impl SheetSink for MemorySheet {
    fn write_header(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError> {
        self.apply_columns(columns);
        Ok(())
    }

    fn apply_column_plan(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError> {
        self.apply_columns(columns);
        Ok(())
    }

    fn write_row(&mut self, row: SheetRow) -> Result<(), SinkError> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<PathBuf>, SinkError> {
        self.finished = true;
        Ok(None)
    }
}

impl MemorySheet {
    fn apply_columns(&mut self, columns: &[ColumnSpec]) {
        for spec in columns {
            self.headers.insert(spec.column, spec.header.clone());
            self.widths.insert(spec.column, spec.width);
        }
    }
}
