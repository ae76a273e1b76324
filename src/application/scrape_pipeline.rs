//! Scrape pipeline: the per-identifier loop
//!
//! One pipeline owns one rendering session and processes identifiers
//! strictly in order:
//!
//! ```text
//! auth gate ─► [ pause ─► UA rotation ─► readiness ─► fields + gallery
//!                ─► re-normalize ─► fetch ─► assemble/place ─► sink ] * n ─► finish
//! ```
//!
//! A failed identifier is recorded and the loop moves on. Only a lost
//! session (or an unsaveable workbook) ends the run early. Cancellation is
//! observed between identifiers, during the pause and during the auth wait.

use scraper::Html;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Identifier, Marketplace, NormalizedImage, PipelineRunState, RunEvent, RunSummary,
};
use crate::infrastructure::auth::AuthState;
use crate::infrastructure::config::{AppConfig, ConfigError, ScraperConfig};
use crate::infrastructure::image_fetcher::{ImageFetcher, ImageSource};
use crate::infrastructure::page_readiness::{PageReadinessController, ReadinessFailure};
use crate::infrastructure::parsing::{GalleryExtractor, MarkupExtractor, ProductFieldExtractor};
use crate::infrastructure::render_session::RenderSession;
use crate::infrastructure::row_assembler::RowAssembler;
use crate::infrastructure::sheet_writer::{SheetSink, SinkError};
use crate::infrastructure::simple_http_client::random_user_agent;
use crate::infrastructure::url_normalizer::{dedupe_key, normalize};

/// Errors that end a run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Not signed in after {secs}s")]
    AuthenticationTimeout { secs: u64 },

    #[error("Output error: {0}")]
    Output(#[from] SinkError),
}

/// Why a single identifier produced no row
#[derive(Error, Debug)]
pub enum IdentifierFailure {
    #[error(transparent)]
    Readiness(#[from] ReadinessFailure),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl IdentifierFailure {
    /// Whether the remaining identifiers can still be processed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Readiness(e) => e.is_recoverable(),
            Self::Sink(e) => e.is_recoverable(),
        }
    }
}

/// A run executing on its own task
pub struct RunHandle {
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<RunSummary, PipelineError>>,
}

/// Sleep for `pause` unless cancelled first; returns `true` when cancelled
async fn pause_or_cancel(pause: Duration, cancel: CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = sleep(pause) => false,
    }
}

pub struct ScrapePipeline<S, A, I, K> {
    session: S,
    auth: A,
    fetcher: ImageFetcher<I>,
    sink: K,
    readiness: PageReadinessController,
    fields: ProductFieldExtractor,
    gallery: GalleryExtractor,
    assembler: RowAssembler,
    marketplace: Marketplace,
    scraper: ScraperConfig,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
    cancel: CancellationToken,
}

impl<S, A, I, K> ScrapePipeline<S, A, I, K>
where
    S: RenderSession,
    A: AuthState,
    I: ImageSource,
    K: SheetSink,
{
    /// Validate `config` and wire the collaborators together
    pub fn new(
        config: &AppConfig,
        session: S,
        auth: A,
        image_source: I,
        sink: K,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let marketplace = config.marketplace()?;

        Ok(Self {
            session,
            auth,
            fetcher: ImageFetcher::new(image_source, &config.images),
            sink,
            readiness: PageReadinessController::new(config.readiness.clone()),
            fields: ProductFieldExtractor::new(marketplace.domain),
            gallery: GalleryExtractor::new(config.scraper.max_images_per_product),
            assembler: RowAssembler::new(config.scraper.min_image_columns, &config.images),
            marketplace,
            scraper: config.scraper.clone(),
            events: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is watching
            let _ = events.send(event);
        }
    }

    /// Uniformly random pause in `[min_pause_secs, max_pause_secs]`
    fn next_pause(&self) -> Duration {
        let min = self.scraper.min_pause_secs;
        let max = self.scraper.max_pause_secs;
        let secs = min + fastrand::f64() * (max - min);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Block until signed in. `Ok(false)` when cancelled while waiting.
    async fn wait_for_authentication(&mut self) -> Result<bool, PipelineError> {
        let poll = Duration::from_millis(self.scraper.auth_poll_interval_ms.max(1));
        let deadline = self
            .scraper
            .auth_timeout_secs
            .map(|secs| (secs, Instant::now() + Duration::from_secs(secs)));
        let mut announced = false;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            if self.auth.is_authenticated().await {
                info!("🔐 Signed in");
                return Ok(true);
            }
            if !announced {
                info!("🔐 Waiting for the operator to sign in...");
                self.emit(RunEvent::AwaitingAuthentication);
                announced = true;
            }
            if let Some((secs, deadline)) = deadline {
                if Instant::now() >= deadline {
                    return Err(PipelineError::AuthenticationTimeout { secs });
                }
            }
            if pause_or_cancel(poll, self.cancel.clone()).await {
                return Ok(false);
            }
        }
    }

    /// Process every input row and save the workbook
    pub async fn run(&mut self, identifiers: Vec<String>) -> Result<RunSummary, PipelineError> {
        let mut state = PipelineRunState::new(identifiers.len());

        if !self.wait_for_authentication().await? {
            warn!("🛑 Run cancelled before authentication");
            state.cancelled = true;
            let summary = state.finish(None);
            self.emit(RunEvent::RunFinished(summary.clone()));
            return Ok(summary);
        }

        info!(
            "🚀 Run {} started: {} rows on {}",
            state.run_id, state.total, self.marketplace
        );
        self.emit(RunEvent::RunStarted {
            run_id: state.run_id.clone(),
            total: state.total,
        });

        let mut attempted = 0usize;
        for (i, raw) in identifiers.iter().enumerate() {
            let index = i + 1;
            if self.cancel.is_cancelled() {
                state.cancelled = true;
                break;
            }

            let identifier = match Identifier::parse(raw) {
                Ok(identifier) => identifier,
                Err(e) => {
                    debug!("Row {} skipped: {}", index, e);
                    state.record_skip();
                    self.emit(RunEvent::IdentifierSkipped {
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if attempted > 0 {
                let pause = self.next_pause();
                if pause_or_cancel(pause, self.cancel.clone()).await {
                    state.cancelled = true;
                    break;
                }
            }
            attempted += 1;

            info!("[{}/{}] {}", index, state.total, identifier);
            self.emit(RunEvent::IdentifierStarted {
                index,
                total: state.total,
                identifier: identifier.to_string(),
            });

            match self.process_identifier(&identifier).await {
                Ok((embedded, rejected)) => {
                    state.record_success(embedded, rejected);
                    self.emit(RunEvent::IdentifierProcessed {
                        identifier: identifier.to_string(),
                        images: embedded,
                        percent: state.percent_complete().round(),
                    });
                }
                Err(failure) => {
                    warn!("❌ {} failed: {}", identifier, failure);
                    let reason = failure.to_string();
                    state.record_failure(identifier.as_str(), reason.clone());
                    self.emit(RunEvent::IdentifierFailed {
                        identifier: identifier.to_string(),
                        reason,
                    });
                    if !failure.is_recoverable() {
                        error!("Stopping run: {}", failure);
                        self.fail_remaining(&mut state, &identifiers[index..], &failure);
                        break;
                    }
                }
            }
        }

        if state.cancelled {
            warn!("🛑 Run cancelled after {} of {} rows", state.handled(), state.total);
        }
        self.finish(state)
    }

    /// Run on a new task; events and cancellation go through the handle
    pub fn spawn(self, identifiers: Vec<String>) -> RunHandle
    where
        S: 'static,
        A: 'static,
        I: 'static,
        K: 'static,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = self.cancel.clone();
        let mut pipeline = self.with_events(tx);
        let task = tokio::spawn(async move { pipeline.run(identifiers).await });
        RunHandle {
            events,
            cancel,
            task,
        }
    }

    fn fail_remaining(
        &self,
        state: &mut PipelineRunState,
        remaining: &[String],
        cause: &IdentifierFailure,
    ) {
        for (offset, raw) in remaining.iter().enumerate() {
            match Identifier::parse(raw) {
                Ok(identifier) => {
                    let reason = format!("not attempted: {cause}");
                    state.record_failure(identifier.as_str(), reason.clone());
                    self.emit(RunEvent::IdentifierFailed {
                        identifier: identifier.to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    state.record_skip();
                    self.emit(RunEvent::IdentifierSkipped {
                        index: state.total - remaining.len() + offset + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn finish(&mut self, state: PipelineRunState) -> Result<RunSummary, PipelineError> {
        let output_path = self.sink.finish()?;
        let summary = state.finish(output_path);
        info!(
            "🏁 {} ({} failed, {} skipped, {} images)",
            summary.headline(),
            summary.failed,
            summary.skipped,
            summary.images_embedded
        );
        self.emit(RunEvent::RunFinished(summary.clone()));
        Ok(summary)
    }

    /// One identifier end to end; returns `(embedded, rejected)` image counts
    async fn process_identifier(
        &mut self,
        identifier: &Identifier,
    ) -> Result<(usize, usize), IdentifierFailure> {
        if self.scraper.rotate_user_agent {
            if let Err(e) = self.session.set_user_agent(random_user_agent()).await {
                debug!("User agent not rotated: {}", e);
            }
        }

        let url = self.marketplace.product_url(identifier.as_str());
        let events = self.events.clone();
        let name = identifier.to_string();
        let page = self
            .readiness
            .prepare(&mut self.session, &url, |attempt, reason| {
                if let Some(events) = &events {
                    let _ = events.send(RunEvent::AttemptFailed {
                        identifier: name.clone(),
                        attempt,
                        reason: reason.to_string(),
                    });
                }
            })
            .await?;

        // Html is not Send; keep it out of scope across awaits
        let (fields, gallery) = {
            let html = Html::parse_document(&page.markup);
            (self.fields.extract(&html), self.gallery.extract(&html))
        };
        if !page.gallery_loaded && gallery.is_empty() {
            info!("   No gallery images for {}", identifier);
        }

        let wanted: Vec<NormalizedImage> = gallery
            .into_iter()
            .map(|image| {
                let fetch_url = normalize(&image.fetch_url);
                NormalizedImage {
                    key: dedupe_key(&fetch_url),
                    fetch_url,
                }
            })
            .collect();
        let outcome = self.fetcher.fetch_all(&wanted).await;
        let embedded = outcome.images.len();
        info!(
            "   ✅ {}: {} of {} image(s) embedded",
            identifier,
            embedded,
            wanted.len()
        );

        let record = self.assembler.assemble(identifier, fields, outcome.images);
        let (row, update) = self.assembler.place(record);
        if update.initial {
            self.sink.write_header(&update.added)?;
        } else if !update.is_empty() {
            self.sink.apply_column_plan(&update.added)?;
        }
        self.sink.write_row(row)?;

        Ok((embedded, outcome.rejected))
    }
}
