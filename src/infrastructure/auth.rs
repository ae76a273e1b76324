//! "Are we signed in?" queries

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::domain::Marketplace;
use crate::infrastructure::render_session::RenderSession;

/// Markup fragments (lowercase) only shown to a signed-in customer
pub const SIGNED_IN_MARKERS: &[&str] = &["sign out", "abmelden", "bestellungen", "your orders"];

/// Authentication state of the browser profile
#[async_trait]
pub trait AuthState: Send {
    async fn is_authenticated(&mut self) -> bool;
}

/// Flag flipped by the operator (or a test)
#[async_trait]
impl AuthState for Arc<AtomicBool> {
    async fn is_authenticated(&mut self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Loads the account page in its own session and looks for signed-in markers
pub struct AccountPageProbe<S> {
    session: S,
    account_url: String,
}

impl<S: RenderSession> AccountPageProbe<S> {
    pub fn new(session: S, marketplace: &Marketplace) -> Self {
        Self {
            session,
            account_url: marketplace.account_url(),
        }
    }

    pub fn into_session(self) -> S {
        self.session
    }
}

pub fn markup_shows_signed_in(markup: &str) -> bool {
    let lower = markup.to_lowercase();
    SIGNED_IN_MARKERS.iter().any(|m| lower.contains(m))
}

#[async_trait]
impl<S: RenderSession> AuthState for AccountPageProbe<S> {
    async fn is_authenticated(&mut self) -> bool {
        if let Err(e) = self.session.load(&self.account_url).await {
            debug!("Account page probe failed: {}", e);
            return false;
        }
        match self.session.current_markup().await {
            Ok(markup) => markup_shows_signed_in(&markup),
            Err(e) => {
                debug!("Account page snapshot failed: {}", e);
                false
            }
        }
    }
}
