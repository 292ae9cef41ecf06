//! Menu catalog for the patron screen.
//!
//! Holds the last good menu snapshot fetched through a [`MenuSource`] and
//! groups it into the fixed display categories. A failed refresh records the
//! error message and leaves the snapshot alone.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::MenuSource;
use crate::error::CafeError;
use crate::models::MenuItem;
use crate::sync::spawn_poller;

/// Display order of the menu sections.
pub const CATEGORIES: &[&str] = &["フード", "デザート", "ソフトドリンク", "お酒", "その他"];

/// Section for items with a missing or unknown category.
pub const FALLBACK_CATEGORY: &str = "その他";

pub const MENU_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct MenuState {
    items: Vec<MenuItem>,
    last_error: Option<String>,
    loaded: bool,
}

pub struct MenuCatalog<S> {
    source: S,
    state: Mutex<MenuState>,
    cancel: CancellationToken,
}

/// Section an item is displayed under.
pub fn category_of(item: &MenuItem) -> &'static str {
    item.category
        .as_deref()
        .map(str::trim)
        .and_then(|c| CATEGORIES.iter().copied().find(|known| *known == c))
        .unwrap_or(FALLBACK_CATEGORY)
}

fn shut_down() -> CafeError {
    CafeError::Transport("menu catalog shut down".into())
}

impl<S: MenuSource> MenuCatalog<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(MenuState::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MenuState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch the menu and replace the snapshot. Returns the item count.
    pub async fn refresh(&self) -> Result<usize, CafeError> {
        if self.cancel.is_cancelled() {
            return Err(shut_down());
        }
        let result = self.source.fetch_menu().await;
        if self.cancel.is_cancelled() {
            return Err(shut_down());
        }

        let mut state = self.lock();
        match result {
            Ok(items) => {
                let count = items.len();
                state.items = items;
                state.last_error = None;
                state.loaded = true;
                debug!(count, "menu snapshot replaced");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, kept = state.items.len(), "menu refresh failed, keeping snapshot");
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn items(&self) -> Vec<MenuItem> {
        self.lock().items.clone()
    }

    pub fn find(&self, name: &str) -> Option<MenuItem> {
        self.lock().items.iter().find(|i| i.name == name).cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// True once any refresh has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    /// Non-empty sections in display order, items in menu order.
    pub fn categorized(&self) -> Vec<(&'static str, Vec<MenuItem>)> {
        let state = self.lock();
        CATEGORIES
            .iter()
            .map(|&category| {
                let items: Vec<MenuItem> = state
                    .items
                    .iter()
                    .filter(|item| category_of(item) == category)
                    .cloned()
                    .collect();
                (category, items)
            })
            .filter(|(_, items)| !items.is_empty())
            .collect()
    }

    /// Stop the refresh timer. Late fetch results are discarded.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl<S: MenuSource + 'static> MenuCatalog<S> {
    /// Refresh now and then every `interval` until [`MenuCatalog::shutdown`].
    pub fn start_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let catalog = Arc::clone(self);
        spawn_poller("menu", interval, self.cancel.clone(), move || {
            let catalog = Arc::clone(&catalog);
            async move {
                let _ = catalog.refresh().await;
            }
        })
    }
}
