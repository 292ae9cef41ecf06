//! Private cafe ordering.
//!
//! Two halves share this crate:
//!
//! - the **proxy** ([`proxy`]), a stateless HTTP pass-through in front of the
//!   spreadsheet script that stores the menu and orders, and
//! - the **client library** a front-end drives: [`menu`], [`cart`],
//!   [`submit`], [`identity`], the order [`sync`] engine and the patron
//!   [`session`] that wires them together.
//!
//! `run()` is the binary entry point and starts the proxy.

use tracing::info;

pub mod api;
pub mod cart;
pub mod client;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod menu;
pub mod models;
pub mod proxy;
pub mod session;
pub mod storage;
pub mod submit;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use cart::Cart;
pub use client::{HttpBackend, MenuSource, OrderBackend};
pub use config::Config;
pub use error::CafeError;
pub use identity::{IdentityStore, UserIdentity};
pub use menu::MenuCatalog;
pub use models::{CartItem, MenuItem, Order};
pub use session::PatronSession;
pub use storage::{KeyValueStore, LocalStore};
pub use sync::{OrderSyncEngine, SyncEvent};

/// Read configuration, set up logging and serve the proxy until shutdown.
pub fn run() -> anyhow::Result<()> {
    let log_dir = std::env::var_os(config::ENV_LOG_DIR)
        .filter(|v| !v.is_empty())
        .map(std::path::PathBuf::from);
    diagnostics::init_logging(log_dir.as_deref());
    let config = Config::from_env();

    info!(about = %diagnostics::get_about_info(), "Starting cafe-order v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(proxy::serve(config))
}
