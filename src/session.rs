//! Patron-facing session: identity, menu, cart, staff confirmation and
//! order history wired together for one device.
//!
//! Ordering is a two-step flow. [`PatronSession::initiate_order`] freezes
//! the cart for a staff member to check, then
//! [`PatronSession::confirm_order`] sends it or
//! [`PatronSession::cancel_order`] drops the snapshot.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cart::Cart;
use crate::client::{MenuSource, OrderBackend};
use crate::error::CafeError;
use crate::identity::{IdentityStore, UserIdentity};
use crate::menu::{MenuCatalog, MENU_POLL_INTERVAL};
use crate::models::{CartItem, Order};
use crate::storage::KeyValueStore;
use crate::submit::{submit_cart, SubmitFailure, SubmitReport};
use crate::sync::{OrderSyncEngine, PATRON_POLL_INTERVAL};

pub struct PatronSession<S, B> {
    identity_store: IdentityStore<S>,
    identity: Option<UserIdentity>,
    backend: B,
    menu: Arc<MenuCatalog<B>>,
    history: Arc<OrderSyncEngine<B>>,
    cart: Cart,
    awaiting_confirmation: Option<Vec<CartItem>>,
}

impl<S, B> PatronSession<S, B>
where
    S: KeyValueStore,
    B: MenuSource + OrderBackend + Clone,
{
    /// Build a session, restoring any identity saved on this device.
    pub fn new(store: S, backend: B) -> Result<Self, CafeError> {
        let identity_store = IdentityStore::new(store);
        let identity = identity_store.load()?;
        if let Some(id) = &identity {
            info!(user_id = %id.user_id, "restored saved identity");
        }
        Ok(Self {
            identity_store,
            identity,
            menu: Arc::new(MenuCatalog::new(backend.clone())),
            history: Arc::new(OrderSyncEngine::new(backend.clone())),
            backend,
            cart: Cart::new(),
            awaiting_confirmation: None,
        })
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(UserIdentity::is_admin)
    }

    /// Validate and persist a new identity.
    pub fn set_identity(
        &mut self,
        nickname: &str,
        animal: &str,
        is_admin: bool,
    ) -> Result<&UserIdentity, CafeError> {
        let identity = UserIdentity::new(nickname, animal, is_admin)?;
        self.identity_store.save(&identity)?;
        Ok(self.identity.insert(identity))
    }

    pub fn clear_identity(&mut self) -> Result<(), CafeError> {
        self.identity_store.clear()?;
        self.identity = None;
        self.awaiting_confirmation = None;
        Ok(())
    }

    pub fn menu(&self) -> &Arc<MenuCatalog<B>> {
        &self.menu
    }

    pub fn history(&self) -> &Arc<OrderSyncEngine<B>> {
        &self.history
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut Cart {
        &mut self.cart
    }

    /// Add one unit of a menu item by name.
    pub fn add_to_cart(&mut self, name: &str) -> Result<(), CafeError> {
        let item = self
            .menu
            .find(name)
            .ok_or_else(|| CafeError::Validation(format!("{name} is not on the menu")))?;
        self.cart.add(&item)
    }

    /// Freeze the cart for staff confirmation.
    pub fn initiate_order(&mut self) -> Result<&[CartItem], CafeError> {
        if self.identity.is_none() {
            return Err(CafeError::Validation("Set a nickname before ordering".into()));
        }
        if self.cart.is_empty() {
            return Err(CafeError::Validation("Cart is empty".into()));
        }
        let snapshot = self.awaiting_confirmation.insert(self.cart.lines().to_vec());
        Ok(snapshot.as_slice())
    }

    pub fn cancel_order(&mut self) {
        self.awaiting_confirmation = None;
    }

    /// Lines waiting for staff confirmation, if any.
    pub fn awaiting_confirmation(&self) -> Option<&[CartItem]> {
        self.awaiting_confirmation.as_deref()
    }

    /// Send the confirmed snapshot. On success the cart is emptied and the
    /// order history refreshed; on failure the snapshot stays for a retry.
    pub async fn confirm_order(&mut self) -> Result<SubmitReport, SubmitFailure> {
        let Some(lines) = self.awaiting_confirmation.clone() else {
            return Err(SubmitFailure {
                error: CafeError::Validation("No order awaiting confirmation".into()),
                units_sent: 0,
                units_total: 0,
            });
        };

        let report = submit_cart(&self.backend, self.identity.as_ref(), &lines).await?;
        self.cart.clear();
        self.awaiting_confirmation = None;

        if let Err(e) = self.history.refresh().await {
            warn!(error = %e, "order history refresh after submit failed");
        }
        Ok(report)
    }

    /// This patron's orders from the last history refresh, newest first.
    pub fn my_orders(&self) -> Vec<Order> {
        match &self.identity {
            Some(id) => self.history.orders_for_user(&id.user_id),
            None => Vec::new(),
        }
    }

    /// Spend across this patron's orders.
    pub fn my_total(&self) -> i64 {
        self.my_orders()
            .iter()
            .map(|o| o.price)
            .fold(0, i64::saturating_add)
    }

    pub fn shutdown(&self) {
        self.menu.shutdown();
        self.history.shutdown();
    }
}

impl<S, B> PatronSession<S, B>
where
    S: KeyValueStore,
    B: MenuSource + OrderBackend + Clone + 'static,
{
    /// Start the menu and order history refresh timers.
    pub fn start_polling(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.menu.start_polling(MENU_POLL_INTERVAL),
            self.history.start_polling(PATRON_POLL_INTERVAL),
        ]
    }
}
