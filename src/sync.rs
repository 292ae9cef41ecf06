//! Order synchronization engine.
//!
//! Polls the proxy for the full order list and keeps a local view of it for
//! the admin and patron screens:
//!
//! - "seen" tracking: orders that appear between two refreshes are flagged
//!   new until the next refresh; the first load marks everything seen.
//! - optimistic completion toggles with rollback on failure.
//! - a new-order cue, fired at most once per refresh.
//!
//! State sits behind a std `Mutex` that is never held across an await.
//! Events go out on a broadcast channel so several screens can listen.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::OrderBackend;
use crate::error::CafeError;
use crate::models::Order;

/// Poll interval for the staff order board.
pub const ADMIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll interval for patron order history and the checkout summary.
pub const PATRON_POLL_INTERVAL: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    OrdersRefreshed { total: usize, pending: usize },
    /// Order count went up since the previous refresh.
    NewOrders { added: usize, order_ids: Vec<String> },
    RefreshFailed { message: String },
    ToggleFailed { order_id: String, message: String },
}

/// Orders and spend for one patron.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTotal {
    pub user_id: String,
    pub nickname: String,
    pub animal: String,
    pub total: i64,
    pub orders: Vec<Order>,
}

/// Toggles in flight for one order.
#[derive(Debug)]
struct PendingToggle {
    in_flight: usize,
    /// Generation of the newest toggle; only that one may roll back.
    generation: u64,
    /// Optimistic value from the newest toggle.
    target: bool,
}

#[derive(Debug, Default)]
struct SyncState {
    /// `None` until the first successful refresh.
    orders: Option<Vec<Order>>,
    seen: HashSet<String>,
    pending: HashMap<String, PendingToggle>,
    next_generation: u64,
    last_count: Option<usize>,
    last_error: Option<String>,
}

struct RefreshOutcome {
    total: usize,
    pending: usize,
    new_order: Option<(usize, Vec<String>)>,
}

impl SyncState {
    fn apply_fetch(&mut self, mut fetched: Vec<Order>) -> RefreshOutcome {
        for order in &mut fetched {
            if let Some(toggle) = self.pending.get(&order.order_id) {
                order.completed = toggle.target;
            }
        }

        let mut arrived = Vec::new();
        match &self.orders {
            None => {
                self.seen
                    .extend(fetched.iter().map(|o| o.order_id.clone()));
            }
            Some(previous) => {
                let known: HashSet<&str> = previous.iter().map(|o| o.order_id.as_str()).collect();
                for order in &fetched {
                    if known.contains(order.order_id.as_str()) {
                        self.seen.insert(order.order_id.clone());
                    } else if !self.seen.contains(&order.order_id) {
                        arrived.push(order.order_id.clone());
                    }
                }
            }
        }

        let total = fetched.len();
        let new_order = match self.last_count {
            Some(last) if total > last => Some((total - last, arrived)),
            _ => None,
        };
        let pending = fetched.iter().filter(|o| !o.completed).count();

        self.last_count = Some(total);
        self.orders = Some(fetched);
        self.last_error = None;

        RefreshOutcome {
            total,
            pending,
            new_order,
        }
    }

    fn set_completed(&mut self, order_id: &str, completed: bool) {
        if let Some(order) = self
            .orders
            .iter_mut()
            .flatten()
            .find(|o| o.order_id == order_id)
        {
            order.completed = completed;
        }
    }

    /// Record a new toggle and return its generation.
    fn begin_toggle(&mut self, order_id: &str, target: bool) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.set_completed(order_id, target);
        let toggle = self
            .pending
            .entry(order_id.to_string())
            .or_insert(PendingToggle {
                in_flight: 0,
                generation,
                target,
            });
        toggle.in_flight += 1;
        toggle.generation = generation;
        toggle.target = target;
        generation
    }

    /// Mark one toggle finished. True if it was the newest for the order.
    fn finish_toggle(&mut self, order_id: &str, generation: u64) -> bool {
        let Some(toggle) = self.pending.get_mut(order_id) else {
            return true;
        };
        let latest = toggle.generation == generation;
        toggle.in_flight = toggle.in_flight.saturating_sub(1);
        if toggle.in_flight == 0 {
            self.pending.remove(order_id);
        }
        latest
    }

    fn orders(&self) -> &[Order] {
        self.orders.as_deref().unwrap_or_default()
    }
}

pub struct OrderSyncEngine<B> {
    backend: B,
    state: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
    cancel: CancellationToken,
}

fn shut_down() -> CafeError {
    CafeError::Transport("order sync shut down".into())
}

impl<B: OrderBackend> OrderSyncEngine<B> {
    pub fn new(backend: B) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            state: Mutex::new(SyncState::default()),
            events,
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Fetch the full order list and replace the local copy.
    ///
    /// On failure the previous list is kept and the error is recorded.
    pub async fn refresh(&self) -> Result<usize, CafeError> {
        if self.cancel.is_cancelled() {
            return Err(shut_down());
        }
        let result = self.backend.fetch_orders().await;
        if self.cancel.is_cancelled() {
            debug!("discarding order fetch after shutdown");
            return Err(shut_down());
        }

        let fetched = match result {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "order refresh failed, keeping previous list");
                self.lock().last_error = Some(e.to_string());
                self.emit(SyncEvent::RefreshFailed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let outcome = self.lock().apply_fetch(fetched);
        debug!(total = outcome.total, pending = outcome.pending, "orders refreshed");

        if let Some((added, order_ids)) = outcome.new_order {
            info!(added, total = outcome.total, "new orders arrived");
            self.emit(SyncEvent::NewOrders { added, order_ids });
        }
        self.emit(SyncEvent::OrdersRefreshed {
            total: outcome.total,
            pending: outcome.pending,
        });
        Ok(outcome.total)
    }

    /// Flip an order's completion, optimistically.
    ///
    /// The local list shows the new value at once. It stays if the backend
    /// accepts the update and reverts to `current_completed` if not, unless a
    /// newer toggle for the same order has started since. Returns the value
    /// this call sent. Failures are not retried.
    pub async fn toggle_completion(
        &self,
        order_id: &str,
        current_completed: bool,
    ) -> Result<bool, CafeError> {
        let target = !current_completed;
        if self.cancel.is_cancelled() {
            return Err(shut_down());
        }
        let generation = self.lock().begin_toggle(order_id, target);

        let result = self.backend.update_order_status(order_id, target).await;
        if self.cancel.is_cancelled() {
            debug!(order_id, "discarding toggle result after shutdown");
            return result.map(|()| target);
        }

        let failure = {
            let mut state = self.lock();
            let latest = state.finish_toggle(order_id, generation);
            match result {
                Ok(()) => {
                    if target {
                        state.seen.insert(order_id.to_string());
                    }
                    None
                }
                Err(e) => {
                    if latest {
                        state.set_completed(order_id, current_completed);
                    }
                    Some((e, latest))
                }
            }
        };

        match failure {
            None => {
                info!(order_id, completed = target, "order completion updated");
                Ok(target)
            }
            Some((e, reverted)) => {
                warn!(order_id, error = %e, reverted, "order completion update failed");
                self.emit(SyncEvent::ToggleFailed {
                    order_id: order_id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stop polling and ignore any in-flight results.
    pub fn shutdown(&self) {
        info!("order sync shutting down");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// True once any refresh has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.lock().orders.is_some()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders().to_vec()
    }

    pub fn pending_orders(&self) -> Vec<Order> {
        self.lock()
            .orders()
            .iter()
            .filter(|o| !o.completed)
            .cloned()
            .collect()
    }

    pub fn completed_orders(&self) -> Vec<Order> {
        self.lock()
            .orders()
            .iter()
            .filter(|o| o.completed)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().orders().iter().filter(|o| !o.completed).count()
    }

    pub fn completed_count(&self) -> usize {
        self.lock().orders().iter().filter(|o| o.completed).count()
    }

    /// Not yet seen by this screen.
    pub fn is_new(&self, order_id: &str) -> bool {
        !self.lock().seen.contains(order_id)
    }

    pub fn new_order_ids(&self) -> Vec<String> {
        let state = self.lock();
        state
            .orders()
            .iter()
            .filter(|o| !state.seen.contains(&o.order_id))
            .map(|o| o.order_id.clone())
            .collect()
    }

    /// A completion toggle for this order is in flight.
    pub fn is_pending(&self, order_id: &str) -> bool {
        self.lock().pending.contains_key(order_id)
    }

    /// Per-patron totals, patrons in order of their first order.
    pub fn user_totals(&self) -> Vec<UserTotal> {
        let state = self.lock();
        let mut totals: Vec<UserTotal> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for order in state.orders() {
            match index.get(order.user_id.as_str()) {
                Some(&i) => {
                    totals[i].total = totals[i].total.saturating_add(order.price);
                    totals[i].orders.push(order.clone());
                }
                None => {
                    index.insert(order.user_id.as_str(), totals.len());
                    totals.push(UserTotal {
                        user_id: order.user_id.clone(),
                        nickname: order.nickname.clone(),
                        animal: order.animal.clone(),
                        total: order.price,
                        orders: vec![order.clone()],
                    });
                }
            }
        }
        totals
    }

    pub fn grand_total(&self) -> i64 {
        self.lock()
            .orders()
            .iter()
            .map(|o| o.price)
            .fold(0, i64::saturating_add)
    }

    /// Distinct patrons with at least one order.
    pub fn user_count(&self) -> usize {
        self.lock()
            .orders()
            .iter()
            .map(|o| o.user_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// One patron's orders, newest first.
    pub fn orders_for_user(&self, user_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders()
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        orders
    }
}

impl<B: OrderBackend + 'static> OrderSyncEngine<B> {
    /// Refresh now and then every `interval` until [`OrderSyncEngine::shutdown`].
    pub fn start_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        spawn_poller("orders", interval, self.cancel.clone(), move || {
            let engine = Arc::clone(&engine);
            async move {
                let _ = engine.refresh().await;
            }
        })
    }
}

/// Run `tick` immediately and then every `interval` until `cancel` fires.
///
/// A tick that is still running when `cancel` fires is dropped.
pub fn spawn_poller<F, Fut>(
    label: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(label, interval_secs = interval.as_secs(), "poll loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick() => {}
            }
        }
        info!(label, "poll loop stopped");
    })
}
