//! Generic order state tracker and rebalance decision engine.
//!
//! One leg = one instance of [`StrategyLeg`], parameterized by a
//! [`TargetPolicy`] that supplies the desired price/quantity/side. The
//! engine owns everything else: the order reference pair (active + sent),
//! the cancel flags, and the decision pass that issues at most one
//! corrective action per trigger.

use crate::gateway::{
    CancelOrderRequest, Instrument, InstrumentId, Order, OrderEvent, OrderEventHandler,
    OrderGateway, OrderId, OrderType, PlaceOrderRequest, ReplaceOrderRequest, Side, Validity,
};
use crate::market::{MarketDataHandler, TopOfBook};
use crate::position::PositionEvent;
use crate::settings::{AssetSetting, SettingKey, SettingsHandler, SettingsNotifier};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Desired order state for one leg, recomputed before every decision pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub price: Decimal,
    pub qty: Decimal,
    pub side: Side,
}

/// Pluggable target calculation: the part that differs between the quoting
/// and the hedging leg. Hooks the leg has no signal for default to no-ops.
pub trait TargetPolicy: Send + 'static {
    /// Instrument this leg trades.
    fn instrument(&self) -> &Instrument;

    /// Current desired price/quantity/side.
    fn target(&self) -> Target;

    /// Consume a synthetic position update.
    fn apply_position(&mut self, event: &PositionEvent);

    /// Consume a reference book update. Returns false when the leg should
    /// withdraw instead of quoting (no usable level on its own side).
    fn apply_book(&mut self, _book: &TopOfBook) -> bool {
        true
    }

    /// Consume an execution price on the leg's signal instrument.
    fn apply_signal_execution(&mut self, _price: Decimal) {}

    /// Settings override for this side's quantity.
    fn set_qty_override(&mut self, _qty: Decimal) {}
}

/// Action kind awaiting acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Place,
    Replace,
    Cancel,
}

/// The in-flight action, carrying the desired next state of the order as its
/// own value, never an alias of anything handed to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct SentAction {
    pub kind: ActionKind,
    pub order: Order,
}

/// Externally observable state of a leg's order machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegPhase {
    Idle,
    AwaitingPlacement,
    Resting,
    AwaitingReplace,
    AwaitingCancel,
}

impl fmt::Display for LegPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegPhase::Idle => "idle",
            LegPhase::AwaitingPlacement => "awaiting-placement",
            LegPhase::Resting => "resting",
            LegPhase::AwaitingReplace => "awaiting-replace",
            LegPhase::AwaitingCancel => "awaiting-cancel",
        };
        f.write_str(name)
    }
}

/// Whole-leg state behind a single lock: order slots, flags and target are
/// only ever read or written together.
struct LegState<P> {
    policy: P,
    target: Target,
    active_order: Option<Order>,
    sent: Option<SentAction>,
    pending_cancel: bool,
    cancel_rejected: bool,
    enabled_all: bool,
    enabled: bool,
    last_position_version: u64,
}

/// One strategy leg: order state tracking plus the rebalance decision pass.
pub struct StrategyLeg<P: TargetPolicy> {
    name: String,
    account: String,
    gateway: Arc<dyn OrderGateway>,
    settings: Arc<dyn SettingsNotifier>,
    state: Mutex<LegState<P>>,
}

impl<P: TargetPolicy> StrategyLeg<P> {
    pub fn new(
        name: impl Into<String>,
        account: impl Into<String>,
        policy: P,
        enabled_all: bool,
        enabled: bool,
        gateway: Arc<dyn OrderGateway>,
        settings: Arc<dyn SettingsNotifier>,
    ) -> Self {
        let target = policy.target();
        Self {
            name: name.into(),
            account: account.into(),
            gateway,
            settings,
            state: Mutex::new(LegState {
                policy,
                target,
                active_order: None,
                sent: None,
                pending_cancel: false,
                cancel_rejected: false,
                enabled_all,
                enabled,
                last_position_version: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.state.lock().policy.instrument().id.clone()
    }

    pub fn phase(&self) -> LegPhase {
        let state = self.state.lock();
        match (&state.active_order, &state.sent) {
            (None, None) => LegPhase::Idle,
            (None, Some(_)) => LegPhase::AwaitingPlacement,
            (Some(_), None) => LegPhase::Resting,
            (Some(_), Some(sent)) => match sent.kind {
                ActionKind::Cancel => LegPhase::AwaitingCancel,
                _ => LegPhase::AwaitingReplace,
            },
        }
    }

    pub fn target(&self) -> Target {
        self.state.lock().target
    }

    pub fn active_order(&self) -> Option<Order> {
        self.state.lock().active_order.clone()
    }

    pub fn sent_order(&self) -> Option<Order> {
        self.state.lock().sent.as_ref().map(|sent| sent.order.clone())
    }

    /// Consume a synthetic position update published by the aggregator.
    ///
    /// Versions guard against out-of-order delivery: an event not newer than
    /// the last one applied can never roll the leg's view backwards.
    pub fn on_synthetic_position(&self, event: &PositionEvent) {
        let mut state = self.state.lock();
        if event.version <= state.last_position_version {
            debug!(
                leg = %self.name,
                version = event.version,
                seen = state.last_position_version,
                "stale synthetic position update ignored"
            );
            return;
        }
        state.last_position_version = event.version;
        debug!(leg = %self.name, net_qty = %event.new.net_qty, "synthetic position update");

        self.fresh_trigger(&mut state);
        state.policy.apply_position(event);
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    /// Consume an execution price on the leg's signal instrument (the hedger
    /// prices its order where the mini actually traded).
    pub fn on_signal_execution(&self, price: Decimal) {
        let mut state = self.state.lock();
        self.fresh_trigger(&mut state);
        state.policy.apply_signal_execution(price);
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    fn refresh_target(&self, state: &mut LegState<P>) {
        state.target = state.policy.target();
    }

    /// A new distinct trigger lifts the cancel-retry suppression.
    fn fresh_trigger(&self, state: &mut LegState<P>) {
        state.cancel_rejected = false;
    }

    /// The decision pass. Priority order is load-bearing: cancellation in
    /// progress and disablement suppress everything else, missing signal
    /// suppresses placement, and an in-flight action blocks new actions.
    fn rebalance(&self, state: &mut LegState<P>) {
        if state.pending_cancel {
            debug!(leg = %self.name, "rebalance: cancel pending");
            self.attempt_cancel(state);
        } else if !state.enabled_all {
            debug!(leg = %self.name, "rebalance: strategy disabled for all assets, withdrawing");
            self.attempt_cancel(state);
        } else if !state.enabled {
            trace!(leg = %self.name, "rebalance: leg disabled");
        } else if state.target.price <= Decimal::ZERO || state.target.qty.is_zero() {
            trace!(
                leg = %self.name,
                price = %state.target.price,
                qty = %state.target.qty,
                "rebalance: insufficient signal"
            );
        } else if state.sent.is_some() {
            trace!(leg = %self.name, "rebalance: another action is pending acknowledgement");
        } else if state.active_order.is_none() {
            self.place_order(state);
        } else if self.out_of_line(state) {
            self.replace_order(state);
        } else {
            trace!(leg = %self.name, "rebalance: already at target");
        }
    }

    /// Whether the resting order differs from the target in price or
    /// remaining quantity.
    fn out_of_line(&self, state: &LegState<P>) -> bool {
        match &state.active_order {
            Some(active) => {
                active.price != state.target.price
                    || active.remaining_qty() != state.target.qty
            }
            None => false,
        }
    }

    /// Withdraw the active order if it is safe to do so now; otherwise leave
    /// `pending_cancel` set so the next acknowledgement retries.
    fn attempt_cancel(&self, state: &mut LegState<P>) {
        if state.sent.is_some() {
            state.pending_cancel = true;
            trace!(leg = %self.name, "cancel deferred, action in flight");
            return;
        }
        let Some(active) = state.active_order.clone() else {
            // Flat: nothing left to withdraw.
            state.pending_cancel = false;
            return;
        };
        if state.cancel_rejected {
            trace!(leg = %self.name, "cancel suppressed after rejection");
            return;
        }

        let request = CancelOrderRequest {
            order_id: active.id.clone(),
        };
        match self.gateway.cancel_order(request) {
            Ok(()) => {
                info!(leg = %self.name, order_id = %active.id, "cancel submitted");
                state.pending_cancel = false;
                state.sent = Some(SentAction {
                    kind: ActionKind::Cancel,
                    order: active,
                });
            }
            Err(error) => {
                warn!(leg = %self.name, order_id = %active.id, %error, "cancel submission failed");
            }
        }
    }

    fn place_order(&self, state: &mut LegState<P>) {
        let request = PlaceOrderRequest {
            order_id: OrderId::generate(),
            account: self.account.clone(),
            instrument: state.policy.instrument().id.clone(),
            side: state.target.side,
            qty: state.target.qty,
            price: state.target.price,
            order_type: OrderType::Limit,
            validity: Validity::Day,
        };

        match self.gateway.place_order(request) {
            Ok(order) => {
                info!(
                    leg = %self.name,
                    order_id = %order.id,
                    side = %order.side,
                    price = %order.price,
                    qty = %order.qty,
                    "place submitted"
                );
                state.sent = Some(SentAction {
                    kind: ActionKind::Place,
                    order,
                });
            }
            Err(error) => {
                warn!(leg = %self.name, %error, "place submission failed");
            }
        }
    }

    fn replace_order(&self, state: &mut LegState<P>) {
        let Some(active) = state.active_order.clone() else {
            return;
        };
        // Replace trues up the REMAINING quantity: the new total keeps what
        // already filled and leaves exactly the target working.
        let new_qty = active.cum_qty + state.target.qty;
        let request = ReplaceOrderRequest {
            order_id: active.id.clone(),
            price: state.target.price,
            qty: new_qty,
        };

        match self.gateway.replace_order(request) {
            Ok(()) => {
                info!(
                    leg = %self.name,
                    order_id = %active.id,
                    price = %state.target.price,
                    qty = %new_qty,
                    "replace submitted"
                );
                let mut desired = active;
                desired.price = state.target.price;
                desired.qty = new_qty;
                state.sent = Some(SentAction {
                    kind: ActionKind::Replace,
                    order: desired,
                });
            }
            Err(error) => {
                warn!(leg = %self.name, order_id = %active.id, %error, "replace submission failed");
            }
        }
    }

    /// Late or duplicate callbacks for orders this leg no longer tracks are
    /// dropped before they can touch state.
    fn invalid_event(&self, state: &LegState<P>, event: &OrderEvent) -> bool {
        let matches_active = state
            .active_order
            .as_ref()
            .is_some_and(|order| order.id == event.order.id);
        let matches_sent = state
            .sent
            .as_ref()
            .is_some_and(|sent| sent.order.id == event.order.id);
        let invalid = !matches_active && !matches_sent;
        if invalid {
            warn!(leg = %self.name, order_id = %event.order.id, "event for unknown order dropped");
        }
        invalid
    }

    /// Switch this leg off, mirror the change to the front-end toggle, and
    /// withdraw the resting order.
    fn deactivate(&self, state: &mut LegState<P>) {
        info!(leg = %self.name, "leg disabled");
        state.enabled = false;
        let key = SettingKey::switch_for(state.target.side);
        self.settings
            .change_asset_state(key, Decimal::ZERO, state.policy.instrument().id.as_str());
        self.attempt_cancel(state);
    }

    fn switch_state(&self, state: &mut LegState<P>, value: Decimal) {
        if state.enabled {
            if value.is_zero() {
                self.deactivate(state);
            }
        } else if value == Decimal::ONE {
            info!(leg = %self.name, "leg enabled");
            state.enabled = true;
            self.fresh_trigger(state);
            self.refresh_target(state);
            self.rebalance(state);
        }
    }
}

impl<P: TargetPolicy> OrderEventHandler for StrategyLeg<P> {
    fn on_order_placed(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        debug!(leg = %self.name, order_id = %event.order.id, "placement confirmed");
        state.sent = None;
        state.active_order = Some(event.order.clone());
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    fn on_order_place_rejected(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        warn!(
            leg = %self.name,
            order_id = %event.order.id,
            reason = event.reason.as_deref().unwrap_or("unspecified"),
            "placement rejected"
        );
        // The rejected action is terminal; force a corrective pass.
        state.sent = None;
        state.pending_cancel = true;
        self.rebalance(&mut state);
    }

    fn on_order_replaced(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        debug!(leg = %self.name, order_id = %event.order.id, "replace confirmed");
        state.sent = None;
        state.active_order = Some(event.order.clone());
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    fn on_order_replace_rejected(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        warn!(
            leg = %self.name,
            order_id = %event.order.id,
            reason = event.reason.as_deref().unwrap_or("unspecified"),
            "replace rejected"
        );
        state.sent = None;
        state.pending_cancel = true;
        self.rebalance(&mut state);
    }

    fn on_order_cancelled(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        info!(leg = %self.name, order_id = %event.order.id, "cancel confirmed");
        state.sent = None;
        state.active_order = None;
        state.pending_cancel = false;
        state.cancel_rejected = false;
        // Back to idle; the next trigger decides whether to quote again.
    }

    fn on_order_cancel_rejected(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        warn!(
            leg = %self.name,
            order_id = %event.order.id,
            reason = event.reason.as_deref().unwrap_or("unspecified"),
            "cancel rejected"
        );
        state.sent = None;
        state.pending_cancel = true;
        state.cancel_rejected = true;
        self.rebalance(&mut state);
    }

    fn on_order_filled(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        info!(
            leg = %self.name,
            order_id = %event.order.id,
            qty = %event.order.qty,
            "order filled"
        );
        state.sent = None;
        state.active_order = None;
        self.fresh_trigger(&mut state);
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    fn on_order_partially_filled(&self, event: &OrderEvent) {
        let mut state = self.state.lock();
        if self.invalid_event(&state, event) {
            return;
        }
        // A fill at the new terms doubles as the acknowledgement when it
        // races ahead of the confirm. A cancel in flight stays in flight.
        if let Some(sent) = &state.sent {
            if sent.kind != ActionKind::Cancel
                && sent.order.id == event.order.id
                && sent.order.price == event.order.price
                && sent.order.qty == event.order.qty
            {
                state.sent = None;
            }
        }
        state.active_order = Some(event.order.clone());
        debug!(
            leg = %self.name,
            order_id = %event.order.id,
            cum_qty = %event.order.cum_qty,
            "partial fill"
        );
        self.fresh_trigger(&mut state);
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    fn on_disconnect(&self, exchange: &str) {
        let state = self.state.lock();
        if state.sent.is_some() {
            // No local timeout exists for lost acknowledgements; surface the
            // parked action so the gateway's own recovery can be chased.
            warn!(
                leg = %self.name,
                exchange,
                "disconnected with an action awaiting acknowledgement"
            );
        }
    }
}

impl<P: TargetPolicy> MarketDataHandler for StrategyLeg<P> {
    fn on_book_updated(&self, book: &TopOfBook) {
        let mut state = self.state.lock();
        self.fresh_trigger(&mut state);
        if !state.policy.apply_book(book) {
            debug!(leg = %self.name, instrument = %book.instrument, "own side empty, withdrawing");
            self.refresh_target(&mut state);
            self.attempt_cancel(&mut state);
            return;
        }
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }
}

impl<P: TargetPolicy> SettingsHandler for StrategyLeg<P> {
    fn on_bot_enabled_change(&self, enabled: bool) {
        info!(leg = %self.name, enabled, "strategy enable switch");
        let mut state = self.state.lock();
        state.enabled_all = enabled;
        self.refresh_target(&mut state);
        self.rebalance(&mut state);
    }

    fn on_asset_setting_change(&self, setting: &AssetSetting) {
        let mut state = self.state.lock();
        if setting.asset != state.policy.instrument().id.as_str() {
            debug!(leg = %self.name, asset = %setting.asset, "setting for another asset ignored");
            return;
        }
        let Some(key) = SettingKey::parse(&setting.key) else {
            warn!(leg = %self.name, key = %setting.key, "setting key not recognized");
            return;
        };
        if key.side() != state.target.side {
            trace!(leg = %self.name, %key, "setting for the other side ignored");
            return;
        }

        match key {
            SettingKey::SwitchAssetBid | SettingKey::SwitchAssetAsk => {
                info!(leg = %self.name, %key, value = %setting.value, "switch setting");
                self.switch_state(&mut state, setting.value);
            }
            SettingKey::ChangeQtyBid | SettingKey::ChangeQtyAsk => {
                if setting.value >= Decimal::ZERO {
                    info!(leg = %self.name, %key, value = %setting.value, "quantity override");
                    self.fresh_trigger(&mut state);
                    state.policy.set_qty_override(setting.value);
                    self.refresh_target(&mut state);
                    self.rebalance(&mut state);
                }
            }
            SettingKey::ChangeVolBid | SettingKey::ChangeVolAsk => {
                if setting.value >= Decimal::ZERO {
                    // Volume caps live outside the core; still worth a pass.
                    self.fresh_trigger(&mut state);
                    self.refresh_target(&mut state);
                    self.rebalance(&mut state);
                }
            }
        }
    }
}
