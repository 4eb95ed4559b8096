//! Event routing to the strategy legs.
//!
//! Mirrors the subscription wiring of the deployed strategy: the quoting
//! legs price off the STANDARD contract's book, the hedging leg consumes
//! mini executions as its price signal, and all three legs consume the
//! synthetic position and settings streams.

use crate::config::Config;
use crate::gateway::{
    GatewayEvent, Instrument, Order, OrderEvent, OrderEventHandler, OrderGateway, Side,
};
use crate::market::{MarketDataHandler, SecurityStatus, TopOfBook};
use crate::position::{InstrumentPosition, PositionSnapshot, SyntheticAggregator};
use crate::settings::{AssetSetting, FrontCommand, SettingsHandler, SettingsNotifier};
use crate::strategy::{HedgingLeg, HedgingPolicy, QuotingLeg, QuotingPolicy, StrategyLeg};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Any event the strategy consumes, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum StrategyEvent {
    Gateway(GatewayEvent),
    Book(TopOfBook),
    SecurityStatus(SecurityStatus),
    BotEnabled { value: bool },
    AssetSetting(AssetSetting),
    FrontCommand(FrontCommand),
}

/// Source of strategy events for the run loop.
#[async_trait]
pub trait EventSource: Send {
    /// The next event, or `None` when the stream ends.
    async fn next_event(&mut self) -> Option<StrategyEvent>;
}

/// Event source backed by an in-process channel.
pub struct ChannelEventSource {
    receiver: mpsc::UnboundedReceiver<StrategyEvent>,
}

impl ChannelEventSource {
    pub fn new(receiver: mpsc::UnboundedReceiver<StrategyEvent>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Option<StrategyEvent> {
        self.receiver.recv().await
    }
}

/// Owns the three strategy legs and the position books, and routes every
/// inbound event to its subscribers.
pub struct StrategyRunner {
    standard: Instrument,
    mini: Instrument,
    quoter_buy: Arc<QuotingLeg>,
    quoter_sell: Arc<QuotingLeg>,
    hedger: Arc<HedgingLeg>,
    synthetic: Arc<SyntheticAggregator>,
    standard_position: InstrumentPosition,
    mini_position: InstrumentPosition,
}

impl StrategyRunner {
    /// Assemble the strategy from configuration plus the external
    /// collaborators, starting from a caller-supplied position snapshot.
    pub fn new(
        config: &Config,
        gateway: Arc<dyn OrderGateway>,
        settings: Arc<dyn SettingsNotifier>,
        initial_position: PositionSnapshot,
    ) -> Self {
        let standard = config.instruments.standard.to_instrument();
        let mini = config.instruments.mini.to_instrument();

        let synthetic = Arc::new(SyntheticAggregator::new(
            [standard.clone(), mini.clone()],
            initial_position,
        ));

        let quoter_buy = Arc::new(StrategyLeg::new(
            "market-maker-buy",
            config.account.clone(),
            QuotingPolicy::new(
                mini.clone(),
                Side::Buy,
                config.quoting.clone(),
                config.hedging.threshold,
            ),
            config.start_enabled,
            config.quoting.start_enabled,
            Arc::clone(&gateway),
            Arc::clone(&settings),
        ));
        let quoter_sell = Arc::new(StrategyLeg::new(
            "market-maker-sell",
            config.account.clone(),
            QuotingPolicy::new(
                mini.clone(),
                Side::Sell,
                config.quoting.clone(),
                config.hedging.threshold,
            ),
            config.start_enabled,
            config.quoting.start_enabled,
            Arc::clone(&gateway),
            Arc::clone(&settings),
        ));
        let hedger = Arc::new(StrategyLeg::new(
            "balancer",
            config.account.clone(),
            HedgingPolicy::new(standard.clone(), config.hedging.clone()),
            config.start_enabled,
            config.hedging.start_enabled,
            gateway,
            settings,
        ));

        info!(
            standard = %standard.id,
            mini = %mini.id,
            threshold = %config.hedging.threshold,
            "strategy assembled"
        );

        Self {
            standard_position: InstrumentPosition::new(
                standard.clone(),
                PositionSnapshot::default(),
            ),
            mini_position: InstrumentPosition::new(mini.clone(), PositionSnapshot::default()),
            standard,
            mini,
            quoter_buy,
            quoter_sell,
            hedger,
            synthetic,
        }
    }

    pub fn quoter_buy(&self) -> &QuotingLeg {
        &self.quoter_buy
    }

    pub fn quoter_sell(&self) -> &QuotingLeg {
        &self.quoter_sell
    }

    pub fn hedger(&self) -> &HedgingLeg {
        &self.hedger
    }

    pub fn synthetic_snapshot(&self) -> PositionSnapshot {
        self.synthetic.snapshot()
    }

    /// Consume events until the source is exhausted.
    pub async fn run(&self, mut source: impl EventSource) {
        while let Some(event) = source.next_event().await {
            self.dispatch(&event);
        }
        info!("event source exhausted, strategy stopping");
    }

    /// Route one event to its subscribers.
    pub fn dispatch(&self, event: &StrategyEvent) {
        match event {
            StrategyEvent::Gateway(gateway_event) => self.dispatch_gateway(gateway_event),
            StrategyEvent::Book(book) => {
                if book.instrument == self.standard.id {
                    self.quoter_buy.on_book_updated(book);
                    self.quoter_sell.on_book_updated(book);
                } else {
                    debug!(instrument = %book.instrument, "book for unsubscribed instrument ignored");
                }
            }
            StrategyEvent::SecurityStatus(status) => {
                self.quoter_buy.on_security_status(status);
                self.quoter_sell.on_security_status(status);
            }
            StrategyEvent::BotEnabled { value } => {
                self.quoter_buy.on_bot_enabled_change(*value);
                self.quoter_sell.on_bot_enabled_change(*value);
                self.hedger.on_bot_enabled_change(*value);
            }
            StrategyEvent::AssetSetting(setting) => {
                self.quoter_buy.on_asset_setting_change(setting);
                self.quoter_sell.on_asset_setting_change(setting);
                self.hedger.on_asset_setting_change(setting);
            }
            StrategyEvent::FrontCommand(command) => {
                self.quoter_buy.on_front_command(command);
                self.quoter_sell.on_front_command(command);
                self.hedger.on_front_command(command);
            }
        }
    }

    fn dispatch_gateway(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Placed(order_event) => {
                self.with_leg(order_event, |leg| leg.on_order_placed(order_event));
            }
            GatewayEvent::PlaceRejected(order_event) => {
                self.with_leg(order_event, |leg| leg.on_order_place_rejected(order_event));
            }
            GatewayEvent::Replaced(order_event) => {
                self.with_leg(order_event, |leg| leg.on_order_replaced(order_event));
            }
            GatewayEvent::ReplaceRejected(order_event) => {
                self.with_leg(order_event, |leg| {
                    leg.on_order_replace_rejected(order_event);
                });
            }
            GatewayEvent::Cancelled(order_event) => {
                self.with_leg(order_event, |leg| leg.on_order_cancelled(order_event));
            }
            GatewayEvent::CancelRejected(order_event) => {
                self.with_leg(order_event, |leg| {
                    leg.on_order_cancel_rejected(order_event);
                });
            }
            GatewayEvent::Filled(order_event) => {
                // Positions first: the leg's own re-decision runs against the
                // post-fill synthetic position.
                self.apply_fill(order_event);
                self.with_leg(order_event, |leg| leg.on_order_filled(order_event));
            }
            GatewayEvent::PartiallyFilled(order_event) => {
                self.apply_fill(order_event);
                self.with_leg(order_event, |leg| {
                    leg.on_order_partially_filled(order_event);
                });
            }
            GatewayEvent::Registered(order_event) => {
                self.with_leg(order_event, |leg| leg.on_order_registered(order_event));
            }
            GatewayEvent::TradeCancel(order_event) => {
                self.with_leg(order_event, |leg| leg.on_trade_cancel(order_event));
            }
            GatewayEvent::TradeFromAnotherAccount(order_event) => {
                self.with_leg(order_event, |leg| {
                    leg.on_trade_from_another_account(order_event);
                });
            }
            GatewayEvent::StartFinish { exchange } => {
                self.quoter_buy.on_start_finish(exchange);
                self.quoter_sell.on_start_finish(exchange);
                self.hedger.on_start_finish(exchange);
            }
            GatewayEvent::Disconnect { exchange } => {
                self.quoter_buy.on_disconnect(exchange);
                self.quoter_sell.on_disconnect(exchange);
                self.hedger.on_disconnect(exchange);
            }
        }
    }

    /// The leg owning an order: mini orders belong to the quoting leg of the
    /// order's side, standard orders to the hedger.
    fn leg_for(&self, order: &Order) -> Option<&dyn OrderEventHandler> {
        if order.instrument == self.mini.id {
            Some(match order.side {
                Side::Buy => self.quoter_buy.as_ref(),
                Side::Sell => self.quoter_sell.as_ref(),
            })
        } else if order.instrument == self.standard.id {
            Some(self.hedger.as_ref())
        } else {
            None
        }
    }

    fn with_leg(&self, event: &OrderEvent, deliver: impl FnOnce(&dyn OrderEventHandler)) {
        match self.leg_for(&event.order) {
            Some(leg) => deliver(leg),
            None => warn!(
                instrument = %event.order.instrument,
                order_id = %event.order.id,
                "order event for unknown instrument dropped"
            ),
        }
    }

    /// Fold a fill into the position books and fan the update out.
    fn apply_fill(&self, event: &OrderEvent) {
        let Some(execution) = &event.execution else {
            warn!(order_id = %event.order.id, "fill event without execution payload dropped");
            return;
        };

        // Price the hedge where the mini traded, before the position update
        // can trigger it.
        if execution.instrument == self.mini.id {
            self.hedger.on_signal_execution(execution.price);
        }

        if let Some(position_event) = self.standard_position.apply_execution(
            &execution.instrument,
            execution.side,
            execution.qty,
        ) {
            debug!(
                instrument = %self.standard.id,
                net = %position_event.new.net_qty,
                "standard position updated"
            );
        }
        if let Some(position_event) = self.mini_position.apply_execution(
            &execution.instrument,
            execution.side,
            execution.qty,
        ) {
            debug!(
                instrument = %self.mini.id,
                net = %position_event.new.net_qty,
                "mini position updated"
            );
        }

        if let Some(position_event) =
            self.synthetic
                .apply_execution(&execution.instrument, execution.side, execution.qty)
        {
            self.quoter_buy.on_synthetic_position(&position_event);
            self.quoter_sell.on_synthetic_position(&position_event);
            self.hedger.on_synthetic_position(&position_event);
        }
    }

    /// One status line per leg plus the synthetic book, for the periodic
    /// monitoring log.
    pub fn log_status(&self) {
        let snapshot = self.synthetic.snapshot();
        info!(
            net_qty = %snapshot.net_qty,
            buy_qty = %snapshot.buy_qty,
            sell_qty = %snapshot.sell_qty,
            standard_net = %self.standard_position.snapshot().net_qty,
            mini_net = %self.mini_position.snapshot().net_qty,
            "synthetic position"
        );
        for (name, phase) in [
            (self.quoter_buy.name(), self.quoter_buy.phase()),
            (self.quoter_sell.name(), self.quoter_sell.phase()),
            (self.hedger.name(), self.hedger.phase()),
        ] {
            info!(leg = name, %phase, "leg status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Execution, MockGateway, Submission};
    use crate::market::Quote;
    use crate::settings::NoopSettingsNotifier;
    use crate::strategy::LegPhase;
    use rust_decimal_macros::dec;

    fn runner() -> (StrategyRunner, Arc<MockGateway>) {
        let gateway = Arc::new(MockGateway::new());
        let runner = StrategyRunner::new(
            &Config::default(),
            Arc::clone(&gateway) as Arc<dyn OrderGateway>,
            Arc::new(NoopSettingsNotifier),
            PositionSnapshot::default(),
        );
        (runner, gateway)
    }

    fn reference_book() -> StrategyEvent {
        StrategyEvent::Book(TopOfBook::new(
            crate::gateway::InstrumentId::new("ROS"),
            Some(Quote::new(dec!(100.0), dec!(5))),
            Some(Quote::new(dec!(100.5), dec!(5))),
        ))
    }

    /// Confirm whatever placements are in flight on a leg.
    fn confirm_placements(runner: &StrategyRunner) {
        for leg_order in [
            runner.quoter_buy().sent_order(),
            runner.quoter_sell().sent_order(),
            runner.hedger().sent_order(),
        ]
        .into_iter()
        .flatten()
        {
            runner.dispatch(&StrategyEvent::Gateway(GatewayEvent::Placed(
                OrderEvent::new(leg_order),
            )));
        }
    }

    #[test]
    fn test_reference_book_drives_both_quoters() {
        let (runner, gateway) = runner();
        runner.dispatch(&reference_book());

        let submissions = gateway.take_submissions();
        assert_eq!(submissions.len(), 2);
        let mut prices = Vec::new();
        for submission in &submissions {
            match submission {
                Submission::Place(request) => prices.push((request.side, request.price)),
                other => panic!("expected place, got {other:?}"),
            }
        }
        assert!(prices.contains(&(Side::Buy, dec!(100.15))));
        assert!(prices.contains(&(Side::Sell, dec!(100.35))));
    }

    #[test]
    fn test_mini_book_is_not_a_quote_reference() {
        let (runner, gateway) = runner();
        runner.dispatch(&StrategyEvent::Book(TopOfBook::new(
            crate::gateway::InstrumentId::new("MIN"),
            Some(Quote::new(dec!(100.0), dec!(5))),
            Some(Quote::new(dec!(100.5), dec!(5))),
        )));
        assert!(gateway.take_submissions().is_empty());
    }

    #[test]
    fn test_mini_fills_move_position_and_trigger_hedge() {
        let (runner, gateway) = runner();
        runner.dispatch(&reference_book());
        confirm_placements(&runner);
        gateway.take_submissions();

        let buy_order = runner
            .quoter_buy()
            .active_order()
            .expect("buy quote resting");

        // Six mini lots bought: 6 * 10 = 60 common units, at the band edge.
        let mut filled = buy_order.clone();
        filled.cum_qty = filled.qty;
        runner.dispatch(&StrategyEvent::Gateway(GatewayEvent::Filled(
            OrderEvent::with_execution(
                filled,
                Execution {
                    instrument: crate::gateway::InstrumentId::new("MIN"),
                    side: Side::Buy,
                    qty: dec!(6),
                    price: dec!(100.15),
                },
            ),
        )));

        assert_eq!(runner.synthetic_snapshot().net_qty, dec!(60));

        // The hedger reacts: sell one standard contract at the traded price.
        let submissions = gateway.take_submissions();
        let hedge = submissions
            .iter()
            .find_map(|submission| match submission {
                Submission::Place(request) if request.instrument.as_str() == "ROS" => {
                    Some(request)
                }
                _ => None,
            })
            .expect("hedge placement");
        assert_eq!(hedge.side, Side::Sell);
        assert_eq!(hedge.qty, dec!(1));
        assert_eq!(hedge.price, dec!(100.15));

        // The filled quoter is suppressed while out of band: no requote.
        assert_eq!(runner.quoter_buy().phase(), LegPhase::Idle);
    }

    #[test]
    fn test_order_events_route_by_instrument_and_side() {
        let (runner, gateway) = runner();
        runner.dispatch(&reference_book());
        gateway.take_submissions();

        let sell_order = runner
            .quoter_sell()
            .sent_order()
            .expect("sell place in flight");
        runner.dispatch(&StrategyEvent::Gateway(GatewayEvent::Placed(
            OrderEvent::new(sell_order),
        )));

        assert_eq!(runner.quoter_sell().phase(), LegPhase::Resting);
        assert_eq!(runner.quoter_buy().phase(), LegPhase::AwaitingPlacement);
    }

    #[test]
    fn test_unknown_instrument_order_event_dropped() {
        let (runner, gateway) = runner();
        runner.dispatch(&reference_book());
        gateway.take_submissions();

        let mut stray = runner
            .quoter_buy()
            .sent_order()
            .expect("buy place in flight");
        stray.instrument = crate::gateway::InstrumentId::new("SOY");
        runner.dispatch(&StrategyEvent::Gateway(GatewayEvent::Filled(
            OrderEvent::new(stray),
        )));

        assert_eq!(runner.quoter_buy().phase(), LegPhase::AwaitingPlacement);
        assert_eq!(runner.synthetic_snapshot(), PositionSnapshot::default());
    }

    #[test]
    fn test_bot_disable_withdraws_every_leg() {
        let (runner, gateway) = runner();
        runner.dispatch(&reference_book());
        confirm_placements(&runner);
        gateway.take_submissions();

        runner.dispatch(&StrategyEvent::BotEnabled { value: false });

        let submissions = gateway.take_submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions
            .iter()
            .all(|submission| matches!(submission, Submission::Cancel(_))));
        assert_eq!(runner.quoter_buy().phase(), LegPhase::AwaitingCancel);
        assert_eq!(runner.quoter_sell().phase(), LegPhase::AwaitingCancel);
    }

    #[tokio::test]
    async fn test_channel_source_feeds_run_loop() {
        let (runner, gateway) = runner();
        let (sender, receiver) = mpsc::unbounded_channel();

        sender.send(reference_book()).expect("send");
        drop(sender);

        runner.run(ChannelEventSource::new(receiver)).await;
        assert_eq!(gateway.take_submissions().len(), 2);
    }
}
