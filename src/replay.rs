//! Paper trading: drive the assembled strategy from a recorded event stream
//! through the auto-acknowledging mock gateway.
//!
//! The capture is a JSON-lines file of [`StrategyEvent`]s (book updates and
//! settings changes); order confirmations and fills are produced by the mock
//! gateway itself, so captured gateway events are usually absent. If present
//! they are dispatched as-is and dropped by the legs as unknown.

use crate::config::Config;
use crate::gateway::{GatewayEvent, MockGateway};
use crate::position::PositionSnapshot;
use crate::runner::{StrategyEvent, StrategyRunner};
use crate::settings::NoopSettingsNotifier;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Final state of one leg after a replay.
#[derive(Debug, Serialize)]
pub struct LegSummary {
    pub name: String,
    pub phase: String,
    pub resting_price: Option<rust_decimal::Decimal>,
    pub resting_qty: Option<rust_decimal::Decimal>,
}

/// Outcome of a replay run.
#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub events_replayed: usize,
    pub gateway_events: usize,
    pub final_position: PositionSnapshot,
    pub legs: Vec<LegSummary>,
    pub finished_at: DateTime<Utc>,
}

/// Replay harness: the strategy wired to a mock gateway whose confirmations
/// are drained back into the dispatch loop after every scripted event.
pub struct ReplayEngine {
    runner: StrategyRunner,
    gateway: Arc<MockGateway>,
    receiver: mpsc::UnboundedReceiver<GatewayEvent>,
    events_replayed: usize,
    gateway_events: usize,
}

impl ReplayEngine {
    pub fn new(config: &Config) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let gateway = Arc::new(MockGateway::with_events(sender));
        let runner = StrategyRunner::new(
            config,
            Arc::clone(&gateway) as Arc<dyn crate::gateway::OrderGateway>,
            Arc::new(NoopSettingsNotifier),
            PositionSnapshot::default(),
        );
        Self {
            runner,
            gateway,
            receiver,
            events_replayed: 0,
            gateway_events: 0,
        }
    }

    /// Feed one scripted event, fill whatever the new book crosses, and
    /// drain the confirmations it produced.
    pub fn step(&mut self, event: &StrategyEvent) {
        self.runner.dispatch(event);
        self.events_replayed += 1;

        if let StrategyEvent::Book(book) = event {
            self.gateway.mark(book);
        }
        self.drain();
    }

    /// Run the whole capture and return the summary.
    pub fn run(&mut self, events: &[StrategyEvent]) -> ReplaySummary {
        for event in events {
            self.step(event);
        }
        self.runner.log_status();
        self.summary()
    }

    fn drain(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.gateway_events += 1;
            self.runner.dispatch(&StrategyEvent::Gateway(event));
        }
    }

    pub fn runner(&self) -> &StrategyRunner {
        &self.runner
    }

    pub fn summary(&self) -> ReplaySummary {
        let legs = [
            (
                self.runner.quoter_buy().name().to_string(),
                self.runner.quoter_buy().phase(),
                self.runner.quoter_buy().active_order(),
            ),
            (
                self.runner.quoter_sell().name().to_string(),
                self.runner.quoter_sell().phase(),
                self.runner.quoter_sell().active_order(),
            ),
            (
                self.runner.hedger().name().to_string(),
                self.runner.hedger().phase(),
                self.runner.hedger().active_order(),
            ),
        ]
        .into_iter()
        .map(|(name, phase, active)| LegSummary {
            name,
            phase: phase.to_string(),
            resting_price: active.as_ref().map(|order| order.price),
            resting_qty: active.as_ref().map(|order| order.remaining_qty()),
        })
        .collect();

        ReplaySummary {
            events_replayed: self.events_replayed,
            gateway_events: self.gateway_events,
            final_position: self.runner.synthetic_snapshot(),
            legs,
            finished_at: Utc::now(),
        }
    }
}

/// Load a JSON-lines event capture. Blank lines are skipped.
pub fn load_events(path: &Path) -> Result<Vec<StrategyEvent>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open event capture {}", path.display()))?;

    let mut events = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: StrategyEvent = serde_json::from_str(&line)
            .with_context(|| format!("Malformed event on line {}", number + 1))?;
        events.push(event);
    }

    info!(count = events.len(), path = %path.display(), "event capture loaded");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InstrumentId;
    use crate::market::{Quote, TopOfBook};
    use rust_decimal_macros::dec;

    fn book(instrument: &str, bid: Quote, ask: Quote) -> StrategyEvent {
        StrategyEvent::Book(TopOfBook::new(
            InstrumentId::new(instrument),
            Some(bid),
            Some(ask),
        ))
    }

    #[test]
    fn test_quotes_rest_after_a_stable_book() {
        let mut engine = ReplayEngine::new(&Config::default());

        engine.step(&book(
            "ROS",
            Quote::new(dec!(100.0), dec!(5)),
            Quote::new(dec!(100.5), dec!(5)),
        ));

        let summary = engine.summary();
        assert_eq!(summary.final_position, PositionSnapshot::default());
        for leg in summary.legs.iter().take(2) {
            assert_eq!(leg.phase, "resting");
        }
        // Buy rests at 100.15, sell at 100.35.
        assert_eq!(summary.legs[0].resting_price, Some(dec!(100.15)));
        assert_eq!(summary.legs[1].resting_price, Some(dec!(100.35)));
    }

    #[test]
    fn test_crossing_mini_book_fills_and_hedges() {
        let mut engine = ReplayEngine::new(&Config::default());

        // Reference book: quoters go out at 100.15 / 100.35.
        engine.step(&book(
            "ROS",
            Quote::new(dec!(100.0), dec!(5)),
            Quote::new(dec!(100.5), dec!(5)),
        ));

        // A mini seller crosses the buy quote six times over: 6 lots fill,
        // 60 common units, band edge reached.
        engine.step(&book(
            "MIN",
            Quote::new(dec!(99.0), dec!(1)),
            Quote::new(dec!(100.0), dec!(6)),
        ));

        let summary = engine.summary();
        assert_eq!(summary.final_position.net_qty, dec!(60));

        let hedger = &summary.legs[2];
        // The hedge order went out and was confirmed by the mock.
        assert_eq!(hedger.phase, "resting");
        assert_eq!(hedger.resting_qty, Some(dec!(1)));
        assert_eq!(hedger.resting_price, Some(dec!(100.15)));
    }

    #[test]
    fn test_load_events_round_trip() {
        let dir = std::env::temp_dir().join("mini-maker-replay-test");
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("events.jsonl");

        let events = vec![
            book(
                "ROS",
                Quote::new(dec!(100.0), dec!(5)),
                Quote::new(dec!(100.5), dec!(5)),
            ),
            StrategyEvent::BotEnabled { value: false },
        ];
        let mut lines = String::new();
        for event in &events {
            lines.push_str(&serde_json::to_string(event).expect("serialize"));
            lines.push('\n');
        }
        lines.push('\n');
        std::fs::write(&path, lines).expect("write capture");

        let loaded = load_events(&path).expect("load");
        assert_eq!(loaded.len(), 2);
        assert!(matches!(loaded[0], StrategyEvent::Book(_)));
        assert!(matches!(
            loaded[1],
            StrategyEvent::BotEnabled { value: false }
        ));
    }
}
