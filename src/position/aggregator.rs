//! Folding execution reports into positions.

use super::types::{PositionEvent, PositionSnapshot};
use crate::gateway::{Instrument, InstrumentId, Side};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

struct AggregatorState {
    snapshot: PositionSnapshot,
    version: u64,
}

/// Combines executions on two differently-sized instruments into one
/// synthetic net position.
///
/// Single writer: every update is serialized through the aggregator's own
/// lock, and each returned [`PositionEvent`] carries the version assigned
/// under that lock.
pub struct SyntheticAggregator {
    multipliers: HashMap<InstrumentId, Decimal>,
    state: Mutex<AggregatorState>,
}

impl SyntheticAggregator {
    /// Build an aggregator over `instruments`, starting from a caller-supplied
    /// snapshot (replayed from the position service at cold start).
    pub fn new(
        instruments: impl IntoIterator<Item = Instrument>,
        initial: PositionSnapshot,
    ) -> Self {
        let multipliers = instruments
            .into_iter()
            .map(|instrument| (instrument.id, instrument.lot_multiplier))
            .collect();
        Self {
            multipliers,
            state: Mutex::new(AggregatorState {
                snapshot: initial,
                version: 0,
            }),
        }
    }

    /// Fold one execution into the synthetic position.
    ///
    /// Executions for instruments this aggregator does not track are a no-op
    /// returning `None`: the execution stream may be shared by several
    /// aggregators each filtering its own instruments.
    pub fn apply_execution(
        &self,
        instrument: &InstrumentId,
        side: Side,
        raw_qty: Decimal,
    ) -> Option<PositionEvent> {
        let Some(multiplier) = self.multipliers.get(instrument) else {
            debug!(%instrument, "execution for untracked instrument ignored");
            return None;
        };

        let mut state = self.state.lock();
        let old = state.snapshot;
        state.snapshot.apply(side, raw_qty * multiplier);
        state.version += 1;
        Some(PositionEvent {
            old,
            new: state.snapshot,
            version: state.version,
        })
    }

    /// The latest snapshot, for logging and cold-start handoff.
    pub fn snapshot(&self) -> PositionSnapshot {
        self.state.lock().snapshot
    }
}

/// Common-unit position of a single security.
///
/// Same fold as the synthetic aggregator but filtered to one instrument;
/// used for per-security monitoring subscriptions.
pub struct InstrumentPosition {
    instrument: Instrument,
    state: Mutex<AggregatorState>,
}

impl InstrumentPosition {
    pub fn new(instrument: Instrument, initial: PositionSnapshot) -> Self {
        Self {
            instrument,
            state: Mutex::new(AggregatorState {
                snapshot: initial,
                version: 0,
            }),
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument.id
    }

    /// Fold one execution; executions for other instruments return `None`.
    pub fn apply_execution(
        &self,
        instrument: &InstrumentId,
        side: Side,
        raw_qty: Decimal,
    ) -> Option<PositionEvent> {
        if *instrument != self.instrument.id {
            return None;
        }

        let mut state = self.state.lock();
        let old = state.snapshot;
        state
            .snapshot
            .apply(side, raw_qty * self.instrument.lot_multiplier);
        state.version += 1;
        Some(PositionEvent {
            old,
            new: state.snapshot,
            version: state.version,
        })
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        self.state.lock().snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn aggregator() -> SyntheticAggregator {
        SyntheticAggregator::new(
            [
                Instrument::new("ROS", dec!(100)),
                Instrument::new("MIN", dec!(10)),
            ],
            PositionSnapshot::default(),
        )
    }

    #[test]
    fn test_net_equals_sum_of_scaled_executions() {
        let aggregator = aggregator();
        let std_id = InstrumentId::new("ROS");
        let mini_id = InstrumentId::new("MIN");

        // 2*100 buy + 3*10 buy - 1*100 sell - 5*10 sell = 180
        aggregator.apply_execution(&std_id, Side::Buy, dec!(2));
        aggregator.apply_execution(&mini_id, Side::Buy, dec!(3));
        aggregator.apply_execution(&std_id, Side::Sell, dec!(1));
        let event = aggregator
            .apply_execution(&mini_id, Side::Sell, dec!(5))
            .expect("tracked instrument");

        assert_eq!(event.new.buy_qty, dec!(230));
        assert_eq!(event.new.sell_qty, dec!(150));
        assert_eq!(event.new.net_qty, dec!(80));
        assert_eq!(aggregator.snapshot().net_qty, dec!(80));
    }

    #[test]
    fn test_event_carries_atomic_old_new_pair() {
        let aggregator = aggregator();
        let mini_id = InstrumentId::new("MIN");

        let first = aggregator
            .apply_execution(&mini_id, Side::Buy, dec!(4))
            .expect("tracked instrument");
        assert_eq!(first.old.net_qty, dec!(0));
        assert_eq!(first.new.net_qty, dec!(40));
        assert_eq!(first.version, 1);

        let second = aggregator
            .apply_execution(&mini_id, Side::Sell, dec!(1))
            .expect("tracked instrument");
        assert_eq!(second.old.net_qty, dec!(40));
        assert_eq!(second.new.net_qty, dec!(30));
        assert_eq!(second.version, 2);
    }

    #[test]
    fn test_unknown_instrument_is_a_no_op() {
        let aggregator = aggregator();
        let other = InstrumentId::new("SOY");

        assert!(aggregator
            .apply_execution(&other, Side::Buy, dec!(7))
            .is_none());
        assert_eq!(aggregator.snapshot(), PositionSnapshot::default());
    }

    #[test]
    fn test_cold_start_from_supplied_snapshot() {
        let aggregator = SyntheticAggregator::new(
            [Instrument::new("MIN", dec!(10))],
            PositionSnapshot::new(dec!(100), dec!(40)),
        );
        let event = aggregator
            .apply_execution(&InstrumentId::new("MIN"), Side::Buy, dec!(1))
            .expect("tracked instrument");

        assert_eq!(event.old.net_qty, dec!(60));
        assert_eq!(event.new.net_qty, dec!(70));
    }

    #[test]
    fn test_instrument_position_filters_other_symbols() {
        let position = InstrumentPosition::new(
            Instrument::new("MIN", dec!(10)),
            PositionSnapshot::default(),
        );

        assert!(position
            .apply_execution(&InstrumentId::new("ROS"), Side::Buy, dec!(2))
            .is_none());
        let event = position
            .apply_execution(&InstrumentId::new("MIN"), Side::Buy, dec!(2))
            .expect("own instrument");
        assert_eq!(event.new.net_qty, dec!(20));
    }
}
