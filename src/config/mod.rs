//! Configuration management for the mini maker.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::gateway::Instrument;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Trading account the strategy submits under
    #[serde(default)]
    pub account: String,
    /// The standard/mini contract pair
    #[serde(default)]
    pub instruments: InstrumentsConfig,
    /// Quoting leg parameters
    #[serde(default)]
    pub quoting: QuotingConfig,
    /// Hedging leg parameters
    #[serde(default)]
    pub hedging: HedgingConfig,
    /// Whether the whole strategy starts enabled (set false in production and
    /// arm it through a settings event)
    #[serde(default = "default_start_enabled")]
    pub start_enabled: bool,
}

/// One tradable contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Exchange symbol
    pub symbol: String,
    /// Conversion factor from native execution quantity to common units
    pub lot_multiplier: Decimal,
}

impl InstrumentConfig {
    pub fn to_instrument(&self) -> Instrument {
        Instrument::new(self.symbol.clone(), self.lot_multiplier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    /// Standard-denomination contract (reference book, hedging instrument)
    #[serde(default = "default_standard_instrument")]
    pub standard: InstrumentConfig,
    /// Mini contract quoted by the market-making legs
    #[serde(default = "default_mini_instrument")]
    pub mini: InstrumentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotingConfig {
    /// Default quoted quantity per side, in mini contracts
    #[serde(default = "default_quote_qty")]
    pub default_qty: Decimal,
    /// Price off the reference mid with a dynamic spread; when false, quote
    /// the raw top of the leg's own side
    #[serde(default = "default_automatic_spread")]
    pub automatic_spread: bool,
    /// Whether the quoting legs start enabled
    #[serde(default = "default_start_enabled")]
    pub start_enabled: bool,
    /// Dynamic spread table
    #[serde(default)]
    pub spread: SpreadConfig,
}

/// Dynamic spread rule, recomputed from the reference book on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadConfig {
    /// Spread applied when only one side of the reference book is present
    #[serde(default = "default_single_sided_spread")]
    pub single_sided: Decimal,
    /// Book width above which the wide spread applies
    #[serde(default = "default_wide_width")]
    pub wide_width: Decimal,
    /// Spread applied above `wide_width`
    #[serde(default = "default_wide_spread")]
    pub wide: Decimal,
    /// Book width below which the tight spread applies
    #[serde(default = "default_tight_width")]
    pub tight_width: Decimal,
    /// Spread applied below `tight_width`
    #[serde(default = "default_tight_spread")]
    pub tight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingConfig {
    /// Absolute synthetic net position (common units) that triggers hedging
    /// and suppresses quoting
    #[serde(default = "default_hedge_threshold")]
    pub threshold: Decimal,
    /// Hedge order quantity, in standard contracts
    #[serde(default = "default_hedge_qty")]
    pub hedge_qty: Decimal,
    /// Whether the hedging leg starts enabled
    #[serde(default = "default_start_enabled")]
    pub start_enabled: bool,
}

// Default value functions
fn default_standard_instrument() -> InstrumentConfig {
    InstrumentConfig {
        symbol: "ROS".to_string(),
        lot_multiplier: Decimal::new(100, 0),
    }
}

fn default_mini_instrument() -> InstrumentConfig {
    InstrumentConfig {
        symbol: "MIN".to_string(),
        lot_multiplier: Decimal::new(10, 0),
    }
}

fn default_quote_qty() -> Decimal {
    Decimal::new(10, 0)
}

fn default_automatic_spread() -> bool {
    true
}

fn default_start_enabled() -> bool {
    true
}

fn default_single_sided_spread() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_wide_width() -> Decimal {
    Decimal::ONE
}

fn default_wide_spread() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

fn default_tight_width() -> Decimal {
    Decimal::new(9, 1) // 0.9
}

fn default_tight_spread() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_hedge_threshold() -> Decimal {
    Decimal::new(60, 0)
}

fn default_hedge_qty() -> Decimal {
    Decimal::ONE
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("MM"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.instruments.standard.symbol.is_empty()
                && !self.instruments.mini.symbol.is_empty(),
            "instrument symbols must not be empty"
        );

        anyhow::ensure!(
            self.instruments.standard.symbol != self.instruments.mini.symbol,
            "standard and mini instruments must differ"
        );

        anyhow::ensure!(
            self.instruments.standard.lot_multiplier > Decimal::ZERO
                && self.instruments.mini.lot_multiplier > Decimal::ZERO,
            "lot multipliers must be positive"
        );

        anyhow::ensure!(
            self.quoting.default_qty > Decimal::ZERO,
            "quoting default_qty must be positive"
        );

        anyhow::ensure!(
            self.quoting.spread.tight_width <= self.quoting.spread.wide_width,
            "spread tight_width must not exceed wide_width"
        );

        anyhow::ensure!(
            self.hedging.threshold > Decimal::ZERO,
            "hedging threshold must be positive"
        );

        anyhow::ensure!(
            self.hedging.hedge_qty > Decimal::ZERO,
            "hedge_qty must be positive"
        );

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: String::new(),
            instruments: InstrumentsConfig::default(),
            quoting: QuotingConfig::default(),
            hedging: HedgingConfig::default(),
            start_enabled: default_start_enabled(),
        }
    }
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_instrument(),
            mini: default_mini_instrument(),
        }
    }
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            default_qty: default_quote_qty(),
            automatic_spread: default_automatic_spread(),
            start_enabled: default_start_enabled(),
            spread: SpreadConfig::default(),
        }
    }
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            single_sided: default_single_sided_spread(),
            wide_width: default_wide_width(),
            wide: default_wide_spread(),
            tight_width: default_tight_width(),
            tight: default_tight_spread(),
        }
    }
}

impl Default for HedgingConfig {
    fn default() -> Self {
        Self {
            threshold: default_hedge_threshold(),
            hedge_qty: default_hedge_qty(),
            start_enabled: default_start_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_same_symbols_rejected() {
        let mut config = Config::default();
        config.instruments.mini.symbol = config.instruments.standard.symbol.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.hedging.threshold = Decimal::ZERO;
        assert!(config.validate().is_err());
    }
}
