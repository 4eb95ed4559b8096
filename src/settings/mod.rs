//! Settings distribution: events consumed by the strategy and the
//! reporting hooks it calls back into.
//!
//! Setting changes arrive with string keys; unrecognized keys are logged and
//! ignored rather than surfaced as errors.

use crate::gateway::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Recognized per-asset setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingKey {
    SwitchAssetBid,
    SwitchAssetAsk,
    ChangeQtyBid,
    ChangeQtyAsk,
    ChangeVolBid,
    ChangeVolAsk,
}

impl SettingKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "switch-asset-bid" => Some(Self::SwitchAssetBid),
            "switch-asset-ask" => Some(Self::SwitchAssetAsk),
            "change-qty-bid" => Some(Self::ChangeQtyBid),
            "change-qty-ask" => Some(Self::ChangeQtyAsk),
            "change-vol-bid" => Some(Self::ChangeVolBid),
            "change-vol-ask" => Some(Self::ChangeVolAsk),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SwitchAssetBid => "switch-asset-bid",
            Self::SwitchAssetAsk => "switch-asset-ask",
            Self::ChangeQtyBid => "change-qty-bid",
            Self::ChangeQtyAsk => "change-qty-ask",
            Self::ChangeVolBid => "change-vol-bid",
            Self::ChangeVolAsk => "change-vol-ask",
        }
    }

    /// The book side a key addresses.
    pub fn side(&self) -> Side {
        match self {
            Self::SwitchAssetBid | Self::ChangeQtyBid | Self::ChangeVolBid => Side::Buy,
            Self::SwitchAssetAsk | Self::ChangeQtyAsk | Self::ChangeVolAsk => Side::Sell,
        }
    }

    /// The on/off toggle key for a leg quoting `side`.
    pub fn switch_for(side: Side) -> Self {
        match side {
            Side::Buy => Self::SwitchAssetBid,
            Side::Sell => Self::SwitchAssetAsk,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-asset setting change as distributed by the settings service.
///
/// `key` stays in wire form; consumers parse it and drop what they do not
/// recognize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSetting {
    pub asset: String,
    pub key: String,
    pub value: Decimal,
}

impl AssetSetting {
    pub fn new(asset: impl Into<String>, key: SettingKey, value: Decimal) -> Self {
        Self {
            asset: asset.into(),
            key: key.as_str().to_string(),
            value,
        }
    }
}

/// Free-form front-end command hook. The decision core subscribes but takes
/// no action on these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontCommand {
    pub command: String,
}

/// Settings callbacks, dispatched on an unspecified thread.
pub trait SettingsHandler: Send + Sync {
    fn on_bot_enabled_change(&self, enabled: bool);
    fn on_asset_setting_change(&self, setting: &AssetSetting);
    fn on_front_command(&self, _command: &FrontCommand) {}
}

/// Reporting hooks back into the settings service, so front-end toggles
/// follow state changes the strategy makes on its own.
pub trait SettingsNotifier: Send + Sync {
    /// Move a per-asset front-end toggle.
    fn change_asset_state(&self, key: SettingKey, value: Decimal, asset: &str);
    /// Move the global robot toggle.
    fn change_robot_state(&self, value: Decimal);
}

/// Notifier used when no settings service is attached (tests, paper
/// trading); records nothing, logs at debug.
#[derive(Debug, Default)]
pub struct NoopSettingsNotifier;

impl SettingsNotifier for NoopSettingsNotifier {
    fn change_asset_state(&self, key: SettingKey, value: Decimal, asset: &str) {
        debug!(%key, %value, asset, "asset state change (no settings service attached)");
    }

    fn change_robot_state(&self, value: Decimal) {
        debug!(%value, "robot state change (no settings service attached)");
    }
}
