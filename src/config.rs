// 7.0 config.rs: all protocol settings in one place. oracle window, trading limits, engine buffers.
// 7.1 pair/group/fee records are NOT here, they live in the registry and change at runtime.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;

// Quote admission window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    // Seconds a quote stays usable after its publish time
    pub lifetime_secs: u64,
    // Widest confidence interval accepted, as percent of price
    pub max_confidence_p: Decimal,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: 60,
            max_confidence_p: dec!(2), // 2%
        }
    }
}

/** 7.2: trading limits. percentages in percent units, 1 = 1% */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    // Open plus pending trades one trader may hold
    pub max_trades_per_trader: u32,
    // Profit cap as percent of collateral
    pub max_profit_p: Decimal,
    // Gap kept between the furthest SL and the liquidation threshold
    pub sl_liquidation_buffer_p: Decimal,
    // Hard cap on price impact per execution
    pub max_price_impact_p: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            max_trades_per_trader: 40,
            max_profit_p: dec!(900),
            sl_liquidation_buffer_p: dec!(5),
            max_price_impact_p: dec!(20),
        }
    }
}

// The complete protocol configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub oracle: OracleConfig,
    pub trading: TradingConfig,
    pub engine: EngineConfig,
}

impl ProtocolConfig {
    // Testnet: long quote lifetime, loose confidence, more slots
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.oracle.lifetime_secs = 300;
        config.oracle.max_confidence_p = dec!(5);
        config.trading.max_trades_per_trader = 100;
        config
    }

    // Mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.oracle.lifetime_secs = 15; // very fresh prices
        config.oracle.max_confidence_p = dec!(0.5);
        config.trading.sl_liquidation_buffer_p = dec!(10);
        config.trading.max_price_impact_p = dec!(5);
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.lifetime_secs == 0 {
            return Err(ConfigError::InvalidOracle {
                reason: "quote lifetime must be positive".to_string(),
            });
        }
        if self.oracle.max_confidence_p <= Decimal::ZERO || self.oracle.max_confidence_p >= dec!(100) {
            return Err(ConfigError::InvalidOracle {
                reason: "max confidence must be in (0, 100)".to_string(),
            });
        }

        if self.trading.max_trades_per_trader == 0 {
            return Err(ConfigError::InvalidTrading {
                reason: "need at least 1 trade slot".to_string(),
            });
        }
        if self.trading.max_profit_p <= Decimal::ZERO {
            return Err(ConfigError::InvalidTrading {
                reason: "max profit must be positive".to_string(),
            });
        }
        // the buffer is subtracted from a liquidation threshold that never exceeds 100%
        if self.trading.sl_liquidation_buffer_p < Decimal::ZERO || self.trading.sl_liquidation_buffer_p >= dec!(100) {
            return Err(ConfigError::InvalidTrading {
                reason: "SL buffer must be in [0, 100)".to_string(),
            });
        }
        if self.trading.max_price_impact_p <= Decimal::ZERO {
            return Err(ConfigError::InvalidTrading {
                reason: "max price impact must be positive".to_string(),
            });
        }

        if self.engine.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "event buffer must hold at least 1 event".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid oracle config: {reason}")]
    InvalidOracle { reason: String },
    #[error("Invalid trading config: {reason}")]
    InvalidTrading { reason: String },
    #[error("Invalid engine config: {reason}")]
    InvalidEngine { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet_conservative(),
        }
    }
}
