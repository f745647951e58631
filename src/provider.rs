// 9.0 provider.rs: the collateral side of the engine. the engine only tracks entitlements,
// tokens move through this interface.
// 9.1 InMemoryVault is MOCKED: balance changes only, no real token transfers.

use crate::types::{Quote, TraderId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::debug;

pub trait CollateralProvider: Debug {
    /// Moves `amount` from the trader into the pool.
    fn pull(&mut self, trader: TraderId, amount: Quote) -> Result<(), ProviderError>;

    /// Pays `amount` from the pool to the trader.
    fn push(&mut self, trader: TraderId, amount: Quote) -> Result<(), ProviderError>;

    fn available_liquidity(&self) -> Quote;

    /// Trader-side result of a settlement: payout less the collateral it released.
    fn report_realized_pnl(&mut self, amount: Quote);

    /// Applies every transfer of one transition, or none of them.
    ///
    /// On `Err` no balance may have moved and no pnl may have been reported.
    fn settle(&mut self, batch: &TransferBatch) -> Result<(), ProviderError>;
}

// 9.0.1: one collateral movement requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Pull { trader: TraderId, amount: Quote },
    Push { trader: TraderId, amount: Quote },
}

/// Transfers queued by a single transition, handed to the provider once the
/// engine state change has succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferBatch {
    pub transfers: Vec<Transfer>,
    pub realized_pnl: Option<Quote>,
}

impl TransferBatch {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.realized_pnl.is_none()
    }

    /// Zero amounts are dropped.
    pub fn pull(&mut self, trader: TraderId, amount: Quote) {
        if !amount.is_zero() {
            self.transfers.push(Transfer::Pull { trader, amount });
        }
    }

    pub fn push(&mut self, trader: TraderId, amount: Quote) {
        if !amount.is_zero() {
            self.transfers.push(Transfer::Push { trader, amount });
        }
    }

    pub fn report_realized_pnl(&mut self, amount: Quote) {
        let total = self.realized_pnl.unwrap_or_else(Quote::zero).add(amount);
        self.realized_pnl = Some(total);
    }

    /// Total paid out of the pool.
    pub fn pushed(&self) -> Quote {
        self.transfers
            .iter()
            .map(|t| match t {
                Transfer::Push { amount, .. } => *amount,
                Transfer::Pull { .. } => Quote::zero(),
            })
            .sum()
    }
}

// 9.1
#[derive(Debug, Clone, Default)]
pub struct InMemoryVault {
    wallets: HashMap<TraderId, Quote>,
    pool: Quote,
    realized_pnl: Decimal,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: Quote) -> Self {
        Self {
            pool,
            ..Self::default()
        }
    }

    pub fn fund_wallet(&mut self, trader: TraderId, amount: Quote) {
        let balance = self.wallets.entry(trader).or_insert_with(Quote::zero);
        *balance = balance.add(amount);
    }

    pub fn seed_pool(&mut self, amount: Quote) {
        self.pool = self.pool.add(amount);
    }

    pub fn wallet_balance(&self, trader: TraderId) -> Quote {
        self.wallets.get(&trader).copied().unwrap_or_else(Quote::zero)
    }

    pub fn pool_balance(&self) -> Quote {
        self.pool
    }

    /// Sum of reported trader pnl so far.
    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }
}

fn check_amount(amount: Quote) -> Result<(), ProviderError> {
    if amount.is_negative() {
        return Err(ProviderError::InvalidAmount(amount));
    }
    Ok(())
}

impl CollateralProvider for InMemoryVault {
    fn pull(&mut self, trader: TraderId, amount: Quote) -> Result<(), ProviderError> {
        check_amount(amount)?;
        let balance = self.wallet_balance(trader);
        if balance < amount {
            return Err(ProviderError::InsufficientFunds {
                trader,
                balance,
                requested: amount,
            });
        }
        self.wallets.insert(trader, balance.sub(amount));
        self.pool = self.pool.add(amount);
        debug!(%trader, %amount, "collateral pulled");
        Ok(())
    }

    fn push(&mut self, trader: TraderId, amount: Quote) -> Result<(), ProviderError> {
        check_amount(amount)?;
        if self.pool < amount {
            return Err(ProviderError::InsufficientLiquidity {
                available: self.pool,
                requested: amount,
            });
        }
        self.pool = self.pool.sub(amount);
        self.fund_wallet(trader, amount);
        debug!(%trader, %amount, "collateral pushed");
        Ok(())
    }

    fn available_liquidity(&self) -> Quote {
        self.pool
    }

    fn report_realized_pnl(&mut self, amount: Quote) {
        self.realized_pnl += amount.value();
    }

    // applied to a scratch copy first so a failing transfer leaves every balance as it was
    fn settle(&mut self, batch: &TransferBatch) -> Result<(), ProviderError> {
        let mut scratch = self.clone();
        for transfer in &batch.transfers {
            match *transfer {
                Transfer::Pull { trader, amount } => scratch.pull(trader, amount)?,
                Transfer::Push { trader, amount } => scratch.push(trader, amount)?,
            }
        }
        if let Some(pnl) = batch.realized_pnl {
            scratch.report_realized_pnl(pnl);
        }
        *self = scratch;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Negative transfer amount {0}")]
    InvalidAmount(Quote),

    #[error("{trader} holds {balance}, {requested} requested")]
    InsufficientFunds {
        trader: TraderId,
        balance: Quote,
        requested: Quote,
    },

    #[error("Pool holds {available}, {requested} requested")]
    InsufficientLiquidity { available: Quote, requested: Quote },
}
