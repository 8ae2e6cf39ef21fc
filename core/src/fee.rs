//! Play-fee policy.
//!
//! The default charges per started block of play time. Game type, rate
//! and buy-in bounds are handed to every policy so table-specific rules
//! can be added without touching the session recorder.

use crate::{
    config::FeePolicyConfig,
    types::{Chips, Money},
};

/// Everything a fee rule may look at when a session closes.
#[derive(Debug, Clone, Copy)]
pub struct FeeContext<'a> {
    pub duration_minutes: i64,
    pub game_type: &'a str,
    pub rate: &'a str,
    pub min_buy_in: Chips,
    pub max_buy_in: Chips,
}

pub trait FeePolicy: Send + Sync {
    /// Fee for one closed session. Never negative.
    fn play_fee(&self, ctx: &FeeContext<'_>) -> Money;
}

/// `ceil(duration / block_minutes) * fee_per_block`, zero for no play time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBlockFee {
    block_minutes: i64,
    fee_per_block: Money,
}

impl TimeBlockFee {
    pub fn new(config: &FeePolicyConfig) -> Self {
        Self {
            // Hand-built configs skip validation.
            block_minutes: config.block_minutes.max(1),
            fee_per_block: config.fee_per_block,
        }
    }
}

impl FeePolicy for TimeBlockFee {
    fn play_fee(&self, ctx: &FeeContext<'_>) -> Money {
        if ctx.duration_minutes <= 0 {
            return 0;
        }
        let blocks = (ctx.duration_minutes + self.block_minutes - 1) / self.block_minutes;
        blocks.saturating_mul(self.fee_per_block).max(0)
    }
}
