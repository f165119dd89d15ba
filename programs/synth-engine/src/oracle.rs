use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{account_info::AccountInfo, program_error::ProgramError, pubkey::Pubkey};

use crate::engine::ADDITIONAL_FEED_PRECISION;
use crate::error::EngineError;

/// Price feeds publish 8-decimal prices.
pub const PRICE_FEED_DECIMALS: u8 = 8;

/// A price older than this is unusable (seconds).
pub const PRICE_STALENESS_THRESHOLD: i64 = 3 * 60 * 60;

/// Layout of an external price feed account. One feed is pinned per
/// approved collateral asset at initialization; the engine only ever
/// reads it.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq)]
pub struct PriceFeed {
    /// Price in the reference currency, `decimals` fractional digits
    pub price: i64,

    /// Declared precision of `price`
    pub decimals: u8,

    /// Unix timestamp of the last oracle update
    pub publish_time: i64,
}

impl PriceFeed {
    pub const LEN: usize = 8 + 1 + 8;

    /// Validate the feed and return the price scaled to 18-decimal fixed
    /// point. A non-positive price, an unexpected declared precision, or a
    /// stale round is a hard fault; no default is ever substituted.
    pub fn validated_price(&self, now: i64) -> Result<u128, ProgramError> {
        if self.decimals != PRICE_FEED_DECIMALS {
            return Err(EngineError::InvalidPriceFeed.into());
        }
        if self.price <= 0 {
            return Err(EngineError::InvalidOraclePrice.into());
        }
        if now.saturating_sub(self.publish_time) > PRICE_STALENESS_THRESHOLD {
            return Err(EngineError::StaleOraclePrice.into());
        }
        Ok(self.price as u128 * ADDITIONAL_FEED_PRECISION)
    }
}

/// Read and validate the feed account pinned to an asset, returning the
/// 18-decimal scaled price.
pub fn read_scaled_price(
    feed_info: &AccountInfo,
    expected_feed: &Pubkey,
    now: i64,
) -> Result<u128, ProgramError> {
    if feed_info.key != expected_feed {
        return Err(EngineError::InvalidPriceFeed.into());
    }
    let data = feed_info.try_borrow_data()?;
    let feed =
        PriceFeed::deserialize(&mut &data[..]).map_err(|_| EngineError::InvalidPriceFeed)?;
    feed.validated_price(now)
}
