use primitive_types::U256;
use solana_program::program_error::ProgramError;

use crate::error::EngineError;
use crate::state::{EngineConfig, Position};

/// 18-decimal fixed point scale shared by all reference-currency values.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Feeds publish 8-decimal prices; they are scaled up by this factor.
pub const ADDITIONAL_FEED_PRECISION: u128 = 10_000_000_000;

/// Native precision of the price feeds.
pub const FEED_PRECISION: u128 = 100_000_000;

/// Share of collateral value counted toward solvency: 50/100, i.e. a
/// position must be at least 200% collateralized.
pub const LIQUIDATION_THRESHOLD: u128 = 50;

pub const LIQUIDATION_PRECISION: u128 = 100;

/// Percentage of the covered value paid to liquidators as bonus collateral.
pub const LIQUIDATION_BONUS: u128 = 10;

/// Minimum solvent health factor (1.0 in 18-decimal fixed point).
pub const MIN_HEALTH_FACTOR: u128 = PRECISION;

/// Health factor reported for a position with no debt.
pub const MAX_HEALTH_FACTOR: u128 = u128::MAX;

/// `a * b / divisor` with a 256-bit intermediate, truncating.
fn mul_div(a: u128, b: u128, divisor: u128) -> Result<u128, ProgramError> {
    if divisor == 0 {
        return Err(EngineError::ArithmeticOverflow.into());
    }
    let wide = U256::from(a) * U256::from(b) / U256::from(divisor);
    if wide > U256::from(u128::MAX) {
        return Err(EngineError::ArithmeticOverflow.into());
    }
    Ok(wide.as_u128())
}

/// `10^(18 - decimals)`, the factor between an asset's native precision
/// and 18-decimal fixed point.
fn decimal_scale(decimals: u8) -> Result<u128, ProgramError> {
    if decimals > 18 {
        return Err(EngineError::UnsupportedMintDecimals.into());
    }
    Ok(10u128.pow(18 - decimals as u32))
}

/// Scale a native token amount up to 18-decimal fixed point.
pub fn to_reference_units(amount: u64, decimals: u8) -> Result<u128, ProgramError> {
    (amount as u128)
        .checked_mul(decimal_scale(decimals)?)
        .ok_or_else(|| EngineError::ArithmeticOverflow.into())
}

/// Reference-currency value of a native token quantity, 18-decimal fixed
/// point. `scaled_price` is the oracle price already scaled to 18 decimals.
/// Truncation is the only rounding applied.
pub fn usd_value(scaled_price: u128, amount: u64, decimals: u8) -> Result<u128, ProgramError> {
    mul_div(to_reference_units(amount, decimals)?, scaled_price, PRECISION)
}

/// Inverse of [`usd_value`]: the native token quantity worth `value`
/// reference-currency units at `scaled_price`.
pub fn token_amount_from_usd(
    scaled_price: u128,
    value: u128,
    decimals: u8,
) -> Result<u64, ProgramError> {
    let scaled_amount = mul_div(value, PRECISION, scaled_price)?;
    let native = scaled_amount / decimal_scale(decimals)?;
    u64::try_from(native).map_err(|_| EngineError::ArithmeticOverflow.into())
}

/// Collateral value counted toward solvency.
pub fn collateral_adjusted_for_threshold(value: u128) -> Result<u128, ProgramError> {
    mul_div(value, LIQUIDATION_THRESHOLD, LIQUIDATION_PRECISION)
}

/// Health factor from total collateral value and total debt value, both in
/// 18-decimal fixed point. A position with no debt can never be
/// liquidated and reports [`MAX_HEALTH_FACTOR`].
pub fn health_factor(collateral_value: u128, debt_value: u128) -> Result<u128, ProgramError> {
    if debt_value == 0 {
        return Ok(MAX_HEALTH_FACTOR);
    }
    mul_div(
        collateral_adjusted_for_threshold(collateral_value)?,
        PRECISION,
        debt_value,
    )
}

pub fn is_solvent(health: u128) -> bool {
    health >= MIN_HEALTH_FACTOR
}

/// Collateral seized when covering `debt_value` (18-decimal) of a
/// position's debt: the equivalent quantity plus the liquidation bonus.
/// Returns `(base, bonus, total)` in the asset's native precision.
pub fn seize_amounts(
    scaled_price: u128,
    debt_value: u128,
    decimals: u8,
) -> Result<(u64, u64, u64), ProgramError> {
    let base = token_amount_from_usd(scaled_price, debt_value, decimals)?;
    let bonus = (base as u128 * LIQUIDATION_BONUS / LIQUIDATION_PRECISION) as u64;
    let total = base
        .checked_add(bonus)
        .ok_or(EngineError::ArithmeticOverflow)?;
    Ok((base, bonus, total))
}

/// Total reference-currency value of a position's deposited collateral.
/// `scaled_prices` is parallel to the config's collateral list.
pub fn account_collateral_value(
    config: &EngineConfig,
    position: &Position,
    scaled_prices: &[u128],
) -> Result<u128, ProgramError> {
    if scaled_prices.len() != config.collaterals.len() {
        return Err(EngineError::ConfigurationMismatch.into());
    }
    let mut total: u128 = 0;
    for (index, collateral) in config.collaterals.iter().enumerate() {
        let amount = position.collateral_balance(index);
        if amount == 0 {
            continue;
        }
        let value = usd_value(scaled_prices[index], amount, collateral.decimals)?;
        total = total
            .checked_add(value)
            .ok_or(EngineError::ArithmeticOverflow)?;
    }
    Ok(total)
}

/// Reference-currency value of a position's outstanding debt. The
/// synthetic token is pegged 1:1, so this is a precision rescale.
pub fn account_debt_value(config: &EngineConfig, position: &Position) -> Result<u128, ProgramError> {
    to_reference_units(position.debt_minted, config.synthetic_decimals)
}

/// Health factor of a position at the given prices.
pub fn account_health_factor(
    config: &EngineConfig,
    position: &Position,
    scaled_prices: &[u128],
) -> Result<u128, ProgramError> {
    health_factor(
        account_collateral_value(config, position, scaled_prices)?,
        account_debt_value(config, position)?,
    )
}

/// Outstanding debt (mint-native units) and total collateral value
/// (18-decimal fixed point) of a position.
pub fn account_information(
    config: &EngineConfig,
    position: &Position,
    scaled_prices: &[u128],
) -> Result<(u64, u128), ProgramError> {
    Ok((
        position.debt_minted,
        account_collateral_value(config, position, scaled_prices)?,
    ))
}
