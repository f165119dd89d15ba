use num_derive::FromPrimitive;
use solana_program::{
    decode_error::DecodeError,
    program_error::{PrintProgramError, ProgramError},
};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, FromPrimitive, PartialEq)]
pub enum EngineError {
    #[error("Invalid instruction")]
    InvalidInstruction = 0,

    #[error("Amount must be greater than zero")]
    InvalidAmount = 1,

    #[error("Asset is not in the approved collateral set")]
    UnapprovedAsset = 2,

    #[error("Collateral and price feed lists do not match")]
    ConfigurationMismatch = 3,

    #[error("Token transfer failed")]
    TransferFailed = 4,

    #[error("Operation would leave the account undercollateralized")]
    InsufficientCollateral = 5,

    #[error("Position is healthy, no liquidation needed")]
    PositionAlreadyHealthy = 6,

    #[error("Liquidation did not improve the position")]
    LiquidationIneffective = 7,

    #[error("Operation already in flight")]
    ReentrantCall = 8,

    #[error("Oracle reported a non-positive price")]
    InvalidOraclePrice = 9,

    #[error("Oracle price is stale")]
    StaleOraclePrice = 10,

    #[error("Invalid price feed account")]
    InvalidPriceFeed = 11,

    #[error("Withdrawal exceeds deposited collateral")]
    InsufficientCollateralBalance = 12,

    #[error("Burn exceeds outstanding debt")]
    InsufficientDebt = 13,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow = 14,

    #[error("Account not initialized")]
    AccountNotInitialized = 15,

    #[error("Account already initialized")]
    AccountAlreadyInitialized = 16,

    #[error("Invalid authority")]
    InvalidAuthority = 17,

    #[error("Too many collateral assets")]
    TooManyCollateralAssets = 18,

    #[error("Unsupported mint decimals")]
    UnsupportedMintDecimals = 19,

    #[error("Invalid vault account")]
    InvalidVaultAccount = 20,

    #[error("Invalid synthetic mint account")]
    InvalidSyntheticMint = 21,
}

impl PrintProgramError for EngineError {
    fn print<E>(&self) {
        use solana_program::msg;
        msg!("EngineError: {}", self);
    }
}

impl From<EngineError> for ProgramError {
    fn from(e: EngineError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for EngineError {
    fn type_of() -> &'static str {
        "EngineError"
    }
}
