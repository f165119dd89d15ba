use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::error::EngineError;

/// Upper bound on the approved collateral set. The set is fixed at
/// initialization, so valuation always iterates a small, bounded list.
pub const MAX_COLLATERAL_ASSETS: usize = 8;

/// Seed for the singleton config PDA.
pub const CONFIG_SEED: &[u8] = b"config";
/// Seed for the PDA that owns the collateral vaults and the synthetic mint.
pub const AUTHORITY_SEED: &[u8] = b"authority";

/// One approved collateral asset: its mint, the price feed pinned to it,
/// and the engine-custody vault holding deposits.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq)]
pub struct CollateralConfig {
    pub mint: Pubkey,
    pub price_feed: Pubkey,
    pub vault: Pubkey,
    pub decimals: u8,
}

/// Engine configuration singleton.
///
/// The collateral list is append-only during initialization and immutable
/// afterwards; no instruction modifies it. `locked` is the mutual-exclusion
/// flag: it is set and persisted before any call leaves the program and
/// cleared before the instruction returns, so a nested invocation observes
/// it and fails.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct EngineConfig {
    /// Account discriminator
    pub discriminator: [u8; 8],

    /// Is initialized
    pub is_initialized: bool,

    /// Bump of the config PDA
    pub config_bump: u8,

    /// Bump of the engine authority PDA
    pub authority_bump: u8,

    /// Mutual-exclusion flag for in-flight operations
    pub locked: bool,

    /// Mint of the synthetic token; its sole mint authority is the
    /// engine authority PDA
    pub synthetic_mint: Pubkey,

    /// Decimals of the synthetic mint
    pub synthetic_decimals: u8,

    /// Approved collateral assets, in initialization order
    pub collaterals: Vec<CollateralConfig>,
}

impl EngineConfig {
    pub const DISCRIMINATOR: [u8; 8] = *b"SYN_CONF";

    pub const LEN: usize = 8 + // discriminator
        1 + // is_initialized
        1 + // config_bump
        1 + // authority_bump
        1 + // locked
        32 + // synthetic_mint
        1 + // synthetic_decimals
        4 + MAX_COLLATERAL_ASSETS * (32 + 32 + 32 + 1) + // collaterals vec
        64; // padding

    pub fn new(
        config_bump: u8,
        authority_bump: u8,
        synthetic_mint: Pubkey,
        synthetic_decimals: u8,
        collaterals: Vec<CollateralConfig>,
    ) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            config_bump,
            authority_bump,
            locked: false,
            synthetic_mint,
            synthetic_decimals,
            collaterals,
        }
    }

    /// Deserialize from account data, tolerating the trailing padding.
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        let config = Self::deserialize(&mut &data[..])
            .map_err(|_| ProgramError::InvalidAccountData)?;
        if config.discriminator != Self::DISCRIMINATOR || !config.is_initialized {
            return Err(EngineError::AccountNotInitialized.into());
        }
        Ok(config)
    }

    pub fn pack(&self, data: &mut [u8]) -> Result<(), ProgramError> {
        self.serialize(&mut &mut data[..])
            .map_err(|_| ProgramError::AccountDataTooSmall)?;
        Ok(())
    }

    /// Index of an approved asset, or `UnapprovedAsset`.
    pub fn asset_index(&self, mint: &Pubkey) -> Result<usize, ProgramError> {
        self.collaterals
            .iter()
            .position(|c| c.mint == *mint)
            .ok_or_else(|| EngineError::UnapprovedAsset.into())
    }

    /// Ordered list of approved collateral mints.
    pub fn collateral_tokens(&self) -> Vec<Pubkey> {
        self.collaterals.iter().map(|c| c.mint).collect()
    }

    /// Price feed pinned to an approved asset.
    pub fn price_feed(&self, mint: &Pubkey) -> Result<Pubkey, ProgramError> {
        Ok(self.collaterals[self.asset_index(mint)?].price_feed)
    }
}

pub fn find_config_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[CONFIG_SEED], program_id)
}

pub fn find_engine_authority_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[AUTHORITY_SEED], program_id)
}
