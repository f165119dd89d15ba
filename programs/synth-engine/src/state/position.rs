use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::error::EngineError;
use crate::state::engine_config::MAX_COLLATERAL_ASSETS;

/// Seed prefix for per-owner position PDAs.
pub const POSITION_SEED: &[u8] = b"position";

/// Per-owner ledger: deposited collateral per approved asset and the
/// outstanding minted synthetic debt.
///
/// Collateral amounts are in each asset's native (mint-decimal) precision;
/// debt is in the synthetic mint's native precision so the ledger and the
/// token supply stay exactly 1:1. Both are unsigned and every decrement is
/// checked: an underflow is rejected, never clamped.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq)]
pub struct Position {
    /// Account discriminator
    pub discriminator: [u8; 8],

    /// Is initialized
    pub is_initialized: bool,

    /// Owner of the position
    pub owner: Pubkey,

    /// Bump of the position PDA
    pub bump: u8,

    /// Outstanding minted synthetic amount, mint-native precision
    pub debt_minted: u64,

    /// Deposited amounts, parallel to the config's collateral list
    pub collateral_deposited: [u64; MAX_COLLATERAL_ASSETS],
}

impl Position {
    pub const DISCRIMINATOR: [u8; 8] = *b"SYN_POSN";

    pub const LEN: usize = 8 + // discriminator
        1 + // is_initialized
        32 + // owner
        1 + // bump
        8 + // debt_minted
        8 * MAX_COLLATERAL_ASSETS + // collateral_deposited
        32; // padding

    pub fn new(owner: Pubkey, bump: u8) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            owner,
            bump,
            debt_minted: 0,
            collateral_deposited: [0; MAX_COLLATERAL_ASSETS],
        }
    }

    /// Deserialize from account data, tolerating the trailing padding.
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        let position = Self::deserialize(&mut &data[..])
            .map_err(|_| ProgramError::InvalidAccountData)?;
        if position.discriminator != Self::DISCRIMINATOR || !position.is_initialized {
            return Err(EngineError::AccountNotInitialized.into());
        }
        Ok(position)
    }

    pub fn pack(&self, data: &mut [u8]) -> Result<(), ProgramError> {
        self.serialize(&mut &mut data[..])
            .map_err(|_| ProgramError::AccountDataTooSmall)?;
        Ok(())
    }

    pub fn collateral_balance(&self, index: usize) -> u64 {
        self.collateral_deposited[index]
    }

    pub fn add_collateral(&mut self, index: usize, amount: u64) -> Result<(), ProgramError> {
        self.collateral_deposited[index] = self.collateral_deposited[index]
            .checked_add(amount)
            .ok_or(EngineError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn remove_collateral(&mut self, index: usize, amount: u64) -> Result<(), ProgramError> {
        self.collateral_deposited[index] = self.collateral_deposited[index]
            .checked_sub(amount)
            .ok_or(EngineError::InsufficientCollateralBalance)?;
        Ok(())
    }

    pub fn add_debt(&mut self, amount: u64) -> Result<(), ProgramError> {
        self.debt_minted = self
            .debt_minted
            .checked_add(amount)
            .ok_or(EngineError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn remove_debt(&mut self, amount: u64) -> Result<(), ProgramError> {
        self.debt_minted = self
            .debt_minted
            .checked_sub(amount)
            .ok_or(EngineError::InsufficientDebt)?;
        Ok(())
    }
}

pub fn find_position_address(program_id: &Pubkey, owner: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[POSITION_SEED, owner.as_ref()], program_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_covers_serialized_size() {
        let position = Position::new(Pubkey::new_unique(), 255);
        let bytes = borsh::BorshSerialize::try_to_vec(&position).unwrap();
        assert!(bytes.len() <= Position::LEN);
    }

    #[test]
    fn pack_unpack_round_trip() {
        let mut position = Position::new(Pubkey::new_unique(), 255);
        position.add_collateral(0, 10_000_000_000).unwrap();
        position.add_debt(8_000_000_000_000).unwrap();
        let mut data = vec![0u8; Position::LEN];
        position.pack(&mut data).unwrap();
        assert_eq!(Position::unpack(&data).unwrap(), position);
    }

    #[test]
    fn remove_collateral_rejects_underflow() {
        let mut position = Position::new(Pubkey::new_unique(), 255);
        position.add_collateral(1, 500).unwrap();
        assert_eq!(
            position.remove_collateral(1, 501).unwrap_err(),
            EngineError::InsufficientCollateralBalance.into()
        );
        // a failed decrement leaves the balance untouched
        assert_eq!(position.collateral_balance(1), 500);
        position.remove_collateral(1, 500).unwrap();
        assert_eq!(position.collateral_balance(1), 0);
    }

    #[test]
    fn remove_debt_rejects_underflow() {
        let mut position = Position::new(Pubkey::new_unique(), 255);
        position.add_debt(100).unwrap();
        assert_eq!(
            position.remove_debt(101).unwrap_err(),
            EngineError::InsufficientDebt.into()
        );
        position.remove_debt(100).unwrap();
        assert_eq!(position.debt_minted, 0);
    }
}
