use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};

use crate::error::EngineError;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub enum EngineInstruction {
    /// Initialize the engine: fix the approved collateral set and the
    /// synthetic mint. Lists must have equal, non-zero length.
    /// Accounts:
    /// 0. `[signer, writable]` Payer
    /// 1. `[writable]` Config PDA
    /// 2. `[]` Engine authority PDA
    /// 3. `[]` Synthetic mint (mint authority must be the engine authority)
    /// 4. `[]` System program
    /// 5.. `[]` For each collateral, in list order: mint, then vault
    InitializeEngine {
        collateral_mints: Vec<Pubkey>,
        price_feeds: Vec<Pubkey>,
    },

    /// Deposit collateral into the caller's position, creating the
    /// position account on first use.
    /// Accounts:
    /// 0. `[signer, writable]` Depositor
    /// 1. `[writable]` Config PDA
    /// 2. `[writable]` Position PDA
    /// 3. `[]` Collateral mint
    /// 4. `[writable]` Depositor collateral token account
    /// 5. `[writable]` Collateral vault
    /// 6. `[]` Token program
    /// 7. `[]` System program
    DepositCollateral { amount: u64 },

    /// Mint synthetic tokens against deposited collateral. Fails if the
    /// resulting position would be undercollateralized.
    /// Accounts:
    /// 0. `[signer]` Owner
    /// 1. `[writable]` Config PDA
    /// 2. `[writable]` Position PDA
    /// 3. `[writable]` Synthetic mint
    /// 4. `[writable]` Owner synthetic token account
    /// 5. `[]` Engine authority PDA
    /// 6. `[]` Token program
    /// 7.. `[]` Price feeds, in config order
    MintSynthetic { amount: u64 },

    /// Withdraw deposited collateral. Fails if the resulting position
    /// would be undercollateralized.
    /// Accounts:
    /// 0. `[signer]` Owner
    /// 1. `[writable]` Config PDA
    /// 2. `[writable]` Position PDA
    /// 3. `[]` Collateral mint
    /// 4. `[writable]` Collateral vault
    /// 5. `[writable]` Owner collateral token account
    /// 6. `[]` Engine authority PDA
    /// 7. `[]` Token program
    /// 8.. `[]` Price feeds, in config order
    RedeemCollateral { amount: u64 },

    /// Burn synthetic tokens, reducing the caller's debt.
    /// Accounts:
    /// 0. `[signer]` Owner
    /// 1. `[writable]` Config PDA
    /// 2. `[writable]` Position PDA
    /// 3. `[writable]` Synthetic mint
    /// 4. `[writable]` Owner synthetic token account
    /// 5. `[]` Token program
    /// 6.. `[]` Price feeds, in config order
    BurnSynthetic { amount: u64 },

    /// Deposit collateral and mint synthetic tokens in one atomic unit.
    /// Accounts:
    /// 0. `[signer, writable]` Owner
    /// 1. `[writable]` Config PDA
    /// 2. `[writable]` Position PDA
    /// 3. `[]` Collateral mint
    /// 4. `[writable]` Owner collateral token account
    /// 5. `[writable]` Collateral vault
    /// 6. `[writable]` Synthetic mint
    /// 7. `[writable]` Owner synthetic token account
    /// 8. `[]` Engine authority PDA
    /// 9. `[]` Token program
    /// 10. `[]` System program
    /// 11.. `[]` Price feeds, in config order
    DepositCollateralAndMint { deposit_amount: u64, mint_amount: u64 },

    /// Burn synthetic tokens and withdraw collateral in one atomic unit.
    /// Accounts:
    /// 0. `[signer]` Owner
    /// 1. `[writable]` Config PDA
    /// 2. `[writable]` Position PDA
    /// 3. `[]` Collateral mint
    /// 4. `[writable]` Collateral vault
    /// 5. `[writable]` Owner collateral token account
    /// 6. `[writable]` Synthetic mint
    /// 7. `[writable]` Owner synthetic token account
    /// 8. `[]` Engine authority PDA
    /// 9. `[]` Token program
    /// 10.. `[]` Price feeds, in config order
    RedeemCollateralForBurn { redeem_amount: u64, burn_amount: u64 },

    /// Cover part of an undercollateralized position's debt with the
    /// caller's synthetic tokens and seize the equivalent collateral plus
    /// the liquidation bonus.
    /// Accounts:
    /// 0. `[signer]` Liquidator
    /// 1. `[writable]` Config PDA
    /// 2. `[]` Target owner
    /// 3. `[writable]` Target position PDA
    /// 4. `[]` Liquidator position PDA (may be an empty account)
    /// 5. `[]` Collateral mint to seize
    /// 6. `[writable]` Collateral vault
    /// 7. `[writable]` Liquidator collateral token account
    /// 8. `[writable]` Synthetic mint
    /// 9. `[writable]` Liquidator synthetic token account
    /// 10. `[]` Engine authority PDA
    /// 11. `[]` Token program
    /// 12.. `[]` Price feeds, in config order
    Liquidate { debt_to_cover: u64 },
}

impl EngineInstruction {
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (&variant, rest) = input
            .split_first()
            .ok_or(EngineError::InvalidInstruction)?;

        Ok(match variant {
            0 => {
                let payload = InitializeEnginePayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::InitializeEngine {
                    collateral_mints: payload.collateral_mints,
                    price_feeds: payload.price_feeds,
                }
            }
            1 => {
                let payload = AmountPayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::DepositCollateral {
                    amount: payload.amount,
                }
            }
            2 => {
                let payload = AmountPayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::MintSynthetic {
                    amount: payload.amount,
                }
            }
            3 => {
                let payload = AmountPayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::RedeemCollateral {
                    amount: payload.amount,
                }
            }
            4 => {
                let payload = AmountPayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::BurnSynthetic {
                    amount: payload.amount,
                }
            }
            5 => {
                let payload = DepositAndMintPayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::DepositCollateralAndMint {
                    deposit_amount: payload.deposit_amount,
                    mint_amount: payload.mint_amount,
                }
            }
            6 => {
                let payload = RedeemForBurnPayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::RedeemCollateralForBurn {
                    redeem_amount: payload.redeem_amount,
                    burn_amount: payload.burn_amount,
                }
            }
            7 => {
                let payload = LiquidatePayload::try_from_slice(rest)
                    .map_err(|_| EngineError::InvalidInstruction)?;
                Self::Liquidate {
                    debt_to_cover: payload.debt_to_cover,
                }
            }
            _ => return Err(EngineError::InvalidInstruction.into()),
        })
    }
}

// Payload structs mirroring the enum variants
#[derive(BorshSerialize, BorshDeserialize)]
struct InitializeEnginePayload {
    collateral_mints: Vec<Pubkey>,
    price_feeds: Vec<Pubkey>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct AmountPayload {
    amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct DepositAndMintPayload {
    deposit_amount: u64,
    mint_amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct RedeemForBurnPayload {
    redeem_amount: u64,
    burn_amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct LiquidatePayload {
    debt_to_cover: u64,
}

fn feed_metas(price_feeds: &[Pubkey]) -> impl Iterator<Item = AccountMeta> + '_ {
    price_feeds
        .iter()
        .map(|feed| AccountMeta::new_readonly(*feed, false))
}

// Helper functions to create instructions
#[allow(clippy::too_many_arguments)]
pub fn initialize_engine(
    program_id: &Pubkey,
    payer: &Pubkey,
    config: &Pubkey,
    engine_authority: &Pubkey,
    synthetic_mint: &Pubkey,
    collateral_mints: &[Pubkey],
    vaults: &[Pubkey],
    price_feeds: &[Pubkey],
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new(*config, false),
        AccountMeta::new_readonly(*engine_authority, false),
        AccountMeta::new_readonly(*synthetic_mint, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    for (mint, vault) in collateral_mints.iter().zip(vaults.iter()) {
        accounts.push(AccountMeta::new_readonly(*mint, false));
        accounts.push(AccountMeta::new_readonly(*vault, false));
    }

    let data = EngineInstruction::InitializeEngine {
        collateral_mints: collateral_mints.to_vec(),
        price_feeds: price_feeds.to_vec(),
    };

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&data).unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn deposit_collateral(
    program_id: &Pubkey,
    depositor: &Pubkey,
    config: &Pubkey,
    position: &Pubkey,
    collateral_mint: &Pubkey,
    depositor_token_account: &Pubkey,
    vault: &Pubkey,
    amount: u64,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new(*depositor, true),
        AccountMeta::new(*config, false),
        AccountMeta::new(*position, false),
        AccountMeta::new_readonly(*collateral_mint, false),
        AccountMeta::new(*depositor_token_account, false),
        AccountMeta::new(*vault, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::DepositCollateral { amount }).unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn mint_synthetic(
    program_id: &Pubkey,
    owner: &Pubkey,
    config: &Pubkey,
    position: &Pubkey,
    synthetic_mint: &Pubkey,
    owner_token_account: &Pubkey,
    engine_authority: &Pubkey,
    price_feeds: &[Pubkey],
    amount: u64,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*config, false),
        AccountMeta::new(*position, false),
        AccountMeta::new(*synthetic_mint, false),
        AccountMeta::new(*owner_token_account, false),
        AccountMeta::new_readonly(*engine_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_feeds));

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::MintSynthetic { amount }).unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn redeem_collateral(
    program_id: &Pubkey,
    owner: &Pubkey,
    config: &Pubkey,
    position: &Pubkey,
    collateral_mint: &Pubkey,
    vault: &Pubkey,
    owner_token_account: &Pubkey,
    engine_authority: &Pubkey,
    price_feeds: &[Pubkey],
    amount: u64,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*config, false),
        AccountMeta::new(*position, false),
        AccountMeta::new_readonly(*collateral_mint, false),
        AccountMeta::new(*vault, false),
        AccountMeta::new(*owner_token_account, false),
        AccountMeta::new_readonly(*engine_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_feeds));

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::RedeemCollateral { amount }).unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn burn_synthetic(
    program_id: &Pubkey,
    owner: &Pubkey,
    config: &Pubkey,
    position: &Pubkey,
    synthetic_mint: &Pubkey,
    owner_token_account: &Pubkey,
    price_feeds: &[Pubkey],
    amount: u64,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*config, false),
        AccountMeta::new(*position, false),
        AccountMeta::new(*synthetic_mint, false),
        AccountMeta::new(*owner_token_account, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_feeds));

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::BurnSynthetic { amount }).unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn deposit_collateral_and_mint(
    program_id: &Pubkey,
    owner: &Pubkey,
    config: &Pubkey,
    position: &Pubkey,
    collateral_mint: &Pubkey,
    owner_collateral_account: &Pubkey,
    vault: &Pubkey,
    synthetic_mint: &Pubkey,
    owner_synthetic_account: &Pubkey,
    engine_authority: &Pubkey,
    price_feeds: &[Pubkey],
    deposit_amount: u64,
    mint_amount: u64,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(*config, false),
        AccountMeta::new(*position, false),
        AccountMeta::new_readonly(*collateral_mint, false),
        AccountMeta::new(*owner_collateral_account, false),
        AccountMeta::new(*vault, false),
        AccountMeta::new(*synthetic_mint, false),
        AccountMeta::new(*owner_synthetic_account, false),
        AccountMeta::new_readonly(*engine_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    accounts.extend(feed_metas(price_feeds));

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::DepositCollateralAndMint {
            deposit_amount,
            mint_amount,
        })
        .unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn redeem_collateral_for_burn(
    program_id: &Pubkey,
    owner: &Pubkey,
    config: &Pubkey,
    position: &Pubkey,
    collateral_mint: &Pubkey,
    vault: &Pubkey,
    owner_collateral_account: &Pubkey,
    synthetic_mint: &Pubkey,
    owner_synthetic_account: &Pubkey,
    engine_authority: &Pubkey,
    price_feeds: &[Pubkey],
    redeem_amount: u64,
    burn_amount: u64,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*config, false),
        AccountMeta::new(*position, false),
        AccountMeta::new_readonly(*collateral_mint, false),
        AccountMeta::new(*vault, false),
        AccountMeta::new(*owner_collateral_account, false),
        AccountMeta::new(*synthetic_mint, false),
        AccountMeta::new(*owner_synthetic_account, false),
        AccountMeta::new_readonly(*engine_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_feeds));

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::RedeemCollateralForBurn {
            redeem_amount,
            burn_amount,
        })
        .unwrap(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn liquidate(
    program_id: &Pubkey,
    liquidator: &Pubkey,
    config: &Pubkey,
    target_owner: &Pubkey,
    target_position: &Pubkey,
    liquidator_position: &Pubkey,
    collateral_mint: &Pubkey,
    vault: &Pubkey,
    liquidator_collateral_account: &Pubkey,
    synthetic_mint: &Pubkey,
    liquidator_synthetic_account: &Pubkey,
    engine_authority: &Pubkey,
    price_feeds: &[Pubkey],
    debt_to_cover: u64,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*liquidator, true),
        AccountMeta::new(*config, false),
        AccountMeta::new_readonly(*target_owner, false),
        AccountMeta::new(*target_position, false),
        AccountMeta::new_readonly(*liquidator_position, false),
        AccountMeta::new_readonly(*collateral_mint, false),
        AccountMeta::new(*vault, false),
        AccountMeta::new(*liquidator_collateral_account, false),
        AccountMeta::new(*synthetic_mint, false),
        AccountMeta::new(*liquidator_synthetic_account, false),
        AccountMeta::new_readonly(*engine_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_feeds));

    Instruction {
        program_id: *program_id,
        accounts,
        data: borsh::to_vec(&EngineInstruction::Liquidate { debt_to_cover }).unwrap(),
    }
}
