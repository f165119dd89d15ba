use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    program_option::COption,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};
use spl_token::state::{Account as TokenAccount, Mint};

use crate::{
    engine,
    error::EngineError,
    instructions::EngineInstruction,
    oracle,
    state::{
        find_config_address, find_engine_authority_address, find_position_address,
        CollateralConfig, EngineConfig, Position, AUTHORITY_SEED, CONFIG_SEED,
        MAX_COLLATERAL_ASSETS, POSITION_SEED,
    },
};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    let instruction = EngineInstruction::unpack(instruction_data)?;

    match instruction {
        EngineInstruction::InitializeEngine {
            collateral_mints,
            price_feeds,
        } => {
            msg!("Instruction: InitializeEngine");
            process_initialize_engine(program_id, accounts, collateral_mints, price_feeds)
        }

        EngineInstruction::DepositCollateral { amount } => {
            msg!("Instruction: DepositCollateral");
            process_deposit_collateral(program_id, accounts, amount)
        }

        EngineInstruction::MintSynthetic { amount } => {
            msg!("Instruction: MintSynthetic");
            process_mint_synthetic(program_id, accounts, amount)
        }

        EngineInstruction::RedeemCollateral { amount } => {
            msg!("Instruction: RedeemCollateral");
            process_redeem_collateral(program_id, accounts, amount)
        }

        EngineInstruction::BurnSynthetic { amount } => {
            msg!("Instruction: BurnSynthetic");
            process_burn_synthetic(program_id, accounts, amount)
        }

        EngineInstruction::DepositCollateralAndMint {
            deposit_amount,
            mint_amount,
        } => {
            msg!("Instruction: DepositCollateralAndMint");
            process_deposit_collateral_and_mint(program_id, accounts, deposit_amount, mint_amount)
        }

        EngineInstruction::RedeemCollateralForBurn {
            redeem_amount,
            burn_amount,
        } => {
            msg!("Instruction: RedeemCollateralForBurn");
            process_redeem_collateral_for_burn(program_id, accounts, redeem_amount, burn_amount)
        }

        EngineInstruction::Liquidate { debt_to_cover } => {
            msg!("Instruction: Liquidate");
            process_liquidate(program_id, accounts, debt_to_cover)
        }
    }
}

/// Initialize the engine configuration with its fixed collateral set
fn process_initialize_engine(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mints: Vec<Pubkey>,
    price_feeds: Vec<Pubkey>,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let payer_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let authority_info = next_account_info(account_info_iter)?;
    let synthetic_mint_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    if !payer_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    // The two lists must describe the same assets, in the same order
    if collateral_mints.len() != price_feeds.len() || collateral_mints.is_empty() {
        return Err(EngineError::ConfigurationMismatch.into());
    }
    if collateral_mints.len() > MAX_COLLATERAL_ASSETS {
        return Err(EngineError::TooManyCollateralAssets.into());
    }

    let (config_key, config_bump) = find_config_address(program_id);
    if config_key != *config_info.key {
        return Err(ProgramError::InvalidSeeds);
    }
    if !config_info.data_is_empty() {
        return Err(EngineError::AccountAlreadyInitialized.into());
    }

    let (authority_key, authority_bump) = find_engine_authority_address(program_id);
    if authority_key != *authority_info.key {
        return Err(ProgramError::InvalidSeeds);
    }

    // The engine must hold sole mint authority over the synthetic token
    if synthetic_mint_info.owner != &spl_token::id() {
        return Err(EngineError::InvalidSyntheticMint.into());
    }
    let synthetic_mint = Mint::unpack(&synthetic_mint_info.data.borrow())
        .map_err(|_| EngineError::InvalidSyntheticMint)?;
    if synthetic_mint.mint_authority != COption::Some(authority_key) {
        return Err(EngineError::InvalidSyntheticMint.into());
    }
    if synthetic_mint.decimals > 18 {
        return Err(EngineError::UnsupportedMintDecimals.into());
    }

    let mut collaterals = Vec::with_capacity(collateral_mints.len());
    for (index, mint_key) in collateral_mints.iter().enumerate() {
        let mint_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;

        if mint_info.key != mint_key {
            return Err(EngineError::ConfigurationMismatch.into());
        }
        if collateral_mints[..index].contains(mint_key) {
            return Err(EngineError::ConfigurationMismatch.into());
        }
        // Every approved asset carries a feed reference
        if price_feeds[index] == Pubkey::default() {
            return Err(EngineError::ConfigurationMismatch.into());
        }

        if mint_info.owner != &spl_token::id() {
            return Err(ProgramError::IncorrectProgramId);
        }
        let mint = Mint::unpack(&mint_info.data.borrow())?;
        if mint.decimals > 18 {
            return Err(EngineError::UnsupportedMintDecimals.into());
        }

        if vault_info.owner != &spl_token::id() {
            return Err(ProgramError::IncorrectProgramId);
        }
        let vault = TokenAccount::unpack(&vault_info.data.borrow())?;
        if vault.mint != *mint_key || vault.owner != authority_key {
            return Err(EngineError::InvalidVaultAccount.into());
        }

        collaterals.push(CollateralConfig {
            mint: *mint_key,
            price_feed: price_feeds[index],
            vault: *vault_info.key,
            decimals: mint.decimals,
        });
    }

    // Create the config account
    let rent = Rent::get()?;
    invoke_signed(
        &system_instruction::create_account(
            payer_info.key,
            config_info.key,
            rent.minimum_balance(EngineConfig::LEN),
            EngineConfig::LEN as u64,
            program_id,
        ),
        &[
            payer_info.clone(),
            config_info.clone(),
            system_program_info.clone(),
        ],
        &[&[CONFIG_SEED, &[config_bump]]],
    )?;

    let config = EngineConfig::new(
        config_bump,
        authority_bump,
        *synthetic_mint_info.key,
        synthetic_mint.decimals,
        collaterals,
    );
    config.pack(&mut config_info.data.borrow_mut()[..])?;

    msg!(
        "Engine initialized with {} collateral assets",
        config.collaterals.len()
    );

    Ok(())
}

/// Deposit collateral into the caller's position
fn process_deposit_collateral(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let depositor_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let mint_info = next_account_info(account_info_iter)?;
    let source_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    if !depositor_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if amount == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    let index = config.asset_index(mint_info.key)?;
    let collateral = config.collaterals[index];
    if *vault_info.key != collateral.vault {
        return Err(EngineError::InvalidVaultAccount.into());
    }

    let mut position = load_or_create_position(
        program_id,
        position_info,
        depositor_info,
        depositor_info,
        system_program_info,
    )?;

    position.add_collateral(index, amount)?;
    transfer_collateral_in(
        token_program_info,
        source_info,
        mint_info,
        vault_info,
        depositor_info,
        amount,
        collateral.decimals,
    )?;
    position.pack(&mut position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!(
        "Deposited {} of {} for {}",
        amount,
        mint_info.key,
        depositor_info.key
    );

    Ok(())
}

/// Mint synthetic tokens against the caller's collateral
fn process_mint_synthetic(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let owner_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let synthetic_mint_info = next_account_info(account_info_iter)?;
    let destination_info = next_account_info(account_info_iter)?;
    let authority_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let feed_infos: Vec<AccountInfo> = account_info_iter.cloned().collect();

    if !owner_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if amount == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    check_synthetic_mint(&config, synthetic_mint_info)?;
    check_engine_authority(program_id, authority_info)?;

    let mut position = load_position(program_id, position_info, owner_info.key)?;

    // Take the debt first, then prove the position still holds up
    position.add_debt(amount)?;
    let now = Clock::get()?.unix_timestamp;
    let prices = collect_scaled_prices(&config, &feed_infos, now)?;
    assert_solvent(&config, &position, &prices)?;

    mint_synthetic_to(
        token_program_info,
        synthetic_mint_info,
        destination_info,
        authority_info,
        config.authority_bump,
        amount,
    )?;
    position.pack(&mut position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!("Minted {} synthetic for {}", amount, owner_info.key);

    Ok(())
}

/// Withdraw collateral from the caller's position
fn process_redeem_collateral(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let owner_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let mint_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;
    let destination_info = next_account_info(account_info_iter)?;
    let authority_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let feed_infos: Vec<AccountInfo> = account_info_iter.cloned().collect();

    if !owner_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if amount == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    let index = config.asset_index(mint_info.key)?;
    let collateral = config.collaterals[index];
    if *vault_info.key != collateral.vault {
        return Err(EngineError::InvalidVaultAccount.into());
    }
    check_engine_authority(program_id, authority_info)?;

    let mut position = load_position(program_id, position_info, owner_info.key)?;

    position.remove_collateral(index, amount)?;
    transfer_collateral_out(
        token_program_info,
        vault_info,
        mint_info,
        destination_info,
        authority_info,
        config.authority_bump,
        amount,
        collateral.decimals,
    )?;

    let now = Clock::get()?.unix_timestamp;
    let prices = collect_scaled_prices(&config, &feed_infos, now)?;
    assert_solvent(&config, &position, &prices)?;

    position.pack(&mut position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!(
        "Redeemed {} of {} for {}",
        amount,
        mint_info.key,
        owner_info.key
    );

    Ok(())
}

/// Burn synthetic tokens, reducing the caller's debt
fn process_burn_synthetic(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let owner_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let synthetic_mint_info = next_account_info(account_info_iter)?;
    let source_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let feed_infos: Vec<AccountInfo> = account_info_iter.cloned().collect();

    if !owner_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if amount == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    check_synthetic_mint(&config, synthetic_mint_info)?;

    let mut position = load_position(program_id, position_info, owner_info.key)?;

    position.remove_debt(amount)?;
    burn_synthetic_from(
        token_program_info,
        source_info,
        synthetic_mint_info,
        owner_info,
        amount,
    )?;

    // Burning debt cannot worsen the ratio; checked for symmetry with the
    // other transitions
    let now = Clock::get()?.unix_timestamp;
    let prices = collect_scaled_prices(&config, &feed_infos, now)?;
    assert_solvent(&config, &position, &prices)?;

    position.pack(&mut position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!("Burned {} synthetic for {}", amount, owner_info.key);

    Ok(())
}

/// Deposit collateral and mint synthetic tokens as one atomic unit
fn process_deposit_collateral_and_mint(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    deposit_amount: u64,
    mint_amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let owner_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let mint_info = next_account_info(account_info_iter)?;
    let source_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;
    let synthetic_mint_info = next_account_info(account_info_iter)?;
    let destination_info = next_account_info(account_info_iter)?;
    let authority_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;
    let feed_infos: Vec<AccountInfo> = account_info_iter.cloned().collect();

    if !owner_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if deposit_amount == 0 || mint_amount == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    let index = config.asset_index(mint_info.key)?;
    let collateral = config.collaterals[index];
    if *vault_info.key != collateral.vault {
        return Err(EngineError::InvalidVaultAccount.into());
    }
    check_synthetic_mint(&config, synthetic_mint_info)?;
    check_engine_authority(program_id, authority_info)?;

    let mut position = load_or_create_position(
        program_id,
        position_info,
        owner_info,
        owner_info,
        system_program_info,
    )?;

    position.add_collateral(index, deposit_amount)?;
    transfer_collateral_in(
        token_program_info,
        source_info,
        mint_info,
        vault_info,
        owner_info,
        deposit_amount,
        collateral.decimals,
    )?;

    position.add_debt(mint_amount)?;
    let now = Clock::get()?.unix_timestamp;
    let prices = collect_scaled_prices(&config, &feed_infos, now)?;
    assert_solvent(&config, &position, &prices)?;

    mint_synthetic_to(
        token_program_info,
        synthetic_mint_info,
        destination_info,
        authority_info,
        config.authority_bump,
        mint_amount,
    )?;
    position.pack(&mut position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!(
        "Deposited {} of {} and minted {} for {}",
        deposit_amount,
        mint_info.key,
        mint_amount,
        owner_info.key
    );

    Ok(())
}

/// Burn synthetic tokens and withdraw collateral as one atomic unit
fn process_redeem_collateral_for_burn(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    redeem_amount: u64,
    burn_amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let owner_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let mint_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;
    let destination_info = next_account_info(account_info_iter)?;
    let synthetic_mint_info = next_account_info(account_info_iter)?;
    let synthetic_source_info = next_account_info(account_info_iter)?;
    let authority_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let feed_infos: Vec<AccountInfo> = account_info_iter.cloned().collect();

    if !owner_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if redeem_amount == 0 || burn_amount == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    let index = config.asset_index(mint_info.key)?;
    let collateral = config.collaterals[index];
    if *vault_info.key != collateral.vault {
        return Err(EngineError::InvalidVaultAccount.into());
    }
    check_synthetic_mint(&config, synthetic_mint_info)?;
    check_engine_authority(program_id, authority_info)?;

    let mut position = load_position(program_id, position_info, owner_info.key)?;

    // Retire debt before releasing the collateral backing it
    position.remove_debt(burn_amount)?;
    burn_synthetic_from(
        token_program_info,
        synthetic_source_info,
        synthetic_mint_info,
        owner_info,
        burn_amount,
    )?;

    position.remove_collateral(index, redeem_amount)?;
    transfer_collateral_out(
        token_program_info,
        vault_info,
        mint_info,
        destination_info,
        authority_info,
        config.authority_bump,
        redeem_amount,
        collateral.decimals,
    )?;

    let now = Clock::get()?.unix_timestamp;
    let prices = collect_scaled_prices(&config, &feed_infos, now)?;
    assert_solvent(&config, &position, &prices)?;

    position.pack(&mut position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!(
        "Burned {} synthetic and redeemed {} of {} for {}",
        burn_amount,
        redeem_amount,
        mint_info.key,
        owner_info.key
    );

    Ok(())
}

/// Liquidate an undercollateralized position.
///
/// Known limitation, kept deliberately: when aggregate collateral value
/// falls to 100% of outstanding debt or lower, the seizure (covered value
/// plus bonus) can exceed what the target holds and the decrement fails,
/// leaving such positions unliquidatable until prices recover.
fn process_liquidate(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    debt_to_cover: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let liquidator_info = next_account_info(account_info_iter)?;
    let config_info = next_account_info(account_info_iter)?;
    let target_owner_info = next_account_info(account_info_iter)?;
    let target_position_info = next_account_info(account_info_iter)?;
    let liquidator_position_info = next_account_info(account_info_iter)?;
    let mint_info = next_account_info(account_info_iter)?;
    let vault_info = next_account_info(account_info_iter)?;
    let collateral_destination_info = next_account_info(account_info_iter)?;
    let synthetic_mint_info = next_account_info(account_info_iter)?;
    let synthetic_source_info = next_account_info(account_info_iter)?;
    let authority_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let feed_infos: Vec<AccountInfo> = account_info_iter.cloned().collect();

    if !liquidator_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut config = load_config(program_id, config_info)?;
    acquire_guard(&mut config, config_info)?;

    if debt_to_cover == 0 {
        return Err(EngineError::InvalidAmount.into());
    }
    let index = config.asset_index(mint_info.key)?;
    let collateral = config.collaterals[index];
    if *vault_info.key != collateral.vault {
        return Err(EngineError::InvalidVaultAccount.into());
    }
    check_synthetic_mint(&config, synthetic_mint_info)?;
    check_engine_authority(program_id, authority_info)?;

    let mut target = load_position(program_id, target_position_info, target_owner_info.key)?;

    let now = Clock::get()?.unix_timestamp;
    let prices = collect_scaled_prices(&config, &feed_infos, now)?;

    let starting_health = engine::account_health_factor(&config, &target, &prices)?;
    if engine::is_solvent(starting_health) {
        return Err(EngineError::PositionAlreadyHealthy.into());
    }

    // Seize the collateral equivalent of the covered debt, plus the bonus
    let covered_value = engine::to_reference_units(debt_to_cover, config.synthetic_decimals)?;
    let (base_quantity, bonus_quantity, total_seized) =
        engine::seize_amounts(prices[index], covered_value, collateral.decimals)?;

    target.remove_collateral(index, total_seized)?;
    transfer_collateral_out(
        token_program_info,
        vault_info,
        mint_info,
        collateral_destination_info,
        authority_info,
        config.authority_bump,
        total_seized,
        collateral.decimals,
    )?;

    // The liquidator pays down the target's debt out of its own tokens
    target.remove_debt(debt_to_cover)?;
    burn_synthetic_from(
        token_program_info,
        synthetic_source_info,
        synthetic_mint_info,
        liquidator_info,
        debt_to_cover,
    )?;

    let ending_health = engine::account_health_factor(&config, &target, &prices)?;
    if ending_health <= starting_health {
        return Err(EngineError::LiquidationIneffective.into());
    }

    // The liquidation must not sink the liquidator's own position
    if liquidator_info.key == target_owner_info.key {
        assert_solvent(&config, &target, &prices)?;
    } else {
        let (expected_position, _) = find_position_address(program_id, liquidator_info.key);
        if expected_position != *liquidator_position_info.key {
            return Err(ProgramError::InvalidSeeds);
        }
        if liquidator_position_info.owner == program_id
            && !liquidator_position_info.data_is_empty()
        {
            let liquidator_position =
                Position::unpack(&liquidator_position_info.data.borrow())?;
            assert_solvent(&config, &liquidator_position, &prices)?;
        }
    }

    target.pack(&mut target_position_info.data.borrow_mut()[..])?;

    release_guard(&mut config, config_info)?;

    msg!(
        "Liquidated {}: covered {} debt, seized {} + {} bonus of {}",
        target_owner_info.key,
        debt_to_cover,
        base_quantity,
        bonus_quantity,
        mint_info.key
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// Shared plumbing

fn load_config(
    program_id: &Pubkey,
    config_info: &AccountInfo,
) -> Result<EngineConfig, ProgramError> {
    if config_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    EngineConfig::unpack(&config_info.data.borrow())
}

/// Set the in-flight flag and persist it before anything else happens, so
/// a nested invocation reading the config observes it.
fn acquire_guard(config: &mut EngineConfig, config_info: &AccountInfo) -> ProgramResult {
    if config.locked {
        return Err(EngineError::ReentrantCall.into());
    }
    config.locked = true;
    config.pack(&mut config_info.data.borrow_mut()[..])
}

fn release_guard(config: &mut EngineConfig, config_info: &AccountInfo) -> ProgramResult {
    config.locked = false;
    config.pack(&mut config_info.data.borrow_mut()[..])
}

fn load_position(
    program_id: &Pubkey,
    position_info: &AccountInfo,
    owner: &Pubkey,
) -> Result<Position, ProgramError> {
    let (expected, _) = find_position_address(program_id, owner);
    if expected != *position_info.key {
        return Err(ProgramError::InvalidSeeds);
    }
    if position_info.owner != program_id || position_info.data_is_empty() {
        return Err(EngineError::AccountNotInitialized.into());
    }
    let position = Position::unpack(&position_info.data.borrow())?;
    if position.owner != *owner {
        return Err(EngineError::InvalidAuthority.into());
    }
    Ok(position)
}

fn load_or_create_position<'a>(
    program_id: &Pubkey,
    position_info: &AccountInfo<'a>,
    owner_info: &AccountInfo<'a>,
    payer_info: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
) -> Result<Position, ProgramError> {
    let (expected, bump) = find_position_address(program_id, owner_info.key);
    if expected != *position_info.key {
        return Err(ProgramError::InvalidSeeds);
    }
    if position_info.data_is_empty() {
        let rent = Rent::get()?;
        invoke_signed(
            &system_instruction::create_account(
                payer_info.key,
                position_info.key,
                rent.minimum_balance(Position::LEN),
                Position::LEN as u64,
                program_id,
            ),
            &[
                payer_info.clone(),
                position_info.clone(),
                system_program_info.clone(),
            ],
            &[&[POSITION_SEED, owner_info.key.as_ref(), &[bump]]],
        )?;
        Ok(Position::new(*owner_info.key, bump))
    } else {
        load_position(program_id, position_info, owner_info.key)
    }
}

fn check_synthetic_mint(config: &EngineConfig, mint_info: &AccountInfo) -> ProgramResult {
    if *mint_info.key != config.synthetic_mint {
        return Err(EngineError::InvalidSyntheticMint.into());
    }
    Ok(())
}

fn check_engine_authority(program_id: &Pubkey, authority_info: &AccountInfo) -> ProgramResult {
    let (expected, _) = find_engine_authority_address(program_id);
    if expected != *authority_info.key {
        return Err(ProgramError::InvalidSeeds);
    }
    Ok(())
}

/// Read every price feed in config order. A missing, mismatched, stale or
/// non-positive feed fails the whole operation.
fn collect_scaled_prices(
    config: &EngineConfig,
    feed_infos: &[AccountInfo],
    now: i64,
) -> Result<Vec<u128>, ProgramError> {
    if feed_infos.len() < config.collaterals.len() {
        return Err(ProgramError::NotEnoughAccountKeys);
    }
    config
        .collaterals
        .iter()
        .zip(feed_infos.iter())
        .map(|(collateral, feed_info)| {
            oracle::read_scaled_price(feed_info, &collateral.price_feed, now)
        })
        .collect()
}

fn assert_solvent(
    config: &EngineConfig,
    position: &Position,
    prices: &[u128],
) -> Result<u128, ProgramError> {
    let health = engine::account_health_factor(config, position, prices)?;
    if !engine::is_solvent(health) {
        return Err(EngineError::InsufficientCollateral.into());
    }
    Ok(health)
}

// ---------------------------------------------------------------------------
// Token CPIs

fn transfer_collateral_in<'a>(
    token_program_info: &AccountInfo<'a>,
    source_info: &AccountInfo<'a>,
    mint_info: &AccountInfo<'a>,
    vault_info: &AccountInfo<'a>,
    owner_info: &AccountInfo<'a>,
    amount: u64,
    decimals: u8,
) -> ProgramResult {
    let instruction = spl_token::instruction::transfer_checked(
        token_program_info.key,
        source_info.key,
        mint_info.key,
        vault_info.key,
        owner_info.key,
        &[],
        amount,
        decimals,
    )?;
    invoke(
        &instruction,
        &[
            source_info.clone(),
            mint_info.clone(),
            vault_info.clone(),
            owner_info.clone(),
            token_program_info.clone(),
        ],
    )
    .map_err(|_| EngineError::TransferFailed.into())
}

#[allow(clippy::too_many_arguments)]
fn transfer_collateral_out<'a>(
    token_program_info: &AccountInfo<'a>,
    vault_info: &AccountInfo<'a>,
    mint_info: &AccountInfo<'a>,
    destination_info: &AccountInfo<'a>,
    authority_info: &AccountInfo<'a>,
    authority_bump: u8,
    amount: u64,
    decimals: u8,
) -> ProgramResult {
    let instruction = spl_token::instruction::transfer_checked(
        token_program_info.key,
        vault_info.key,
        mint_info.key,
        destination_info.key,
        authority_info.key,
        &[],
        amount,
        decimals,
    )?;
    invoke_signed(
        &instruction,
        &[
            vault_info.clone(),
            mint_info.clone(),
            destination_info.clone(),
            authority_info.clone(),
            token_program_info.clone(),
        ],
        &[&[AUTHORITY_SEED, &[authority_bump]]],
    )
    .map_err(|_| EngineError::TransferFailed.into())
}

fn mint_synthetic_to<'a>(
    token_program_info: &AccountInfo<'a>,
    mint_info: &AccountInfo<'a>,
    destination_info: &AccountInfo<'a>,
    authority_info: &AccountInfo<'a>,
    authority_bump: u8,
    amount: u64,
) -> ProgramResult {
    let instruction = spl_token::instruction::mint_to(
        token_program_info.key,
        mint_info.key,
        destination_info.key,
        authority_info.key,
        &[],
        amount,
    )?;
    invoke_signed(
        &instruction,
        &[
            mint_info.clone(),
            destination_info.clone(),
            authority_info.clone(),
            token_program_info.clone(),
        ],
        &[&[AUTHORITY_SEED, &[authority_bump]]],
    )
    .map_err(|_| EngineError::TransferFailed.into())
}

fn burn_synthetic_from<'a>(
    token_program_info: &AccountInfo<'a>,
    source_info: &AccountInfo<'a>,
    mint_info: &AccountInfo<'a>,
    owner_info: &AccountInfo<'a>,
    amount: u64,
) -> ProgramResult {
    let instruction = spl_token::instruction::burn(
        token_program_info.key,
        source_info.key,
        mint_info.key,
        owner_info.key,
        &[],
        amount,
    )?;
    invoke(
        &instruction,
        &[
            source_info.clone(),
            mint_info.clone(),
            owner_info.clone(),
            token_program_info.clone(),
        ],
    )
    .map_err(|_| EngineError::TransferFailed.into())
}
