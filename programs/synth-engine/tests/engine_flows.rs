use borsh::BorshSerialize;
use solana_program::{program_pack::Pack, pubkey::Pubkey, system_instruction};
use solana_program_test::{processor, BanksClientError, ProgramTest, ProgramTestContext};
use solana_sdk::{
    account::{Account, AccountSharedData},
    clock::Clock,
    instruction::InstructionError,
    signature::{Keypair, Signer},
    transaction::{Transaction, TransactionError},
};
use spl_token::state::{Account as TokenAccount, Mint};

use synth_engine::{
    error::EngineError,
    instructions,
    oracle::{PriceFeed, PRICE_FEED_DECIMALS, PRICE_STALENESS_THRESHOLD},
    state::{
        find_config_address, find_engine_authority_address, find_position_address, EngineConfig,
        Position,
    },
};

const DECIMALS: u8 = 9;
const UNIT: u64 = 1_000_000_000;

// feed prices carry 8 decimals
const PRICE_2000: i64 = 2_000 * 100_000_000;
const PRICE_1000: i64 = 1_000 * 100_000_000;

struct TestEngine {
    program_id: Pubkey,
    config: Pubkey,
    authority: Pubkey,
    synthetic_mint: Pubkey,
    collateral_mint: Pubkey,
    vault: Pubkey,
    feed: Pubkey,
}

struct TestUser {
    keypair: Keypair,
    position: Pubkey,
    collateral_account: Pubkey,
    synthetic_account: Pubkey,
}

async fn start() -> (ProgramTestContext, TestEngine) {
    let program_id = Pubkey::new_unique();
    let program_test = ProgramTest::new(
        "synth_engine",
        program_id,
        processor!(synth_engine::processor::process_instruction),
    );
    let mut context = program_test.start_with_context().await;

    let (config, _) = find_config_address(&program_id);
    let (authority, _) = find_engine_authority_address(&program_id);

    let synthetic_mint = create_mint(&mut context, &authority).await;
    let payer_key = context.payer.pubkey();
    let collateral_mint = create_mint(&mut context, &payer_key).await;
    let vault = create_token_account(&mut context, &collateral_mint, &authority).await;

    let feed = Pubkey::new_unique();
    set_feed(&mut context, &feed, PRICE_2000, 0).await;

    let init_ix = instructions::initialize_engine(
        &program_id,
        &payer_key,
        &config,
        &authority,
        &synthetic_mint,
        &[collateral_mint],
        &[vault],
        &[feed],
    );
    send(&mut context, &[init_ix], &[]).await.unwrap();

    (
        context,
        TestEngine {
            program_id,
            config,
            authority,
            synthetic_mint,
            collateral_mint,
            vault,
            feed,
        },
    )
}

async fn new_user(
    context: &mut ProgramTestContext,
    engine: &TestEngine,
    collateral_units: u64,
) -> TestUser {
    let keypair = Keypair::new();
    let payer_key = context.payer.pubkey();
    let fund_ix = system_instruction::transfer(&payer_key, &keypair.pubkey(), 1_000_000_000);
    send(context, &[fund_ix], &[]).await.unwrap();

    let collateral_account =
        create_token_account(context, &engine.collateral_mint, &keypair.pubkey()).await;
    let synthetic_account =
        create_token_account(context, &engine.synthetic_mint, &keypair.pubkey()).await;

    if collateral_units > 0 {
        let mint_ix = spl_token::instruction::mint_to(
            &spl_token::id(),
            &engine.collateral_mint,
            &collateral_account,
            &payer_key,
            &[],
            collateral_units,
        )
        .unwrap();
        send(context, &[mint_ix], &[]).await.unwrap();
    }

    let (position, _) = find_position_address(&engine.program_id, &keypair.pubkey());
    TestUser {
        keypair,
        position,
        collateral_account,
        synthetic_account,
    }
}

async fn create_mint(context: &mut ProgramTestContext, authority: &Pubkey) -> Pubkey {
    let mint = Keypair::new();
    let rent = context.banks_client.get_rent().await.unwrap();
    let payer_key = context.payer.pubkey();
    let instructions = [
        system_instruction::create_account(
            &payer_key,
            &mint.pubkey(),
            rent.minimum_balance(Mint::LEN),
            Mint::LEN as u64,
            &spl_token::id(),
        ),
        spl_token::instruction::initialize_mint(
            &spl_token::id(),
            &mint.pubkey(),
            authority,
            None,
            DECIMALS,
        )
        .unwrap(),
    ];
    send(context, &instructions, &[&mint]).await.unwrap();
    mint.pubkey()
}

async fn create_token_account(
    context: &mut ProgramTestContext,
    mint: &Pubkey,
    owner: &Pubkey,
) -> Pubkey {
    let account = Keypair::new();
    let rent = context.banks_client.get_rent().await.unwrap();
    let payer_key = context.payer.pubkey();
    let instructions = [
        system_instruction::create_account(
            &payer_key,
            &account.pubkey(),
            rent.minimum_balance(TokenAccount::LEN),
            TokenAccount::LEN as u64,
            &spl_token::id(),
        ),
        spl_token::instruction::initialize_account3(
            &spl_token::id(),
            &account.pubkey(),
            mint,
            owner,
        )
        .unwrap(),
    ];
    send(context, &instructions, &[&account]).await.unwrap();
    account.pubkey()
}

/// Write a price feed account, `age` seconds in the past.
async fn set_feed(context: &mut ProgramTestContext, feed: &Pubkey, price: i64, age: i64) {
    let clock: Clock = context.banks_client.get_sysvar().await.unwrap();
    let data = PriceFeed {
        price,
        decimals: PRICE_FEED_DECIMALS,
        publish_time: clock.unix_timestamp - age,
    }
    .try_to_vec()
    .unwrap();
    let account = Account {
        lamports: 1_000_000_000,
        data,
        owner: Pubkey::new_unique(),
        executable: false,
        rent_epoch: 0,
    };
    context.set_account(feed, &AccountSharedData::from(account));
}

async fn send(
    context: &mut ProgramTestContext,
    instructions: &[solana_program::instruction::Instruction],
    extra_signers: &[&Keypair],
) -> Result<(), BanksClientError> {
    let blockhash = context.get_new_latest_blockhash().await.unwrap();
    let mut signers = vec![&context.payer];
    signers.extend_from_slice(extra_signers);
    let transaction = Transaction::new_signed_with_payer(
        instructions,
        Some(&context.payer.pubkey()),
        &signers,
        blockhash,
    );
    context.banks_client.process_transaction(transaction).await
}

async fn deposit(
    context: &mut ProgramTestContext,
    engine: &TestEngine,
    user: &TestUser,
    amount: u64,
) -> Result<(), BanksClientError> {
    let ix = instructions::deposit_collateral(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.collateral_mint,
        &user.collateral_account,
        &engine.vault,
        amount,
    );
    send(context, &[ix], &[&user.keypair]).await
}

async fn mint_synthetic(
    context: &mut ProgramTestContext,
    engine: &TestEngine,
    user: &TestUser,
    amount: u64,
) -> Result<(), BanksClientError> {
    let ix = instructions::mint_synthetic(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.synthetic_mint,
        &user.synthetic_account,
        &engine.authority,
        &[engine.feed],
        amount,
    );
    send(context, &[ix], &[&user.keypair]).await
}

async fn token_balance(context: &mut ProgramTestContext, account: &Pubkey) -> u64 {
    let account = context
        .banks_client
        .get_account(*account)
        .await
        .unwrap()
        .unwrap();
    TokenAccount::unpack(&account.data).unwrap().amount
}

async fn read_position(context: &mut ProgramTestContext, position: &Pubkey) -> Position {
    let account = context
        .banks_client
        .get_account(*position)
        .await
        .unwrap()
        .unwrap();
    Position::unpack(&account.data).unwrap()
}

fn assert_engine_error(result: Result<(), BanksClientError>, expected: EngineError) {
    match result {
        Err(BanksClientError::TransactionError(TransactionError::InstructionError(
            _,
            InstructionError::Custom(code),
        ))) => assert_eq!(code, expected as u32, "expected {:?}", expected),
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}

#[tokio::test]
async fn initialize_engine_records_collateral_set() {
    let (mut context, engine) = start().await;

    let account = context
        .banks_client
        .get_account(engine.config)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.owner, engine.program_id);

    let config = EngineConfig::unpack(&account.data).unwrap();
    assert!(!config.locked);
    assert_eq!(config.synthetic_mint, engine.synthetic_mint);
    assert_eq!(config.synthetic_decimals, DECIMALS);
    assert_eq!(config.collateral_tokens(), vec![engine.collateral_mint]);
    assert_eq!(
        config.price_feed(&engine.collateral_mint).unwrap(),
        engine.feed
    );
    assert_eq!(config.collaterals[0].vault, engine.vault);
}

#[tokio::test]
async fn initialize_engine_rejects_list_length_mismatch() {
    let program_id = Pubkey::new_unique();
    let program_test = ProgramTest::new(
        "synth_engine",
        program_id,
        processor!(synth_engine::processor::process_instruction),
    );
    let mut context = program_test.start_with_context().await;

    let (config, _) = find_config_address(&program_id);
    let (authority, _) = find_engine_authority_address(&program_id);
    let synthetic_mint = create_mint(&mut context, &authority).await;
    let payer_key = context.payer.pubkey();
    let collateral_mint = create_mint(&mut context, &payer_key).await;
    let vault = create_token_account(&mut context, &collateral_mint, &authority).await;

    // one collateral mint but two feed references
    let init_ix = instructions::initialize_engine(
        &program_id,
        &payer_key,
        &config,
        &authority,
        &synthetic_mint,
        &[collateral_mint],
        &[vault],
        &[Pubkey::new_unique(), Pubkey::new_unique()],
    );
    let result = send(&mut context, &[init_ix], &[]).await;
    assert_engine_error(result, EngineError::ConfigurationMismatch);
}

#[tokio::test]
async fn deposit_and_mint_update_ledgers_and_balances() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 100 * UNIT).await;

    deposit(&mut context, &engine, &user, 10 * UNIT).await.unwrap();

    assert_eq!(token_balance(&mut context, &engine.vault).await, 10 * UNIT);
    assert_eq!(
        token_balance(&mut context, &user.collateral_account).await,
        90 * UNIT
    );
    let position = read_position(&mut context, &user.position).await;
    assert_eq!(position.owner, user.keypair.pubkey());
    assert_eq!(position.collateral_balance(0), 10 * UNIT);
    assert_eq!(position.debt_minted, 0);

    // $20,000 of collateral supports an $8,000 mint
    mint_synthetic(&mut context, &engine, &user, 8_000 * UNIT)
        .await
        .unwrap();

    assert_eq!(
        token_balance(&mut context, &user.synthetic_account).await,
        8_000 * UNIT
    );
    let position = read_position(&mut context, &user.position).await;
    assert_eq!(position.debt_minted, 8_000 * UNIT);
}

#[tokio::test]
async fn deposit_rejects_zero_amount_and_unapproved_asset() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 10 * UNIT).await;

    assert_engine_error(
        deposit(&mut context, &engine, &user, 0).await,
        EngineError::InvalidAmount,
    );

    // an asset outside the approved set is rejected outright
    let payer_key = context.payer.pubkey();
    let rogue_mint = create_mint(&mut context, &payer_key).await;
    let rogue_account =
        create_token_account(&mut context, &rogue_mint, &user.keypair.pubkey()).await;
    let ix = instructions::deposit_collateral(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &rogue_mint,
        &rogue_account,
        &engine.vault,
        UNIT,
    );
    let result = send(&mut context, &[ix], &[&user.keypair]).await;
    assert_engine_error(result, EngineError::UnapprovedAsset);
}

#[tokio::test]
async fn mint_boundary_is_exact() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 10 * UNIT).await;
    deposit(&mut context, &engine, &user, 10 * UNIT).await.unwrap();

    // $20,000 collateral counts as $10,000: one base unit above fails
    assert_engine_error(
        mint_synthetic(&mut context, &engine, &user, 10_000 * UNIT + 1).await,
        EngineError::InsufficientCollateral,
    );

    // minting to a health factor of exactly 1.0 succeeds
    mint_synthetic(&mut context, &engine, &user, 10_000 * UNIT)
        .await
        .unwrap();
    let position = read_position(&mut context, &user.position).await;
    assert_eq!(position.debt_minted, 10_000 * UNIT);
}

#[tokio::test]
async fn redeem_and_burn_round_trip() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 10 * UNIT).await;
    deposit(&mut context, &engine, &user, 10 * UNIT).await.unwrap();
    mint_synthetic(&mut context, &engine, &user, 4_000 * UNIT)
        .await
        .unwrap();

    // redeeming most of the backing while debt is outstanding must fail
    let ix = instructions::redeem_collateral(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.collateral_mint,
        &engine.vault,
        &user.collateral_account,
        &engine.authority,
        &[engine.feed],
        8 * UNIT,
    );
    let result = send(&mut context, &[ix], &[&user.keypair]).await;
    assert_engine_error(result, EngineError::InsufficientCollateral);

    // burn the debt, then the collateral is free
    let ix = instructions::burn_synthetic(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.synthetic_mint,
        &user.synthetic_account,
        &[engine.feed],
        4_000 * UNIT,
    );
    send(&mut context, &[ix], &[&user.keypair]).await.unwrap();

    let ix = instructions::redeem_collateral(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.collateral_mint,
        &engine.vault,
        &user.collateral_account,
        &engine.authority,
        &[engine.feed],
        10 * UNIT,
    );
    send(&mut context, &[ix], &[&user.keypair]).await.unwrap();

    let position = read_position(&mut context, &user.position).await;
    assert_eq!(position.debt_minted, 0);
    assert_eq!(position.collateral_balance(0), 0);
    assert_eq!(
        token_balance(&mut context, &user.collateral_account).await,
        10 * UNIT
    );
    assert_eq!(
        token_balance(&mut context, &user.synthetic_account).await,
        0
    );
}

#[tokio::test]
async fn combined_operations_are_atomic() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 10 * UNIT).await;

    // an overdrawn mint fails the whole combined operation
    let ix = instructions::deposit_collateral_and_mint(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.collateral_mint,
        &user.collateral_account,
        &engine.vault,
        &engine.synthetic_mint,
        &user.synthetic_account,
        &engine.authority,
        &[engine.feed],
        10 * UNIT,
        10_001 * UNIT,
    );
    let result = send(&mut context, &[ix], &[&user.keypair]).await;
    assert_engine_error(result, EngineError::InsufficientCollateral);
    assert_eq!(token_balance(&mut context, &engine.vault).await, 0);
    assert_eq!(
        token_balance(&mut context, &user.collateral_account).await,
        10 * UNIT
    );

    let ix = instructions::deposit_collateral_and_mint(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.collateral_mint,
        &user.collateral_account,
        &engine.vault,
        &engine.synthetic_mint,
        &user.synthetic_account,
        &engine.authority,
        &[engine.feed],
        10 * UNIT,
        6_000 * UNIT,
    );
    send(&mut context, &[ix], &[&user.keypair]).await.unwrap();
    let position = read_position(&mut context, &user.position).await;
    assert_eq!(position.collateral_balance(0), 10 * UNIT);
    assert_eq!(position.debt_minted, 6_000 * UNIT);

    let ix = instructions::redeem_collateral_for_burn(
        &engine.program_id,
        &user.keypair.pubkey(),
        &engine.config,
        &user.position,
        &engine.collateral_mint,
        &engine.vault,
        &user.collateral_account,
        &engine.synthetic_mint,
        &user.synthetic_account,
        &engine.authority,
        &[engine.feed],
        10 * UNIT,
        6_000 * UNIT,
    );
    send(&mut context, &[ix], &[&user.keypair]).await.unwrap();
    let position = read_position(&mut context, &user.position).await;
    assert_eq!(position.collateral_balance(0), 0);
    assert_eq!(position.debt_minted, 0);
}

#[tokio::test]
async fn liquidation_after_price_crash() {
    let (mut context, engine) = start().await;

    let target = new_user(&mut context, &engine, 10 * UNIT).await;
    deposit(&mut context, &engine, &target, 10 * UNIT)
        .await
        .unwrap();
    mint_synthetic(&mut context, &engine, &target, 8_000 * UNIT)
        .await
        .unwrap();

    // a healthy position cannot be liquidated
    let liquidator = new_user(&mut context, &engine, 50 * UNIT).await;
    deposit(&mut context, &engine, &liquidator, 50 * UNIT)
        .await
        .unwrap();
    mint_synthetic(&mut context, &engine, &liquidator, 8_000 * UNIT)
        .await
        .unwrap();

    let liquidate_ix = |debt_to_cover: u64| {
        instructions::liquidate(
            &engine.program_id,
            &liquidator.keypair.pubkey(),
            &engine.config,
            &target.keypair.pubkey(),
            &target.position,
            &liquidator.position,
            &engine.collateral_mint,
            &engine.vault,
            &liquidator.collateral_account,
            &engine.synthetic_mint,
            &liquidator.synthetic_account,
            &engine.authority,
            &[engine.feed],
            debt_to_cover,
        )
    };

    let result = send(&mut context, &[liquidate_ix(8_000 * UNIT)], &[&liquidator.keypair]).await;
    assert_engine_error(result, EngineError::PositionAlreadyHealthy);

    // price halves; the target's health factor falls to 0.625
    set_feed(&mut context, &engine.feed, PRICE_1000, 0).await;

    send(&mut context, &[liquidate_ix(8_000 * UNIT)], &[&liquidator.keypair])
        .await
        .unwrap();

    // covering $8,000 at $1,000/unit seizes 8 units plus a 0.8 unit bonus
    assert_eq!(
        token_balance(&mut context, &liquidator.collateral_account).await,
        8_800_000_000
    );
    assert_eq!(
        token_balance(&mut context, &liquidator.synthetic_account).await,
        0
    );

    let target_position = read_position(&mut context, &target.position).await;
    assert_eq!(target_position.debt_minted, 0);
    assert_eq!(target_position.collateral_balance(0), 1_200_000_000);

    // the liquidator's own debt is untouched
    let liquidator_position = read_position(&mut context, &liquidator.position).await;
    assert_eq!(liquidator_position.debt_minted, 8_000 * UNIT);
}

#[tokio::test]
async fn stale_price_fails_the_operation() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 10 * UNIT).await;
    deposit(&mut context, &engine, &user, 10 * UNIT).await.unwrap();

    set_feed(
        &mut context,
        &engine.feed,
        PRICE_2000,
        PRICE_STALENESS_THRESHOLD + 10,
    )
    .await;
    assert_engine_error(
        mint_synthetic(&mut context, &engine, &user, UNIT).await,
        EngineError::StaleOraclePrice,
    );

    // a zero price is a hard fault, not a default
    set_feed(&mut context, &engine.feed, 0, 0).await;
    assert_engine_error(
        mint_synthetic(&mut context, &engine, &user, UNIT).await,
        EngineError::InvalidOraclePrice,
    );
}

#[tokio::test]
async fn in_flight_flag_rejects_nested_operations() {
    let (mut context, engine) = start().await;
    let user = new_user(&mut context, &engine, 10 * UNIT).await;

    // simulate an operation left in flight
    let account = context
        .banks_client
        .get_account(engine.config)
        .await
        .unwrap()
        .unwrap();
    let mut config = EngineConfig::unpack(&account.data).unwrap();
    config.locked = true;
    let mut data = vec![0u8; EngineConfig::LEN];
    config.pack(&mut data).unwrap();
    context.set_account(
        &engine.config,
        &AccountSharedData::from(Account {
            lamports: account.lamports,
            data,
            owner: account.owner,
            executable: false,
            rent_epoch: 0,
        }),
    );

    assert_engine_error(
        deposit(&mut context, &engine, &user, UNIT).await,
        EngineError::ReentrantCall,
    );
}
