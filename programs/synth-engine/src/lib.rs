// Overcollateralized synthetic asset issuance engine
// Native Solana implementation - NO ANCHOR

pub mod engine;
pub mod error;
pub mod instructions;
pub mod oracle;
pub mod processor;
pub mod state;

#[cfg(not(feature = "no-entrypoint"))]
use processor::process_instruction;

// Declare program ID
solana_program::declare_id!("SynthEng11111111111111111111111111111111111");

#[cfg(not(feature = "no-entrypoint"))]
solana_program::entrypoint!(process_instruction);
