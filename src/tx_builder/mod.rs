//! Staged transaction builder
//!
//! This module turns a sequence of high-level stage calls into a balanced,
//! fee-correct, redeemer-indexed Conway transaction ready for signing.
//!
//! ## Architecture
//!
//! The builder is split into focused modules:
//! - **errors**: error taxonomy with classes for retry decisions
//! - **context**: session state ([`BuilderContext`]) and the immutable
//!   snapshot handed to deferred programs
//! - **intent**: deferred programs and the mutations they return
//! - **stages**: read, collect, pay, mint, interval and signer stages
//! - **certificates**: staking, delegation, governance and withdrawals
//! - **redeemer**: redeemer specs and their resolution to `(tag, index)`
//! - **coin_selection**: wallet input and collateral selection
//! - **fee**: min-ADA sizing and the fee fixed point
//! - **complete**: the completion engine
//! - **sign**: signature collection and submission
//! - **output**: chained-build results
//! - **builder**: the [`TxBuilder`] facade
//!
//! ## Session lifecycle
//!
//! A [`TxBuilder`] is single-use. Stage calls enqueue deferred programs;
//! [`TxBuilder::complete`] drains them concurrently, applies their
//! mutations in enqueue order and hands the draft to the completion engine:
//!
//! ```text
//! Draining -> Balancing -> FeeConverging -> Evaluating -> Finalized
//! ```
//!
//! Any failure along the way yields no transaction. The result is a
//! [`TxSignBuilder`] whose body is frozen; signing only adds witnesses.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cardano_tx::{Address, Assets, CardanoClient, Config, Emulator, EmulatorAccount, KeyWallet, Network};
//! use std::sync::Arc;
//!
//! # async fn example(receiver: Address) -> anyhow::Result<()> {
//! let key = "0707070707070707070707070707070707070707070707070707070707070707";
//! let probe = Arc::new(Emulator::new(vec![]));
//! let wallet_address = KeyWallet::from_private_key(key, Network::Custom, probe)?.payment_address();
//!
//! let emulator = Arc::new(Emulator::new(vec![EmulatorAccount::new(
//!     wallet_address,
//!     Assets::from_lovelace(100_000_000),
//! )]));
//! let config = Config {
//!     network: Network::Custom,
//!     slot_config: Some(emulator.slot_config()),
//!     ..Config::default()
//! };
//! let client = CardanoClient::new(emulator.clone(), config).await?;
//! client.select_wallet_from_private_key(key)?;
//!
//! let signed = client
//!     .new_tx()
//!     .pay_to_address(receiver, Assets::from_lovelace(5_000_000))
//!     .complete()
//!     .await?
//!     .sign_with_wallet()
//!     .await?
//!     .complete()?;
//! let tx_hash = signed.submit().await?;
//! emulator.await_block(1);
//! # let _ = tx_hash;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod certificates;
pub mod coin_selection;
pub mod complete;
pub mod context;
pub mod errors;
pub mod fee;
pub mod intent;
pub mod output;
pub mod redeemer;
pub mod sign;
pub mod stages;

pub use builder::TxBuilder;
pub use complete::CompleteOptions;
pub use context::{AttachedScript, BuilderContext, ContextSnapshot, ScriptSource, SessionConfig, TxDraft};
pub use errors::{ErrorClass, SignError, SubmitError, TxBuilderError};
pub use fee::{ensure_min_ada, fill_min_ada, min_ada_for};
pub use intent::{drain, Mutation, Program, ProgramResult};
pub use output::{derive_outputs, ChainResult};
pub use redeemer::{RedeemerBuilder, RedeemerSpec};
pub use sign::{TxSignBuilder, TxSigned};
pub use stages::{OutputData, OutputDatum};
