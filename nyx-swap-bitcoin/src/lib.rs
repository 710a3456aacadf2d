//! Bitcoin Second-Side Driver for Nyx Atomic Swaps.
//!
//! This crate implements the `nyx-swap` [`SecondSide`](nyx_swap::SecondSide)
//! contract for Bitcoin. It owns the hash-time-locked contract script, the
//! lock / refund / redeem sub-transaction pipelines, lock-height negotiation
//! between the two chains, and the asynchronous bridge to a Bitcoin full
//! node.
//!
//! # How a swap proceeds
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    BITCOIN SWAP SIDE FLOW                            │
//! │                                                                      │
//! │  1. Initialize                                                       │
//! │     └─ swap keypair from the node wallet, secret (owner side)       │
//! │                                                                      │
//! │  2. Negotiate lock height                                            │
//! │     └─ owner proposes, counterparty validates against its own tip   │
//! │                                                                      │
//! │  3. Lock pipeline                                                    │
//! │     └─ create → fund → sign → broadcast → confirm (P2SH output)     │
//! │                                                                      │
//! │  4. Withdraw pipeline                                                │
//! │     └─ redeem (secret revealed) or refund (lock height passed)      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All progress is persisted to the swap session store before every node
//! round-trip, so a restarted wallet resumes mid-pipeline without ever
//! broadcasting the same sub-transaction twice.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bridge;
pub mod contract;
pub mod fees;
pub mod rpc;
pub mod settings;
pub mod side;
pub mod timelock;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bridge::{BridgeError, BridgeTxIn, NodeBridge, TxOutInfo};
pub use contract::{ContractParams, ParsedContract, WithdrawBranch};
pub use rpc::{CoreRpcBridge, RpcConfig};
pub use settings::{Network, SettingsProvider, StaticSettings, SwapSettings};
pub use side::BitcoinSide;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockNodeBridge;

/// Outputs at or below this value are unrelayable dust.
pub const DUST_THRESHOLD: u64 = 546;

/// Conservative virtual size, in vbytes, of a withdraw spending the P2SH
/// lock output to a single destination. The contract input carries a
/// signature, a pubkey, an optional 32-byte secret and the full redeem
/// script, which keeps the worst case well under this bound.
pub const WITHDRAW_TX_AVERAGE_VSIZE: u64 = 360;

/// Default confirmation threshold for the lock output.
pub const DEFAULT_TX_MIN_CONFIRMATIONS: u16 = 6;

/// Default safety margin, in Bitcoin blocks, added on top of the translated
/// response window when proposing a lock height.
pub const DEFAULT_LOCK_TIME_IN_BLOCKS: u32 = 12;

/// Fixed block-time ratio between the chains: Nyx targets 60-second blocks
/// against Bitcoin's 600 seconds.
pub const NATIVE_BLOCKS_PER_BITCOIN_BLOCK: u64 = 10;

/// Estimated time to build, broadcast and propagate the lock transaction,
/// in native-chain blocks.
pub const LOCK_TX_ESTIMATED_TIME_IN_NATIVE_BLOCKS: u64 = 10;

/// Slack, in Bitcoin blocks, allowed above the computed upper bound when
/// validating a counterparty's proposed lock height.
pub const LOCK_TIME_TOLERANCE_IN_BLOCKS: u64 = 6;
