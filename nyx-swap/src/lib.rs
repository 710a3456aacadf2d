//! Chain-Agnostic Atomic-Swap Layer for Nyx.
//!
//! This crate defines the contract between the Nyx wallet's swap transaction
//! engine and the driver for the *second side* of an atomic swap — the
//! external chain on which the counter-asset is locked, refunded, or
//! redeemed. It carries no chain-specific logic; concrete drivers (such as
//! `nyx-swap-bitcoin`) implement the [`SecondSide`] trait against the types
//! defined here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      NYX SWAP LAYER                                  │
//! │                                                                      │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │ SWAP ENGINE (host)                                             │  │
//! │  │  - Owns the swap session parameter store                       │  │
//! │  │  - Ticks the second-side driver                                │  │
//! │  │  - Exchanges wire parameters with the counterparty             │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! │                            │                                         │
//! │           ┌────────────────┼────────────────┐                       │
//! │           ▼                ▼                ▼                       │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐                 │
//! │  │  Bitcoin    │  │  Litecoin   │  │    ...      │                 │
//! │  │  SecondSide │  │  SecondSide │  │  SecondSide │                 │
//! │  └─────────────┘  └─────────────┘  └─────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every state transition of a driver is a function of the session store
//! alone, so replaying a persisted store after a crash reproduces the same
//! state.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod errors;
pub mod params;
pub mod session;
pub mod side;
pub mod state;

pub use errors::{FailureReason, Result, SwapError};
pub use params::{OutgoingParams, ParameterId, ParameterValue};
pub use session::{PersistedSubTx, SwapSession, SwapSessionId, SwapSessionParams};
pub use side::SecondSide;
pub use state::{SubTxId, SubTxRecord, SwapTxState};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::errors::{FailureReason, Result, SwapError};
    pub use crate::params::{OutgoingParams, ParameterId, ParameterValue};
    pub use crate::session::{SwapSession, SwapSessionId, SwapSessionParams};
    pub use crate::side::SecondSide;
    pub use crate::state::{SubTxId, SubTxRecord, SwapTxState};
}
