//! Perun channel backend for substrate chains running the Perun pallet.
//!
//! [PerunClient] connects to a chain through a [substrate::ChainClient] and
//! hands out the [pallet::Funder] and [pallet::Adjudicator] that implement
//! the [channel] interfaces on-chain.

pub mod scale {
    mod hashing;

    pub mod types;

    pub use hashing::{to_hash, Keccak256Writer};
}

pub mod backend;
pub mod channel;
mod client;
pub mod config;
pub mod pallet;
pub mod substrate;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use client::PerunClient;
pub use config::Config;
pub use scale::types;
