//! procwatch daemon: a live process table with per-process memory tracking
//!
//! - [`table`] keeps an identity-stable set of [`record::ProcessRecord`]s in
//!   sync with the OS on every refresh tick.
//! - [`monitor`] and [`registry`] run one cancellable background poll per
//!   tracked process, each with a bounded memory history.
//! - [`service`] ties both to the user actions exposed over [`socket`].

pub mod collector;
pub mod config;
pub mod details;
pub mod error;
pub mod executor;
pub mod filter;
pub mod monitor;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod service;
pub mod socket;
pub mod table;
