//! lanpeer-core — shared types, wire codec, and local network identity.
//! All other lanpeer crates depend on this one.

pub mod config;
pub mod identity;
pub mod netinfo;
pub mod wire;

pub use identity::{LocalIdentity, PeerId};
pub use wire::{AnnounceMessage, DISCOVER_PORT};
