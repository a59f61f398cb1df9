#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Core
//!
//! Identifier types shared by every caravan crate.
//!
//! - [`AccountId`], [`RouteId`], [`ActionId`] — strongly-typed UUID
//!   identifiers for the three persisted entities
//! - [`NetworkKey`] — normalized, validated identifier for a logical
//!   upstream network (used to key the endpoint directory)

pub mod id;
pub mod network;

pub use id::{AccountId, ActionId, RouteId};
pub use network::{NetworkKey, NetworkKeyError};
