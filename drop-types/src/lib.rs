//! # drop-types
//!
//! Rendezvous codes and wire events for the codedrop relay.
//!
//! This crate provides the foundational types shared by the relay and its clients:
//! - [`Code`], [`ALPHABET`], [`generate_all`] - The 4-symbol code space
//! - [`ConnId`] - Opaque identity of one live client link
//! - [`Inbound`], [`Outbound`], [`Payload`] - Protocol events
//! - [`Frame`] - JSON text framing of events
//! - [`DropError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod code;
mod conn;
mod error;
mod events;
mod frame;

pub use code::{generate_all, Code, CodeError, ALPHABET, CODE_LEN, CODE_SPACE_SIZE};
pub use conn::ConnId;
pub use error::DropError;
pub use events::{Inbound, Outbound, Payload};
pub use frame::Frame;
