//! # codedrop-relay
//!
//! Code-based rendezvous relay for codedrop.
//!
//! This crate implements a relay server that:
//! - Hands a sender a short code from a fixed space of 116,280
//! - Pairs the sender with the receiver who presents that code
//! - Forwards the sender's chunks to the receiver without looking at them
//! - Frees the code once the transfer ends, either side leaves, or it idles out
//!
//! ## Architecture
//!
//! ```text
//! Sender ──┐                          ┌── Receiver
//!          │     WebSocket (JSON)     │
//!          ├─────────────────────────►│
//!          │                          │
//!      ┌───┴──────────────────────────┴───┐
//!      │          codedrop-relay          │
//!      │  ┌────────────────────────────┐  │
//!      │  │ Pairing                    │  │
//!      │  │   SlotRegistry (codes)     │  │
//!      │  │   SessionIndex (conn→code) │  │
//!      │  └────────────────────────────┘  │
//!      │  Reaper (idle slots)             │
//!      └──────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Frames are `{"event": <name>, "data": <json>}` text messages:
//! - `request_slot` → `slot_answer` (sender gets a code)
//! - `request_from_slot` → `transmit_now` to the sender (receiver joins)
//! - `transmission` → forwarded verbatim to the receiver
//! - `got_all` → forwarded to the sender; the code is freed
//! - `servererror` (server → client, `no_slot` / `bad_slot` / `old_slot` ...)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod pairing;
pub mod protocol;
pub mod reaper;
pub mod registry;
pub mod server;
pub mod session;
pub mod sessions;
pub mod transport;
