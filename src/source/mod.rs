//! The Source RCON protocol: packet codec and session clients.
//!
//! Source RCON runs over a single reliable byte stream. Requests carry a
//! random non-negative id the server echoes in its replies; the reserved id
//! `-1` signals a failed login.

mod client;
mod packet;

pub use client::Client;
pub use packet::{Packet, PacketKind, Reassembler, Reassembly, TERMINATOR};

#[cfg(feature = "tokio")]
pub mod tokio;
