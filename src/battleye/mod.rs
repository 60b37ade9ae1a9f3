//! The BattlEye RCon protocol: datagram codec and session client.
//!
//! BattlEye RCon runs over UDP. Every datagram starts with a fixed header
//! carrying a CRC-32 over its payload; command replies are reassembled by
//! sequence number, and unsolicited server messages must be acknowledged.

mod client;
mod packet;

pub use client::{Client, MessageHandler};
pub use packet::{
    CommandRequest, CommandResponse, Header, LoginRequest, LoginResponse, Response, ServerMessage,
    ServerMessageAck, HEADER_LEN,
};
