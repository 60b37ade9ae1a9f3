//! Contains types implementing the BattlEye RCon wire protocol described in
//! the [BattlEye spec].
//!
//! [BattlEye spec]: https://www.battleye.com/downloads/BERConProtocol.txt

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::Error;

/// The two byte datagram prefix.
const PREFIX: [u8; 2] = *b"BE";

/// The byte separating the checksum from the type tag, included in the
/// checksummed bytes.
const INFIX: u8 = 0xff;

/// Wire size of the fixed [`Header`].
pub const HEADER_LEN: usize = 8;

const KIND_LOGIN: u8 = 0x00;
const KIND_COMMAND: u8 = 0x01;
const KIND_MESSAGE: u8 = 0x02;

/// Computes the datagram checksum: a CRC-32 (IEEE 802.3 / zlib polynomial)
/// over `0xFF || kind || payload`.
fn checksum(kind: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[INFIX, kind]);
    hasher.update(payload);
    hasher.finalize()
}

pub(crate) fn build_datagram(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    Header::new(checksum(kind, payload), kind).serialise_into(&mut buf);
    buf.put_slice(payload);
    buf.to_vec()
}

/// The fixed 8 byte header prefixing every BattlEye datagram:
///
/// ```text
/// 'B' 'E' | crc32:u32le | 0xFF | kind:u8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    crc32: u32,
    kind: u8,
}

impl Header {
    /// Constructs a `Header` from its raw fields.
    pub fn new(crc32: u32, kind: u8) -> Self {
        Self { crc32, kind }
    }

    /// Computes the header for a payload of the given kind.
    pub fn from_payload(kind: u8, payload: &[u8]) -> Self {
        Self::new(checksum(kind, payload), kind)
    }

    /// The checksum carried in this header.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// The type tag of the datagram this header prefixes.
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Serialises this `Header` into `buf`.
    pub fn serialise_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&PREFIX);
        buf.put_u32_le(self.crc32);
        buf.put_u8(INFIX);
        buf.put_u8(self.kind);
    }

    /// Decodes a `Header` from the first [`HEADER_LEN`] bytes of `data`.
    ///
    /// Rejects a wrong prefix or infix byte before anything else is looked
    /// at; the checksum itself is validated against the payload in
    /// [`Response::from_datagram`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < HEADER_LEN {
            return Err(Error::IncompleteDatagram(data.len()));
        }
        if data[..2] != PREFIX || data[6] != INFIX {
            return Err(Error::InvalidHeader);
        }

        let crc32 = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
        Ok(Self::new(crc32, data[7]))
    }
}

/// A login request carrying the server password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    passwd: String,
}

impl LoginRequest {
    /// Constructs a login request for `passwd`.
    pub fn new(passwd: impl Into<String>) -> Self {
        Self {
            passwd: passwd.into(),
        }
    }

    /// Serialises this request into a datagram.
    pub fn to_datagram(&self) -> Vec<u8> {
        build_datagram(KIND_LOGIN, self.passwd.as_bytes())
    }
}

/// A command request: one sequence byte followed by the command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    seq: u8,
    command: String,
}

impl CommandRequest {
    /// Constructs a fresh command request with sequence number `0`.
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_seq(0, command)
    }

    /// Constructs a command request re-using a server assigned sequence
    /// number.
    pub fn with_seq(seq: u8, command: impl Into<String>) -> Self {
        Self {
            seq,
            command: command.into(),
        }
    }

    /// Constructs a fresh command request joining `command` and `args` with
    /// single spaces.
    pub fn from_command<S: AsRef<str>>(command: &str, args: &[S]) -> Self {
        let mut text = command.to_owned();
        for arg in args {
            text.push(' ');
            text.push_str(arg.as_ref());
        }
        Self::new(text)
    }

    /// The sequence number of this request.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Serialises this request into a datagram.
    pub fn to_datagram(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.command.len());
        payload.push(self.seq);
        payload.extend_from_slice(self.command.as_bytes());
        build_datagram(KIND_COMMAND, &payload)
    }
}

/// An acknowledgement of a [`ServerMessage`], echoing its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerMessageAck {
    seq: u8,
}

impl ServerMessageAck {
    /// Constructs an acknowledgement for sequence number `seq`.
    pub fn new(seq: u8) -> Self {
        Self { seq }
    }

    /// Serialises this acknowledgement into a datagram.
    pub fn to_datagram(&self) -> Vec<u8> {
        build_datagram(KIND_MESSAGE, &[self.seq])
    }
}

/// The server's verdict on a login request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginResponse {
    success: bool,
}

impl LoginResponse {
    /// Returns `true` if the server accepted the password.
    pub fn success(&self) -> bool {
        self.success
    }
}

/// One fragment of a command reply.
///
/// A server may split one reply over multiple datagrams with distinct
/// sequence numbers; fragments sort by sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    seq: u8,
    payload: Vec<u8>,
}

impl CommandResponse {
    /// The sequence number of this fragment.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Returns a reference to the text bytes of this fragment.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the fragment, returning its text bytes.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// The fragment text, decoded lossily.
    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// An unsolicited notification from the server.
///
/// Every server message must be acknowledged with a [`ServerMessageAck`]
/// echoing its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    seq: u8,
    payload: Vec<u8>,
}

impl ServerMessage {
    /// The sequence number to acknowledge.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Returns a reference to the text bytes of this message.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The message text, decoded lossily.
    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// A decoded server-to-client datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The verdict on a login request.
    Login(LoginResponse),
    /// One fragment of a command reply.
    Command(CommandResponse),
    /// An unsolicited server notification.
    Message(ServerMessage),
}

impl Response {
    /// Decodes one datagram.
    ///
    /// The checksum must validate before any per-type parsing happens; a
    /// mismatch (recomputed little-endian) is a framing error.
    pub fn from_datagram(data: &[u8]) -> Result<Self, Error> {
        let header = Header::from_bytes(data)?;
        let payload = &data[HEADER_LEN..];

        let computed = checksum(header.kind(), payload);
        if computed != header.crc32() {
            return Err(Error::CrcMismatch {
                header: header.crc32(),
                computed,
            });
        }

        match header.kind() {
            KIND_LOGIN => {
                let success = *payload.first().ok_or(Error::IncompleteDatagram(data.len()))?;
                Ok(Self::Login(LoginResponse {
                    success: success != 0,
                }))
            }
            KIND_COMMAND => {
                let (&seq, text) = payload
                    .split_first()
                    .ok_or(Error::IncompleteDatagram(data.len()))?;
                Ok(Self::Command(CommandResponse {
                    seq,
                    payload: text.to_vec(),
                }))
            }
            KIND_MESSAGE => {
                let (&seq, text) = payload
                    .split_first()
                    .ok_or(Error::IncompleteDatagram(data.len()))?;
                Ok(Self::Message(ServerMessage {
                    seq,
                    payload: text.to_vec(),
                }))
            }
            v => Err(Error::InvalidPacketKind(i32::from(v))),
        }
    }
}
