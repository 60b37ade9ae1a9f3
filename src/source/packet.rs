//! Contains types implementing the Source RCON wire protocol described in
//! the [Valve developer wiki].
//!
//! [Valve developer wiki]: https://developer.valvesoftware.com/wiki/Source_RCON_Protocol

use std::io::{Read, Write};

use crate::{int::random_request_id, Error, SignedInt32Le};

/// The canonical two byte packet terminator.
pub const TERMINATOR: [u8; 2] = [0, 0];

/// Number of bytes the size field counts beyond the payload: id (4), kind
/// (4) and terminator (2).
const FIXED_LEN: i32 = 10;

const KIND_AUTH: i32 = 3;
const KIND_AUTH_RESPONSE: i32 = 2;
const KIND_EXEC_COMMAND: i32 = 2;
const KIND_RESPONSE_VALUE: i32 = 0;

/// The kind of a Source RCON packet.
///
/// `SERVERDATA_AUTH_RESPONSE` and `SERVERDATA_EXECCOMMAND` share the wire
/// value `2`; the protocol disambiguates them by the phase of the session,
/// not by the tag. Decoding therefore resolves `2` to
/// [`AuthResponse`](Self::AuthResponse) - the only kind a well behaved
/// server sends with that tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// `SERVERDATA_AUTH`: a client login request.
    Auth,
    /// `SERVERDATA_AUTH_RESPONSE`: the server's verdict on a login request.
    AuthResponse,
    /// `SERVERDATA_EXECCOMMAND`: a client command request.
    ExecCommand,
    /// `SERVERDATA_RESPONSE_VALUE`: a server command response.
    ResponseValue,
}

impl PacketKind {
    /// Returns the wire tag of this kind.
    pub fn wire_value(self) -> i32 {
        match self {
            Self::Auth => KIND_AUTH,
            Self::AuthResponse => KIND_AUTH_RESPONSE,
            Self::ExecCommand => KIND_EXEC_COMMAND,
            Self::ResponseValue => KIND_RESPONSE_VALUE,
        }
    }

    /// Resolves a wire tag read off the stream.
    pub fn from_wire(v: i32) -> Result<Self, Error> {
        match v {
            KIND_AUTH => Ok(Self::Auth),
            KIND_AUTH_RESPONSE => Ok(Self::AuthResponse),
            KIND_RESPONSE_VALUE => Ok(Self::ResponseValue),
            v => Err(Error::InvalidPacketKind(v)),
        }
    }
}

/// A Source RCON packet.
///
/// The wire layout is length-prefixed with every integer little-endian:
///
/// ```text
/// size:i32 | id:i32 | kind:i32 | payload:(size - 10) bytes | 0x00 0x00
/// ```
///
/// where `size` counts every byte after itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: SignedInt32Le,
    kind: PacketKind,
    payload: Vec<u8>,
    terminator: [u8; 2],
}

impl Packet {
    /// Constructs a new `Packet` with the canonical terminator.
    pub fn new(id: SignedInt32Le, kind: PacketKind, payload: Vec<u8>) -> Self {
        Self {
            id,
            kind,
            payload,
            terminator: TERMINATOR,
        }
    }

    /// Creates a command packet with a freshly drawn request id.
    ///
    /// The arguments are joined with single spaces and encoded as UTF-8.
    pub fn make_command<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let payload = args
            .into_iter()
            .map(|v| v.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(" ")
            .into_bytes();

        Self::new(random_request_id(), PacketKind::ExecCommand, payload)
    }

    /// Creates a login packet with a freshly drawn request id.
    pub fn make_login(passwd: &str) -> Self {
        Self::new(
            random_request_id(),
            PacketKind::Auth,
            passwd.as_bytes().to_vec(),
        )
    }

    /// The request id correlating this packet to its request.
    ///
    /// The server reserves `-1` to signal authentication failure; ids drawn
    /// by [`random_request_id`](crate::random_request_id) never collide with
    /// it.
    pub fn id(&self) -> SignedInt32Le {
        self.id
    }

    /// The kind tag of this packet.
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Returns a reference to the payload bytes.
    ///
    /// The payload is typically ASCII or UTF-8 text but the protocol does
    /// not enforce an encoding.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// The two terminator bytes as received.
    ///
    /// Canonically `00 00`; decoding accepts (and warns on) anything else.
    pub fn terminator(&self) -> [u8; 2] {
        self.terminator
    }

    /// Serialises this `Packet` into `buf`, prefixed with its size.
    ///
    /// Fails with [`Error::OutOfRange`] if the payload is too large for the
    /// signed 32-bit size field.
    pub fn serialise_into<W: Write>(&self, buf: &mut W) -> Result<(), Error> {
        let size = SignedInt32Le::new(self.payload.len() as i64 + i64::from(FIXED_LEN))?;

        size.serialise_into(buf)?;
        self.id.serialise_into(buf)?;
        SignedInt32Le::from(self.kind.wire_value()).serialise_into(buf)?;
        buf.write_all(&self.payload)?;
        buf.write_all(&self.terminator)?;

        Ok(())
    }

    /// Serialises this `Packet` into a new [`Vec`] sized exactly to contain
    /// it.
    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(self.serialised_len());
        self.serialise_into(&mut buf)?;
        Ok(buf)
    }

    /// Returns the on-wire length of this packet once serialised, including
    /// the size prefix.
    pub fn serialised_len(&self) -> usize {
        4 + FIXED_LEN as usize + self.payload.len()
    }

    /// Reads one packet off `r`.
    ///
    /// A declared size of zero fails with [`Error::EmptyResponse`]; a size
    /// smaller than the fixed fields fails with [`Error::InvalidFrameSize`].
    /// A non-canonical terminator is kept after logging a warning.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, Error> {
        let size = SignedInt32Le::read_from(r)?.get();
        if size == 0 {
            return Err(Error::EmptyResponse);
        }
        if size < FIXED_LEN {
            return Err(Error::InvalidFrameSize(size));
        }

        let id = SignedInt32Le::read_from(r)?;
        let kind = PacketKind::from_wire(SignedInt32Le::read_from(r)?.get())?;

        // Sized by the declared length, but grown as bytes actually arrive
        // so a corrupt size field cannot force a huge allocation up front.
        let len = (size - FIXED_LEN) as u64;
        let mut payload = Vec::new();
        if (&mut *r).take(len).read_to_end(&mut payload)? as u64 != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }

        let mut terminator = [0; 2];
        r.read_exact(&mut terminator)?;
        if terminator != TERMINATOR {
            log::warn!("unexpected packet terminator: {:02x?}", terminator);
        }

        Ok(Self {
            id,
            kind,
            payload,
            terminator,
        })
    }

    /// Reads one packet off `r`, suspending at each transport read.
    ///
    /// The contract is identical to [`read_from`](Self::read_from).
    #[cfg(feature = "tokio")]
    pub async fn read_from_async<R>(r: &mut R) -> Result<Self, Error>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;

        let size = r.read_i32_le().await?;
        if size == 0 {
            return Err(Error::EmptyResponse);
        }
        if size < FIXED_LEN {
            return Err(Error::InvalidFrameSize(size));
        }

        let id = SignedInt32Le::from(r.read_i32_le().await?);
        let kind = PacketKind::from_wire(r.read_i32_le().await?)?;

        // As in the blocking variant, grow the buffer as bytes arrive.
        let len = (size - FIXED_LEN) as u64;
        let mut payload = Vec::new();
        if (&mut *r).take(len).read_to_end(&mut payload).await? as u64 != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }

        let mut terminator = [0; 2];
        r.read_exact(&mut terminator).await?;
        if terminator != TERMINATOR {
            log::warn!("unexpected packet terminator: {:02x?}", terminator);
        }

        Ok(Self {
            id,
            kind,
            payload,
            terminator,
        })
    }

    /// Concatenates `other` onto this packet.
    ///
    /// Defined only for packets sharing a request id - the result keeps this
    /// packet's id, kind and terminator with the payloads joined. Mixing ids
    /// is a protocol violation and fails with [`Error::SessionTimeout`].
    pub fn concat(mut self, other: Packet) -> Result<Self, Error> {
        if other.id != self.id {
            return Err(Error::SessionTimeout {
                sent: self.id.get(),
                received: other.id.get(),
            });
        }

        self.payload.extend_from_slice(&other.payload);
        Ok(self)
    }
}

/// The outcome of feeding one packet to a [`Reassembler`].
#[derive(Debug)]
pub enum Reassembly {
    /// The packet extended (or seeded) the partial response; more may
    /// follow.
    Partial,
    /// The packet's id diverged from the partial response, completing it.
    Complete {
        /// The fully reassembled response.
        response: Packet,
        /// The divergent packet that terminated reassembly, kept for the
        /// next processing step.
        divergent: Packet,
    },
}

/// Reassembles a fragmented multi-packet response.
///
/// A server may split one reply into several `ResponseValue` packets
/// sharing the request id, with no explicit end marker. The reassembler
/// concatenates same-id packets and completes on the first packet whose id
/// diverges. Feeding a single packet and calling
/// [`finish`](Reassembler::finish) yields that packet unchanged.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: Option<Packet>,
}

impl Reassembler {
    /// Creates an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet to the reassembler.
    pub fn push(&mut self, packet: Packet) -> Reassembly {
        match self.partial.take() {
            None => {
                self.partial = Some(packet);
                Reassembly::Partial
            }
            Some(mut partial) if partial.id == packet.id => {
                partial.payload.extend_from_slice(&packet.payload);
                self.partial = Some(partial);
                Reassembly::Partial
            }
            Some(partial) => Reassembly::Complete {
                response: partial,
                divergent: packet,
            },
        }
    }

    /// Returns the partial response accumulated so far, if any.
    pub fn finish(self) -> Option<Packet> {
        self.partial
    }
}
