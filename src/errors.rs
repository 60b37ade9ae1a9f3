use thiserror::Error;

/// Error types returned by this crate.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The server rejected the provided password.
    ///
    /// A Source server signals this with the reserved request id `-1` in the
    /// `SERVERDATA_AUTH_RESPONSE` packet; a BattlEye server sets the success
    /// byte of the login response to `0`.
    #[error("authentication rejected by server")]
    WrongPassword,

    /// A Source reply carried a request id differing from the id of the
    /// request it answers.
    ///
    /// This happens when the server has discarded the session, typically
    /// after an idle timeout. Re-authenticating and retrying with a freshly
    /// drawn request id is the caller's responsibility.
    #[error("session timed out (sent request id {sent}, received {received})")]
    SessionTimeout {
        /// The request id sent to the server.
        sent: i32,

        /// The request id the server answered with.
        received: i32,
    },

    /// A Source frame declared a size of zero.
    ///
    /// Raising this rather than returning an empty payload lets callers
    /// distinguish a dropped session from a genuinely empty reply.
    #[error("empty response frame")]
    EmptyResponse,

    /// A Source frame declared a size too small to contain the fixed id,
    /// kind and terminator fields.
    #[error("invalid frame size {0}")]
    InvalidFrameSize(i32),

    /// The packet kind tag is not one the protocol defines.
    #[error("invalid packet kind {0}")]
    InvalidPacketKind(i32),

    /// A BattlEye datagram does not start with the `BE` prefix, or the byte
    /// separating the checksum from the type is not `0xFF`.
    #[error("malformed battleye header")]
    InvalidHeader,

    /// The CRC-32 in a BattlEye header does not match the checksum computed
    /// over the received payload.
    ///
    /// The checksum is recomputed little-endian only; no further parsing is
    /// attempted on a mismatch.
    #[error("crc mismatch (header {header:#010x}, computed {computed:#010x})")]
    CrcMismatch {
        /// The checksum carried in the header.
        header: u32,

        /// The checksum computed over the received bytes.
        computed: u32,
    },

    /// A BattlEye datagram is shorter than its fixed 8 byte header, or its
    /// payload is missing a required field.
    #[error("incomplete datagram (got {0} bytes)")]
    IncompleteDatagram(usize),

    /// A value cannot be represented as a signed 32-bit integer.
    ///
    /// Signals an internal programming error or a corrupt stream, e.g. a
    /// payload too large for the frame size field.
    #[error("signed int32 out of bounds: {0}")]
    OutOfRange(i64),

    /// A server reference string or configuration section is malformed.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred on the transport.
    ///
    /// Connection-refused and timed-out conditions surface here with the
    /// corresponding [`std::io::ErrorKind`].
    #[error("i/o error ({0:?}): {1}")]
    IOError(std::io::ErrorKind, String),
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::IOError(v.kind(), v.to_string())
    }
}

impl Error {
    /// Returns `true` if this error is a receive timeout on the transport.
    ///
    /// Platforms report an expired socket read timeout as either
    /// [`WouldBlock`](std::io::ErrorKind::WouldBlock) (POSIX) or
    /// [`TimedOut`](std::io::ErrorKind::TimedOut) (Windows).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::IOError(std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut, _)
        )
    }
}
