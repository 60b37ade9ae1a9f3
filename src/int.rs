use std::{
    fmt,
    io::{Read, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;

use crate::Error;

/// A signed 32-bit integer serialised as 4 little-endian two's-complement
/// bytes.
///
/// Both RCON protocols express their integer fields this way. Construction
/// from a wider integer is range checked so a corrupt length computation
/// surfaces as [`Error::OutOfRange`] instead of silently truncating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedInt32Le(i32);

impl SignedInt32Le {
    /// The smallest representable value.
    pub const MIN: Self = Self(i32::MIN);

    /// The largest representable value.
    pub const MAX: Self = Self(i32::MAX);

    /// Constructs a `SignedInt32Le`, validating `value` lies within
    /// [`MIN`](Self::MIN) to [`MAX`](Self::MAX) inclusive.
    pub fn new(value: i64) -> Result<Self, Error> {
        i32::try_from(value)
            .map(Self)
            .map_err(|_| Error::OutOfRange(value))
    }

    /// Returns the integer value.
    pub fn get(self) -> i32 {
        self.0
    }

    /// Serialises this integer into `buf` as 4 little-endian bytes.
    pub fn serialise_into<W: Write>(self, buf: &mut W) -> Result<(), std::io::Error> {
        buf.write_i32::<LittleEndian>(self.0)
    }

    /// Reads exactly 4 bytes from `r` and decodes them.
    ///
    /// An underfull read is a framing error and surfaces as
    /// [`Error::IOError`] with [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof).
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, Error> {
        Ok(Self(r.read_i32::<LittleEndian>()?))
    }
}

impl From<i32> for SignedInt32Le {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

impl From<SignedInt32Le> for i32 {
    fn from(v: SignedInt32Le) -> Self {
        v.0
    }
}

impl fmt::Display for SignedInt32Le {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Draws a fresh request id uniformly from `0` to [`SignedInt32Le::MAX`]
/// inclusive.
///
/// The id `-1` is reserved by the Source protocol to signal authentication
/// failure and is never drawn. Ids are not required to be unique within a
/// session; a retry after a session timeout draws a new one.
pub fn random_request_id() -> SignedInt32Le {
    SignedInt32Le(rand::thread_rng().gen_range(0..=i32::MAX))
}
