//! The synchronous Source RCON session client.

use std::{
    io::Write,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{
    source::{Packet, PacketKind, Reassembler, Reassembly},
    Config, Error,
};

/// The request id a Source server reserves to signal a failed login.
const AUTH_FAILED_ID: i32 = -1;

/// A Source RCON client over a single TCP stream.
///
/// The client owns its transport for the lifetime of the session and
/// serialises all operations on it: a new request is not issued until the
/// current reply (and its reassembly) is complete, which keeps request-id
/// correlation unambiguous. Instances are not safe for concurrent use from
/// multiple threads without external synchronisation.
///
/// The transport is released when the client is dropped.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,

    /// The payload of the fragmentation probe command, or `None` to disable
    /// probing.
    frag_probe: Option<String>,
}

impl Client {
    /// Opens a TCP connection to the server at `addr`.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        Ok(Self::new(TcpStream::connect(addr)?))
    }

    /// Opens a TCP connection to the server at `addr`, bounding the connect
    /// and every subsequent send/receive by `timeout`.
    pub fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, Error> {
        let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            Error::IOError(
                std::io::ErrorKind::AddrNotAvailable,
                "server address did not resolve".to_owned(),
            )
        })?;

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(Self::new(stream))
    }

    /// Opens a connection to the server a [`Config`] references, applying
    /// `timeout` when one is given and authenticating when the config holds
    /// a password.
    pub fn from_config(config: &Config, timeout: Option<Duration>) -> Result<Self, Error> {
        let addr = (config.host(), config.port());
        let mut client = match timeout {
            Some(timeout) => Self::connect_timeout(addr, timeout)?,
            None => Self::connect(addr)?,
        };

        if let Some(passwd) = config.passwd() {
            client.login(passwd)?;
        }

        Ok(client)
    }

    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            frag_probe: Some(String::new()),
        }
    }

    /// Configures the fragmentation probe sent after each command.
    ///
    /// The Source protocol has no end-of-response marker: a long reply
    /// arrives as several packets sharing the request id. When probing is
    /// enabled the client sends a second (by default empty) command after
    /// each request; the server answers in order, so the probe's reply
    /// marks the end of the primary reply. Some servers want a short
    /// innocuous command instead of an empty one.
    ///
    /// With `None` the client returns the first reply packet as-is.
    pub fn set_frag_probe(&mut self, probe: Option<String>) {
        self.frag_probe = probe;
    }

    /// Authenticates the session.
    ///
    /// Any packet preceding the `SERVERDATA_AUTH_RESPONSE` verdict is
    /// ignored: servers commonly emit a throwaway empty `RESPONSE_VALUE`
    /// first.
    pub fn login(&mut self, passwd: &str) -> Result<(), Error> {
        self.send(&Packet::make_login(passwd))?;

        let mut response = self.read()?;
        while response.kind() != PacketKind::AuthResponse {
            response = self.read()?;
        }

        if response.id().get() == AUTH_FAILED_ID {
            return Err(Error::WrongPassword);
        }

        log::debug!("session authenticated (id {})", response.id());
        Ok(())
    }

    /// Runs `command` with `args` and returns the server's reply text.
    ///
    /// Requires an authenticated session. A reply id differing from the
    /// request id means the server discarded the session; the caller is
    /// responsible for re-authenticating and retrying.
    pub fn run<S: AsRef<str>>(&mut self, command: &str, args: &[S]) -> Result<String, Error> {
        let request = Packet::make_command(
            std::iter::once(command).chain(args.iter().map(|v| v.as_ref())),
        );
        self.send(&request)?;

        // The probe goes out on the same stream before any reply is read;
        // the server answers strictly in order.
        if let Some(probe) = self.frag_probe.clone() {
            self.send(&Packet::make_command([probe.as_str()]))?;
        }

        let first = self.read()?;
        if first.id() != request.id() {
            return Err(Error::SessionTimeout {
                sent: request.id().get(),
                received: first.id().get(),
            });
        }

        let response = if self.frag_probe.is_none() {
            first
        } else {
            let mut reassembler = Reassembler::new();
            reassembler.push(first);
            loop {
                let next = self.read()?;
                if let Reassembly::Complete { response, .. } = reassembler.push(next) {
                    break response;
                }
            }
        };

        Ok(String::from_utf8_lossy(response.payload()).into_owned())
    }

    /// Closes the session, releasing the transport.
    pub fn close(self) {
        drop(self);
    }

    fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        let buf = packet.serialise()?;
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<Packet, Error> {
        Packet::read_from(&mut self.stream)
    }
}
