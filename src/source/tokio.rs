//! The cooperative-async Source RCON session client.
//!
//! Available with the `tokio` cargo feature. Suspension points are exactly
//! the transport operations: connect, write-and-flush, and each exact read
//! of a frame. Cancelling a task cancels the in-flight transport operation
//! and dropping the client releases the transport.

use std::{future::Future, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, ToSocketAddrs},
};

use crate::{
    source::{Packet, PacketKind, Reassembler, Reassembly},
    Config, Error,
};

/// The request id a Source server reserves to signal a failed login.
const AUTH_FAILED_ID: i32 = -1;

/// Runs `fut` to completion, bounded by `limit` when one is configured.
async fn bounded<F, T>(limit: Option<Duration>, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(v) => v,
            Err(_) => Err(Error::IOError(
                std::io::ErrorKind::TimedOut,
                "operation timed out".to_owned(),
            )),
        },
    }
}

/// The async twin of [`Client`](crate::source::Client), with an identical
/// operation contract over a tokio TCP stream.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    timeout: Option<Duration>,
    frag_probe: Option<String>,
}

impl Client {
    /// Opens a TCP connection to the server at `addr`.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        Ok(Self::new(TcpStream::connect(addr).await?, None))
    }

    /// Opens a TCP connection to the server at `addr`, bounding the connect
    /// and every subsequent receive by `timeout`.
    pub async fn connect_timeout<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let stream = bounded(Some(timeout), async {
            Ok(TcpStream::connect(addr).await?)
        })
        .await?;

        Ok(Self::new(stream, Some(timeout)))
    }

    /// Opens a connection to the server a [`Config`] references, applying
    /// `timeout` when one is given and authenticating when the config holds
    /// a password.
    pub async fn from_config(config: &Config, timeout: Option<Duration>) -> Result<Self, Error> {
        let addr = (config.host(), config.port());
        let mut client = match timeout {
            Some(timeout) => Self::connect_timeout(addr, timeout).await?,
            None => Self::connect(addr).await?,
        };

        if let Some(passwd) = config.passwd() {
            client.login(passwd).await?;
        }

        Ok(client)
    }

    fn new(stream: TcpStream, timeout: Option<Duration>) -> Self {
        Self {
            stream,
            timeout,
            frag_probe: Some(String::new()),
        }
    }

    /// Configures the fragmentation probe sent after each command.
    ///
    /// See [`Client::set_frag_probe`](crate::source::Client::set_frag_probe).
    pub fn set_frag_probe(&mut self, probe: Option<String>) {
        self.frag_probe = probe;
    }

    /// Authenticates the session.
    ///
    /// Any packet preceding the `SERVERDATA_AUTH_RESPONSE` verdict is
    /// ignored: servers commonly emit a throwaway empty `RESPONSE_VALUE`
    /// first.
    pub async fn login(&mut self, passwd: &str) -> Result<(), Error> {
        self.send(&Packet::make_login(passwd)).await?;

        let mut response = self.read().await?;
        while response.kind() != PacketKind::AuthResponse {
            response = self.read().await?;
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
    pub async fn run<S: AsRef<str>>(&mut self, command: &str, args: &[S]) -> Result<String, Error> {
        let request = Packet::make_command(
            std::iter::once(command).chain(args.iter().map(|v| v.as_ref())),
        );
        self.send(&request).await?;

        if let Some(probe) = self.frag_probe.clone() {
            self.send(&Packet::make_command([probe.as_str()])).await?;
        }

        let first = self.read().await?;
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
                let next = self.read().await?;
                if let Reassembly::Complete { response, .. } = reassembler.push(next) {
                    break response;
                }
            }
        };

        Ok(String::from_utf8_lossy(response.payload()).into_owned())
    }

    /// Shuts the stream down and releases the transport.
    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        let buf = packet.serialise()?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Packet, Error> {
        bounded(self.timeout, Packet::read_from_async(&mut self.stream)).await
    }
}

/// Opens a connection to `addr`, authenticates with `passwd`, runs one
/// command and closes the session.
///
/// A convenience wrapper over [`Client`] for one-shot invocations.
pub async fn rcon<A: ToSocketAddrs, S: AsRef<str>>(
    addr: A,
    passwd: &str,
    command: &str,
    args: &[S],
) -> Result<String, Error> {
    let mut client = Client::connect(addr).await?;
    client.login(passwd).await?;
    let response = client.run(command, args).await?;
    client.close().await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use crate::SignedInt32Le;

    use super::*;

    async fn reply(stream: &mut TcpStream, id: i32, kind: PacketKind, payload: &[u8]) {
        let packet = Packet::new(SignedInt32Le::from(id), kind, payload.to_vec());
        stream.write_all(&packet.serialise().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = Packet::read_from_async(&mut stream).await.unwrap();
            assert_eq!(request.kind(), PacketKind::Auth);
            reply(&mut stream, request.id().get(), PacketKind::AuthResponse, b"").await;
        });

        let mut client = Client::connect(addr).await.unwrap();
        client.login("hunter2").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _request = Packet::read_from_async(&mut stream).await.unwrap();
            reply(&mut stream, -1, PacketKind::AuthResponse, b"").await;
        });

        let mut client = Client::connect(addr).await.unwrap();
        assert_eq!(client.login("bad").await, Err(Error::WrongPassword));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fragmented_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = Packet::read_from_async(&mut stream).await.unwrap();
            let probe = Packet::read_from_async(&mut stream).await.unwrap();

            for payload in [b"foo".as_slice(), b"bar", b"baz"] {
                reply(&mut stream, request.id().get(), PacketKind::ResponseValue, payload).await;
            }
            reply(&mut stream, probe.id().get(), PacketKind::ResponseValue, b"").await;
        });

        let mut client = Client::connect(addr).await.unwrap();
        let got = client.run("cvarlist", &[] as &[&str]).await.unwrap();
        assert_eq!(got, "foobarbaz");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_one_shot_rcon() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let login = Packet::read_from_async(&mut stream).await.unwrap();
            reply(&mut stream, login.id().get(), PacketKind::AuthResponse, b"").await;

            let request = Packet::read_from_async(&mut stream).await.unwrap();
            let probe = Packet::read_from_async(&mut stream).await.unwrap();
            reply(&mut stream, request.id().get(), PacketKind::ResponseValue, b"0 players").await;
            reply(&mut stream, probe.id().get(), PacketKind::ResponseValue, b"").await;
        });

        let got = rcon(addr, "hunter2", "players", &[] as &[&str]).await.unwrap();
        assert_eq!(got, "0 players");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_from_config_auto_login() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = Packet::read_from_async(&mut stream).await.unwrap();
            assert_eq!(request.kind(), PacketKind::Auth);
            assert_eq!(request.payload(), b"hunter2");
            reply(&mut stream, request.id().get(), PacketKind::AuthResponse, b"").await;
        });

        let config = format!("hunter2@{}:{}", addr.ip(), addr.port())
            .parse::<Config>()
            .unwrap();
        let client = Client::from_config(&config, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        client.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // Accept and go silent.
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut client = Client::connect_timeout(addr, Duration::from_millis(50))
            .await
            .unwrap();
        client.set_frag_probe(None);
        match client.run("status", &[] as &[&str]).await {
            Err(e) if e.is_timeout() => {}
            v => panic!("expected timeout, got {:?}", v),
        }
        server.await.unwrap();
    }
}
