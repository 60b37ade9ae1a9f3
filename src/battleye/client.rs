//! The BattlEye RCon session client.

use std::{
    collections::BTreeMap,
    fmt,
    net::{ToSocketAddrs, UdpSocket},
    time::Duration,
};

use crate::{
    battleye::{CommandRequest, LoginRequest, Response, ServerMessage, ServerMessageAck},
    Config, Error,
};

/// Largest datagram the client accepts.
const MAX_DATAGRAM: usize = 4096;

/// The default receive timeout.
///
/// UDP delivery gives the command-response stream no explicit terminator;
/// the receive timeout doubles as the end-of-stream detector, so one is
/// always installed.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// A callback invoked with each [`ServerMessage`] in arrival order.
///
/// The handler runs on the thread driving the client and must not block
/// indefinitely.
pub type MessageHandler = Box<dyn FnMut(&ServerMessage) + Send>;

/// The default handler, logging the server message.
fn log_message(message: &ServerMessage) {
    log::info!("server message: {}", message.message());
}

/// A BattlEye RCon client over a single datagram socket bound to the server
/// address.
///
/// Delivery is unreliable and unordered, so command replies are reassembled
/// by sequence number tolerating duplicates and interleaved server
/// messages. Requests and replies are serialised by `&mut self`; instances
/// are not safe for concurrent use from multiple threads without external
/// synchronisation.
pub struct Client {
    socket: UdpSocket,
    handler: MessageHandler,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Binds a local socket and connects it to the server at `addr`, with
    /// the default receive timeout of one second.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        Self::connect_timeout(addr, DEFAULT_TIMEOUT)
    }

    /// Binds a local socket and connects it to the server at `addr` with
    /// the given receive timeout.
    ///
    /// The timeout bounds every receive and is also the end-of-stream
    /// detector for fragmented command replies; values well above the
    /// server's round-trip time make `run` linger after complete replies.
    pub fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(timeout))?;

        Ok(Self {
            socket,
            handler: Box::new(log_message),
        })
    }

    /// Opens a session to the server a [`Config`] references, applying
    /// `timeout` when one is given and authenticating when the config holds
    /// a password.
    pub fn from_config(config: &Config, timeout: Option<Duration>) -> Result<Self, Error> {
        let mut client = Self::connect_timeout(
            (config.host(), config.port()),
            timeout.unwrap_or(DEFAULT_TIMEOUT),
        )?;

        if let Some(passwd) = config.passwd() {
            client.login(passwd)?;
        }

        Ok(client)
    }

    /// Replaces the server-message handler.
    ///
    /// The default handler logs each message at info level.
    pub fn set_message_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&ServerMessage) + Send + 'static,
    {
        self.handler = Box::new(handler);
    }

    /// Authenticates the session.
    ///
    /// Server messages arriving before the verdict are acknowledged and
    /// dispatched as usual.
    pub fn login(&mut self, passwd: &str) -> Result<(), Error> {
        self.socket.send(&LoginRequest::new(passwd).to_datagram())?;

        loop {
            match self.receive()? {
                Response::Login(v) => {
                    if !v.success() {
                        return Err(Error::WrongPassword);
                    }
                    log::debug!("session authenticated");
                    return Ok(());
                }
                Response::Message(m) => self.dispatch(m)?,
                Response::Command(_) => {
                    log::debug!("stray command response during login");
                }
            }
        }
    }

    /// Runs `command` with `args` and returns the server's reply text.
    ///
    /// The reply may arrive as multiple fragments with distinct sequence
    /// numbers; the stream ends when a receive times out after at least one
    /// fragment arrived, or when a fragment's sequence number repeats (a
    /// retransmit). A timeout before the first fragment propagates as an
    /// error. Server messages arriving mid-reply are acknowledged and
    /// dispatched without affecting the reply stream.
    pub fn run<S: AsRef<str>>(&mut self, command: &str, args: &[S]) -> Result<String, Error> {
        let request = CommandRequest::from_command(command, args);
        self.socket.send(&request.to_datagram())?;

        let mut fragments = BTreeMap::new();
        loop {
            match self.receive() {
                Ok(Response::Message(m)) => self.dispatch(m)?,
                Ok(Response::Command(part)) => {
                    if fragments.contains_key(&part.seq()) {
                        break;
                    }
                    fragments.insert(part.seq(), part.into_payload());
                }
                Ok(Response::Login(_)) => {
                    // Only ever sent in reply to a login request.
                    log::debug!("stray login response during command");
                }
                Err(e) if e.is_timeout() && !fragments.is_empty() => break,
                Err(e) => return Err(e),
            }
        }

        let mut text = Vec::new();
        for payload in fragments.into_values() {
            text.extend_from_slice(&payload);
        }

        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// Closes the session, releasing the transport.
    pub fn close(self) {
        drop(self);
    }

    /// Acknowledges `message` to the server, then hands it to the handler.
    ///
    /// The acknowledgement goes out exactly once, before the handler runs.
    fn dispatch(&mut self, message: ServerMessage) -> Result<(), Error> {
        self.socket
            .send(&ServerMessageAck::new(message.seq()).to_datagram())?;
        (self.handler)(&message);
        Ok(())
    }

    fn receive(&mut self) -> Result<Response, Error> {
        let mut buf = [0; MAX_DATAGRAM];
        let n = self.socket.recv(&mut buf)?;
        Response::from_datagram(&buf[..n])
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
        thread,
    };

    use crate::battleye::packet::build_datagram;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_millis(100);

    /// Spawns a mock server driven by `f`, handed the server socket and the
    /// address of the first datagram received (the client).
    fn serve<F>(f: F) -> (SocketAddr, thread::JoinHandle<()>)
    where
        F: FnOnce(UdpSocket, SocketAddr, Vec<u8>) + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0; MAX_DATAGRAM];
            let (n, client) = socket.recv_from(&mut buf).unwrap();
            f(socket, client, buf[..n].to_vec());
        });
        (addr, handle)
    }

    #[test]
    fn test_login_success() {
        let (addr, handle) = serve(|socket, client, request| {
            assert_eq!(request, LoginRequest::new("secret").to_datagram());
            socket
                .send_to(&build_datagram(0x00, &[0x01]), client)
                .unwrap();
        });

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        c.login("secret").unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_login_wrong_password() {
        let (addr, handle) = serve(|socket, client, _request| {
            socket
                .send_to(&build_datagram(0x00, &[0x00]), client)
                .unwrap();
        });

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        assert_eq!(c.login("bad"), Err(Error::WrongPassword));
        handle.join().unwrap();
    }

    #[test]
    fn test_login_dispatches_messages_before_verdict() {
        let (addr, handle) = serve(|socket, client, _request| {
            socket
                .send_to(&build_datagram(0x02, b"\x01RCon admin logged in"), client)
                .unwrap();

            let mut buf = [0; MAX_DATAGRAM];
            let (n, _) = socket.recv_from(&mut buf).unwrap();
            assert_eq!(buf[..n], ServerMessageAck::new(1).to_datagram());

            socket
                .send_to(&build_datagram(0x00, &[0x01]), client)
                .unwrap();
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        c.set_message_handler(move |m| log.lock().unwrap().push(m.message().into_owned()));

        c.login("secret").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["RCon admin logged in".to_owned()]);
        handle.join().unwrap();
    }

    #[test]
    fn test_run_acknowledges_server_message() {
        let (addr, handle) = serve(|socket, client, request| {
            assert_eq!(request, CommandRequest::new("players").to_datagram());

            // Interleave a server message before the reply; the ack must
            // come back before anything else is sent.
            socket
                .send_to(&build_datagram(0x02, b"\x05player joined"), client)
                .unwrap();

            let mut buf = [0; MAX_DATAGRAM];
            let (n, _) = socket.recv_from(&mut buf).unwrap();
            assert_eq!(buf[..n], ServerMessageAck::new(5).to_datagram());

            socket
                .send_to(&build_datagram(0x01, b"\x000 online"), client)
                .unwrap();
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        c.set_message_handler(move |m| log.lock().unwrap().push(m.message().into_owned()));

        let got = c.run("players", &[] as &[&str]).unwrap();
        assert_eq!(got, "0 online");
        assert_eq!(*seen.lock().unwrap(), vec!["player joined".to_owned()]);
        handle.join().unwrap();
    }

    #[test]
    fn test_run_reassembles_fragments_by_seq() {
        let (addr, handle) = serve(|socket, client, _request| {
            // Fragments out of order, then a retransmit to end the stream.
            socket
                .send_to(&build_datagram(0x01, b"\x01tail"), client)
                .unwrap();
            socket
                .send_to(&build_datagram(0x01, b"\x00head "), client)
                .unwrap();
            socket
                .send_to(&build_datagram(0x01, b"\x01tail"), client)
                .unwrap();
        });

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        let got = c.run("status", &[] as &[&str]).unwrap();
        assert_eq!(got, "head tail");
        handle.join().unwrap();
    }

    #[test]
    fn test_run_ends_on_timeout_after_first_fragment() {
        let (addr, handle) = serve(|socket, client, _request| {
            socket
                .send_to(&build_datagram(0x01, b"\x00lone reply"), client)
                .unwrap();
        });

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        let got = c.run("status", &[] as &[&str]).unwrap();
        assert_eq!(got, "lone reply");
        handle.join().unwrap();
    }

    #[test]
    fn test_run_timeout_without_reply() {
        let (addr, handle) = serve(|_socket, _client, _request| {
            // Swallow the request and go silent.
        });

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        match c.run("status", &[] as &[&str]) {
            Err(e) if e.is_timeout() => {}
            v => panic!("expected timeout, got {:?}", v),
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_from_config_auto_login() {
        let (addr, handle) = serve(|socket, client, request| {
            assert_eq!(request, LoginRequest::new("secret").to_datagram());
            socket
                .send_to(&build_datagram(0x00, &[0x01]), client)
                .unwrap();
        });

        let config = format!("secret@{}:{}", addr.ip(), addr.port())
            .parse::<Config>()
            .unwrap();
        let c = Client::from_config(&config, Some(TEST_TIMEOUT)).unwrap();
        c.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_run_joins_arguments() {
        let (addr, handle) = serve(|socket, client, request| {
            assert_eq!(
                request,
                CommandRequest::new("say -1 server restart").to_datagram()
            );
            socket
                .send_to(&build_datagram(0x01, b"\x00sent"), client)
                .unwrap();
        });

        let mut c = Client::connect_timeout(addr, TEST_TIMEOUT).unwrap();
        let got = c.run("say", &["-1", "server", "restart"]).unwrap();
        assert_eq!(got, "sent");
        handle.join().unwrap();
    }
}
