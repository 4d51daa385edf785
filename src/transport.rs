//! Transport abstraction layer.
//! Production transport is a single-client TCP server, tests may plug in any other.

use crate::error::Error;
use crate::protocol::{codec, envelope, Dictionary, FrameDecoder, MessageName};
use crate::{weak_error, wire_trace};
use log::{debug, error, info, warn};
use nix::sys::socket::{
    self as nix_socket, shutdown as shutdown_socket, sockopt, AddressFamily,
    Shutdown as SocketShutdown, SockFlag, SockProtocol, SockType, SockaddrStorage,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

/// Size of a single socket read.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Maximum length of the pending connections queue.
pub const LISTEN_BACKLOG: usize = 5;

/// Owner of a transport, receives decoded messages and connection events.
pub trait TransportClient: Send + Sync {
    /// Handle a decoded top level message.
    fn message_received(&self, message: Dictionary);

    /// Remote client closed the connection.
    fn client_connection_died(&self);
}

/// Trait for outgoing message transport.
pub trait Transport: Send {
    /// Wrap `payload` into a named message and deliver it to the connected client.
    /// No-op if there is no client or transport is closed.
    fn send_message(&self, name: MessageName, payload: Dictionary) -> Result<(), Error>;

    /// Stop accepting clients and drop current one. Idempotent.
    fn close(&self);

    /// Address transport listening on, if any.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Create a transport for the given owner.
pub type TransportFactory =
    Arc<dyn Fn(Weak<dyn TransportClient>) -> Result<Box<dyn Transport>, Error> + Send + Sync>;

/// Tracked client socket.
struct ClientSocket {
    /// Distinguishes clients accepted one after another.
    generation: u64,
    peer: SocketAddr,
    stream: TcpStream,
}

#[derive(Default)]
struct Shared {
    closed: AtomicBool,
    client: Mutex<Option<ClientSocket>>,
    next_generation: AtomicU64,
}

impl Shared {
    fn client(&self) -> MutexGuard<'_, Option<ClientSocket>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget a client if it is still the tracked one. Return true if client was released.
    fn release_client(&self, generation: u64) -> bool {
        let mut client = self.client();
        match client.as_ref() {
            Some(current) if current.generation == generation => {
                if let Some(current) = client.take() {
                    _ = current.stream.shutdown(Shutdown::Both);
                }
                true
            }
            _ => false,
        }
    }
}

/// TCP-based transport. Serves one client at a time, a client that connects while another one
/// is served is rejected (connection is closed right after accept).
pub struct TcpTransport {
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    accept_thread: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Bind listening socket and start accepting clients.
    ///
    /// # Arguments
    ///
    /// * `addr`: address to listen on
    /// * `client`: owner of the transport
    pub fn bind(addr: SocketAddr, client: Weak<dyn TransportClient>) -> Result<Self, Error> {
        let listener = listen(addr).map_err(|errno| Error::Bind {
            addr,
            source: errno.into(),
        })?;
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(listener);
        let shared = Arc::new(Shared::default());

        let accept_thread = thread::Builder::new().name("inspector-accept".to_string()).spawn({
            let listener = listener.clone();
            let shared = shared.clone();
            move || accept_loop(&listener, &shared, &client)
        })?;

        info!(target: "transport", "inspector listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            shared,
            accept_thread: Some(accept_thread),
        })
    }

    /// Factory of TCP transports bound on `addr`.
    pub fn factory(addr: SocketAddr) -> TransportFactory {
        Arc::new(
            move |client: Weak<dyn TransportClient>| -> Result<Box<dyn Transport>, Error> {
                Ok(Box::new(TcpTransport::bind(addr, client)?))
            },
        )
    }
}

impl Transport for TcpTransport {
    fn send_message(&self, name: MessageName, payload: Dictionary) -> Result<(), Error> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let client = self.shared.client();
        let Some(client) = client.as_ref() else {
            return Ok(());
        };

        let frame = codec::encode(envelope(name, payload))?;
        wire_trace!(name, &frame);
        debug!(target: "transport", "send {name} ({} bytes) to {}", frame.len(), client.peer);
        // `write_all` retries partial writes until the whole frame is sent or fails
        let mut stream = &client.stream;
        stream.write_all(&frame)?;
        stream.flush()?;
        Ok(())
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // wakes up blocked accept
        weak_error!(
            shutdown_socket(self.listener.as_raw_fd(), SocketShutdown::Both),
            "shutdown listener:"
        );
        if let Some(client) = self.shared.client().take() {
            _ = client.stream.shutdown(Shutdown::Both);
        }
        info!(target: "transport", "inspector stop listening on {}", self.local_addr);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
        if let Some(accept_thread) = self.accept_thread.take() {
            _ = accept_thread.join();
        }
    }
}

/// Create a listening socket with [`LISTEN_BACKLOG`] queue length.
fn listen(addr: SocketAddr) -> nix::Result<TcpListener> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let fd = nix_socket::socket(
        family,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::Tcp,
    )?;
    nix_socket::setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    nix_socket::bind(fd.as_raw_fd(), &SockaddrStorage::from(addr))?;
    nix_socket::listen(&fd, LISTEN_BACKLOG)?;
    Ok(TcpListener::from(fd))
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>, client: &Weak<dyn TransportClient>) {
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(err) => {
                if shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                if err.kind() != ErrorKind::Interrupted {
                    warn!(target: "transport", "accept failed: {err:#}");
                }
                continue;
            }
        };
        if shared.closed.load(Ordering::SeqCst) {
            _ = stream.shutdown(Shutdown::Both);
            break;
        }

        let generation = shared.next_generation.fetch_add(1, Ordering::SeqCst);
        let reader = {
            let mut current = shared.client();
            if let Some(current) = current.as_ref() {
                warn!(
                    target: "transport",
                    "reject client {peer}: client {} already connected", current.peer
                );
                _ = stream.shutdown(Shutdown::Both);
                continue;
            }
            _ = stream.set_nodelay(true);
            let Some(reader) = weak_error!(stream.try_clone(), "clone client socket:") else {
                _ = stream.shutdown(Shutdown::Both);
                continue;
            };
            *current = Some(ClientSocket {
                generation,
                peer,
                stream,
            });
            reader
        };
        info!(target: "transport", "inspector client connected: {peer}");

        let spawned = thread::Builder::new().name("inspector-recv".to_string()).spawn({
            let shared = shared.clone();
            let client = client.clone();
            move || receive_loop(reader, peer, generation, &shared, &client)
        });
        if weak_error!(spawned, "spawn receive thread:").is_none() {
            shared.release_client(generation);
        }
    }
    debug!(target: "transport", "accept loop finished");
}

fn receive_loop(
    mut stream: TcpStream,
    peer: SocketAddr,
    generation: u64,
    shared: &Shared,
    client: &Weak<dyn TransportClient>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; RECV_BUFFER_SIZE];

    loop {
        let read = match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    warn!(target: "transport", "receive from {peer} failed: {err:#}");
                }
                break;
            }
        };

        decoder.extend(&buffer[..read]);
        loop {
            match decoder.next_message() {
                Ok(Some(message)) => {
                    if let Some(client) = client.upgrade() {
                        client.message_received(message);
                    }
                }
                Ok(None) => break,
                Err(err) if err.is_protocol() => {
                    warn!(target: "transport", "invalid packet from {peer}: {err:#}")
                }
                Err(err) => error!(target: "transport", "decode data from {peer}: {err:#}"),
            }
        }
    }

    info!(target: "transport", "inspector client disconnected: {peer}");
    // transport closed by its owner already released the client, the owner knows about it
    if shared.release_client(generation) {
        if let Some(client) = client.upgrade() {
            client.client_connection_died();
        }
    }
}
