//! TLS WebSocket control channel.
//!
//! One accept loop, one handler thread per connection, and at most one
//! *current* connection: accepting a new client bumps the connection epoch
//! and the displaced handler shuts itself down, exactly like the original
//! single-operator panel. The handler alternates between draining the
//! outbound queue (alerts and deferred acknowledgments pushed from other
//! threads) and short, bounded reads.

use std::collections::VecDeque;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use tungstenite::{Message, WebSocket};

use crate::error::{Error, Result};
use crate::net::protocol::{ClientMessage, ServerMessage};
use crate::session::SessionManager;

/// Messages queued for the current client while it is between reads (or not
/// connected at all). Bounded; the oldest alerts fall off first.
pub struct Outbound {
    queue: Mutex<VecDeque<ServerMessage>>,
}

const OUTBOUND_CAP: usize = 256;

impl Outbound {
    pub fn new() -> Arc<Outbound> {
        Arc::new(Outbound {
            queue: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push(&self, message: ServerMessage) {
        let mut queue = self.queue.lock();
        if queue.len() >= OUTBOUND_CAP {
            debug!("outbound queue full, dropping oldest message");
            queue.pop_front();
        }
        queue.push_back(message);
    }

    pub fn drain(&self) -> Vec<ServerMessage> {
        self.queue.lock().drain(..).collect()
    }
}

type TlsWebSocket = WebSocket<StreamOwned<ServerConnection, TcpStream>>;

pub struct WsServer {
    session: Arc<SessionManager>,
    outbound: Arc<Outbound>,
    tls: Arc<ServerConfig>,
    port: u16,
    running: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
}

impl WsServer {
    pub fn new(
        session: Arc<SessionManager>,
        outbound: Arc<Outbound>,
        tls: ServerConfig,
        port: u16,
        running: Arc<AtomicBool>,
    ) -> WsServer {
        WsServer {
            session,
            outbound,
            tls: Arc::new(tls),
            port,
            running,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Accept loop; returns when the shutdown flag flips.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).map_err(|e| {
            Error::Config(format!("cannot listen on port {}: {e}", self.port))
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::Config(format!("listener setup: {e}")))?;
        info!("control channel listening on port {}", self.port);

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    // The newcomer displaces whoever was connected.
                    let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("client connected from {peer}");
                    let session = Arc::clone(&self.session);
                    let outbound = Arc::clone(&self.outbound);
                    let tls = Arc::clone(&self.tls);
                    let running = Arc::clone(&self.running);
                    let epoch = Arc::clone(&self.epoch);
                    let spawned = thread::Builder::new()
                        .name(format!("ws-client-{my_epoch}"))
                        .spawn(move || {
                            if let Err(e) = serve_connection(
                                stream, session, outbound, tls, running, epoch, my_epoch,
                            ) {
                                debug!("connection ended: {e}");
                            }
                        });
                    if let Err(e) = spawned {
                        warn!("could not spawn connection handler: {e}");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
        Ok(())
    }
}

fn serve_connection(
    stream: TcpStream,
    session: Arc<SessionManager>,
    outbound: Arc<Outbound>,
    tls: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
    my_epoch: u64,
) -> std::result::Result<(), tungstenite::Error> {
    // The listener is non-blocking; the per-connection socket must not be.
    stream.set_nonblocking(false)?;
    // Keep a second handle so the read timeout can be set after the
    // handshakes have run blocking.
    let control = stream.try_clone()?;
    let tls_conn = ServerConnection::new(tls)
        .map_err(|e| tungstenite::Error::Io(std::io::Error::other(e)))?;
    let tls_stream = StreamOwned::new(tls_conn, stream);
    let mut ws = match tungstenite::accept(tls_stream) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake failed: {e}");
            return Ok(());
        }
    };
    control.set_read_timeout(Some(Duration::from_millis(50)))?;

    loop {
        if !running.load(Ordering::SeqCst) || epoch.load(Ordering::SeqCst) != my_epoch {
            debug!("connection {my_epoch} superseded or shutting down");
            let _ = ws.close(None);
            let _ = ws.flush();
            return Ok(());
        }

        // Only the current connection may consume queued pushes.
        for message in outbound.drain() {
            send_json(&mut ws, &message)?;
        }

        match ws.read() {
            Ok(Message::Text(text)) => handle_text(&mut ws, &session, &text)?,
            Ok(Message::Close(_)) => {
                info!("client disconnected");
                return Ok(());
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => {
                info!("client connection closed");
                return Ok(());
            }
            Err(e) => {
                warn!("client read failed: {e}");
                return Err(e);
            }
        }
    }
}

fn handle_text(
    ws: &mut TlsWebSocket,
    session: &Arc<SessionManager>,
    text: &str,
) -> std::result::Result<(), tungstenite::Error> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Echo) => {
            // Echoed verbatim, extra fields and all.
            ws.send(Message::Text(text.to_string()))
        }
        Ok(ClientMessage::Login {
            id,
            username,
            password,
        }) => {
            let response = session.on_password_login(&username, &password, &id);
            send_json(ws, &response)
        }
        Ok(ClientMessage::UnlockKeySlot { id, jwt, slot_id }) => {
            match session.on_unlock_request(&jwt, slot_id, &id) {
                Some(response) => send_json(ws, &response),
                // Granted: the acknowledgment follows the relock cycle
                // through the outbound queue.
                None => Ok(()),
            }
        }
        Err(e) => {
            warn!("unparseable client message: {e}");
            Ok(())
        }
    }
}

fn send_json(
    ws: &mut TlsWebSocket,
    message: &ServerMessage,
) -> std::result::Result<(), tungstenite::Error> {
    match serde_json::to_string(message) {
        Ok(text) => ws.send(Message::Text(text)),
        Err(e) => {
            warn!("cannot serialize server message: {e}");
            Ok(())
        }
    }
}

/// Load the PEM certificate chain and private key for the listener.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    let cert_file = std::fs::File::open(cert_path).map_err(|source| Error::File {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Parse {
            path: cert_path.to_path_buf(),
            message: e.to_string(),
        })?;

    let key_file = std::fs::File::open(key_path).map_err(|source| Error::File {
        path: key_path.to_path_buf(),
        source,
    })?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| Error::Parse {
            path: key_path.to_path_buf(),
            message: e.to_string(),
        })?
        .ok_or_else(|| Error::Config(format!("no private key in {}", key_path.display())))?;

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Config(format!("TLS configuration rejected: {e}")))
}
