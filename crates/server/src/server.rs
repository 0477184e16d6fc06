//! TCP server for the webhook.
//!
//! Binds to the configured address and answers one HTTP request per
//! connection, each on its own thread.

use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::http::{read_request, HttpError, HttpResponse};
use crate::service::WebhookService;

/// Socket read/write timeout per connection.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep between accept polls while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Configuration for the webhook server.
#[derive(Debug, Clone)]
pub struct WebhookServerConfig {
    /// Address to bind. Port 0 picks a free port.
    pub listen: SocketAddr,
    /// Concurrent connections before new ones get a 503.
    pub max_connections: usize,
}

/// The webhook server - owns the listener thread.
pub struct WebhookServer {
    /// TCP listener handle.
    listener_handle: Option<JoinHandle<()>>,
    /// Shutdown signal.
    shutdown: Arc<AtomicBool>,
    /// Bound address (if running).
    bound_addr: Option<SocketAddr>,
    /// Connections currently being served.
    active: Arc<AtomicUsize>,
}

impl WebhookServer {
    /// Create a new server (not started).
    pub fn new() -> Self {
        Self {
            listener_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bound_addr: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind and start accepting connections.
    pub fn start(&mut self, config: WebhookServerConfig, service: Arc<WebhookService>) -> std::io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let listener = TcpListener::bind(config.listen)?;
        let addr = listener.local_addr()?;
        self.bound_addr = Some(addr);

        // Set non-blocking so we can check shutdown flag
        listener.set_nonblocking(true)?;

        let shutdown = Arc::clone(&self.shutdown);
        let active = Arc::clone(&self.active);
        let max_connections = config.max_connections;

        self.listener_handle = Some(thread::spawn(move || {
            run_listener(listener, shutdown, service, active, max_connections);
        }));

        log::info!("Webhook server listening on {}", addr);

        Ok(())
    }

    /// Stop accepting connections. In-flight connections finish on their own.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }

        self.bound_addr = None;

        log::info!("Webhook server stopped");
    }

    /// Block until the listener thread exits (accept failure or `stop`
    /// from another owner of the shutdown flag).
    pub fn wait(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Connections currently being served.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for WebhookServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WebhookServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decrements the active-connection count when the connection thread ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run the listener loop in a separate thread.
fn run_listener(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    service: Arc<WebhookService>,
    active: Arc<AtomicUsize>,
    max_connections: usize,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if active.load(Ordering::SeqCst) >= max_connections {
                    log::warn!(
                        "Connection refused from {}: limit of {} reached",
                        addr,
                        max_connections
                    );
                    refuse(stream);
                    continue;
                }

                log::debug!("Accepted connection from {}", addr);
                active.fetch_add(1, Ordering::SeqCst);
                let slot = ConnectionSlot(Arc::clone(&active));
                let service = Arc::clone(&service);

                thread::spawn(move || {
                    let _slot = slot;
                    if let Err(e) = handle_connection(stream, &service) {
                        log::warn!("Connection error from {}: {}", addr, e);
                    }
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
                break;
            }
        }
    }
}

fn refuse(mut stream: TcpStream) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_write_timeout(Some(Duration::from_secs(1)));
    let _ = HttpResponse::text(503, "Server busy.").write_to(&mut stream);
}

/// Serve a single request on `stream`.
fn handle_connection(mut stream: TcpStream, service: &WebhookService) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let response = match read_request(&mut reader) {
        Ok(request) => {
            log::debug!("{} {}", request.method, request.path);
            service.handle_http(&request)
        }
        Err(HttpError::BodyTooLarge(len)) => {
            log::warn!("Rejected {} byte body", len);
            HttpResponse::text(413, "Request body too large.")
        }
        Err(HttpError::Malformed(msg)) => {
            log::warn!("Malformed request: {}", msg);
            HttpResponse::text(400, "Bad request.")
        }
        Err(HttpError::Io(e)) => return Err(e),
    };

    response.write_to(&mut stream)
}
