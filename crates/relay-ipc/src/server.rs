//! TCP server, client and robot connection.
//!
//! Every connection is request/response until it sends `robot.identify`.
//! From then on the relay may also push `{event, data}` lines to it at any
//! time. Responses and pushed events go through the same per-connection
//! writer, so they are never interleaved mid-line.

use crate::protocol::{error_codes, Frame, IdentifyParams, Method, Request, Response};
use crate::transport::{run_writer, send_line, FrameSender, TcpTransport, WRITER_QUEUE_DEPTH};
use crate::{IpcError, IpcResult};
use relay_core::{Relay, RelayError};
use relay_types::{ConnectionId, OutboundEvent};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Boxed async handler for one request method.
pub type HandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

type Handlers = Arc<RwLock<HashMap<Method, HandlerFn>>>;

/// Relay server listening on a TCP socket.
pub struct IpcServer {
    listen_addr: SocketAddr,
    relay: Arc<Relay>,
    transport: Arc<TcpTransport>,
    handlers: Handlers,
    shutdown_tx: broadcast::Sender<()>,
}

impl IpcServer {
    /// Create a new server. `transport` must be the one `relay` emits through.
    pub fn new(listen_addr: SocketAddr, relay: Arc<Relay>, transport: Arc<TcpTransport>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            listen_addr,
            relay,
            transport,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Route `method` to `handler`, replacing any earlier registration.
    ///
    /// `robot.identify` is handled by the server itself and cannot be overridden.
    pub async fn register_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let boxed: HandlerFn = Box::new(move |request| Box::pin(handler(request)));
        self.handlers.write().await.insert(method, boxed);
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Fires once when the server is told to stop.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Lets a handler (the `shutdown` method) stop the server.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> IpcResult<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to bind {}: {}", self.listen_addr, e)))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> IpcResult<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Relay server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let ctx = ConnectionContext {
                                relay: self.relay.clone(),
                                transport: self.transport.clone(),
                                handlers: self.handlers.clone(),
                                shutdown_rx: self.shutdown_tx.subscribe(),
                            };
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer, ctx).await {
                                    error!(peer = %peer, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Relay server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

struct ConnectionContext {
    relay: Arc<Relay>,
    transport: Arc<TcpTransport>,
    handlers: Handlers,
    shutdown_rx: broadcast::Receiver<()>,
}

/// What the reader loop should do after answering a request.
enum Next {
    Continue,
    Close,
}

/// Handle a single client connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    mut ctx: ConnectionContext,
) -> IpcResult<()> {
    let connection = ConnectionId::new();
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (tx, rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
    let writer_task = tokio::spawn(run_writer(writer, rx));
    let hangup = ctx.transport.attach(connection, tx.clone());

    debug!(connection = %connection, peer = %peer, "Client connected");

    let (result, hung_up) = tokio::select! {
        result = read_requests(&mut reader, connection, &tx, &mut ctx) => (result, false),
        _ = hangup.notified() => (Ok(()), true),
    };

    // Forget the identity before the writer goes away.
    if let Some(robot) = ctx.relay.on_connection_closed(connection).await {
        info!(connection = %connection, robot = %robot, "Robot disconnected");
    }
    ctx.transport.detach(connection);
    drop(tx);
    if hung_up {
        // Queued frames were given up on by the relay; none may be written.
        warn!(connection = %connection, peer = %peer, "Connection dropped by relay");
        writer_task.abort();
    } else {
        let _ = writer_task.await;
    }

    debug!(connection = %connection, "Client disconnected");
    result
}

async fn read_requests(
    reader: &mut BufReader<OwnedReadHalf>,
    connection: ConnectionId,
    tx: &FrameSender,
    ctx: &mut ConnectionContext,
) -> IpcResult<()> {
    let mut line = Vec::new();

    loop {
        let read = tokio::select! {
            read = read_bounded_line(reader, &mut line) => read?,
            _ = ctx.shutdown_rx.recv() => {
                debug!(connection = %connection, "Closing connection for shutdown");
                return Ok(());
            }
        };

        match read {
            LineRead::Eof => return Ok(()),
            LineRead::Oversized => {
                warn!(connection = %connection, limit = MAX_LINE_BYTES, "Request line too long, discarded");
                let response = Response::error(
                    "",
                    error_codes::INVALID_REQUEST,
                    &format!("Invalid request: line exceeds {} bytes", MAX_LINE_BYTES),
                );
                respond(tx, &response).await?;
                continue;
            }
            LineRead::Line => {}
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            respond(tx, &Response::error("", error_codes::PARSE_ERROR, "Parse error: not UTF-8")).await?;
            continue;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(connection = %connection, request = %trimmed, "Received request");

        let request = match Request::from_json(trimmed) {
            Ok(req) => req,
            Err(e) => {
                warn!(connection = %connection, error = %e, "Failed to parse request");
                respond(tx, &reject_unparsed(trimmed, &e)).await?;
                continue;
            }
        };

        let (response, next) = if request.method == Method::RobotIdentify {
            identify(&ctx.relay, connection, &request).await
        } else {
            let handlers = ctx.handlers.read().await;
            let response = match handlers.get(&request.method) {
                Some(handler) => handler(request).await,
                None => Response::error(
                    &request.id,
                    error_codes::METHOD_NOT_FOUND,
                    &format!("Method not found: {:?}", request.method),
                ),
            };
            (response, Next::Continue)
        };

        respond(tx, &response).await?;

        if let Next::Close = next {
            return Ok(());
        }
    }
}

/// Longest request line accepted, newline included.
const MAX_LINE_BYTES: usize = 1024 * 1024;

enum LineRead {
    Line,
    Oversized,
    Eof,
}

/// Read one line into `line`, never buffering more than `MAX_LINE_BYTES`.
/// An oversized line is consumed through its newline and reported.
async fn read_bounded_line(
    reader: &mut BufReader<OwnedReadHalf>,
    line: &mut Vec<u8>,
) -> std::io::Result<LineRead> {
    line.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', line)
        .await?;

    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if read < MAX_LINE_BYTES || line.ends_with(b"\n") {
        return Ok(LineRead::Line);
    }

    line.clear();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(LineRead::Oversized);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(LineRead::Oversized);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Bind the connection to a robot identity, greet it and deliver its backlog.
/// The response goes out after the backlog, so a robot that sees it has
/// seen everything that was waiting.
async fn identify(relay: &Relay, connection: ConnectionId, request: &Request) -> (Response, Next) {
    let params: IdentifyParams = match request.params_as() {
        Ok(params) => params,
        Err(response) => return (response, Next::Continue),
    };

    match relay
        .on_connection_identified(connection, params.robot.clone(), params.secret.as_deref())
        .await
    {
        Ok(report) => (
            Response::success(
                &request.id,
                serde_json::json!({
                    "identified": params.robot,
                    "delivered": report.delivered,
                    "complete": report.is_complete(),
                }),
            ),
            Next::Continue,
        ),
        Err(RelayError::Unauthorized) => (
            Response::error(&request.id, error_codes::UNAUTHORIZED, "Unauthorized"),
            Next::Close,
        ),
        Err(e) => (
            Response::error(&request.id, error_codes::INTERNAL_ERROR, &e.to_string()),
            Next::Continue,
        ),
    }
}

/// Pick the error for a line that did not decode as a request.
fn reject_unparsed(line: &str, err: &serde_json::Error) -> Response {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) => {
            let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("");
            match value.get("method") {
                Some(method) if serde_json::from_value::<Method>(method.clone()).is_err() => Response::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    &format!("Method not found: {}", method),
                ),
                _ => Response::error(
                    id,
                    error_codes::INVALID_REQUEST,
                    &format!("Invalid request: {}", err),
                ),
            }
        }
        Err(_) => Response::error("", error_codes::PARSE_ERROR, &format!("Parse error: {}", err)),
    }
}

async fn respond(tx: &FrameSender, response: &Response) -> IpcResult<()> {
    let response_json = response.to_json()?;
    debug!(response = %response_json, "Sending response");
    send_line(tx, response_json)
        .await
        .map_err(|_| IpcError::ConnectionClosed)
}

/// One-shot client: each call opens a connection, sends a request and
/// reads one response.
pub struct IpcClient {
    addr: SocketAddr,
}

impl IpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Open a connection, send `request` and read its single reply.
    pub async fn call(&self, request: Request) -> IpcResult<Response> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to connect: {}", e)))?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_request(&mut writer, &request).await?;

        let mut reply = String::new();
        if reader.read_line(&mut reply).await? == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        Ok(Response::from_json(reply.trim())?)
    }

    /// Call `method` without params.
    pub async fn call_method(&self, method: Method) -> IpcResult<Response> {
        self.call(Request::new(method)).await
    }

    /// Call `method` with `params`.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> IpcResult<Response> {
        self.call(Request::with_params(method, params)).await
    }

    /// Check if a relay is answering on this address.
    pub async fn is_running(&self) -> bool {
        self.call_method(Method::Health).await.is_ok()
    }
}

async fn write_request(writer: &mut OwnedWriteHalf, request: &Request) -> IpcResult<()> {
    let mut line = request.to_json()?.into_bytes();
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// A long-lived robot connection.
///
/// After `identify` the relay pushes events on this connection; read them
/// with `next_event`.
pub struct RobotConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl RobotConnection {
    pub async fn connect(addr: SocketAddr) -> IpcResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to connect: {}", e)))?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
        })
    }

    /// Identify as `robot`. Returns the events pushed before the response
    /// (welcome and any backlog), then the response itself.
    pub async fn identify(
        &mut self,
        robot: &str,
        secret: Option<&str>,
    ) -> IpcResult<(Vec<OutboundEvent>, Response)> {
        let request = Request::with_params(
            Method::RobotIdentify,
            serde_json::json!({ "robot": robot, "secret": secret }),
        );
        self.call(request).await
    }

    /// Send any request on this connection. Events that arrive before the
    /// matching response are returned alongside it.
    pub async fn call(&mut self, request: Request) -> IpcResult<(Vec<OutboundEvent>, Response)> {
        write_request(&mut self.writer, &request).await?;

        let mut events = Vec::new();
        loop {
            match self.next_frame().await? {
                Some(Frame::Event(event)) => events.push(event),
                Some(Frame::Response(response)) if response.id == request.id || response.id.is_empty() => {
                    return Ok((events, response));
                }
                Some(Frame::Response(response)) => {
                    warn!(id = %response.id, "Dropping response for another request");
                }
                None => return Err(IpcError::ConnectionClosed),
            }
        }
    }

    /// Wait for the next pushed event. `None` once the relay closed the connection.
    pub async fn next_event(&mut self) -> IpcResult<Option<OutboundEvent>> {
        match self.next_frame().await? {
            Some(Frame::Event(event)) => Ok(Some(event)),
            Some(Frame::Response(response)) => Err(IpcError::Protocol(format!(
                "Unexpected response {} while waiting for an event",
                response.id
            ))),
            None => Ok(None),
        }
    }

    async fn next_frame(&mut self) -> IpcResult<Option<Frame>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(Frame::from_json(trimmed)?));
        }
    }
}
