//! Metrics SPI Port - Runtime Lifecycle Callbacks
//!
//! The host runtime reports connection, request, message and pool
//! lifecycle events through these traits. Each trait carries associated
//! types for the per-connection / per-request state the runtime hands
//! back on later callbacks, so an adapter can remember the label values
//! it resolved when the event began.
//!
//! Callbacks that end a lifecycle take that state by value: a request
//! can only be ended (or reset) once.

use std::fmt;

/// Connection-level callbacks shared by TCP and HTTP, client and server.
pub trait TcpMetrics: Send + Sync {
    /// Per-connection state returned by [`TcpMetrics::connected`].
    type Socket;

    /// A connection to/from the remote peer was established.
    fn connected(&self, remote_host: Option<&str>, remote_port: u16) -> Self::Socket;

    /// The connection was closed.
    fn disconnected(&self, socket: Self::Socket);

    /// Bytes were read from the connection.
    fn bytes_read(&self, socket: &Self::Socket, bytes: u64);

    /// Bytes were written to the connection.
    fn bytes_written(&self, socket: &Self::Socket, bytes: u64);

    /// An error occurred on the connection; `error_class` is its simple type name.
    fn exception_occurred(&self, socket: &Self::Socket, error_class: &str);
}

/// HTTP server callbacks.
pub trait HttpServerMetrics: TcpMetrics {
    /// Per-request state.
    type Request;
    /// Per-websocket state.
    type WebSocket;

    /// A request started being processed.
    fn request_begin(&self, socket: &Self::Socket, method: &str) -> Self::Request;

    /// The request was reset before a response completed.
    fn request_reset(&self, request: Self::Request);

    /// The server pushed a response (HTTP/2 push) on the connection.
    fn response_pushed(&self, socket: &Self::Socket, method: &str) -> Self::Request;

    /// The response was fully written.
    fn response_end(&self, request: Self::Request, status: u16);

    /// A websocket was accepted on the connection.
    fn websocket_connected(&self, socket: &Self::Socket) -> Self::WebSocket;

    /// The websocket was closed.
    fn websocket_disconnected(&self, websocket: Self::WebSocket);
}

/// HTTP client callbacks.
pub trait HttpClientMetrics: TcpMetrics {
    /// Per-request state.
    type Request;
    /// Per-websocket state.
    type WebSocket;

    /// A request was sent on the connection.
    fn request_begin(&self, socket: &Self::Socket, method: &str) -> Self::Request;

    /// The request was reset before its response completed.
    fn request_reset(&self, request: Self::Request);

    /// The response was fully received.
    fn response_end(&self, request: Self::Request, status: u16);

    /// A websocket was opened on the connection.
    fn websocket_connected(&self, socket: &Self::Socket) -> Self::WebSocket;

    /// The websocket was closed.
    fn websocket_disconnected(&self, websocket: Self::WebSocket);
}

/// Datagram socket callbacks.
pub trait DatagramSocketMetrics: Send + Sync {
    /// The socket is bound and listening.
    fn listening(&self, local_host: Option<&str>, local_port: u16);

    fn bytes_read(&self, bytes: u64);

    fn bytes_written(&self, bytes: u64);

    fn exception_occurred(&self, error_class: &str);
}

/// Why a request/reply exchange on the event bus failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFailure {
    Timeout,
    NoHandlers,
    RecipientFailure,
    Error,
}

impl fmt::Display for ReplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "TIMEOUT",
            Self::NoHandlers => "NO_HANDLERS",
            Self::RecipientFailure => "RECIPIENT_FAILURE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Event bus callbacks.
pub trait EventBusMetrics: Send + Sync {
    /// Per-consumer state.
    type Handler;
    /// Per-message processing state.
    type HandlerTiming;

    /// A consumer was registered on `address`.
    fn handler_registered(&self, address: &str) -> Self::Handler;

    /// The consumer was unregistered.
    fn handler_unregistered(&self, handler: Self::Handler);

    /// The consumer started processing a message.
    fn begin_handle_message(&self, handler: &Self::Handler, local: bool) -> Self::HandlerTiming;

    /// The consumer finished processing; `failure` is the simple type name of the error, if any.
    fn end_handle_message(
        &self,
        handler: &Self::Handler,
        timing: Self::HandlerTiming,
        failure: Option<&str>,
    );

    /// A message was sent (`publish = false`) or published.
    fn message_sent(&self, address: &str, publish: bool, local: bool);

    /// A message arrived and was dispatched to `handlers` consumers.
    fn message_received(&self, address: &str, publish: bool, local: bool, handlers: usize);

    /// A message was written to a cluster peer.
    fn message_written(&self, address: &str, bytes: u64);

    /// A message was read from a cluster peer.
    fn message_read(&self, address: &str, bytes: u64);

    /// A reply could not be delivered.
    fn reply_failure(&self, address: &str, failure: ReplyFailure);
}

/// Named pool callbacks (worker pools, datasources).
pub trait PoolMetrics: Send + Sync {
    /// State of a task waiting for a resource.
    type Task;
    /// State of a task holding a resource.
    type Usage;

    /// A task was queued for a resource.
    fn submitted(&self) -> Self::Task;

    /// The queued task was rejected.
    fn rejected(&self, task: Self::Task);

    /// The queued task acquired a resource.
    fn begin(&self, task: Self::Task) -> Self::Usage;

    /// The task released its resource.
    fn end(&self, usage: Self::Usage, succeeded: bool);
}

/// Verticle deployment callbacks.
pub trait VerticleMetrics: Send + Sync {
    fn deployed(&self, name: &str);

    fn undeployed(&self, name: &str);
}
