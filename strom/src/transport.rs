//! Transport abstraction for carrying whole JSON-RPC messages
//!
//! A transport is a duplex carrier of [`Message`]s; framing is the
//! transport's problem. For any single instance, sends preserve order on the
//! wire and inbound delivery follows the order the peer sent messages.

use std::future::Future;

use uuid::Uuid;

use crate::error::{Error, ErrorCode};
use crate::types::Message;

pub use memory::{MemoryReceiver, MemorySender, MemoryTransport};

pub mod http;
pub mod memory;

/// The outbound half of a transport.
///
/// `send` completes when the message is handed to the underlying carrier,
/// not when the peer observed it. Instances are cheap to clone; the engine
/// funnels all sends through one path.
pub trait Sender {
    /// Sends a message to the peer.
    fn send(&self, msg: Message) -> impl Future<Output = Result<(), Error>> + Send;
}

/// The inbound half of a transport.
pub trait Receiver {
    /// Receives the next message from the peer; errors once the carrier is
    /// closed.
    fn recv(&mut self) -> impl Future<Output = Result<Message, Error>> + Send;
}

/// A duplex carrier bound to exactly one protocol session.
pub trait Transport {
    type Sender: Sender + Clone + Send + Sync + 'static;
    type Receiver: Receiver + Send + 'static;

    /// Begins delivering messages. May be called at most once.
    fn start(&mut self) -> Result<(), Error>;

    /// The session id, when the transport participates in a multi-session
    /// carrier. Presence means the session was already negotiated and the
    /// engine skips the initialize handshake.
    fn session_id(&self) -> Option<Uuid>;

    /// Splits the transport into halves usable from different tasks.
    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// All supported transport protocols.
pub enum TransportProto {
    None,
    Memory(MemoryTransport),
    HttpSession(http::HttpSessionTransport),
}

/// The outbound half of [`TransportProto`].
#[derive(Clone)]
pub enum TransportSender {
    None,
    Memory(MemorySender),
    HttpSession(http::HttpSessionSender),
}

/// The inbound half of [`TransportProto`].
pub enum TransportReceiver {
    None,
    Memory(MemoryReceiver),
    HttpSession(http::HttpSessionReceiver),
}

impl Default for TransportProto {
    #[inline]
    fn default() -> Self {
        TransportProto::None
    }
}

fn no_transport() -> Error {
    Error::new(ErrorCode::InternalError, "Transport protocol must be specified")
}

impl Sender for TransportSender {
    #[inline]
    async fn send(&self, msg: Message) -> Result<(), Error> {
        match self {
            TransportSender::Memory(memory) => memory.send(msg).await,
            TransportSender::HttpSession(http) => http.send(msg).await,
            TransportSender::None => Err(no_transport()),
        }
    }
}

impl Receiver for TransportReceiver {
    #[inline]
    async fn recv(&mut self) -> Result<Message, Error> {
        match self {
            TransportReceiver::Memory(memory) => memory.recv().await,
            TransportReceiver::HttpSession(http) => http.recv().await,
            TransportReceiver::None => Err(no_transport()),
        }
    }
}

impl Transport for TransportProto {
    type Sender = TransportSender;
    type Receiver = TransportReceiver;

    #[inline]
    fn start(&mut self) -> Result<(), Error> {
        match self {
            TransportProto::Memory(memory) => memory.start(),
            TransportProto::HttpSession(http) => http.start(),
            TransportProto::None => Ok(()),
        }
    }

    #[inline]
    fn session_id(&self) -> Option<Uuid> {
        match self {
            TransportProto::Memory(memory) => memory.session_id(),
            TransportProto::HttpSession(http) => http.session_id(),
            TransportProto::None => None,
        }
    }

    fn split(self) -> (Self::Sender, Self::Receiver) {
        match self {
            TransportProto::Memory(memory) => {
                let (tx, rx) = memory.split();
                (TransportSender::Memory(tx), TransportReceiver::Memory(rx))
            }
            TransportProto::HttpSession(http) => {
                let (tx, rx) = http.split();
                (TransportSender::HttpSession(tx), TransportReceiver::HttpSession(rx))
            }
            TransportProto::None => (TransportSender::None, TransportReceiver::None),
        }
    }
}

impl From<MemoryTransport> for TransportProto {
    #[inline]
    fn from(memory: MemoryTransport) -> Self {
        Self::Memory(memory)
    }
}
