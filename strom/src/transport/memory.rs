//! In-process duplex transport
//!
//! The reference transport: two cross-wired unbounded channels, used to
//! connect a [`crate::App`] and a [`crate::Client`] inside one process and
//! throughout the test suite. Channel delivery gives the FIFO guarantee the
//! transport contract requires.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, ErrorCode};
use crate::transport::{Receiver, Sender, Transport};
use crate::types::Message;

/// One end of an in-process duplex pair.
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Message>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
}

/// Creates a connected pair of in-process transports.
pub fn duplex() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    (
        MemoryTransport { tx: a_tx, rx: Some(b_rx) },
        MemoryTransport { tx: b_tx, rx: Some(a_rx) },
    )
}

/// The outbound half of a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemorySender {
    tx: mpsc::UnboundedSender<Message>,
}

/// The inbound half of a [`MemoryTransport`].
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Sender for MemorySender {
    #[inline]
    async fn send(&self, msg: Message) -> Result<(), Error> {
        self.tx
            .send(msg)
            .map_err(|_| Error::from(ErrorCode::ConnectionClosed))
    }
}

impl Receiver for MemoryReceiver {
    #[inline]
    async fn recv(&mut self) -> Result<Message, Error> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::from(ErrorCode::ConnectionClosed))
    }
}

impl Transport for MemoryTransport {
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;

    fn start(&mut self) -> Result<(), Error> {
        if self.rx.is_none() {
            return Err(Error::new(ErrorCode::InternalError, "Transport already started"));
        }
        Ok(())
    }

    fn session_id(&self) -> Option<Uuid> {
        None
    }

    fn split(self) -> (Self::Sender, Self::Receiver) {
        let rx = self.rx.expect("memory transport split twice");
        (MemorySender { tx: self.tx }, MemoryReceiver { rx })
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Notification;
    use super::*;

    #[tokio::test]
    async fn it_delivers_messages_in_order() {
        let (a, b) = duplex();
        let (a_tx, _) = a.split();
        let (_, mut b_rx) = b.split();

        for i in 0..5 {
            a_tx.send(Notification::new(&format!("n{i}"), None).into()).await.unwrap();
        }

        for i in 0..5 {
            let msg = b_rx.recv().await.unwrap();
            match msg {
                Message::Notification(n) => assert_eq!(n.method, format!("n{i}")),
                _ => panic!("expected notification"),
            }
        }
    }

    #[tokio::test]
    async fn it_reports_closed_peer() {
        let (a, b) = duplex();
        let (a_tx, a_rx) = a.split();
        drop(b);
        drop(a_rx);

        let err = a_tx.send(Notification::new("n", None).into()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionClosed);
    }

    #[tokio::test]
    async fn it_is_full_duplex() {
        let (a, b) = duplex();
        let (a_tx, mut a_rx) = a.split();
        let (b_tx, mut b_rx) = b.split();

        a_tx.send(Notification::new("from_a", None).into()).await.unwrap();
        b_tx.send(Notification::new("from_b", None).into()).await.unwrap();

        assert!(b_rx.recv().await.is_ok());
        assert!(a_rx.recv().await.is_ok());
    }
}
