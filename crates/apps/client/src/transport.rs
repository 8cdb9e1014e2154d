use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use streaming::{Transport, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Frames queued between the session and the socket writer.
const WRITE_QUEUE: usize = 256;

/// Hands frames to a writer task that owns the socket sink.
///
/// `send` never blocks: a full queue is reported as a transport error.
#[derive(Debug)]
pub struct WsTransport {
    tx: mpsc::Sender<Bytes>,
}

impl WsTransport {
    pub fn spawn<S>(mut sink: S) -> (Self, JoinHandle<()>)
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: std::fmt::Display + Send,
    {
        let (tx, mut rx) = mpsc::channel::<Bytes>(WRITE_QUEUE);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let len = frame.len();
                if let Err(e) = sink.send(Message::Binary(frame.into())).await {
                    warn!("failed to send frame: {e}");
                    break;
                }
                debug!(bytes = len, "frame sent");
            }
            let _ = sink.close().await;
        });
        (Self { tx }, writer)
    }
}

impl Transport for WsTransport {
    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .try_send(Bytes::from(frame))
            .map_err(|e| TransportError::new(format!("writer unavailable: {e}")))
    }
}
