//! The remote duplex connection.
//!
//! A [`LiveConnection`] is two channels: outbound media in send order, and
//! inbound events in arrival order. Whatever transport sits behind it runs on
//! its own tasks. [`LiveConnection::close`] is explicit and idempotent.

use std::sync::Once;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{ParleyError, Result};
use crate::live::protocol::{
    parse_server_message, ClientMessage, InboundMessage, LiveSetup, OutboundMedia,
};

pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// What arrives from the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(InboundMessage),
    /// The remote side went away. Nothing follows this.
    Closed { reason: String },
}

pub struct LiveConnection {
    outbound: Option<mpsc::UnboundedSender<OutboundMedia>>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
    reader: Option<JoinHandle<()>>,
}

impl LiveConnection {
    /// Wrap transport channels. `reader` is aborted on close.
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundMedia>,
        inbound: mpsc::UnboundedReceiver<InboundEvent>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound: Some(outbound),
            inbound,
            reader,
        }
    }

    pub fn is_open(&self) -> bool {
        self.outbound
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Queue one media message. Never blocks.
    ///
    /// # Errors
    /// `ParleyError::Connection` once the connection is closed.
    pub fn send(&self, media: OutboundMedia) -> Result<()> {
        let tx = self
            .outbound
            .as_ref()
            .ok_or_else(|| ParleyError::Connection("connection is closed".into()))?;
        tx.send(media)
            .map_err(|_| ParleyError::Connection("transport has shut down".into()))
    }

    /// Next inbound event; `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.inbound.recv().await
    }

    /// Stop sending after the remote side has closed. Inbound stays readable.
    pub fn shutdown_outbound(&mut self) {
        self.outbound.take();
    }

    /// Close both directions. Calling it again is a no-op.
    pub fn close(&mut self) {
        let had_outbound = self.outbound.take().is_some();
        let had_reader = match self.reader.take() {
            Some(reader) => {
                reader.abort();
                true
            }
            None => false,
        };
        self.inbound.close();
        if had_outbound || had_reader {
            info!("live connection closed");
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`LiveConnection`]s.
pub trait LiveConnector: Send + Sync {
    /// Resolves once the remote side has accepted `setup`.
    fn connect(&self, setup: LiveSetup) -> BoxFuture<'static, Result<LiveConnection>>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Bidirectional streaming endpoint over a WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    api_key: String,
}

impl WebSocketConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// rustls needs a process-wide crypto provider before the first TLS
    /// handshake. Another component may have installed one already.
    fn ensure_crypto_provider() {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                debug!("rustls crypto provider already installed");
            }
        });
    }

    fn url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, sep, self.api_key)
    }
}

impl LiveConnector for WebSocketConnector {
    fn connect(&self, setup: LiveSetup) -> BoxFuture<'static, Result<LiveConnection>> {
        let url = self.url();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            Self::ensure_crypto_provider();
            info!(endpoint = endpoint.as_str(), model = setup.model.as_str(), "connecting");
            let (ws, _resp) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ParleyError::Connection(format!("connect {endpoint}: {e}")))?;
            let (mut sink, mut stream) = ws.split();

            sink.send(Message::Text(ClientMessage::setup(&setup).to_json()?))
                .await
                .map_err(|e| ParleyError::Connection(format!("send setup: {e}")))?;

            // Nothing counts as open until the server acknowledges the setup.
            loop {
                match stream.next().await {
                    Some(Ok(msg)) => match frame_text(&msg) {
                        Some(text) => {
                            let reply = parse_server_message(&text).map_err(|e| {
                                ParleyError::Connection(format!("unexpected setup reply: {e}"))
                            })?;
                            if reply.setup_complete {
                                break;
                            }
                        }
                        None => {
                            if let Message::Close(frame) = msg {
                                return Err(ParleyError::Connection(format!(
                                    "setup rejected: {}",
                                    close_reason(frame.as_ref())
                                )));
                            }
                        }
                    },
                    Some(Err(e)) => {
                        return Err(ParleyError::Connection(format!("awaiting setup: {e}")))
                    }
                    None => {
                        return Err(ParleyError::Connection(
                            "closed before setup completed".into(),
                        ))
                    }
                }
            }
            info!("live connection open");

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMedia>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundEvent>();

            tokio::spawn(async move {
                let mut sent = 0u64;
                while let Some(media) = out_rx.recv().await {
                    let text = match ClientMessage::audio(&media).to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            warn!("failed to encode outbound media: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(sent, "outbound send failed: {e}");
                        break;
                    }
                    sent += 1;
                }
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                debug!(sent, "outbound writer finished");
            });

            let reader = tokio::spawn(async move {
                let reason = loop {
                    match stream.next().await {
                        Some(Ok(msg)) => {
                            if let Message::Close(frame) = &msg {
                                break close_reason(frame.as_ref());
                            }
                            let Some(text) = frame_text(&msg) else {
                                continue;
                            };
                            match parse_server_message(&text) {
                                Ok(inbound) => {
                                    if in_tx.send(InboundEvent::Message(inbound)).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("dropping inbound frame: {e}"),
                            }
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream ended".to_string(),
                    }
                };
                let _ = in_tx.send(InboundEvent::Closed { reason });
            });

            Ok(LiveConnection::new(out_tx, in_rx, Some(reader)))
        })
    }
}

/// Text payload of a data frame. The endpoint sends JSON in either kind.
fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.to_string()),
        Message::Binary(b) => String::from_utf8(b.to_vec()).ok(),
        _ => None,
    }
}

fn close_reason(
    frame: Option<&tokio_tungstenite::tungstenite::protocol::CloseFrame<'_>>,
) -> String {
    match frame {
        Some(f) if !f.reason.is_empty() => format!("{} ({})", f.reason, u16::from(f.code)),
        Some(f) => format!("code {}", u16::from(f.code)),
        None => "no close frame".into(),
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// The far end of a [`ChannelConnector`] connection.
pub struct RemotePeer {
    pub setup: LiveSetup,
    /// Media the session sent, in order.
    pub outbound: mpsc::UnboundedReceiver<OutboundMedia>,
    /// Push messages to the session.
    pub inbound: mpsc::UnboundedSender<InboundEvent>,
}

/// Connector backed by channels instead of a network. Each successful
/// connect hands a [`RemotePeer`] to whoever holds the receiver.
pub struct ChannelConnector {
    peers: mpsc::UnboundedSender<RemotePeer>,
    reject_with: Option<String>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemotePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                reject_with: None,
            },
            rx,
        )
    }

    /// A connector whose every attempt fails with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        let (peers, _rx) = mpsc::unbounded_channel();
        Self {
            peers,
            reject_with: Some(reason.into()),
        }
    }
}

impl LiveConnector for ChannelConnector {
    fn connect(&self, setup: LiveSetup) -> BoxFuture<'static, Result<LiveConnection>> {
        if let Some(reason) = &self.reject_with {
            let err = ParleyError::Connection(reason.clone());
            return Box::pin(async move { Err(err) });
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = RemotePeer {
            setup,
            outbound: out_rx,
            inbound: in_tx,
        };
        let delivered = self.peers.send(peer).is_ok();
        Box::pin(async move {
            if !delivered {
                return Err(ParleyError::Connection("no remote peer listening".into()));
            }
            Ok(LiveConnection::new(out_tx, in_rx, None))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::chunk::EncodedAudioChunk;

    fn setup() -> LiveSetup {
        LiveSetup {
            model: "m".into(),
            system_instruction: "s".into(),
        }
    }

    #[tokio::test]
    async fn channel_connection_round_trip_and_idempotent_close() {
        let (connector, mut peers) = ChannelConnector::new();
        let mut conn = connector.connect(setup()).await.expect("connect");
        let mut peer = peers.recv().await.expect("peer");
        assert_eq!(peer.setup.system_instruction, "s");

        let media = OutboundMedia::pcm16(&EncodedAudioChunk::new("AAA=", 16_000));
        conn.send(media.clone()).unwrap();
        assert_eq!(peer.outbound.recv().await, Some(media.clone()));

        peer.inbound
            .send(InboundEvent::Message(InboundMessage::default()))
            .unwrap();
        assert!(matches!(conn.recv().await, Some(InboundEvent::Message(_))));

        assert!(conn.is_open());
        conn.close();
        conn.close();
        assert!(!conn.is_open());
        assert!(matches!(conn.send(media), Err(ParleyError::Connection(_))));
        assert_eq!(peer.outbound.recv().await, None);
    }

    #[tokio::test]
    async fn failed_tls_handshake_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and hang up before any TLS bytes are exchanged.
            if let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let connector = WebSocketConnector::new(format!("wss://127.0.0.1:{port}/live"), "k");
        let err = connector.connect(setup()).await.err().expect("must fail");
        assert!(matches!(err, ParleyError::Connection(_)), "got {err:?}");
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }

    #[tokio::test]
    async fn rejecting_connector_fails_with_connection_error() {
        let connector = ChannelConnector::rejecting("bad config");
        let err = connector.connect(setup()).await.err().expect("must fail");
        assert!(matches!(err, ParleyError::Connection(ref m) if m == "bad config"));
    }

    #[tokio::test]
    async fn shutdown_outbound_keeps_inbound_readable() {
        let (connector, mut peers) = ChannelConnector::new();
        let mut conn = connector.connect(setup()).await.unwrap();
        let peer = peers.recv().await.unwrap();

        peer.inbound
            .send(InboundEvent::Closed {
                reason: "bye".into(),
            })
            .unwrap();
        conn.shutdown_outbound();
        assert!(!conn.is_open());
        assert_eq!(
            conn.recv().await,
            Some(InboundEvent::Closed {
                reason: "bye".into()
            })
        );
    }

    #[test]
    fn websocket_url_appends_key() {
        let c = WebSocketConnector::new("wss://host/path", "k1");
        assert_eq!(c.url(), "wss://host/path?key=k1");
        let c = WebSocketConnector::new("wss://host/path?alt=x", "k1");
        assert_eq!(c.url(), "wss://host/path?alt=x&key=k1");
    }
}
