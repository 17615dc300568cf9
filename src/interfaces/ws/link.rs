//! WebSocket link
//!
//! Exactly one socket per link. The link owns a socket task doing the
//! blocking network I/O; its owner talks to it through a command
//! channel and receives `LinkEvent`s on the channel handed to
//! `WebSocketLink::connect`. No callbacks are stored anywhere.

use std::sync::Arc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, info, warn};

use super::options::ConnectionOptions;
use super::OCPP_SUBPROTOCOL;

// ── Public types ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Why a connected link went away (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    GoingAway,
    ServiceRestart,
    AbnormalClose,
    PongTimeout,
}

/// Why a connection attempt did not produce a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    InvalidTrustAnchor,
    UnauthorizedBasic,
    TlsHandshake,
    UnreachableNetwork,
    HandshakeRejected,
}

/// Events pushed to the owner, in order of occurrence.
#[derive(Debug)]
pub enum LinkEvent {
    Connected { security_profile: u8 },
    /// The socket dropped without a close handshake.
    Disconnected,
    /// The socket closed deliberately (by either side) or timed out
    /// waiting for a pong.
    Closed(CloseReason),
    /// A connection attempt failed before the link came up.
    Failed(ConnectionFailure),
    /// An inbound text frame.
    Frame(String),
}

enum LinkCommand {
    Send(String, oneshot::Sender<bool>),
    Close(CloseReason),
}

// ── WebSocketLink ──────────────────────────────────────────────

pub struct WebSocketLink {
    cmd_tx: mpsc::UnboundedSender<LinkCommand>,
    state_rx: watch::Receiver<LinkState>,
}

impl WebSocketLink {
    /// Start connecting; events (including the connect outcome) arrive
    /// on `events`.
    pub fn connect(options: ConnectionOptions, events: mpsc::Sender<LinkEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);

        tokio::spawn(run_link(options, events, cmd_rx, state_tx));

        Self { cmd_tx, state_rx }
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Send a text frame. Returns true only if the socket accepted the
    /// write and stayed open through it.
    pub async fn send(&self, text: String) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(LinkCommand::Send(text, ack_tx))
            .is_err()
        {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    /// Initiate a clean close; the link never reconnects by itself.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.cmd_tx.send(LinkCommand::Close(reason));
    }
}

// ── Socket task ────────────────────────────────────────────────

async fn run_link(
    options: ConnectionOptions,
    events: mpsc::Sender<LinkEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<LinkCommand>,
    state_tx: watch::Sender<LinkState>,
) {
    state_tx.send_replace(LinkState::Connecting);

    let connector = match build_tls_connector(&options) {
        Ok(connector) => connector,
        Err(failure) => {
            state_tx.send_replace(LinkState::Disconnected);
            let _ = events.send(LinkEvent::Failed(failure)).await;
            return;
        }
    };

    let request = match build_request(&options) {
        Ok(request) => request,
        Err(failure) => {
            state_tx.send_replace(LinkState::Disconnected);
            let _ = events.send(LinkEvent::Failed(failure)).await;
            return;
        }
    };

    info!(endpoint = %options.endpoint, "Connecting websocket");
    let (stream, response) =
        match connect_async_tls_with_config(request, None, false, connector).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(endpoint = %options.endpoint, error = %e, "Websocket connect failed");
                state_tx.send_replace(LinkState::Disconnected);
                let _ = events.send(LinkEvent::Failed(classify_error(&e))).await;
                return;
            }
        };

    let negotiated = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok());
    if negotiated != Some(OCPP_SUBPROTOCOL) {
        warn!(?negotiated, "CSMS did not accept the ocpp2.0.1 subprotocol");
        state_tx.send_replace(LinkState::Disconnected);
        let _ = events
            .send(LinkEvent::Failed(ConnectionFailure::HandshakeRejected))
            .await;
        return;
    }

    state_tx.send_replace(LinkState::Connected);
    let _ = events
        .send(LinkEvent::Connected {
            security_profile: options.security_profile,
        })
        .await;

    let (mut sink, mut stream) = stream.split();

    let mut ping_timer = options
        .ping_interval
        .map(|d| time::interval_at(Instant::now() + d, d));
    let mut pong_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(LinkCommand::Send(text, ack)) => {
                    let ok = sink.send(Message::Text(text)).await.is_ok();
                    let _ = ack.send(ok);
                    if !ok {
                        let _ = events.send(LinkEvent::Disconnected).await;
                        break;
                    }
                }
                Some(LinkCommand::Close(reason)) => {
                    state_tx.send_replace(LinkState::Closing);
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        })))
                        .await;
                    let _ = events.send(LinkEvent::Closed(reason)).await;
                    break;
                }
                // Owner dropped the link object; tear down silently.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::Frame(text)).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    pong_deadline = None;
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "CSMS closed the websocket");
                    let _ = events
                        .send(LinkEvent::Closed(close_reason_of(frame.as_ref())))
                        .await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Websocket read error");
                    let _ = events.send(LinkEvent::Disconnected).await;
                    break;
                }
                None => {
                    let _ = events.send(LinkEvent::Disconnected).await;
                    break;
                }
            },

            _ = next_tick(&mut ping_timer) => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    let _ = events.send(LinkEvent::Disconnected).await;
                    break;
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + options.pong_timeout);
                }
            },

            _ = at_deadline(pong_deadline) => {
                warn!("No pong within the timeout window");
                let _ = events.send(LinkEvent::Closed(CloseReason::PongTimeout)).await;
                break;
            },
        }
    }

    state_tx.send_replace(LinkState::Disconnected);
}

async fn next_tick(interval: &mut Option<time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn at_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}

// ── Handshake helpers ──────────────────────────────────────────

fn build_request(options: &ConnectionOptions) -> Result<Request<()>, ConnectionFailure> {
    let mut request = options
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(|_| ConnectionFailure::UnreachableNetwork)?;

    let headers = request.headers_mut();
    headers.insert(
        SEC_WEBSOCKET_PROTOCOL,
        OCPP_SUBPROTOCOL
            .parse()
            .map_err(|_| ConnectionFailure::UnreachableNetwork)?,
    );

    if let Some((user, pass)) = &options.basic_auth {
        let encoded = BASE64_STANDARD.encode(format!("{}:{}", user, pass));
        headers.insert(
            AUTHORIZATION,
            format!("Basic {}", encoded)
                .parse()
                .map_err(|_| ConnectionFailure::UnauthorizedBasic)?,
        );
    }

    Ok(request)
}

/// Build the rustls connector for wss endpoints. Without a configured
/// trust anchor bundle the platform roots are used (None lets
/// tokio-tungstenite pick its default connector).
fn build_tls_connector(
    options: &ConnectionOptions,
) -> Result<Option<Connector>, ConnectionFailure> {
    if !options.is_tls() {
        return Ok(None);
    }
    let Some(anchor_path) = &options.trust_anchor_path else {
        return Ok(None);
    };

    let file = std::fs::File::open(anchor_path)
        .map_err(|_| ConnectionFailure::InvalidTrustAnchor)?;
    let mut reader = std::io::BufReader::new(file);

    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|_| ConnectionFailure::InvalidTrustAnchor)?;
        roots
            .add(cert)
            .map_err(|_| ConnectionFailure::InvalidTrustAnchor)?;
    }
    if roots.is_empty() {
        return Err(ConnectionFailure::InvalidTrustAnchor);
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

    let config = match (&options.client_cert_path, &options.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let cert_file = std::fs::File::open(cert_path)
                .map_err(|_| ConnectionFailure::TlsHandshake)?;
            let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConnectionFailure::TlsHandshake)?;

            let key_file = std::fs::File::open(key_path)
                .map_err(|_| ConnectionFailure::TlsHandshake)?;
            let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
                .map_err(|_| ConnectionFailure::TlsHandshake)?
                .ok_or(ConnectionFailure::TlsHandshake)?;

            builder
                .with_client_auth_cert(certs, key)
                .map_err(|_| ConnectionFailure::TlsHandshake)?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Some(Connector::Rustls(Arc::new(config))))
}

fn classify_error(e: &WsError) -> ConnectionFailure {
    match e {
        WsError::Http(response) if response.status() == 401 || response.status() == 403 => {
            ConnectionFailure::UnauthorizedBasic
        }
        WsError::Http(_) => ConnectionFailure::HandshakeRejected,
        WsError::Tls(_) => ConnectionFailure::TlsHandshake,
        WsError::Io(_) => ConnectionFailure::UnreachableNetwork,
        _ => ConnectionFailure::UnreachableNetwork,
    }
}

fn close_reason_of(frame: Option<&CloseFrame<'_>>) -> CloseReason {
    match frame.map(|f| f.code) {
        Some(CloseCode::Normal) => CloseReason::Normal,
        Some(CloseCode::Away) => CloseReason::GoingAway,
        Some(CloseCode::Restart) => CloseReason::ServiceRestart,
        _ => CloseReason::AbnormalClose,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options(url: &str, profile: u8) -> ConnectionOptions {
        ConnectionOptions {
            endpoint: url::Url::parse(url).unwrap(),
            security_profile: profile,
            basic_auth: Some(("cp001".into(), "secret".into())),
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(10),
            trust_anchor_path: None,
            client_cert_path: None,
            client_key_path: None,
        }
    }

    #[test]
    fn request_carries_subprotocol_and_basic_auth() {
        let request = build_request(&options("ws://csms.example.com/ocpp/cp001", 1)).unwrap();
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "ocpp2.0.1"
        );
        let auth = request.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.starts_with("Basic "));
        assert_eq!(
            auth.trim_start_matches("Basic "),
            BASE64_STANDARD.encode("cp001:secret")
        );
    }

    #[test]
    fn missing_trust_anchor_file_is_reported() {
        let mut opts = options("wss://csms.example.com/ocpp/cp001", 2);
        opts.trust_anchor_path = Some("/nonexistent/ca.pem".into());
        let err = match build_tls_connector(&opts) {
            Err(failure) => failure,
            Ok(_) => panic!("expected build_tls_connector to fail"),
        };
        assert_eq!(err, ConnectionFailure::InvalidTrustAnchor);
    }

    #[test]
    fn plain_endpoint_needs_no_connector() {
        let connector = build_tls_connector(&options("ws://csms.example.com/x", 1)).unwrap();
        assert!(connector.is_none());
    }

    #[test]
    fn close_codes_map_to_closed_reasons() {
        assert_eq!(close_reason_of(None), CloseReason::AbnormalClose);
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "".into(),
        };
        assert_eq!(close_reason_of(Some(&frame)), CloseReason::GoingAway);
    }

    #[tokio::test]
    async fn failed_connect_emits_failed_event() {
        let (tx, mut rx) = mpsc::channel(8);
        // Port 9 (discard) on localhost: connection refused fast.
        let link = WebSocketLink::connect(options("ws://127.0.0.1:9/ocpp/cp001", 1), tx);
        match rx.recv().await {
            Some(LinkEvent::Failed(ConnectionFailure::UnreachableNetwork)) => {}
            other => panic!("expected Failed(UnreachableNetwork), got {:?}", other),
        }
        assert_eq!(link.state(), LinkState::Disconnected);
    }
}
