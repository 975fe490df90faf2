//! WebSocket transport split into an outbound sender and an inbound receiver.
//!
//! Writes go through an unbounded channel drained by a writer task, so
//! [`TransportSender::send_text`] never blocks and can be called while a
//! lock is held.

use std::borrow::Cow;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use termlink_protocol::close_code;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer closes without a status.
const NO_STATUS: u16 = 1005;

/// Inbound socket event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Text(String),
	/// The socket is gone; carries the close code (1006 for abnormal drops).
	Closed(u16),
}

/// Both halves of an open socket.
pub struct TransportParts {
	pub sender: TransportSender,
	pub receiver: TransportReceiver,
}

/// Opens WebSocket connections.
pub struct WebSocketTransport;

impl WebSocketTransport {
	pub async fn connect(url: &Url) -> Result<TransportParts> {
		let (socket, _response) = connect_async(url.as_str()).await.map_err(|e| Error::ConnectionFailed(e.to_string()))?;
		let (sink, stream) = socket.split();
		let (tx, rx) = mpsc::unbounded_channel();
		tokio::spawn(write_loop(sink, rx));
		Ok(TransportParts {
			sender: TransportSender { tx },
			receiver: TransportReceiver { stream, closed: false },
		})
	}
}

/// Outbound half. Dropping it lets the writer flush and close the sink.
#[derive(Debug)]
pub struct TransportSender {
	tx: mpsc::UnboundedSender<Message>,
}

impl TransportSender {
	/// Queues a text frame. Returns `false` once the writer has stopped.
	pub fn send_text(&self, text: String) -> bool {
		self.tx.send(Message::Text(text)).is_ok()
	}

	pub fn is_open(&self) -> bool {
		!self.tx.is_closed()
	}

	/// Queues a close frame and releases the sender.
	pub fn close(self, code: u16, reason: &'static str) {
		let frame = CloseFrame {
			code: CloseCode::from(code),
			reason: Cow::Borrowed(reason),
		};
		let _ = self.tx.send(Message::Close(Some(frame)));
	}
}

/// Inbound half.
pub struct TransportReceiver {
	stream: SplitStream<Socket>,
	closed: bool,
}

impl TransportReceiver {
	/// Waits for the next text frame or the end of the socket.
	///
	/// After [`Inbound::Closed`] has been returned once, every later call
	/// returns it again without touching the stream.
	pub async fn recv(&mut self) -> Inbound {
		if self.closed {
			return Inbound::Closed(close_code::ABNORMAL);
		}
		loop {
			match self.stream.next().await {
				Some(Ok(Message::Text(text))) => return Inbound::Text(text),
				Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
					Ok(text) => return Inbound::Text(text),
					Err(_) => tracing::warn!(target: "termlink::transport", "dropping non-UTF-8 binary frame"),
				},
				Some(Ok(Message::Close(frame))) => {
					self.closed = true;
					return Inbound::Closed(close_code_of(frame.as_ref()));
				}
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					tracing::debug!(target: "termlink::transport", error = %err, "socket read failed");
					self.closed = true;
					return Inbound::Closed(close_code::ABNORMAL);
				}
				None => {
					self.closed = true;
					return Inbound::Closed(close_code::ABNORMAL);
				}
			}
		}
	}
}

fn close_code_of(frame: Option<&CloseFrame<'_>>) -> u16 {
	frame.map_or(NO_STATUS, |f| u16::from(f.code))
}

async fn write_loop(mut sink: SplitSink<Socket, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
	while let Some(message) = rx.recv().await {
		let closing = matches!(message, Message::Close(_));
		if let Err(err) = sink.send(message).await {
			tracing::debug!(target: "termlink::transport", error = %err, "socket write failed");
			return;
		}
		if closing {
			break;
		}
	}
	let _ = sink.close().await;
}
