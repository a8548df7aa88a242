//! WebSocket connection to the chat relay.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use petconnect_core::chat::{SocketEvent, SocketFrame};
use petconnect_core::config::ApiSettings;
use petconnect_core::ports::ChatConnection;
use petconnect_core::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsChatConnection {
    sink: Mutex<SplitSink<Socket, Message>>,
    stream: Mutex<SplitStream<Socket>>,
}

impl WsChatConnection {
    /// Open a connection to `settings.ws_url`. The relay only accepts
    /// whitelisted origins, so `settings.ws_origin` is sent as `Origin`.
    #[instrument(skip_all, fields(url = %settings.ws_url))]
    pub async fn connect(settings: &ApiSettings) -> Result<Self, Error> {
        let mut request = settings
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::WebSocket(format!("invalid relay url: {}", e)))?;

        let origin = HeaderValue::from_str(&settings.ws_origin)
            .map_err(|e| Error::WebSocket(format!("invalid origin: {}", e)))?;
        request.headers_mut().insert("Origin", origin);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| Error::WebSocket(format!("failed to connect to chat relay: {}", e)))?;

        debug!("connected to chat relay");
        let (sink, stream) = socket.split();
        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl ChatConnection for WsChatConnection {
    async fn send(&self, frame: &SocketFrame) -> Result<(), Error> {
        let text = serde_json::to_string(frame)
            .map_err(|e| Error::WebSocket(format!("failed to encode frame: {}", e)))?;

        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::WebSocket(format!("failed to send frame: {}", e)))
    }

    async fn recv(&self) -> Result<Option<SocketEvent>, Error> {
        let mut stream = self.stream.lock().await;

        while let Some(message) = stream.next().await {
            let message =
                message.map_err(|e| Error::WebSocket(format!("failed to read frame: {}", e)))?;

            match message {
                Message::Text(text) => match serde_json::from_str::<SocketEvent>(&text) {
                    Ok(SocketEvent::Unknown) => debug!("ignoring unknown frame type"),
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!(error = %e, "ignoring malformed frame"),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }

        Ok(None)
    }

    async fn close(&self) -> Result<(), Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| Error::WebSocket(format!("failed to close connection: {}", e)))
    }
}
