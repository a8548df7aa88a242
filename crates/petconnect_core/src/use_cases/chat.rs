use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::api_client::ApiClient;
use crate::chat::{ChatTimeline, SocketFrame};
use crate::entities::{ChatHandle, ChatMessage, ChatSummary, UserRecord};
use crate::error::Error;
use crate::ports::ChatConnection;

const CHATS_PATH: &str = "/chat/chats/";
const GET_OR_CREATE_PATH: &str = "/chat/chats/obtener_o_crear/";

#[derive(Serialize)]
struct GetOrCreate {
    mascota_id: u64,
}

#[derive(Serialize)]
struct NewMessage<'a> {
    contenido: &'a str,
}

/// A chat ready to be displayed: its metadata and the messages so far.
#[derive(Debug, Clone)]
pub struct OpenChat {
    pub info: ChatSummary,
    pub timeline: ChatTimeline,
}

/// Conversations between adopters and shelters.
///
/// The REST API stores messages; a [`ChatConnection`] only relays them to
/// whoever is currently online.
pub struct ChatUseCase {
    api: Arc<ApiClient>,
}

impl ChatUseCase {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, Error> {
        self.api.get(CHATS_PATH).await
    }

    pub async fn chat_info(&self, chat_id: u64) -> Result<ChatSummary, Error> {
        self.api
            .get(&format!("{}{}/info/", CHATS_PATH, chat_id))
            .await
    }

    /// Full history, oldest first. The server marks the other side's messages
    /// as read.
    pub async fn history(&self, chat_id: u64) -> Result<Vec<ChatMessage>, Error> {
        self.api.get(&format!("{}{}/", CHATS_PATH, chat_id)).await
    }

    #[instrument(skip(self))]
    pub async fn open(&self, chat_id: u64) -> Result<OpenChat, Error> {
        let info = self.chat_info(chat_id).await?;
        let history = self.history(chat_id).await?;
        debug!(messages = history.len(), "chat loaded");

        Ok(OpenChat {
            info,
            timeline: ChatTimeline::new(chat_id, history),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_or_create(&self, pet_id: u64) -> Result<ChatHandle, Error> {
        self.api
            .post(GET_OR_CREATE_PATH, &GetOrCreate { mascota_id: pet_id })
            .await
    }

    /// Register on the relay for `chat_id`.
    pub async fn join(
        &self,
        connection: &dyn ChatConnection,
        user: &UserRecord,
        chat_id: u64,
    ) -> Result<(), Error> {
        connection
            .send(&SocketFrame::authenticate(user, chat_id))
            .await
    }

    /// Send a message to the chat of `timeline`.
    ///
    /// The message is relayed first when a connection is given, then stored
    /// through the API. A relay failure is only logged. The stored message is
    /// added to the timeline unless it already arrived as an echo.
    #[instrument(skip_all, fields(chat_id = timeline.chat_id()))]
    pub async fn send_message(
        &self,
        timeline: &mut ChatTimeline,
        sender: &UserRecord,
        content: &str,
        connection: Option<&dyn ChatConnection>,
    ) -> Result<ChatMessage, Error> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Other("message is empty".to_string()));
        }

        if let Some(connection) = connection {
            if let Err(e) = connection.send(&SocketFrame::message(sender, content)).await {
                warn!(error = %e, "failed to relay message");
            }
        }

        let stored: ChatMessage = self
            .api
            .post(
                &format!("{}{}/enviar_mensaje/", CHATS_PATH, timeline.chat_id()),
                &NewMessage { contenido: content },
            )
            .await?;

        if !timeline.confirm_sent(stored.clone(), Utc::now()) {
            debug!(id = stored.id, "stored message already shown");
        }
        Ok(stored)
    }

    /// Tell the relay whether the local user is typing.
    pub async fn announce_typing(
        &self,
        connection: &dyn ChatConnection,
        user: &UserRecord,
        is_typing: bool,
    ) -> Result<(), Error> {
        connection.send(&SocketFrame::typing(user, is_typing)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SocketEvent;
    use crate::http::{ApiResponse, Body};
    use crate::test_support::{InMemoryStore, ScriptedTransport};
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;

    const STORED: &str = r#"{"id": 41, "remitente_username": "anna", "contenido": "Hola!", "fecha_envio": "2024-05-01T10:00:00Z"}"#;

    fn use_case(transport: &Arc<ScriptedTransport>) -> ChatUseCase {
        let store = Arc::new(InMemoryStore::with_tokens("T1", "R1"));
        ChatUseCase::new(Arc::new(ApiClient::new(transport.clone(), store)))
    }

    fn anna() -> UserRecord {
        UserRecord {
            id: 7,
            username: "anna".to_string(),
            email: None,
            role: Default::default(),
            extra: Map::new(),
        }
    }

    #[derive(Default)]
    struct RecordingConnection {
        frames: Mutex<Vec<SocketFrame>>,
        broken: bool,
    }

    #[async_trait]
    impl ChatConnection for RecordingConnection {
        async fn send(&self, frame: &SocketFrame) -> Result<(), Error> {
            if self.broken {
                return Err(Error::WebSocket("connection reset".to_string()));
            }
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        async fn recv(&self) -> Result<Option<SocketEvent>, Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_open_loads_info_and_history() {
        let transport = Arc::new(ScriptedTransport::new(|request| {
            match request.path.as_str() {
                "/chat/chats/3/info/" => Ok(ApiResponse::new(
                    200,
                    r#"{"id": 3, "mascota": 12, "adoptante_username": "anna", "protectora_username": "refugi", "activo": true}"#,
                )),
                "/chat/chats/3/" => Ok(ApiResponse::new(200, format!("[{}]", STORED))),
                _ => Ok(ApiResponse::new(404, "{}")),
            }
        }));

        let chat = use_case(&transport).open(3).await.unwrap();

        assert_eq!(chat.info.counterpart("anna"), Some("refugi"));
        assert_eq!(chat.timeline.chat_id(), 3);
        assert_eq!(chat.timeline.messages()[0].content, "Hola!");
    }

    #[tokio::test]
    async fn test_get_or_create_by_pet() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(ApiResponse::new(201, r#"{"chat": {"id": 8}, "created": true}"#))
        }));

        let handle = use_case(&transport).get_or_create(12).await.unwrap();

        assert!(handle.created);
        assert_eq!(handle.chat.id, 8);
        let sent = transport.requests();
        assert_eq!(sent[0].path, GET_OR_CREATE_PATH);
        assert_eq!(sent[0].body, Some(Body::Json(json!({"mascota_id": 12}))));
    }

    #[tokio::test]
    async fn test_send_relays_then_stores() {
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(ApiResponse::new(201, STORED))));
        let connection = RecordingConnection::default();
        let mut timeline = ChatTimeline::new(3, Vec::new());

        let stored = use_case(&transport)
            .send_message(&mut timeline, &anna(), "  Hola!  ", Some(&connection))
            .await
            .unwrap();

        assert_eq!(stored.id, 41);
        assert_eq!(timeline.messages(), [stored]);
        assert_eq!(
            *connection.frames.lock().unwrap(),
            [SocketFrame::message(&anna(), "Hola!")]
        );
        let sent = transport.requests();
        assert_eq!(sent[0].path, "/chat/chats/3/enviar_mensaje/");
        assert_eq!(sent[0].body, Some(Body::Json(json!({"contenido": "Hola!"}))));
    }

    #[tokio::test]
    async fn test_relay_failure_is_not_fatal() {
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(ApiResponse::new(201, STORED))));
        let connection = RecordingConnection {
            broken: true,
            ..Default::default()
        };
        let mut timeline = ChatTimeline::new(3, Vec::new());

        let result = use_case(&transport)
            .send_message(&mut timeline, &anna(), "Hola!", Some(&connection))
            .await;

        assert!(result.is_ok());
        assert_eq!(timeline.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_locally() {
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(ApiResponse::new(201, STORED))));
        let mut timeline = ChatTimeline::new(3, Vec::new());

        let result = use_case(&transport)
            .send_message(&mut timeline, &anna(), "   ", None)
            .await;

        assert!(result.is_err());
        assert!(transport.requests().is_empty());
        assert!(timeline.messages().is_empty());
    }

    #[tokio::test]
    async fn test_join_and_typing_frames() {
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(ApiResponse::new(200, "{}"))));
        let connection = RecordingConnection::default();
        let chats = use_case(&transport);

        chats.join(&connection, &anna(), 3).await.unwrap();
        chats.announce_typing(&connection, &anna(), true).await.unwrap();

        assert_eq!(
            *connection.frames.lock().unwrap(),
            [
                SocketFrame::Authenticate {
                    user_id: 7,
                    chat_id: 3
                },
                SocketFrame::typing(&anna(), true),
            ]
        );
    }
}
