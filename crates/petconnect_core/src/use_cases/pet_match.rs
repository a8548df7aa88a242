use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::api_client::ApiClient;
use crate::entities::{Favorites, NextCard, PetCard, SwipeAction, SwipeOutcome, SwipeRequest};
use crate::error::Error;

const NEXT_CARD_PATH: &str = "/feed/next-card/";
const SWIPE_PATH: &str = "/swipe/action/";
const FAVORITES_PATH: &str = "/preferits/";

/// Swipe feed for adopters.
pub struct PetMatchUseCase {
    api: Arc<ApiClient>,
}

impl PetMatchUseCase {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    #[instrument(skip(self))]
    pub async fn next_card(&self) -> Result<NextCard, Error> {
        let value: Value = self.api.get(NEXT_CARD_PATH).await?;
        NextCard::from_value(value)
    }

    /// Like or dislike a pet. A like opens a chat with its shelter, or reuses
    /// the existing one.
    #[instrument(skip(self))]
    pub async fn swipe(&self, pet_id: u64, action: SwipeAction) -> Result<SwipeOutcome, Error> {
        let outcome: SwipeOutcome = self
            .api
            .post(
                SWIPE_PATH,
                &SwipeRequest {
                    mascota_id: pet_id,
                    action,
                },
            )
            .await?;

        if let Some(chat_id) = outcome.chat_id {
            info!(chat_id, "match opened a chat");
        }
        Ok(outcome)
    }

    pub async fn pet(&self, pet_id: u64) -> Result<PetCard, Error> {
        self.api.get(&format!("/mascota/{}/", pet_id)).await
    }

    pub async fn favorites(&self) -> Result<Vec<u64>, Error> {
        let favorites: Favorites = self.api.get(FAVORITES_PATH).await?;
        Ok(favorites.pet_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ApiResponse, Body};
    use crate::test_support::{InMemoryStore, ScriptedTransport};
    use serde_json::json;

    fn use_case(transport: &Arc<ScriptedTransport>) -> PetMatchUseCase {
        let store = Arc::new(InMemoryStore::with_tokens("T1", "R1"));
        PetMatchUseCase::new(Arc::new(ApiClient::new(transport.clone(), store)))
    }

    #[tokio::test]
    async fn test_next_card_exhausted_feed() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(ApiResponse::new(
                200,
                r#"{"status": "empty", "message": "No hi ha més mascotes"}"#,
            ))
        }));

        let card = use_case(&transport).next_card().await.unwrap();

        assert!(matches!(card, NextCard::Exhausted { ref message } if message == "No hi ha més mascotes"));
        assert_eq!(transport.requests()[0].path, NEXT_CARD_PATH);
    }

    #[tokio::test]
    async fn test_like_reports_chat() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(ApiResponse::new(
                201,
                r#"{"status": "ok", "is_like": true, "chat_id": 15, "message": "Match!"}"#,
            ))
        }));

        let outcome = use_case(&transport)
            .swipe(12, SwipeAction::Like)
            .await
            .unwrap();

        assert!(outcome.is_like);
        assert_eq!(outcome.chat_id, Some(15));
        let sent = transport.requests();
        assert_eq!(sent[0].path, SWIPE_PATH);
        assert_eq!(
            sent[0].body,
            Some(Body::Json(json!({"mascota_id": 12, "action": "like"})))
        );
    }

    #[tokio::test]
    async fn test_pet_and_favorites() {
        let transport = Arc::new(ScriptedTransport::new(|request| {
            match request.path.as_str() {
                "/mascota/12/" => Ok(ApiResponse::new(200, r#"{"id": 12, "nombre": "Luna"}"#)),
                FAVORITES_PATH => Ok(ApiResponse::new(200, r#"{"preferits_ids": [12, 30]}"#)),
                _ => Ok(ApiResponse::new(404, r#"{"detail": "Not found."}"#)),
            }
        }));
        let pets = use_case(&transport);

        assert_eq!(pets.pet(12).await.unwrap().name, "Luna");
        assert_eq!(pets.favorites().await.unwrap(), [12, 30]);
        assert_eq!(pets.pet(99).await.unwrap_err().status(), Some(404));
    }
}
