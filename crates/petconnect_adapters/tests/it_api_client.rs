//! End-to-end tests of the authenticated client over a real HTTP transport

use std::sync::Arc;

use mockito::{Matcher, Server};
use petconnect_adapters::{build_api_client, MemoryCredentialStore};
use petconnect_core::config::ApiSettings;
use petconnect_core::entities::{CredentialKey, ProfileKind};
use petconnect_core::ports::CredentialStore;
use petconnect_core::use_cases::{PetMatchUseCase, ProfilesUseCase};
use petconnect_core::{ApiClient, Error};
use serde_json::json;

async fn signed_in_store() -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(CredentialKey::Access, "T1").await.unwrap();
    store.set(CredentialKey::Refresh, "R1").await.unwrap();
    store
        .set(CredentialKey::User, r#"{"id": 7, "username": "anna"}"#)
        .await
        .unwrap();
    store
}

fn client(base_url: String, store: Arc<MemoryCredentialStore>) -> Arc<ApiClient> {
    let settings = ApiSettings {
        base_url,
        ..ApiSettings::default()
    };
    Arc::new(build_api_client(&settings, store).expect("Failed to build client"))
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_request_retried() {
    //* Given
    let mut server = Server::new_async().await;
    let store = signed_in_store().await;

    let expired = server
        .mock("GET", "/api/preferits/")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .with_body(r#"{"detail": "Given token not valid for any token type"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"refresh": "R1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "T2"}"#)
        .expect(1)
        .create_async()
        .await;
    let renewed = server
        .mock("GET", "/api/preferits/")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"preferits_ids": [4, 9]}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let pets = PetMatchUseCase::new(client(format!("{}/api", server.url()), store.clone()));
    let favorites = pets.favorites().await.expect("Failed to fetch favorites");

    //* Then
    expired.assert_async().await;
    refresh.assert_async().await;
    renewed.assert_async().await;
    assert_eq!(favorites, [4, 9]);
    assert_eq!(
        store.get(CredentialKey::Access).await.unwrap().as_deref(),
        Some("T2")
    );
    assert_eq!(
        store.get(CredentialKey::Refresh).await.unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn rejected_refresh_signs_the_user_out() {
    //* Given
    let mut server = Server::new_async().await;
    let store = signed_in_store().await;

    let expired = server
        .mock("GET", "/api/feed/next-card/")
        .with_status(401)
        .with_body(r#"{"detail": "Given token not valid for any token type"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(401)
        .with_body(r#"{"detail": "Token is invalid or expired", "code": "token_not_valid"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let pets = PetMatchUseCase::new(client(format!("{}/api", server.url()), store.clone()));
    let err = pets.next_card().await.unwrap_err();

    //* Then
    expired.assert_async().await;
    refresh.assert_async().await;
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.detail().as_deref(), Some("Token is invalid or expired"));
    for key in CredentialKey::ALL {
        assert!(store.get(key).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn profile_update_is_sent_as_multipart_with_bearer() {
    //* Given
    let mut server = Server::new_async().await;
    let store = signed_in_store().await;

    let update = server
        .mock("PATCH", "/api/perfil-usuario/3/")
        .match_header("authorization", "Bearer T1")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="barrio""#.to_string()),
            Matcher::Regex(r#"\["gos","gat"\]"#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 3, "barrio": "Gràcia"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let profiles = ProfilesUseCase::new(client(format!("{}/api", server.url()), store));
    let fields = json!({"barrio": "Gràcia", "preferencias": ["gos", "gat"], "foto": null});
    let updated = profiles
        .update(ProfileKind::Adopter, 3, fields.as_object().unwrap())
        .await
        .expect("Failed to update profile");

    //* Then
    update.assert_async().await;
    assert_eq!(updated.get("barrio"), Some(&json!("Gràcia")));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    //* Given
    let store = signed_in_store().await;

    //* When
    let pets = PetMatchUseCase::new(client("http://127.0.0.1:9/api".to_string(), store.clone()));
    let err = pets.favorites().await.unwrap_err();

    //* Then
    assert!(matches!(err, Error::Network(_)));
    assert_eq!(
        store.get(CredentialKey::Access).await.unwrap().as_deref(),
        Some("T1")
    );
}
