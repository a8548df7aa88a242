use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ============================================================================
// Credentials
// ============================================================================

/// Keys of the persisted credential set. All three are created on login and
/// removed together when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    Access,
    Refresh,
    User,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::Access,
        CredentialKey::Refresh,
        CredentialKey::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKey::Access => "access",
            CredentialKey::Refresh => "refresh",
            CredentialKey::User => "user",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Body of `POST /token/refresh/`.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Successful refresh response. `refresh` is only present when the backend
/// rotates refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedAccess {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Login form (never persisted)
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Adopter account
    #[default]
    Usuario,
    /// Animal shelter account
    Protectora,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Usuario => write!(f, "adopter"),
            UserRole::Protectora => write!(f, "shelter"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Account record as returned by the backend and cached under the `user` key.
/// Fields this client does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn is_shelter(&self) -> bool {
        self.role == UserRole::Protectora
    }

    pub fn is_adopter(&self) -> bool {
        self.role == UserRole::Usuario
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserRecord,
}

impl LoginResponse {
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access: self.access.clone(),
            refresh: self.refresh.clone(),
        }
    }
}

// ============================================================================
// Pets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetCard {
    pub id: u64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "especie_display", default)]
    pub species: Option<String>,
    #[serde(rename = "genero_display", default)]
    pub sex: Option<String>,
    #[serde(rename = "tamano_display", default)]
    pub size: Option<String>,
    #[serde(rename = "edad_clasificacion_display", default)]
    pub age: Option<String>,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "foto", default)]
    pub photo: Option<String>,
    #[serde(rename = "protectora", default)]
    pub shelter_id: Option<u64>,
    #[serde(rename = "protectora_nombre", default)]
    pub shelter_name: Option<String>,
    #[serde(rename = "protectora_ciudad", default)]
    pub shelter_city: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of asking the feed for the next card to swipe.
#[derive(Debug, Clone, PartialEq)]
pub enum NextCard {
    Card(Box<PetCard>),
    /// Every available pet has been swiped already
    Exhausted { message: String },
}

impl NextCard {
    /// The feed answers with either a pet or `{"status": "empty", "message": ...}`.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        if value.get("status").and_then(Value::as_str) == Some("empty") {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(NextCard::Exhausted { message });
        }

        serde_json::from_value(value)
            .map(|card| NextCard::Card(Box::new(card)))
            .map_err(|e| Error::InvalidServerResponse(format!("invalid pet card: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Dislike,
}

#[derive(Debug, Serialize)]
pub struct SwipeRequest {
    pub mascota_id: u64,
    pub action: SwipeAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwipeOutcome {
    #[serde(default)]
    pub status: String,
    pub is_like: bool,
    /// Chat opened with the shelter when the swipe was a like
    #[serde(default)]
    pub chat_id: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Favorites {
    #[serde(rename = "preferits_ids", default)]
    pub pet_ids: Vec<u64>,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(rename = "contenido")]
    pub content: String,
    #[serde(rename = "fecha_envio")]
    pub sent_at: DateTime<Utc>,
    #[serde(rename = "remitente")]
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: u64,
    #[serde(rename = "mascota", default)]
    pub pet_id: Option<u64>,
    #[serde(rename = "mascota_nombre", default)]
    pub pet_name: Option<String>,
    #[serde(rename = "adoptante_username", default)]
    pub adopter: Option<String>,
    #[serde(rename = "protectora_username", default)]
    pub shelter: Option<String>,
    #[serde(rename = "num_mensajes", default)]
    pub message_count: u32,
    #[serde(rename = "num_no_llegits", default)]
    pub unread_count: u32,
    #[serde(rename = "activo", default)]
    pub active: bool,
    #[serde(rename = "ultimo_mensaje", default)]
    pub last_message: Option<LastMessage>,
}

impl ChatSummary {
    /// Username of the other participant, seen from `me`.
    pub fn counterpart(&self, me: &str) -> Option<&str> {
        match (self.adopter.as_deref(), self.shelter.as_deref()) {
            (Some(adopter), shelter) if adopter == me => shelter,
            (adopter, _) => adopter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server id; messages only seen over the socket carry a negative local id.
    pub id: i64,
    #[serde(rename = "remitente_username")]
    pub sender: String,
    #[serde(rename = "contenido")]
    pub content: String,
    #[serde(rename = "fecha_envio")]
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatHandle {
    pub chat: ChatSummary,
    pub created: bool,
}

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Adopter,
    Shelter,
}

impl ProfileKind {
    pub fn path(self) -> &'static str {
        match self {
            ProfileKind::Adopter => "/perfil-usuario/",
            ProfileKind::Shelter => "/perfil-protectora/",
        }
    }
}
