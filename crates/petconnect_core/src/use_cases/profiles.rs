use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::instrument;

use crate::api_client::ApiClient;
use crate::entities::ProfileKind;
use crate::error::Error;

/// Profile records are passed through as the backend shapes them.
pub type Profile = Map<String, Value>;

/// Adopter and shelter profiles. Writes go out as multipart forms so that
/// uploads share one code path with plain fields.
pub struct ProfilesUseCase {
    api: Arc<ApiClient>,
}

impl ProfilesUseCase {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, kind: ProfileKind) -> Result<Vec<Profile>, Error> {
        self.api.get(kind.path()).await
    }

    #[instrument(skip(self, fields))]
    pub async fn create(&self, kind: ProfileKind, fields: &Profile) -> Result<Profile, Error> {
        self.api
            .post_multipart(kind.path(), multipart_fields(fields))
            .await
    }

    #[instrument(skip(self, fields))]
    pub async fn update(
        &self,
        kind: ProfileKind,
        id: u64,
        fields: &Profile,
    ) -> Result<Profile, Error> {
        self.api
            .patch_multipart(&format!("{}{}/", kind.path(), id), multipart_fields(fields))
            .await
    }
}

/// Flatten a JSON object into form fields: nulls are left out, strings are
/// sent as-is and everything else as its JSON text.
pub fn multipart_fields(fields: &Profile) -> Vec<(String, String)> {
    fields
        .iter()
        .filter_map(|(name, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((name.clone(), text))
        })
        .collect()
}
