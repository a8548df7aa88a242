//! In-process fakes of the ports for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::entities::CredentialKey;
use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse};
use crate::ports::{CredentialStore, HttpTransport};

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, Error> + Send + Sync>;

/// Answers every request with a handler and records what was sent.
pub struct ScriptedTransport {
    handler: Handler,
    delays: HashMap<String, Duration>,
    sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<ApiResponse, Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delays: HashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Make requests to `path` take `delay` before they are answered.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        self.sent.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }
        (self.handler)(request)
    }
}

/// Credential store that counts mutations made through the port.
#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<CredentialKey, String>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let store = Self::default();
        store.put(CredentialKey::Access, access);
        store.put(CredentialKey::Refresh, refresh);
        store
    }

    /// Seed a value without counting it as a write.
    pub fn put(&self, key: CredentialKey, value: &str) {
        self.values.lock().unwrap().insert(key, value.to_string());
    }

    pub fn value(&self, key: CredentialKey) -> Option<String> {
        self.values.lock().unwrap().get(&key).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, Error> {
        Ok(self.value(key))
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.put(key, value);
        Ok(())
    }

    async fn remove(&self, key: CredentialKey) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().unwrap().remove(&key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().unwrap().clear();
        Ok(())
    }
}
