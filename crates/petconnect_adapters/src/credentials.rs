use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use directories::ProjectDirs;
use keyring::credential::CredentialBuilderApi;
use keyring::{CredentialBuilder, Entry};
use petconnect_core::config::{CredentialBackend, StorageSettings};
use petconnect_core::entities::{CredentialKey, TokenPair, UserRecord};
use petconnect_core::ports::CredentialStore;
use petconnect_core::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const SERVICE_NAME: &str = "petconnect";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Credential store selected by `storage.backend`.
///
/// The keyring is checked with a throwaway entry first. When it cannot keep a
/// value the file store is used instead.
pub async fn open_credential_store(
    settings: &StorageSettings,
) -> Result<Arc<dyn CredentialStore>, Error> {
    match settings.backend {
        CredentialBackend::File => Ok(Arc::new(file_store(settings)?)),
        CredentialBackend::Keyring => keyring_or_file(KeyringCredentialStore::new(), settings).await,
        CredentialBackend::Memory => Ok(Arc::new(MemoryCredentialStore::new())),
    }
}

async fn keyring_or_file(
    keyring: KeyringCredentialStore,
    settings: &StorageSettings,
) -> Result<Arc<dyn CredentialStore>, Error> {
    match keyring.verify().await {
        Ok(()) => {
            debug!("using keyring credential store");
            Ok(Arc::new(keyring))
        }
        Err(e) => {
            warn!(error = %e, "keyring cannot keep credentials, falling back to the file store");
            Ok(Arc::new(file_store(settings)?))
        }
    }
}

fn file_store(settings: &StorageSettings) -> Result<FileCredentialStore, Error> {
    let dir = match &settings.dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    debug!(dir = %dir.display(), "using file credential store");
    Ok(FileCredentialStore::new(dir))
}

pub fn default_data_dir() -> Result<PathBuf, Error> {
    ProjectDirs::from("com", "petconnect", "petconnect")
        .map(|d| d.data_local_dir().to_path_buf())
        .ok_or_else(|| Error::CredentialStorage("no home directory found".to_string()))
}

// ============================================================================
// Keyring
// ============================================================================

const CHECK_ENTRY: &str = "store-check";

/// OS keyring store, one entry per credential key
pub struct KeyringCredentialStore {
    builder: Option<Arc<CredentialBuilder>>,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self { builder: None }
    }

    /// Entries are built by `builder` instead of the platform keyring.
    pub fn with_builder(builder: Box<CredentialBuilder>) -> Self {
        Self {
            builder: Some(Arc::from(builder)),
        }
    }

    fn get_entry(&self, user: &str) -> Result<Entry, Error> {
        let entry = match &self.builder {
            Some(builder) => builder
                .build(None, SERVICE_NAME, user)
                .map(Entry::new_with_credential),
            None => Entry::new(SERVICE_NAME, user),
        };
        entry.map_err(|e| Error::CredentialStorage(format!("failed to create keyring entry: {}", e)))
    }

    /// Store a throwaway value and read it back through a second handle.
    ///
    /// Fails when the keyring has no backing store, which is the case when no
    /// platform backend is compiled in.
    #[instrument(skip(self))]
    pub async fn verify(&self) -> Result<(), Error> {
        let writer = self.get_entry(CHECK_ENTRY)?;
        let reader = self.get_entry(CHECK_ENTRY)?;
        let expected = format!("check-{}", std::process::id());

        tokio::task::spawn_blocking(move || {
            writer
                .set_password(&expected)
                .map_err(|e| Error::CredentialStorage(format!("keyring rejected a write: {}", e)))?;
            let read = reader.get_password();
            if let Err(e) = writer.delete_credential() {
                debug!(error = %e, "failed to delete keyring check entry");
            }

            match read {
                Ok(value) if value == expected => Ok(()),
                Ok(_) => Err(Error::CredentialStorage(
                    "keyring returned a different value".to_string(),
                )),
                Err(keyring::Error::NoEntry) => Err(Error::CredentialStorage(
                    "keyring did not keep a stored value".to_string(),
                )),
                Err(e) => Err(Error::CredentialStorage(format!(
                    "failed to read back keyring entry: {}",
                    e
                ))),
            }
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    #[instrument(skip(self))]
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, Error> {
        let entry = self.get_entry(key.as_str())?;

        tokio::task::spawn_blocking(move || match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::CredentialStorage(format!(
                "failed to read {}: {}",
                key, e
            ))),
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), Error> {
        let entry = self.get_entry(key.as_str())?;

        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            entry
                .set_password(&value)
                .map_err(|e| Error::CredentialStorage(format!("failed to store {}: {}", key, e)))
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: CredentialKey) -> Result<(), Error> {
        let entry = self.get_entry(key.as_str())?;

        tokio::task::spawn_blocking(move || {
            match entry.delete_credential() {
                Ok(()) => Ok(()),
                Err(keyring::Error::NoEntry) => Ok(()), // Already gone
                Err(e) => Err(Error::CredentialStorage(format!(
                    "failed to delete {}: {}",
                    key, e
                ))),
            }
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }

    /// Every key is attempted even if an earlier one fails.
    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), Error> {
        let mut first_error = None;
        for key in CredentialKey::ALL {
            if let Err(e) = self.remove(key).await {
                warn!(%key, error = %e, "failed to clear keyring entry");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// ============================================================================
// File
// ============================================================================

/// All three keys in one JSON document under the data directory.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            path: data_dir.join(CREDENTIALS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, Error> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        serde_json::from_str(&content).map_err(|e| {
            Error::CredentialStorage(format!("failed to parse credentials file: {}", e))
        })
    }

    /// Write to a sibling file and rename it over the document.
    async fn save(&self, values: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(values).map_err(|e| {
            Error::CredentialStorage(format!("failed to serialize credentials: {}", e))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[instrument(skip(self))]
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key.as_str()))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.as_str().to_string(), value.to_string());
        self.save(&values).await
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: CredentialKey) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key.as_str()).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.save(&BTreeMap::new()).await
    }

    /// All three keys land in a single rewrite of the document.
    #[instrument(skip_all)]
    async fn store_session(&self, tokens: &TokenPair, user: &UserRecord) -> Result<(), Error> {
        let user_json = serde_json::to_string(user)
            .map_err(|e| Error::CredentialStorage(format!("failed to serialize user: {}", e)))?;

        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        for (key, value) in [
            (CredentialKey::Access, tokens.access.as_str()),
            (CredentialKey::Refresh, tokens.refresh.as_str()),
            (CredentialKey::User, user_json.as_str()),
        ] {
            values.insert(key.as_str().to_string(), value.to_string());
        }
        self.save(&values).await
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local store; nothing outlives the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, Error> {
        Ok(self.values.lock().await.get(&key).cloned())
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), Error> {
        self.values.lock().await.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: CredentialKey) -> Result<(), Error> {
        self.values.lock().await.remove(&key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.values.lock().await.clear();
        Ok(())
    }
}
