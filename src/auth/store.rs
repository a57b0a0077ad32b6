//! Durable key/value storage of token records, scoped per service id

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;

use super::error::StoreError;
use super::tokens::PersistedTokenRecord;

const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_TOKEN_SECRET: &str = "token_secret";
const KEY_EXPIRES_IN: &str = "expires_in";
const KEY_ISSUED_AT: &str = "issued_at";

/// Storage backend for persisted tokens.
pub trait CredentialStore: Send + Sync {
    /// Load the complete record for `service_id`. Partial records load as `None`.
    fn load(&self, service_id: &str) -> Result<Option<PersistedTokenRecord>, StoreError>;
    /// Overwrite every field of the record for `service_id` in one step.
    fn save(&self, service_id: &str, record: &PersistedTokenRecord) -> Result<(), StoreError>;
}

/// Key under which one field of a service's record is stored.
fn scoped_key(service_id: &str, key: &str) -> String {
    format!("{}_{}", service_id, key)
}

fn record_entries(service_id: &str, record: &PersistedTokenRecord) -> [(String, String); 5] {
    [
        (
            scoped_key(service_id, KEY_ACCESS_TOKEN),
            record.access_token.clone(),
        ),
        (
            scoped_key(service_id, KEY_REFRESH_TOKEN),
            record.refresh_token.clone(),
        ),
        (
            scoped_key(service_id, KEY_TOKEN_SECRET),
            record.token_secret.clone(),
        ),
        (
            scoped_key(service_id, KEY_EXPIRES_IN),
            record.expires_in.to_string(),
        ),
        (
            scoped_key(service_id, KEY_ISSUED_AT),
            record.issued_at.to_string(),
        ),
    ]
}

/// Rebuild a record from the key/value view. Any missing or unparseable field
/// means there is no usable record.
fn record_from<F>(service_id: &str, get: F) -> Option<PersistedTokenRecord>
where
    F: Fn(&str) -> Option<String>,
{
    let field = |key: &str| get(&scoped_key(service_id, key));
    let record = PersistedTokenRecord {
        access_token: field(KEY_ACCESS_TOKEN)?,
        refresh_token: field(KEY_REFRESH_TOKEN)?,
        token_secret: field(KEY_TOKEN_SECRET)?,
        expires_in: field(KEY_EXPIRES_IN)?.parse().ok()?,
        issued_at: field(KEY_ISSUED_AT)?.parse().ok()?,
    };
    Some(record)
}

/// Credential store backed by a single TOML file of flat string keys.
///
/// Saves rewrite the whole file through a temp file and a rename, so a
/// concurrent reader sees either the previous or the new record.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the platform data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf, StoreError> {
        let proj_dirs =
            ProjectDirs::from("net", "mirror-feeds", "mirror-feeds").ok_or(StoreError::NoDataDir)?;
        Ok(proj_dirs.data_dir().join("credentials.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&content)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(map)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;

        // Contains tokens
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, service_id: &str) -> Result<Option<PersistedTokenRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let map = self.read_map()?;
        let record = record_from(service_id, |key| map.get(key).cloned());
        if record.is_none() {
            tracing::debug!("No complete token record for {}", service_id);
        }
        Ok(record)
    }

    fn save(&self, service_id: &str, record: &PersistedTokenRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        map.extend(record_entries(service_id, record));
        self.write_map(&map)?;
        tracing::debug!("Saved token record for {} to {}", service_id, self.path.display());
        Ok(())
    }
}

/// In-memory store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one raw key, for staging partial records.
    #[cfg(test)]
    pub fn put_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), value.into());
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, service_id: &str) -> Result<Option<PersistedTokenRecord>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(record_from(service_id, |key| entries.get(key).cloned()))
    }

    fn save(&self, service_id: &str, record: &PersistedTokenRecord) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.extend(record_entries(service_id, record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str) -> PersistedTokenRecord {
        PersistedTokenRecord {
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
            token_secret: String::new(),
            expires_in: 10800,
            issued_at: 1_700_000_123,
        }
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.toml");

        let store = FileCredentialStore::new(&path);
        assert_eq!(store.load("withings").unwrap(), None);
        store.save("withings", &record("a")).unwrap();
        drop(store);

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.load("withings").unwrap(), Some(record("a")));
    }

    #[test]
    fn test_file_store_scopes_by_service() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.toml"));

        store.save("withings", &record("w")).unwrap();
        store.save("fitbit", &record("f")).unwrap();
        store.save("withings", &record("w2")).unwrap();

        assert_eq!(store.load("withings").unwrap(), Some(record("w2")));
        assert_eq!(store.load("fitbit").unwrap(), Some(record("f")));
        assert_eq!(store.load("other").unwrap(), None);
        assert!(!dir.path().join("credentials.toml.tmp").exists());
    }

    #[test]
    fn test_file_store_partial_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        fs::write(
            &path,
            concat!(
                "withings_access_token = \"a\"\n",
                "withings_refresh_token = \"r\"\n",
                "withings_token_secret = \"\"\n",
                "withings_expires_in = \"3600\"\n",
            ),
        )
        .unwrap();

        let store = FileCredentialStore::new(&path);
        assert_eq!(store.load("withings").unwrap(), None);
    }

    #[test]
    fn test_file_store_bad_number_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let store = FileCredentialStore::new(&path);
        store.save("withings", &record("a")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        fs::write(
            &path,
            content.replace("\"1700000123\"", "\"yesterday\""),
        )
        .unwrap();

        assert_eq!(store.load("withings").unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.load("withings"), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_memory_store_partial_record_is_absent() {
        let store = MemoryCredentialStore::new();
        store.put_raw("withings_access_token", "a");
        store.put_raw("withings_refresh_token", "r");
        assert_eq!(store.load("withings").unwrap(), None);

        store.save("withings", &record("m")).unwrap();
        assert_eq!(store.load("withings").unwrap(), Some(record("m")));
    }
}
