use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::token::record::TokenRecord;
use crate::utils::constants::{ENV_ACCESS_TOKEN, ENV_EXPIRES_AT, ENV_REFRESH_TOKEN};

/// Durable home of the token record.
///
/// `load` never fails: whatever cannot be read degrades to the next fallback
/// and finally to an unauthenticated record. `save` replaces the whole record.
pub trait TokenStore: Send + Sync + 'static {
    fn load(&self) -> impl Future<Output = TokenRecord> + Send;

    fn save(&self, record: &TokenRecord) -> impl Future<Output = Result<()>> + Send;
}

/// Store selected at startup.
#[derive(Debug)]
pub enum TokenStoreKind {
    File(FileTokenStore),
    Memory(MemoryTokenStore),
}

impl TokenStore for TokenStoreKind {
    async fn load(&self) -> TokenRecord {
        match self {
            TokenStoreKind::File(s) => s.load().await,
            TokenStoreKind::Memory(s) => s.load().await,
        }
    }

    async fn save(&self, record: &TokenRecord) -> Result<()> {
        match self {
            TokenStoreKind::File(s) => s.save(record).await,
            TokenStoreKind::Memory(s) => s.save(record).await,
        }
    }
}

/// ================================
/// JSON file with atomic replace
/// ================================
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_file(&self) -> Result<Option<TokenRecord>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str::<TokenRecord>(&content)
                .map(Some)
                .map_err(|e| anyhow!("token file '{}' is corrupt: {}", self.path.display(), e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("token file '{}' unreadable: {}", self.path.display(), e)),
        }
    }
}

impl TokenStore for FileTokenStore {
    async fn load(&self) -> TokenRecord {
        match self.read_file().await {
            Ok(Some(record)) => {
                info!("token record loaded from '{}'", self.path.display());
                record
            }
            Ok(None) => {
                info!("no token file at '{}', trying environment seed", self.path.display());
                bootstrap_from_env()
            }
            Err(e) => {
                warn!("{}, trying environment seed", e);
                bootstrap_from_env()
            }
        }
    }

    async fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        let content = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&tmp, &self.path).await?;
        debug!("token record written to '{}'", self.path.display());
        Ok(())
    }
}

/// Seed record from `REFRESH_TOKEN`, `ACCESS_TOKEN` and `EXPIRES_AT`.
/// Read once at startup and never written back by itself.
pub fn bootstrap_from_env() -> TokenRecord {
    let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    let refresh_token = non_empty(ENV_REFRESH_TOKEN);
    let access_token = non_empty(ENV_ACCESS_TOKEN);
    let expires_at = non_empty(ENV_EXPIRES_AT)
        .and_then(|v| {
            v.trim()
                .parse::<i64>()
                .inspect_err(|e| warn!("ignoring {}='{}': {}", ENV_EXPIRES_AT, v, e))
                .ok()
        })
        .unwrap_or(0);

    let record = TokenRecord::new(access_token, refresh_token, expires_at);
    if record.is_empty() {
        info!("no bootstrap tokens in environment, starting unauthenticated");
        TokenRecord::default()
    } else {
        info!("token record seeded from environment");
        record
    }
}

/// ================================
/// In-memory store
/// ================================
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: Mutex<TokenRecord>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new(record: TokenRecord) -> Self {
        Self { record: Mutex::new(record), ..Default::default() }
    }

    /// Every subsequent `save` returns an error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> TokenRecord {
        self.record.lock().await.clone()
    }
}

impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> TokenRecord {
        self.record.lock().await.clone()
    }

    async fn save(&self, record: &TokenRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store configured to fail"));
        }
        *self.record.lock().await = record.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
