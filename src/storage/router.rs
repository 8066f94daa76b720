//! (provider, store_name) -> 物理库 的路由
//!
//! 两个缓存都在首次访问时创建，进程生命周期内不淘汰；
//! 每个 key 最多只打开一个物理库。

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::app_config::settings::DataSettings;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    pub provider: String,
    pub store_name: String,
}

impl StoreKey {
    pub fn new(provider: &str, store_name: &str) -> Self {
        Self {
            provider: provider.to_string(),
            store_name: store_name.to_string(),
        }
    }

    /// 物理文件名：`{provider}_{store_name}.db`
    pub fn file_name(&self) -> String {
        format!("{}_{}.db", self.provider, self.store_name)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.provider, self.store_name)
    }
}

/// 一个已打开的物理库
#[derive(Debug)]
pub struct Store {
    key: StoreKey,
    path: PathBuf,
    pool: SqlitePool,
}

impl Store {
    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// 绑定到某个物理库的会话工厂
pub struct SessionFactory {
    key: StoreKey,
    pool: SqlitePool,
}

impl SessionFactory {
    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn session(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }
}

pub struct StoreRouter {
    data_path: PathBuf,
    max_connections: u32,
    stores: Mutex<HashMap<StoreKey, Arc<Store>>>,
    sessions: Mutex<HashMap<StoreKey, Arc<SessionFactory>>>,
}

impl StoreRouter {
    pub fn new(settings: &DataSettings) -> Self {
        Self {
            data_path: settings.data_path.clone(),
            max_connections: settings.max_connections.max(1),
            stores: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn store_path(&self, key: &StoreKey) -> PathBuf {
        self.data_path.join(key.file_name())
    }

    /// 获取或创建物理库；锁在创建期间一直持有，保证同一个 key 只打开一次
    pub async fn store(&self, provider: &str, store_name: &str) -> Result<Arc<Store>> {
        let key = StoreKey::new(provider, store_name);
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        tokio::fs::create_dir_all(&self.data_path).await?;
        let path = self.store_path(&key);
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await?;
        info!("opened store {} at {}", key, path.display());

        let store = Arc::new(Store {
            key: key.clone(),
            path,
            pool,
        });
        stores.insert(key, store.clone());
        Ok(store)
    }

    /// 获取或创建会话工厂，首次创建时绑定到对应的物理库
    pub async fn session_factory(&self, provider: &str, store_name: &str) -> Result<Arc<SessionFactory>> {
        let key = StoreKey::new(provider, store_name);
        let mut sessions = self.sessions.lock().await;
        if let Some(factory) = sessions.get(&key) {
            return Ok(factory.clone());
        }

        let store = self.store(provider, store_name).await?;
        debug!("bind session factory to store {}", key);
        let factory = Arc::new(SessionFactory {
            key: key.clone(),
            pool: store.pool().clone(),
        });
        sessions.insert(key, factory.clone());
        Ok(factory)
    }

    pub async fn open_stores(&self) -> Vec<StoreKey> {
        let mut keys: Vec<StoreKey> = self.stores.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 关闭所有连接池，进程退出前调用
    pub async fn close_all(&self) {
        for (key, store) in self.stores.lock().await.iter() {
            store.pool().close().await;
            debug!("closed store {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_is_cached_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let router = StoreRouter::new(&DataSettings::new(dir.path()));

        let a = router.store("sina", "meta").await.unwrap();
        let b = router.store("sina", "meta").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.path(), dir.path().join("sina_meta.db"));
        assert!(a.path().exists());

        let c = router.store("eastmoney", "meta").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(
            router.open_stores().await,
            vec![StoreKey::new("eastmoney", "meta"), StoreKey::new("sina", "meta")]
        );
    }

    #[tokio::test]
    async fn test_session_factory_is_bound_once() {
        let dir = tempfile::tempdir().unwrap();
        let router = StoreRouter::new(&DataSettings::new(dir.path()));

        assert!(router.open_stores().await.is_empty());
        let first = router.session_factory("netease", "stock_1d_kdata").await.unwrap();
        let second = router.session_factory("netease", "stock_1d_kdata").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(router.open_stores().await, vec![StoreKey::new("netease", "stock_1d_kdata")]);

        let mut conn = first.session().await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&mut *conn).await.unwrap();
        assert_eq!(one, 1);
    }
}
