//! 记录类型注册中心
//!
//! 持有 provider -> store、store -> schema group、entity_type -> 记录类型、
//! 记录类型 -> provider / recorder 的映射，并负责按需建库、建表、建索引。
//! 每个进程（或每个测试）构造一个实例，通过 `Arc` 传给查询和读取组件。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::app_config::settings::DataSettings;
use crate::domain::{RecordType, SchemaGroup};
use crate::error::{DataError, Result};
use crate::recorder::Recorder;
use crate::storage::ddl;
use crate::storage::router::{SessionFactory, Store, StoreKey, StoreRouter};

/// 按 store 名或记录类型定位物理库
#[derive(Debug, Clone, Copy)]
pub enum StoreRef<'a> {
    Name(&'a str),
    Record(&'a RecordType),
}

impl<'a> From<&'a str> for StoreRef<'a> {
    fn from(name: &'a str) -> Self {
        StoreRef::Name(name)
    }
}

impl<'a> From<&'a RecordType> for StoreRef<'a> {
    fn from(record_type: &'a RecordType) -> Self {
        StoreRef::Record(record_type)
    }
}

impl<'a> From<&'a Arc<RecordType>> for StoreRef<'a> {
    fn from(record_type: &'a Arc<RecordType>) -> Self {
        StoreRef::Record(record_type.as_ref())
    }
}

#[derive(Default)]
struct RegistryState {
    providers: Vec<String>,
    entity_types: Vec<String>,
    // provider -> [store_name1, store_name2...]
    provider_stores: HashMap<String, Vec<String>>,
    // store_name -> schema group，保持注册顺序
    store_groups: Vec<(String, SchemaGroup)>,
    // entity_type -> 记录类型
    entity_schemas: HashMap<String, Arc<RecordType>>,
    // 记录类型名 -> [provider...]，第一个为默认
    record_providers: HashMap<String, Vec<String>>,
    // 记录类型名 -> [recorder...]，第一个为默认
    recorders: HashMap<String, Vec<Arc<dyn Recorder>>>,
    // 建表、建索引已成功的 (provider, store)
    prepared: HashSet<StoreKey>,
}

impl RegistryState {
    fn group_of(&self, store_name: &str) -> Option<&SchemaGroup> {
        self.store_groups
            .iter()
            .find(|(name, _)| name == store_name)
            .map(|(_, group)| group)
    }

    fn bind_group(&mut self, store_name: &str, group: &SchemaGroup) {
        match self.store_groups.iter_mut().find(|(name, _)| name == store_name) {
            Some((_, existing)) => *existing = group.clone(),
            None => self.store_groups.push((store_name.to_string(), group.clone())),
        }
    }

    fn bind_entity(&mut self, entity_type: &str, record_type: &Arc<RecordType>) -> Result<()> {
        if let Some(existing) = self.entity_schemas.get(entity_type) {
            if existing.name() != record_type.name() {
                warn!(
                    "entity type {} already bound to {}, rejecting {}",
                    entity_type,
                    existing.name(),
                    record_type.name()
                );
                return Err(DataError::AmbiguousEntityType {
                    entity_type: entity_type.to_string(),
                    existing: existing.name().to_string(),
                    incoming: record_type.name().to_string(),
                });
            }
        }
        if !self.entity_types.iter().any(|t| t == entity_type) {
            self.entity_types.push(entity_type.to_string());
        }
        self.entity_schemas
            .insert(entity_type.to_string(), record_type.clone());
        Ok(())
    }
}

pub struct SchemaRegistry {
    router: StoreRouter,
    state: RwLock<RegistryState>,
    // 串行化注册与建表，避免同一个 (provider, store) 被并发初始化
    ddl_lock: Mutex<()>,
}

impl SchemaRegistry {
    pub fn new(settings: &DataSettings) -> Self {
        Self {
            router: StoreRouter::new(settings),
            state: RwLock::new(RegistryState::default()),
            ddl_lock: Mutex::new(()),
        }
    }

    pub fn router(&self) -> &StoreRouter {
        &self.router
    }

    /// 注册一组记录类型到 `store_name`，对每个 provider：
    /// 记录 provider 的 store 列表、绑定 store -> group、绑定实体类型、
    /// 建库、建表、建索引。重复调用是安全的。
    ///
    /// `entity_type` 只作用于组内的实体类记录；不传时使用类型名小写。
    pub async fn register(
        &self,
        providers: &[&str],
        store_name: &str,
        group: &SchemaGroup,
        entity_type: Option<&str>,
    ) -> Result<()> {
        let entity_records: Vec<&Arc<RecordType>> = group
            .record_types()
            .iter()
            .filter(|r| r.has_entity_fields())
            .collect();
        if let (Some(entity_type), [first, second, ..]) = (entity_type, entity_records.as_slice()) {
            return Err(DataError::AmbiguousEntityType {
                entity_type: entity_type.to_string(),
                existing: first.name().to_string(),
                incoming: second.name().to_string(),
            });
        }

        let _guard = self.ddl_lock.lock().await;

        {
            let mut state = self.state.write().await;
            // group 可能变化，所有 provider 下的这个 store 都需要重新检查表结构
            state.prepared.retain(|key| key.store_name != store_name);
            for record_type in &entity_records {
                let entity_type = entity_type
                    .map(str::to_string)
                    .unwrap_or_else(|| record_type.default_entity_type());
                state.bind_entity(&entity_type, record_type)?;
            }

            for provider in providers {
                if !state.providers.iter().any(|p| p == provider) {
                    state.providers.push(provider.to_string());
                }
                let stores = state.provider_stores.entry(provider.to_string()).or_default();
                if !stores.iter().any(|s| s == store_name) {
                    stores.push(store_name.to_string());
                }
                state.bind_group(store_name, group);

                for record_type in group.record_types() {
                    let record_providers = state
                        .record_providers
                        .entry(record_type.name().to_string())
                        .or_default();
                    if !record_providers.iter().any(|p| p == provider) {
                        record_providers.push(provider.to_string());
                    }
                }
            }
        }

        for provider in providers {
            self.create_tables(provider, store_name, group).await?;
        }
        info!(
            "registered store:{} providers:{:?} record types:{:?}",
            store_name,
            providers,
            group.record_types().iter().map(|r| r.name()).collect::<Vec<_>>()
        );
        Ok(())
    }

    /// 只登记实体类型，不触碰存储
    pub async fn register_entity(&self, record_type: &Arc<RecordType>, entity_type: Option<&str>) -> Result<()> {
        let entity_type = entity_type
            .map(str::to_string)
            .unwrap_or_else(|| record_type.default_entity_type());
        self.state.write().await.bind_entity(&entity_type, record_type)
    }

    /// 为已注册的 record type 追加一个 recorder，第一个为默认
    pub async fn register_recorder(&self, record_type: &str, recorder: Arc<dyn Recorder>) {
        let mut state = self.state.write().await;
        let recorders = state.recorders.entry(record_type.to_string()).or_default();
        if !recorders.iter().any(|r| Arc::ptr_eq(r, &recorder)) {
            recorders.push(recorder);
        }
    }

    pub async fn recorders(&self, record_type: &str) -> Vec<Arc<dyn Recorder>> {
        self.state
            .read()
            .await
            .recorders
            .get(record_type)
            .cloned()
            .unwrap_or_default()
    }

    /// 第一个包含该记录类型的 store 名
    pub async fn resolve_store_name(&self, record_type: &RecordType) -> Result<String> {
        self.state
            .read()
            .await
            .store_groups
            .iter()
            .find(|(_, group)| group.contains(record_type.name()))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| DataError::SchemaNotRegistered(record_type.name().to_string()))
    }

    /// 解析出 store 名，并要求该 provider 注册过这个 store
    async fn store_name_of(&self, provider: &str, store: StoreRef<'_>) -> Result<String> {
        let state = self.state.read().await;
        let provider_stores = state.provider_stores.get(provider);
        let store_name = match store {
            StoreRef::Name(name) => name.to_string(),
            // 同一记录类型可能挂在多个 store 下，优先取该 provider 自己的
            StoreRef::Record(record_type) => provider_stores
                .and_then(|stores| {
                    stores
                        .iter()
                        .find(|name| state.group_of(name).is_some_and(|g| g.contains(record_type.name())))
                })
                .cloned()
                .or_else(|| {
                    state
                        .store_groups
                        .iter()
                        .find(|(_, group)| group.contains(record_type.name()))
                        .map(|(name, _)| name.clone())
                })
                .ok_or_else(|| DataError::SchemaNotRegistered(record_type.name().to_string()))?,
        };
        if state.group_of(&store_name).is_none() {
            return Err(DataError::SchemaNotRegistered(store_name));
        }
        let registered = provider_stores
            .map(|stores| stores.contains(&store_name))
            .unwrap_or(false);
        if !registered {
            warn!("provider:{} has no registered store:{}", provider, store_name);
            return Err(DataError::SchemaNotRegistered(format!("{}_{}", provider, store_name)));
        }
        Ok(store_name)
    }

    /// 物理库句柄，按 (provider, store_name) 缓存
    pub async fn resolve_store<'a>(&self, provider: &str, store: impl Into<StoreRef<'a>>) -> Result<Arc<Store>> {
        let store_name = self.store_name_of(provider, store.into()).await?;
        self.router.store(provider, &store_name).await
    }

    pub async fn resolve_session_factory<'a>(
        &self,
        provider: &str,
        store: impl Into<StoreRef<'a>>,
    ) -> Result<Arc<SessionFactory>> {
        let store_name = self.store_name_of(provider, store.into()).await?;
        self.router.session_factory(provider, &store_name).await
    }

    /// 确保 (provider, store) 已建库、建表，返回绑定的会话工厂
    pub async fn ensure_store(&self, provider: &str, store_name: &str) -> Result<Arc<SessionFactory>> {
        self.store_name_of(provider, StoreRef::Name(store_name)).await?;
        let key = StoreKey::new(provider, store_name);

        if !self.state.read().await.prepared.contains(&key) {
            let _guard = self.ddl_lock.lock().await;
            let group = self
                .state
                .read()
                .await
                .group_of(store_name)
                .cloned()
                .ok_or_else(|| DataError::SchemaNotRegistered(store_name.to_string()))?;
            if !self.state.read().await.prepared.contains(&key) {
                self.create_tables(provider, store_name, &group).await?;
            }
        }
        self.router.session_factory(provider, store_name).await
    }

    /// 调用方需持有 `ddl_lock`；全部成功后才标记为已就绪
    async fn create_tables(&self, provider: &str, store_name: &str, group: &SchemaGroup) -> Result<()> {
        let factory = self.router.session_factory(provider, store_name).await?;
        for record_type in group.record_types() {
            ddl::ensure_table(factory.pool(), record_type).await?;
            let created = ddl::ensure_indexes(factory.pool(), record_type).await?;
            if !created.is_empty() {
                info!("{}_{} table:{} created index:{:?}", provider, store_name, record_type.table_name(), created);
            }
        }
        self.state
            .write()
            .await
            .prepared
            .insert(StoreKey::new(provider, store_name));
        Ok(())
    }

    /// 记录类型的 provider 列表，`provider_index` 为 0 时即默认 provider
    pub async fn providers_of(&self, record_type: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .record_providers
            .get(record_type)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn default_provider(&self, record_type: &RecordType) -> Result<String> {
        self.providers_of(record_type.name())
            .await
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SchemaNotRegistered(record_type.name().to_string()))
    }

    /// provider 必须在该记录类型上注册过
    pub async fn check_provider(&self, record_type: &RecordType, provider: &str) -> Result<()> {
        if self.providers_of(record_type.name()).await.iter().any(|p| p == provider) {
            return Ok(());
        }
        if self.resolve_store_name(record_type).await.is_err() {
            return Err(DataError::SchemaNotRegistered(record_type.name().to_string()));
        }
        Err(DataError::ProviderNotRegistered {
            record_type: record_type.name().to_string(),
            provider: provider.to_string(),
        })
    }

    pub async fn providers(&self) -> Vec<String> {
        self.state.read().await.providers.clone()
    }

    pub async fn entity_types(&self) -> Vec<String> {
        self.state.read().await.entity_types.clone()
    }

    pub async fn stores_of(&self, provider: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .provider_stores
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn group_of(&self, store_name: &str) -> Option<SchemaGroup> {
        self.state.read().await.group_of(store_name).cloned()
    }

    pub async fn entity_schema(&self, entity_type: &str) -> Result<Arc<RecordType>> {
        self.state
            .read()
            .await
            .entity_schemas
            .get(entity_type)
            .cloned()
            .ok_or_else(|| DataError::SchemaNotRegistered(entity_type.to_string()))
    }

    /// 按名字查找已注册的记录类型
    pub async fn record_type(&self, name: &str) -> Result<Arc<RecordType>> {
        self.state
            .read()
            .await
            .store_groups
            .iter()
            .find_map(|(_, group)| group.get(name).cloned())
            .ok_or_else(|| DataError::SchemaNotRegistered(name.to_string()))
    }
}
