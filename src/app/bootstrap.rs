use std::sync::Arc;

use anyhow::{anyhow, Context};
use dotenv::dotenv;
use tracing::info;

use crate::app_config::log::setup_logging;
use crate::app_config::settings::DataSettings;
use crate::query::QueryEngine;
use crate::storage::SchemaRegistry;

/// 数据层运行环境：配置、注册中心、查询引擎
pub struct DataEnv {
    pub settings: DataSettings,
    pub registry: Arc<SchemaRegistry>,
    pub engine: Arc<QueryEngine>,
}

impl DataEnv {
    /// 关闭所有已打开的物理库
    pub async fn shutdown(&self) {
        let router = self.registry.router();
        let opened = router.open_stores().await.len();
        router.close_all().await;
        info!(
            "data env closed {} stores, data path: {}",
            opened,
            self.settings.data_path.display()
        );
    }
}

/// 创建数据目录并返回一个全新的注册中心
pub async fn init_data_env(settings: &DataSettings) -> anyhow::Result<Arc<SchemaRegistry>> {
    tokio::fs::create_dir_all(&settings.data_path)
        .await
        .with_context(|| format!("create data path {}", settings.data_path.display()))?;
    info!("data path: {}", settings.data_path.display());
    Ok(Arc::new(SchemaRegistry::new(settings)))
}

/// 读取 .env、初始化日志，再按环境变量构建数据层
pub async fn bootstrap() -> anyhow::Result<DataEnv> {
    dotenv().ok();
    setup_logging().map_err(|e| anyhow!("setup logging failed: {}", e))?;

    let settings = DataSettings::from_env();
    let registry = init_data_env(&settings).await?;
    let engine = Arc::new(QueryEngine::new(registry.clone()));
    Ok(DataEnv {
        settings,
        registry,
        engine,
    })
}
