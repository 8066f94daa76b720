//! 增量数据读取器
//!
//! 先按配置加载一段数据，之后通过 `move_on` 按分类拉取比本地更新的行，
//! 合并后通知订阅者。实时模式下 `run` 会按固定间隔循环执行 `move_on`，
//! 直到通过 [`StopHandle`] 停止。

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::app_config::settings::DataSettings;
use crate::domain::schema::{ENTITY_ID, TIMESTAMP};
use crate::domain::{IntervalLevel, Record, RecordType, Value};
use crate::error::Result;
use crate::query::{DataFrame, DataQuery, DataSource, Filter};
use crate::reader::listener::DataListener;
use crate::reader::ticker::{RefreshTicker, StopHandle};
use crate::time_util;

/// 读取器配置
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub provider: Option<String>,
    pub entity_ids: Option<Vec<String>>,
    pub codes: Option<Vec<String>>,
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub level: IntervalLevel,
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: Option<NaiveDateTime>,
    /// 设置后只加载这一个时间点
    pub the_timestamp: Option<NaiveDateTime>,
    pub category_field: String,
    pub time_field: String,
    /// 日线及以上周期把时间截到日期
    pub trim_timestamp: bool,
    pub real_time: bool,
    pub refresh_interval: Duration,
    pub move_on_timeout: Duration,
    /// 同一分类两次查询之间的间隔
    pub retry_interval: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            provider: None,
            entity_ids: None,
            codes: None,
            columns: None,
            filters: Vec::new(),
            level: IntervalLevel::Level1Day,
            start_timestamp: None,
            end_timestamp: None,
            the_timestamp: None,
            category_field: ENTITY_ID.to_string(),
            time_field: TIMESTAMP.to_string(),
            trim_timestamp: true,
            real_time: false,
            refresh_interval: Duration::from_secs(10),
            move_on_timeout: Duration::from_secs(20),
            retry_interval: Duration::from_millis(500),
        }
    }
}

impl ReaderConfig {
    /// 时间相关的默认值取自配置
    pub fn from_settings(settings: &DataSettings) -> Self {
        Self {
            refresh_interval: settings.refresh_interval,
            move_on_timeout: settings.move_on_timeout,
            retry_interval: settings.move_on_retry_interval,
            ..Self::default()
        }
    }
}

pub struct DataReader {
    record_type: Arc<RecordType>,
    source: Arc<dyn DataSource>,
    config: ReaderConfig,
    data: DataFrame,
    listeners: Vec<Arc<dyn DataListener>>,
    stop: StopHandle,
}

impl DataReader {
    pub fn new(record_type: Arc<RecordType>, source: Arc<dyn DataSource>, config: ReaderConfig) -> Self {
        Self {
            record_type,
            source,
            config,
            data: DataFrame::empty(),
            listeners: Vec::new(),
            stop: StopHandle::new(),
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn categories(&self) -> Vec<String> {
        self.data.categories()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// 重复注册同一个订阅者会被忽略；已有数据时立即回放 `on_data_loaded`
    pub fn register_data_listener(&mut self, listener: Arc<dyn DataListener>) {
        if self.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }
        if !self.data.is_empty() {
            listener.on_data_loaded(&self.data);
        }
        self.listeners.push(listener);
    }

    pub fn deregister_data_listener(&mut self, listener: &Arc<dyn DataListener>) {
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn base_query(&self) -> DataQuery {
        let config = &self.config;
        let mut query = DataQuery::new(self.record_type.clone())
            .level(config.level)
            .time_field(&config.time_field);
        if let Some(provider) = &config.provider {
            query = query.provider(provider);
        }
        if let Some(entity_ids) = &config.entity_ids {
            query = query.entity_ids(entity_ids.iter().cloned());
        }
        if let Some(codes) = &config.codes {
            query = query.codes(codes.iter().cloned());
        }
        if let Some(columns) = &config.columns {
            let mut columns = columns.clone();
            if !columns.contains(&config.category_field) {
                columns.push(config.category_field.clone());
            }
            query = query.columns(columns);
        }
        for filter in &config.filters {
            query = query.filter(filter.clone());
        }
        query
    }

    /// 截断时间并建立 (category, time) 索引
    fn normalize(&self, mut frame: DataFrame) -> DataFrame {
        let config = &self.config;
        if config.trim_timestamp && !config.level.is_intraday() {
            frame.map_column(&config.time_field, |value| match value {
                Value::Timestamp(ts) => Value::Timestamp(IntervalLevel::Level1Day.floor_timestamp(ts)),
                other => other.clone(),
            });
        }
        frame.index_by_category_time(&config.category_field, &config.time_field)
    }

    /// 全量加载，是把数据从空变为非空的唯一途径
    pub async fn load_data(&mut self) -> Result<()> {
        self.record_type.require_column(&self.config.category_field)?;

        let mut query = self.base_query();
        match self.config.the_timestamp {
            Some(ts) => query = query.the_timestamp(ts),
            None => {
                if let Some(start) = self.config.start_timestamp {
                    query = query.start_timestamp(start);
                }
                if let Some(end) = self.config.end_timestamp {
                    query = query.end_timestamp(end);
                }
            }
        }

        let frame = self.source.fetch(&query).await?;
        self.data = self.normalize(frame);
        info!(
            "{} level:{} loaded {} rows of {} categories",
            self.record_type.name(),
            self.config.level,
            self.data.len(),
            self.data.categories().len()
        );

        for listener in &self.listeners {
            listener.on_data_loaded(&self.data);
        }
        Ok(())
    }

    /// 拉取各分类在本地最大时间之后、`to_timestamp`（默认当前时间）之前的数据。
    ///
    /// 每个分类至少查询一次；没有新数据时按 `retry_interval` 重试，
    /// 直到自调用开始累计超过 `timeout` 后放弃该分类并继续下一个。
    /// 本地没有数据时改为全量加载并返回 false。配置类错误不重试，直接返回。
    pub async fn move_on(&mut self, to_timestamp: Option<NaiveDateTime>, timeout: Duration) -> Result<bool> {
        if self.data.is_empty() {
            self.load_data().await?;
            return Ok(false);
        }

        let to_timestamp = to_timestamp.unwrap_or_else(time_util::now);
        let recorded = self.data.max_time_by_category();
        debug!(
            "{} level:{} recorded timestamps:{:?}",
            self.record_type.name(),
            self.config.level,
            recorded
        );

        let started = Instant::now();
        let mut changed = false;
        for (category, recorded_timestamp) in recorded {
            if recorded_timestamp >= to_timestamp {
                continue;
            }
            let query = self
                .base_query()
                .start_timestamp(recorded_timestamp)
                .end_timestamp(to_timestamp)
                .filter(Filter::eq(&self.config.category_field, category.as_str()));

            loop {
                // 单次查询最多等到总超时，但至少给一个重试间隔
                let remaining = timeout.saturating_sub(started.elapsed());
                let budget = remaining.max(self.config.retry_interval);
                match time::timeout(budget, self.source.fetch(&query)).await {
                    Ok(Ok(frame)) => {
                        let added = self.newer_rows(frame, recorded_timestamp);
                        if !added.is_empty() {
                            self.merge(&category, added);
                            changed = true;
                            break;
                        }
                    }
                    // 配置错误重试也不会恢复，直接返回
                    Ok(Err(e)) if e.is_configuration() => return Err(e),
                    Ok(Err(e)) => {
                        error!("category:{} level:{} move on failed: {}", category, self.config.level, e);
                    }
                    Err(_) => {}
                }

                if started.elapsed() >= timeout {
                    warn!(
                        "category:{} level:{} getting data timeout, to_timestamp:{}, now:{}",
                        category,
                        self.config.level,
                        to_timestamp,
                        time_util::now()
                    );
                    break;
                }
                let remaining = timeout.saturating_sub(started.elapsed());
                time::sleep(self.config.retry_interval.min(remaining)).await;
            }
        }

        if changed {
            for listener in &self.listeners {
                listener.on_data_changed(&self.data);
            }
        }
        Ok(changed)
    }

    fn newer_rows(&self, frame: DataFrame, recorded_timestamp: NaiveDateTime) -> Vec<Record> {
        let time_field = self.config.time_field.clone();
        self.normalize(frame)
            .into_rows()
            .into_iter()
            .filter(|row| {
                row.timestamp_of(&time_field)
                    .map(|ts| ts > recorded_timestamp)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn merge(&mut self, category: &str, added: Vec<Record>) {
        let added = DataFrame::new(self.data.columns().to_vec(), added)
            .index_by_category_time(&self.config.category_field, &self.config.time_field);
        info!("category:{} added {} rows", category, added.len());

        self.data.append(added.rows().to_vec());
        for listener in &self.listeners {
            listener.on_category_data_added(category, &added);
        }
    }

    /// 加载一次；实时模式下按间隔循环 move_on，直到 stop_handle 被触发
    pub async fn run(&mut self) -> Result<()> {
        self.load_data().await?;
        if !self.config.real_time {
            return Ok(());
        }

        let mut ticker = RefreshTicker::new(self.config.refresh_interval, self.stop.clone());
        while !self.stop.is_stopped() {
            match self.move_on(None, self.config.move_on_timeout).await {
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => error!("{} move on error: {}", self.record_type.name(), e),
                Ok(_) => {}
            }
            if !ticker.tick().await {
                break;
            }
        }
        info!("{} reader stopped", self.record_type.name());
        Ok(())
    }
}
