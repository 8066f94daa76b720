//! 采集器约定
//!
//! 具体的采集器（抓取某个交易所、某个数据源）在 crate 之外实现，
//! 通过 [`SchemaRegistry::register_recorder`](crate::storage::SchemaRegistry::register_recorder)
//! 挂到记录类型上，再由 [`record_data`] 调度。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::info;

use crate::app_config::settings::DataSettings;
use crate::domain::{FetchWindow, IntervalLevel, Record, RecordType};
use crate::error::{DataError, Result};
use crate::query::QueryEngine;
use crate::time_util::{self, TIME_FORMAT_DAY, TIME_FORMAT_ISO8601};

#[async_trait]
pub trait Recorder: Send + Sync {
    fn name(&self) -> &str;

    /// 数据写入哪个 provider 的库
    fn provider(&self) -> &str;

    /// 抓取并写入，返回写入的行数；没有数据不是错误
    async fn run(&self, ctx: &RecordContext) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub exchanges: Option<Vec<String>>,
    pub entity_ids: Option<Vec<String>>,
    pub codes: Option<Vec<String>>,
    pub batch_size: usize,
    pub force_update: bool,
    pub sleeping_time: Duration,
    pub default_size: i64,
    pub real_time: bool,
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: Option<NaiveDateTime>,
    /// 不指定时从表名 `{entity}_{level}_{event}` 推断
    pub level: Option<IntervalLevel>,
    /// 日内周期估算 bar 数量时每天的交易分钟数
    pub one_day_trading_minutes: i64,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            exchanges: None,
            entity_ids: None,
            codes: None,
            batch_size: 10,
            force_update: false,
            sleeping_time: Duration::from_secs(5),
            default_size: 2000,
            real_time: false,
            start_timestamp: None,
            end_timestamp: None,
            level: None,
            one_day_trading_minutes: 24 * 60,
        }
    }
}

impl RecordOptions {
    pub fn from_settings(settings: &DataSettings) -> Self {
        Self {
            one_day_trading_minutes: settings.trading_minutes_per_day,
            ..Self::default()
        }
    }

    /// 从本地最新一条记录到现在需要抓取多少个 bar；
    /// 本地没有数据或周期未知时取 `default_size`
    pub fn fetch_window(&self, latest: Option<&NaiveDateTime>) -> FetchWindow {
        match (latest, self.level) {
            (Some(ts), Some(level)) => level.count_from_timestamp(ts, self.one_day_trading_minutes),
            _ => FetchWindow {
                wait_seconds: None,
                size: self.default_size,
            },
        }
    }
}

/// 采集器运行时可用的上下文
pub struct RecordContext {
    engine: Arc<QueryEngine>,
    record_type: Arc<RecordType>,
    provider: String,
    options: RecordOptions,
}

impl RecordContext {
    pub fn new(engine: Arc<QueryEngine>, record_type: Arc<RecordType>, provider: &str, options: RecordOptions) -> Self {
        Self {
            engine,
            record_type,
            provider: provider.to_string(),
            options,
        }
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    pub fn fetch_window(&self, latest: Option<&NaiveDateTime>) -> FetchWindow {
        self.options.fetch_window(latest)
    }

    /// 写入当前记录类型
    pub async fn save(&self, rows: Vec<Record>) -> Result<usize> {
        self.engine
            .init_entities(&self.provider, &self.record_type, rows)
            .await
    }
}

/// 时间序列行的 id：`{entity_id}_{时间}`，日线及以上只保留日期
pub fn time_series_id(entity_id: &str, timestamp: &NaiveDateTime, level: IntervalLevel) -> String {
    let fmt = if level >= IntervalLevel::Level1Day {
        TIME_FORMAT_DAY
    } else {
        TIME_FORMAT_ISO8601
    };
    format!("{}_{}", entity_id, time_util::to_time_str(timestamp, fmt))
}

/// `stock_1d_kdata` -> 1d；多位数字在表名里被拆成多段，
/// `stock_1_5m_kdata` 需要先拼回 `15m`
pub fn level_of_table(table_name: &str) -> Option<IntervalLevel> {
    let mut level = String::new();
    for segment in table_name.split('_').skip(1) {
        level.push_str(segment);
        if !segment.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
    }
    level.parse().ok()
}

/// 运行记录类型上第 `recorder_index` 个采集器
pub async fn record_data(
    engine: &Arc<QueryEngine>,
    record_type: &Arc<RecordType>,
    recorder_index: usize,
    mut options: RecordOptions,
) -> Result<usize> {
    let recorders = engine.registry().recorders(record_type.name()).await;
    let recorder = recorders
        .get(recorder_index)
        .cloned()
        .ok_or_else(|| DataError::RecorderNotFound {
            record_type: record_type.name().to_string(),
            index: recorder_index,
        })?;

    if options.level.is_none() {
        options.level = level_of_table(record_type.table_name());
    }
    info!(
        "{} registered recorders:{:?}, run {}",
        record_type.name(),
        recorders.iter().map(|r| r.name().to_string()).collect::<Vec<_>>(),
        recorder.name()
    );

    let ctx = RecordContext::new(engine.clone(), record_type.clone(), recorder.provider(), options);
    recorder.run(&ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::naming::to_table_name;
    use crate::time_util::parse_timestamp;

    #[test]
    fn test_time_series_id() {
        let ts = parse_timestamp("2019-06-23 09:35:00").unwrap();
        assert_eq!(
            time_series_id("stock_sz_000338", &ts, IntervalLevel::Level1Day),
            "stock_sz_000338_2019-06-23"
        );
        assert_eq!(
            time_series_id("stock_sz_000338", &ts, IntervalLevel::Level5Min),
            "stock_sz_000338_2019-06-23T09:35:00.000"
        );
    }

    #[test]
    fn test_fetch_window() {
        let mut settings = DataSettings::new("/tmp/quant_data");
        settings.trading_minutes_per_day = 4 * 60;
        let options = RecordOptions {
            level: Some(IntervalLevel::Level1Hour),
            ..RecordOptions::from_settings(&settings)
        };
        assert_eq!(options.one_day_trading_minutes, 240);
        assert_eq!(options.fetch_window(None).size, 2000);

        // 两天前：(2 + 1) 天 * 4 小时 + 1
        let latest = time_util::now() - chrono::Duration::days(2) - chrono::Duration::minutes(1);
        assert_eq!(options.fetch_window(Some(&latest)).size, 13);

        let daily = RecordOptions {
            level: Some(IntervalLevel::Level1Day),
            ..RecordOptions::default()
        };
        let latest = time_util::now() - chrono::Duration::days(3) - chrono::Duration::minutes(1);
        assert_eq!(daily.fetch_window(Some(&latest)).size, 3);
        assert_eq!(RecordOptions::default().fetch_window(Some(&latest)).size, 2000);
    }

    #[test]
    fn test_level_of_record_type_name() {
        for (name, level) in [
            ("Stock15mKdata", IntervalLevel::Level15Min),
            ("Stock30mKdata", IntervalLevel::Level30Min),
            ("Stock5mKdata", IntervalLevel::Level5Min),
            ("Stock1hKdata", IntervalLevel::Level1Hour),
        ] {
            assert_eq!(level_of_table(&to_table_name(name)), Some(level), "{}", name);
        }
    }

    #[test]
    fn test_level_of_table() {
        assert_eq!(level_of_table("stock_1d_kdata"), Some(IntervalLevel::Level1Day));
        assert_eq!(level_of_table("coin_1wk_kdata"), Some(IntervalLevel::Level1Week));
        assert_eq!(level_of_table("stock_1_5m_kdata"), Some(IntervalLevel::Level15Min));
        assert_eq!(level_of_table("stock_3_0m_kdata"), Some(IntervalLevel::Level30Min));
        assert_eq!(level_of_table("coin_4h_kdata"), Some(IntervalLevel::Level4Hour));
        assert_eq!(level_of_table("stock"), None);
        assert_eq!(level_of_table("finance_factor"), None);
    }
}
