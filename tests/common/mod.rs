#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use quant_data::app_config::settings::DataSettings;
use quant_data::time_util::parse_timestamp;
use quant_data::{time_series_id, ColumnType, IntervalLevel, QueryEngine, Record, RecordType, SchemaGroup, SchemaRegistry};
use tempfile::TempDir;

pub const STOCK_A: &str = "stock_sz_000001";
pub const STOCK_B: &str = "stock_sz_000002";
pub const STOCK_C: &str = "stock_sz_000003";

pub fn stock() -> Arc<RecordType> {
    RecordType::entity("Stock")
        .normal()
        .column("list_date", ColumnType::Timestamp)
        .build()
}

pub fn kdata() -> Arc<RecordType> {
    RecordType::time_series("Stock1dKdata")
        .column("code", ColumnType::Text)
        .column("level", ColumnType::Text)
        .columns(["open", "close"], ColumnType::Float)
        .build()
}

pub fn day(n: i64) -> NaiveDateTime {
    parse_timestamp("2019-01-01").unwrap() + Duration::days(n - 1)
}

pub fn kdata_row(entity_id: &str, n: i64, close: f64) -> Record {
    let ts = day(n);
    let code = entity_id.rsplit('_').next().unwrap();
    Record::new()
        .with("id", time_series_id(entity_id, &ts, IntervalLevel::Level1Day))
        .with("entity_id", entity_id)
        .with("timestamp", ts)
        .with("code", code)
        .with("level", "1d")
        .with("open", close - 0.5)
        .with("close", close)
}

pub fn stock_row(exchange: &str, code: &str, name: &str) -> Record {
    Record::new()
        .with("entity_type", "stock")
        .with("exchange", exchange)
        .with("code", code)
        .with("name", name)
        .with("list_date", "2000-01-01")
}

pub struct TestEnv {
    pub dir: TempDir,
    pub registry: Arc<SchemaRegistry>,
    pub engine: Arc<QueryEngine>,
}

/// 每个测试一个全新的目录和注册中心
pub async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(SchemaRegistry::new(&DataSettings::new(dir.path())));

    registry
        .register(&["sina", "eastmoney"], "meta", &SchemaGroup::new().with(stock()), None)
        .await
        .unwrap();
    registry
        .register(&["netease"], "stock_1d_kdata", &SchemaGroup::new().with(kdata()), None)
        .await
        .unwrap();

    let engine = Arc::new(QueryEngine::new(registry.clone()));
    TestEnv { dir, registry, engine }
}

/// 为每个实体写入第 1..=days 天的日线
pub async fn seed_kdata(engine: &QueryEngine, entity_ids: &[&str], days: std::ops::RangeInclusive<i64>) {
    let mut rows = Vec::new();
    for entity_id in entity_ids {
        for n in days.clone() {
            rows.push(kdata_row(entity_id, n, 10.0 + n as f64));
        }
    }
    engine.init_entities("netease", &kdata(), rows).await.unwrap();
}
