//! 行情数据的记录类型注册、按 provider 分库存储、查询与增量读取

pub mod app;
pub mod app_config;
pub mod domain;
pub mod error;
pub mod query;
pub mod reader;
pub mod recorder;
pub mod storage;
pub mod time_util;

pub use domain::{entity_id, ColumnType, IntervalLevel, Record, RecordType, SchemaGroup, Value};
pub use error::{DataError, Result};
pub use query::{DataFrame, DataQuery, DataSource, Filter, IndexBy, Order, QueryEngine};
pub use reader::{DataListener, DataReader, ReaderConfig, StopHandle};
pub use recorder::{record_data, time_series_id, RecordContext, RecordOptions, Recorder};
pub use storage::{SchemaRegistry, StoreRef};
