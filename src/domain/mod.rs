//! 领域模型：周期、记录类型描述、行数据

pub mod level;
pub mod naming;
pub mod schema;
pub mod value;

pub use level::{FetchWindow, IntervalLevel};
pub use naming::{to_domain_name, to_table_name};
pub use schema::{entity_id, Column, ColumnType, RecordType, RecordTypeBuilder, SchemaGroup};
pub use value::{Record, Value};
