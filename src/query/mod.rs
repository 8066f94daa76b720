//! 查询：条件、结果表、执行引擎

pub mod engine;
pub mod filter;
pub mod frame;

pub use engine::{DataSource, QueryEngine};
pub use filter::{DataQuery, Filter, IndexBy, Order};
pub use frame::{Cardinality, DataFrame, FrameIndex, TableType};
