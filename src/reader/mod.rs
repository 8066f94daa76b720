//! 增量读取：加载、move_on、订阅通知

pub mod data_reader;
pub mod listener;
pub mod ticker;

pub use data_reader::{DataReader, ReaderConfig};
pub use listener::DataListener;
pub use ticker::{RefreshTicker, StopHandle};
