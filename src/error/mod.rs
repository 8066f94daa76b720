//! 错误处理模块

pub mod data_error;

pub use data_error::{DataError, Result};
