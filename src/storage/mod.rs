//! 物理存储：库路由、建表建索引、记录类型注册

pub mod ddl;
pub mod registry;
pub mod router;

pub use registry::{SchemaRegistry, StoreRef};
pub use router::{SessionFactory, Store, StoreKey, StoreRouter};
