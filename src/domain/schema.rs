//! 记录类型描述
//!
//! 每个记录类型由若干字段组组合而成：
//! - 基础字段 `id`、`entity_id`、`timestamp`
//! - 可选的实体字段 `entity_type`、`exchange`、`code`、`name`
//! - 可选的入库时间字段 `created_timestamp`、`updated_timestamp`
//!
//! 再加上各自的业务列。

use std::sync::Arc;

use serde::Serialize;

use crate::domain::naming;
use crate::error::{DataError, Result};

pub const ID: &str = "id";
pub const ENTITY_ID: &str = "entity_id";
pub const TIMESTAMP: &str = "timestamp";
pub const ENTITY_TYPE: &str = "entity_type";
pub const EXCHANGE: &str = "exchange";
pub const CODE: &str = "code";
pub const NAME: &str = "name";
pub const LEVEL: &str = "level";
pub const CREATED_TIMESTAMP: &str = "created_timestamp";
pub const UPDATED_TIMESTAMP: &str = "updated_timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    /// 以毫秒时间戳存储
    Timestamp,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer | ColumnType::Timestamp => "INTEGER",
            ColumnType::Float => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// 基础字段组，所有记录类型都有
pub struct BaseFields;

impl BaseFields {
    pub fn columns() -> Vec<Column> {
        vec![
            Column::new(ID, ColumnType::Text),
            Column::new(ENTITY_ID, ColumnType::Text),
            Column::new(TIMESTAMP, ColumnType::Timestamp),
        ]
    }
}

/// 实体字段组，描述一个可交易标的
pub struct EntityFields;

impl EntityFields {
    pub fn columns() -> Vec<Column> {
        vec![
            Column::new(ENTITY_TYPE, ColumnType::Text),
            Column::new(EXCHANGE, ColumnType::Text),
            Column::new(CODE, ColumnType::Text),
            Column::new(NAME, ColumnType::Text),
        ]
    }
}

/// 入库/更新时间字段组
pub struct NormalFields;

impl NormalFields {
    pub fn columns() -> Vec<Column> {
        vec![
            Column::new(CREATED_TIMESTAMP, ColumnType::Timestamp),
            Column::new(UPDATED_TIMESTAMP, ColumnType::Timestamp),
        ]
    }
}

/// 实体 id：`{entity_type}_{exchange}_{code}`
pub fn entity_id(entity_type: &str, exchange: &str, code: &str) -> String {
    format!("{}_{}_{}", entity_type, exchange, code)
}

/// 一个已声明的记录类型
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordType {
    name: String,
    table_name: String,
    entity_fields: bool,
    normal_fields: bool,
    columns: Vec<Column>,
}

impl RecordType {
    /// 实体类记录，例如股票列表
    pub fn entity(name: &str) -> RecordTypeBuilder {
        RecordTypeBuilder::new(name, true)
    }

    /// 挂在某个实体上的时间序列记录，例如日K线
    pub fn time_series(name: &str) -> RecordTypeBuilder {
        RecordTypeBuilder::new(name, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn has_entity_fields(&self) -> bool {
        self.entity_fields
    }

    pub fn has_normal_fields(&self) -> bool {
        self.normal_fields
    }

    /// 全部列，字段组在前，业务列在后
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// 列不存在时返回 `UnknownColumn`
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| DataError::UnknownColumn {
            record_type: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn time_field(&self) -> &'static str {
        TIMESTAMP
    }

    /// 默认的 entity_type：类型名小写
    pub fn default_entity_type(&self) -> String {
        self.name.to_lowercase()
    }
}

pub struct RecordTypeBuilder {
    name: String,
    table_name: Option<String>,
    entity_fields: bool,
    normal_fields: bool,
    columns: Vec<Column>,
}

impl RecordTypeBuilder {
    fn new(name: &str, entity_fields: bool) -> Self {
        Self {
            name: name.to_string(),
            table_name: None,
            entity_fields,
            normal_fields: false,
            columns: Vec::new(),
        }
    }

    /// 加上 created_timestamp / updated_timestamp
    pub fn normal(mut self) -> Self {
        self.normal_fields = true;
        self
    }

    /// 覆盖默认表名（默认由类型名转换）
    pub fn table_name(mut self, table_name: &str) -> Self {
        self.table_name = Some(table_name.to_string());
        self
    }

    pub fn column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push(Column::new(name, ty));
        self
    }

    pub fn columns<'a>(mut self, names: impl IntoIterator<Item = &'a str>, ty: ColumnType) -> Self {
        for name in names {
            self.columns.push(Column::new(name, ty));
        }
        self
    }

    pub fn build(self) -> Arc<RecordType> {
        let mut columns = BaseFields::columns();
        if self.entity_fields {
            columns.extend(EntityFields::columns());
        }
        if self.normal_fields {
            columns.extend(NormalFields::columns());
        }
        // 业务列与字段组重名时以字段组为准
        for column in self.columns {
            if !columns.iter().any(|c| c.name == column.name) {
                columns.push(column);
            }
        }

        let table_name = self
            .table_name
            .unwrap_or_else(|| naming::to_table_name(&self.name));

        Arc::new(RecordType {
            name: self.name,
            table_name,
            entity_fields: self.entity_fields,
            normal_fields: self.normal_fields,
            columns,
        })
    }
}

/// 共用一个物理库的一组记录类型
#[derive(Debug, Clone, Default)]
pub struct SchemaGroup {
    record_types: Vec<Arc<RecordType>>,
}

impl SchemaGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, record_type: Arc<RecordType>) -> Self {
        self.add(record_type);
        self
    }

    /// 同名类型覆盖旧声明
    pub fn add(&mut self, record_type: Arc<RecordType>) {
        match self.record_types.iter_mut().find(|r| r.name() == record_type.name()) {
            Some(existing) => *existing = record_type,
            None => self.record_types.push(record_type),
        }
    }

    pub fn record_types(&self) -> &[Arc<RecordType>] {
        &self.record_types
    }

    pub fn contains(&self, record_type: &str) -> bool {
        self.record_types.iter().any(|r| r.name() == record_type)
    }

    pub fn get(&self, record_type: &str) -> Option<&Arc<RecordType>> {
        self.record_types.iter().find(|r| r.name() == record_type)
    }
}
