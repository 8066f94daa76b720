//! 查询条件
//!
//! 列名在执行前都会对照记录类型校验，不会拼接任何调用方给出的 SQL 片段。

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::domain::schema::{CODE, ENTITY_ID, ID, LEVEL};
use crate::domain::{IntervalLevel, RecordType, Value};
use crate::error::{DataError, Result};

/// 单列条件，多个条件之间是 AND 关系
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    NotEq(String, Value),
    In(String, Vec<Value>),
    Gt(String, Value),
    Ge(String, Value),
    Lt(String, Value),
    Le(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn not_eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::NotEq(column.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(column.to_string(), value.into())
    }

    pub fn ge(column: &str, value: impl Into<Value>) -> Self {
        Filter::Ge(column.to_string(), value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(column.to_string(), value.into())
    }

    pub fn le(column: &str, value: impl Into<Value>) -> Self {
        Filter::Le(column.to_string(), value.into())
    }

    pub fn is_null(column: &str) -> Self {
        Filter::IsNull(column.to_string())
    }

    pub fn not_null(column: &str) -> Self {
        Filter::NotNull(column.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::NotEq(c, _)
            | Filter::In(c, _)
            | Filter::Gt(c, _)
            | Filter::Ge(c, _)
            | Filter::Lt(c, _)
            | Filter::Le(c, _)
            | Filter::IsNull(c)
            | Filter::NotNull(c) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }
}

/// 返回结果的索引方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexBy {
    /// 原始行序列
    #[default]
    None,
    /// 按时间列
    Time,
    /// 按 (entity_id, 时间列) 两级索引
    EntityTime,
}

/// 一次 `get_data` 的全部参数
#[derive(Debug, Clone)]
pub struct DataQuery {
    pub record_type: Arc<RecordType>,
    pub ids: Option<Vec<String>>,
    pub entity_ids: Option<Vec<String>>,
    pub codes: Option<Vec<String>>,
    pub level: Option<IntervalLevel>,
    pub provider: Option<String>,
    pub columns: Option<Vec<String>>,
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: Option<NaiveDateTime>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<i64>,
    pub index: IndexBy,
    pub time_field: Option<String>,
}

impl DataQuery {
    pub fn new(record_type: Arc<RecordType>) -> Self {
        Self {
            record_type,
            ids: None,
            entity_ids: None,
            codes: None,
            level: None,
            provider: None,
            columns: None,
            start_timestamp: None,
            end_timestamp: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            index: IndexBy::None,
            time_field: None,
        }
    }

    pub fn ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn entity_ids<S: Into<String>>(mut self, entity_ids: impl IntoIterator<Item = S>) -> Self {
        self.entity_ids
            .get_or_insert_with(Vec::new)
            .extend(entity_ids.into_iter().map(Into::into));
        self
    }

    /// 与 `entity_ids` 属于同一条身份路径，会合并到一起
    pub fn entity_id(self, entity_id: &str) -> Self {
        self.entity_ids([entity_id])
    }

    pub fn codes<S: Into<String>>(mut self, codes: impl IntoIterator<Item = S>) -> Self {
        self.codes
            .get_or_insert_with(Vec::new)
            .extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn code(self, code: &str) -> Self {
        self.codes([code])
    }

    pub fn level(mut self, level: IntervalLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn start_timestamp(mut self, ts: NaiveDateTime) -> Self {
        self.start_timestamp = Some(ts);
        self
    }

    pub fn end_timestamp(mut self, ts: NaiveDateTime) -> Self {
        self.end_timestamp = Some(ts);
        self
    }

    /// 单点查询：start = end = ts
    pub fn the_timestamp(self, ts: NaiveDateTime) -> Self {
        self.start_timestamp(ts).end_timestamp(ts)
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn index(mut self, index: IndexBy) -> Self {
        self.index = index;
        self
    }

    pub fn time_field(mut self, time_field: &str) -> Self {
        self.time_field = Some(time_field.to_string());
        self
    }

    pub fn time_column(&self) -> &str {
        self.time_field
            .as_deref()
            .unwrap_or_else(|| self.record_type.time_field())
    }

    /// 记录类型带 level 列时才按周期过滤
    pub fn level_filter(&self) -> Option<Filter> {
        match self.level {
            Some(level) if self.record_type.has_column(LEVEL) => Some(Filter::eq(LEVEL, level.as_str())),
            _ => None,
        }
    }

    /// 身份路径对应的条件
    pub fn identity_filter(&self) -> Option<Filter> {
        if let Some(ids) = &self.ids {
            return Some(Filter::is_in(ID, ids.iter().map(String::as_str)));
        }
        if let Some(entity_ids) = &self.entity_ids {
            return Some(Filter::is_in(ENTITY_ID, entity_ids.iter().map(String::as_str)));
        }
        self.codes
            .as_ref()
            .map(|codes| Filter::is_in(CODE, codes.iter().map(String::as_str)))
    }

    /// 实际查询的列；指定了 `columns` 时补上建索引必须的列
    pub fn projection(&self) -> Vec<String> {
        match &self.columns {
            None => self
                .record_type
                .columns()
                .iter()
                .map(|c| c.name.clone())
                .collect(),
            Some(columns) => {
                let mut projection: Vec<String> = Vec::with_capacity(columns.len() + 3);
                for required in [ID, ENTITY_ID, self.time_column()] {
                    if !projection.iter().any(|c| c == required) {
                        projection.push(required.to_string());
                    }
                }
                for column in columns {
                    if !projection.contains(column) {
                        projection.push(column.clone());
                    }
                }
                projection
            }
        }
    }

    /// 全部条件，顺序：身份、周期、时间区间、调用方条件
    pub fn all_filters(&self) -> Vec<Filter> {
        let time_column = self.time_column();
        let mut filters = Vec::new();
        filters.extend(self.identity_filter());
        filters.extend(self.level_filter());
        if let Some(start) = self.start_timestamp {
            filters.push(Filter::ge(time_column, start));
        }
        if let Some(end) = self.end_timestamp {
            filters.push(Filter::le(time_column, end));
        }
        filters.extend(self.filters.iter().cloned());
        filters
    }

    /// 执行前校验：身份路径唯一、所有列都存在
    pub fn validate(&self) -> Result<()> {
        let paths = [self.ids.is_some(), self.entity_ids.is_some(), self.codes.is_some()]
            .iter()
            .filter(|supplied| **supplied)
            .count();
        if paths > 1 {
            return Err(DataError::InvalidQuery(format!(
                "{}: only one of ids, entity_ids and codes can be supplied",
                self.record_type.name()
            )));
        }
        if let Some(limit) = self.limit {
            if limit < 0 {
                return Err(DataError::InvalidQuery(format!("negative limit {}", limit)));
            }
        }
        if let (Some(start), Some(end)) = (self.start_timestamp, self.end_timestamp) {
            if start > end {
                return Err(DataError::InvalidQuery(format!(
                    "start_timestamp {} is after end_timestamp {}",
                    start, end
                )));
            }
        }

        let record_type = &self.record_type;
        record_type.require_column(self.time_column())?;
        for filter in self.all_filters() {
            record_type.require_column(filter.column())?;
        }
        for column in self.projection() {
            record_type.require_column(&column)?;
        }
        if let Some(order) = &self.order {
            record_type.require_column(&order.column)?;
        }
        Ok(())
    }
}
