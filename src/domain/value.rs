use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::schema::{ENTITY_ID, ID, TIMESTAMP};
use crate::time_util;

/// 单元格的值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Timestamp(_) => 3,
        }
    }

    /// 全序比较，用于索引排序；Null 最小，不同类型按类型排序
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => {
                let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                a.total_cmp(&b)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{}", time_util::to_time_str(v, time_util::TIME_FORMAT_SECOND)),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// 一行数据：列名 -> 值
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// 缺失的列按 Null 处理
    pub fn value(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn timestamp_of(&self, column: &str) -> Option<NaiveDateTime> {
        self.get(column).and_then(Value::as_timestamp)
    }

    pub fn id(&self) -> Option<&str> {
        self.text(ID)
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.text(ENTITY_ID)
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp_of(TIMESTAMP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_util::parse_timestamp;

    #[test]
    fn test_total_cmp() {
        assert_eq!(Value::Null.total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::from("a").total_cmp(&Value::from("b")), Ordering::Less);

        let a = parse_timestamp("2019-01-01").unwrap();
        let b = parse_timestamp("2019-01-02").unwrap();
        assert_eq!(Value::from(a).total_cmp(&Value::from(b)), Ordering::Less);
    }

    #[test]
    fn test_record_accessors() {
        let ts = parse_timestamp("2019-01-01").unwrap();
        let record = Record::new()
            .with(ID, "stock_sz_000338_2019-01-01")
            .with(ENTITY_ID, "stock_sz_000338")
            .with(TIMESTAMP, ts)
            .with("close", 10.5)
            .with("name", Option::<String>::None);

        assert_eq!(record.id(), Some("stock_sz_000338_2019-01-01"));
        assert_eq!(record.entity_id(), Some("stock_sz_000338"));
        assert_eq!(record.timestamp(), Some(ts));
        assert_eq!(record.value("close").as_f64(), Some(10.5));
        assert!(record.value("name").is_null());
        assert!(record.value("missing").is_null());
    }
}
