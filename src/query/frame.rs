//! 查询结果表
//!
//! 行按索引列排序保存；`(category, time)` 两级索引是读取器使用的规范形式。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::schema::{ENTITY_ID, TIMESTAMP};
use crate::domain::{Record, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub enum FrameIndex {
    #[default]
    None,
    Single(String),
    Category { category: String, time: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multiple,
}

impl Cardinality {
    fn of(count: usize) -> Self {
        if count == 1 {
            Cardinality::Single
        } else {
            Cardinality::Multiple
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "single",
            Cardinality::Multiple => "multiple",
        }
    }
}

/// 表的形状：实体数 / 每个实体的行数 / 数据列数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableType {
    pub entities: Cardinality,
    pub rows: Cardinality,
    pub columns: Cardinality,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.entities.as_str(),
            self.rows.as_str(),
            self.columns.as_str()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DataFrame {
    columns: Vec<String>,
    index: FrameIndex,
    rows: Vec<Record>,
}

impl DataFrame {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            columns,
            index: FrameIndex::None,
            rows,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按单列排序，稳定排序保留同值行的原有顺序
    pub fn index_by(mut self, column: &str) -> Self {
        self.index = FrameIndex::Single(column.to_string());
        self.sort();
        self
    }

    /// 规范化为 (category, time) 两级索引
    pub fn index_by_category_time(mut self, category: &str, time: &str) -> Self {
        self.index = FrameIndex::Category {
            category: category.to_string(),
            time: time.to_string(),
        };
        self.sort();
        self
    }

    pub fn is_normalized(&self) -> bool {
        matches!(self.index, FrameIndex::Category { .. })
    }

    fn sort(&mut self) {
        match &self.index {
            FrameIndex::None => {}
            FrameIndex::Single(column) => {
                let column = column.clone();
                self.rows
                    .sort_by(|a, b| a.value(&column).total_cmp(b.value(&column)));
            }
            FrameIndex::Category { category, time } => {
                let (category, time) = (category.clone(), time.clone());
                self.rows.sort_by(|a, b| {
                    match a.value(&category).total_cmp(b.value(&category)) {
                        Ordering::Equal => a.value(&time).total_cmp(b.value(&time)),
                        other => other,
                    }
                });
            }
        }
    }

    fn category_column(&self) -> &str {
        match &self.index {
            FrameIndex::Category { category, .. } => category,
            _ => ENTITY_ID,
        }
    }

    fn time_column(&self) -> &str {
        match &self.index {
            FrameIndex::Category { time, .. } => time,
            FrameIndex::Single(column) => column,
            FrameIndex::None => TIMESTAMP,
        }
    }

    /// 出现过的分类，按首次出现顺序去重
    pub fn categories(&self) -> Vec<String> {
        let category = self.category_column();
        let mut seen: HashSet<String> = HashSet::new();
        let mut categories: Vec<String> = Vec::new();
        for row in &self.rows {
            let value = row.value(category);
            if value.is_null() {
                continue;
            }
            let value = value.to_string();
            if seen.insert(value.clone()) {
                categories.push(value);
            }
        }
        categories
    }

    pub fn category_rows(&self, category: &str) -> Vec<&Record> {
        let column = self.category_column();
        self.rows
            .iter()
            .filter(|row| !row.value(column).is_null() && row.value(column).to_string() == category)
            .collect()
    }

    /// 每个分类本地已知的最大时间，按分类首次出现顺序，一次遍历
    pub fn max_time_by_category(&self) -> Vec<(String, NaiveDateTime)> {
        let category = self.category_column();
        let time = self.time_column();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut result: Vec<(String, NaiveDateTime)> = Vec::new();
        for row in &self.rows {
            let key = row.value(category);
            if key.is_null() {
                continue;
            }
            let Some(ts) = row.timestamp_of(time) else {
                continue;
            };
            let key = key.to_string();
            match positions.get(&key) {
                Some(&pos) => {
                    if ts > result[pos].1 {
                        result[pos].1 = ts;
                    }
                }
                None => {
                    positions.insert(key.clone(), result.len());
                    result.push((key, ts));
                }
            }
        }
        result
    }

    /// 追加行并按当前索引重新排序；新出现的列追加到列表末尾
    pub fn append(&mut self, rows: Vec<Record>) {
        for row in &rows {
            for column in row.columns() {
                if !self.columns.iter().any(|c| c == column) {
                    self.columns.push(column.to_string());
                }
            }
        }
        self.rows.extend(rows);
        self.sort();
    }

    /// 逐行改写某一列，例如日线把时间截到日期
    pub fn map_column(&mut self, column: &str, f: impl Fn(&Value) -> Value) {
        for row in &mut self.rows {
            if let Some(value) = row.get(column) {
                let mapped = f(value);
                row.set(column, mapped);
            }
        }
    }

    /// 按分类拆成多张表，每张表只保留时间索引
    pub fn entity_map(&self) -> BTreeMap<String, DataFrame> {
        let category = self.category_column().to_string();
        let time = self.time_column().to_string();
        let columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| **c != category)
            .cloned()
            .collect();

        self.categories()
            .into_iter()
            .map(|key| {
                let rows: Vec<Record> = self
                    .category_rows(&key)
                    .into_iter()
                    .map(|row| {
                        let mut row = row.clone();
                        row.remove(&category);
                        row
                    })
                    .collect();
                let frame = DataFrame::new(columns.clone(), rows).index_by(&time);
                (key, frame)
            })
            .collect()
    }

    /// 空表没有形状
    pub fn table_type(&self) -> Option<TableType> {
        let entity_size = self.categories().len();
        if entity_size == 0 {
            return None;
        }
        let index_columns = [self.category_column(), self.time_column()];
        let column_size = self
            .columns
            .iter()
            .filter(|c| !index_columns.contains(&c.as_str()))
            .count();
        Some(TableType {
            entities: Cardinality::of(entity_size),
            rows: Cardinality::of(self.rows.len() / entity_size),
            columns: Cardinality::of(column_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_util::parse_timestamp;

    fn row(entity_id: &str, day: &str, score: f64) -> Record {
        Record::new()
            .with("id", format!("{}_{}", entity_id, day))
            .with("entity_id", entity_id)
            .with("timestamp", parse_timestamp(day).unwrap())
            .with("score", score)
    }

    fn columns() -> Vec<String> {
        ["id", "entity_id", "timestamp", "score"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_category_time_index() {
        let frame = DataFrame::new(
            columns(),
            vec![
                row("tom", "2019-01-02", 2.0),
                row("jack", "2019-01-02", 4.0),
                row("tom", "2019-01-01", 1.0),
                row("jack", "2019-01-01", 3.0),
            ],
        )
        .index_by_category_time("entity_id", "timestamp");

        assert_eq!(frame.categories(), vec!["jack", "tom"]);
        let scores: Vec<f64> = frame.rows().iter().filter_map(|r| r.value("score").as_f64()).collect();
        assert_eq!(scores, vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(
            frame.max_time_by_category(),
            vec![
                ("jack".to_string(), parse_timestamp("2019-01-02").unwrap()),
                ("tom".to_string(), parse_timestamp("2019-01-02").unwrap()),
            ]
        );
    }

    #[test]
    fn test_max_time_on_unsorted_rows() {
        let frame = DataFrame::new(
            columns(),
            vec![
                row("tom", "2019-01-02", 2.0),
                row("jack", "2019-01-01", 3.0),
                row("tom", "2019-01-03", 1.0),
                row("tom", "2019-01-01", 1.0),
            ],
        );
        assert_eq!(frame.categories(), vec!["tom", "jack"]);
        assert_eq!(
            frame.max_time_by_category(),
            vec![
                ("tom".to_string(), parse_timestamp("2019-01-03").unwrap()),
                ("jack".to_string(), parse_timestamp("2019-01-01").unwrap()),
            ]
        );
    }

    #[test]
    fn test_append_keeps_order() {
        let mut frame = DataFrame::new(columns(), vec![row("tom", "2019-01-01", 1.0)])
            .index_by_category_time("entity_id", "timestamp");
        frame.append(vec![row("tom", "2019-01-03", 3.0), row("jack", "2019-01-02", 2.0)]);

        let ids: Vec<&str> = frame.rows().iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["jack_2019-01-02", "tom_2019-01-01", "tom_2019-01-03"]);
    }

    #[test]
    fn test_entity_map_and_table_type() {
        let frame = DataFrame::new(
            columns(),
            vec![
                row("tom", "2019-01-01", 1.0),
                row("tom", "2019-01-02", 2.0),
                row("jack", "2019-01-01", 3.0),
                row("jack", "2019-01-02", 4.0),
            ],
        )
        .index_by_category_time("entity_id", "timestamp");

        let map = frame.entity_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["tom"].len(), 2);
        assert!(!map["tom"].columns().contains(&"entity_id".to_string()));

        let table_type = frame.table_type().unwrap();
        assert_eq!(table_type.to_string(), "multiple_multiple_multiple");

        let single = DataFrame::new(
            vec!["entity_id".to_string(), "timestamp".to_string(), "score".to_string()],
            vec![Record::new()
                .with("entity_id", "tom")
                .with("timestamp", parse_timestamp("2019-01-01").unwrap())
                .with("score", 1.0)],
        )
        .index_by_category_time("entity_id", "timestamp");
        assert_eq!(single.table_type().unwrap().to_string(), "single_single_single");
        assert!(DataFrame::empty().table_type().is_none());
    }
}
