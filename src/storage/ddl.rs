//! 建表、补列、建索引，均可重复执行

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info};

use crate::domain::schema::{CODE, ENTITY_ID, ID, TIMESTAMP, UPDATED_TIMESTAMP};
use crate::domain::RecordType;
use crate::error::Result;

/// 单列索引：表中存在哪列就建哪列
pub const INDEX_COLUMNS: [&str; 5] = [TIMESTAMP, ENTITY_ID, CODE, "report_period", UPDATED_TIMESTAMP];

/// 组合索引：两列都存在时才建
pub const COMPOSITE_INDEX_COLUMNS: [(&str, &str); 2] = [(TIMESTAMP, ENTITY_ID), (TIMESTAMP, CODE)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_table_sql(record_type: &RecordType) -> String {
    let columns: Vec<String> = record_type
        .columns()
        .iter()
        .map(|column| {
            if column.name == ID {
                format!("{} TEXT PRIMARY KEY", quote_ident(&column.name))
            } else {
                format!("{} {}", quote_ident(&column.name), column.ty.sql_type())
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(record_type.table_name()),
        columns.join(", ")
    )
}

/// 按约定生成该表应有的索引
pub fn index_plan(record_type: &RecordType) -> Vec<IndexSpec> {
    let table = record_type.table_name();
    let mut plan: Vec<IndexSpec> = INDEX_COLUMNS
        .iter()
        .filter(|col| record_type.has_column(col))
        .map(|col| IndexSpec {
            name: format!("{}_{}_index", table, col),
            columns: vec![col.to_string()],
        })
        .collect();

    for (first, second) in COMPOSITE_INDEX_COLUMNS {
        if record_type.has_column(first) && record_type.has_column(second) {
            plan.push(IndexSpec {
                name: format!("{}_{}_{}_index", table, first, second),
                columns: vec![first.to_string(), second.to_string()],
            });
        }
    }
    plan
}

pub async fn existing_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
        .fetch_all(pool)
        .await?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(row.try_get::<String, _>("name")?);
    }
    Ok(columns)
}

pub async fn existing_indexes(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA index_list({})", quote_ident(table)))
        .fetch_all(pool)
        .await?;
    let mut indexes = Vec::with_capacity(rows.len());
    for row in rows {
        indexes.push(row.try_get::<String, _>("name")?);
    }
    Ok(indexes)
}

/// 建表；表已存在时补齐缺少的列
pub async fn ensure_table(pool: &SqlitePool, record_type: &RecordType) -> Result<()> {
    let table = record_type.table_name();
    sqlx::query(&create_table_sql(record_type)).execute(pool).await?;

    let existing = existing_columns(pool, table).await?;
    for column in record_type.columns() {
        if existing.iter().any(|name| name == &column.name) {
            continue;
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(&column.name),
            column.ty.sql_type()
        );
        sqlx::query(&sql).execute(pool).await?;
        info!("table:{} add column:{}", table, column.name);
    }
    Ok(())
}

/// 先查询已有索引，只创建缺少的；返回本次新建的索引名
pub async fn ensure_indexes(pool: &SqlitePool, record_type: &RecordType) -> Result<Vec<String>> {
    let table = record_type.table_name();
    let index_list = existing_indexes(pool, table).await?;
    debug!("table:{},index:{:?}", table, index_list);

    let mut created = Vec::new();
    for index in index_plan(record_type) {
        if index_list.contains(&index.name) {
            continue;
        }
        let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&index.name),
            quote_ident(table),
            columns.join(", ")
        );
        sqlx::query(&sql).execute(pool).await?;
        created.push(index.name);
    }
    Ok(created)
}
