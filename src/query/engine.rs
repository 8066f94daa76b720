//! 查询与批量写入
//!
//! 所有读写都经由注册中心解析出的会话工厂执行。

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, error, info};

use crate::domain::schema::{CODE, CREATED_TIMESTAMP, ENTITY_ID, ENTITY_TYPE, EXCHANGE, ID, UPDATED_TIMESTAMP};
use crate::domain::{entity_id, Column, ColumnType, Record, RecordType, Value};
use crate::error::{DataError, Result};
use crate::query::filter::{DataQuery, Filter, IndexBy};
use crate::query::frame::DataFrame;
use crate::storage::ddl::quote_ident;
use crate::storage::SchemaRegistry;
use crate::time_util;

/// 读取器依赖的数据来源
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &DataQuery) -> Result<DataFrame>;
}

pub struct QueryEngine {
    registry: Arc<SchemaRegistry>,
}

impl QueryEngine {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// 未指定 provider 时使用该记录类型注册的第一个 provider
    async fn resolve_provider(&self, query: &DataQuery) -> Result<String> {
        match &query.provider {
            Some(provider) => {
                self.registry.check_provider(&query.record_type, provider).await?;
                Ok(provider.clone())
            }
            None => self.registry.default_provider(&query.record_type).await,
        }
    }

    /// 按条件读取原始行，默认按主键升序
    pub async fn query_records(&self, query: &DataQuery) -> Result<Vec<Record>> {
        query.validate()?;
        let record_type = &query.record_type;
        let provider = self.resolve_provider(query).await?;
        let factory = self.registry.resolve_session_factory(&provider, record_type).await?;

        let projection: Vec<&Column> = query
            .projection()
            .iter()
            .map(|name| record_type.require_column(name))
            .collect::<Result<_>>()?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        let select: Vec<String> = projection.iter().map(|c| quote_ident(&c.name)).collect();
        builder.push(select.join(", "));
        builder.push(" FROM ");
        builder.push(quote_ident(record_type.table_name()));

        for (i, filter) in query.all_filters().iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            push_filter(&mut builder, record_type, filter)?;
        }

        match &query.order {
            Some(order) => {
                builder.push(" ORDER BY ");
                builder.push(quote_ident(&order.column));
                builder.push(if order.descending { " DESC" } else { " ASC" });
                if order.column != ID {
                    builder.push(", ");
                    builder.push(quote_ident(ID));
                    builder.push(" ASC");
                }
            }
            None => {
                builder.push(" ORDER BY ");
                builder.push(quote_ident(ID));
                builder.push(" ASC");
            }
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        debug!("{} query sql:{}", factory.key(), builder.sql());
        let rows = builder.build().fetch_all(factory.pool()).await.map_err(|e| {
            error!("query {} from {} failed: {}", record_type.name(), factory.key(), e);
            e
        })?;

        rows.iter().map(|row| decode_row(row, &projection)).collect()
    }

    /// 读取并按 `query.index` 组织结果
    pub async fn get_data(&self, query: &DataQuery) -> Result<DataFrame> {
        let records = self.query_records(query).await?;
        let frame = DataFrame::new(query.projection(), records);
        let time_column = query.time_column().to_string();
        Ok(match query.index {
            IndexBy::None => frame,
            IndexBy::Time => frame.index_by(&time_column),
            IndexBy::EntityTime => frame.index_by_category_time(ENTITY_ID, &time_column),
        })
    }

    /// 按 entity_type 找到实体记录类型再查询
    pub async fn get_entities(
        &self,
        entity_type: &str,
        customize: impl FnOnce(DataQuery) -> DataQuery + Send,
    ) -> Result<DataFrame> {
        let record_type = self.registry.entity_schema(entity_type).await?;
        let query = customize(DataQuery::new(record_type)).filter(Filter::eq(ENTITY_TYPE, entity_type));
        self.get_data(&query).await
    }

    /// 按 id upsert，物理库和表不存在时先创建；返回写入行数
    pub async fn init_entities(
        &self,
        provider: &str,
        record_type: &Arc<RecordType>,
        rows: Vec<Record>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.registry.check_provider(record_type, provider).await?;
        let store_name = self.registry.resolve_store_name(record_type).await?;
        let factory = self.registry.ensure_store(provider, &store_name).await?;

        let now = time_util::now();
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            prepared.push(prepare_row(record_type, row, now)?);
        }

        let mut tx = factory.begin().await?;
        for row in &prepared {
            let mut builder = upsert_builder(record_type, row)?;
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(
            "{} saved {} rows into {}",
            factory.key(),
            prepared.len(),
            record_type.table_name()
        );
        Ok(prepared.len())
    }
}

#[async_trait]
impl DataSource for QueryEngine {
    async fn fetch(&self, query: &DataQuery) -> Result<DataFrame> {
        self.get_data(query).await
    }
}

/// 补齐 id / entity_id / 入库时间，并校验列名
fn prepare_row(record_type: &RecordType, mut row: Record, now: chrono::NaiveDateTime) -> Result<Record> {
    for column in row.columns() {
        record_type.require_column(column)?;
    }

    if row.value(ID).is_null() && record_type.has_entity_fields() {
        if let (Some(entity_type), Some(exchange), Some(code)) =
            (row.text(ENTITY_TYPE), row.text(EXCHANGE), row.text(CODE))
        {
            let id = entity_id(entity_type, exchange, code);
            row.set(ID, id);
        }
    }
    let id = match row.id() {
        Some(id) => id.to_string(),
        None => {
            return Err(DataError::InvalidQuery(format!(
                "{} row without id: {:?}",
                record_type.name(),
                row
            )))
        }
    };
    if row.value(ENTITY_ID).is_null() && record_type.has_entity_fields() {
        row.set(ENTITY_ID, id);
    }

    if record_type.has_normal_fields() {
        if row.value(CREATED_TIMESTAMP).is_null() {
            row.set(CREATED_TIMESTAMP, now);
        }
        row.set(UPDATED_TIMESTAMP, now);
    }
    Ok(row)
}

fn upsert_builder(record_type: &RecordType, row: &Record) -> Result<QueryBuilder<'static, Sqlite>> {
    // 按记录类型的列顺序写入
    let columns: Vec<&Column> = record_type
        .columns()
        .iter()
        .filter(|c| row.contains(&c.name))
        .collect();

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("INSERT INTO ");
    builder.push(quote_ident(record_type.table_name()));
    builder.push(" (");
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    builder.push(names.join(", "));
    builder.push(") VALUES (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        push_value(&mut builder, &coerce(record_type, column, row.value(&column.name))?);
    }
    builder.push(") ON CONFLICT(");
    builder.push(quote_ident(ID));

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| c.name != ID && c.name != CREATED_TIMESTAMP)
        .map(|c| format!("{0} = excluded.{0}", quote_ident(&c.name)))
        .collect();
    if updates.is_empty() {
        builder.push(") DO NOTHING");
    } else {
        builder.push(") DO UPDATE SET ");
        builder.push(updates.join(", "));
    }
    Ok(builder)
}

/// 时间列允许传入字符串，统一转成时间
fn coerce(record_type: &RecordType, column: &Column, value: &Value) -> Result<Value> {
    match (column.ty, value) {
        (ColumnType::Timestamp, Value::Text(text)) => Ok(Value::Timestamp(time_util::parse_timestamp(text)?)),
        (ColumnType::Timestamp, Value::Int(ms)) => Ok(Value::Timestamp(time_util::from_timestamp_ms(*ms)?)),
        (ColumnType::Timestamp, Value::Float(_)) | (ColumnType::Integer, Value::Timestamp(_)) => {
            Err(DataError::InvalidQuery(format!(
                "{}.{} can not hold {:?}",
                record_type.name(),
                column.name,
                value
            )))
        }
        _ => Ok(value.clone()),
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            builder.push("NULL");
        }
        Value::Int(v) => {
            builder.push_bind(*v);
        }
        Value::Float(v) => {
            builder.push_bind(*v);
        }
        Value::Text(v) => {
            builder.push_bind(v.clone());
        }
        Value::Timestamp(ts) => {
            builder.push_bind(time_util::to_timestamp_ms(ts));
        }
    }
}

fn push_filter(builder: &mut QueryBuilder<'static, Sqlite>, record_type: &RecordType, filter: &Filter) -> Result<()> {
    let column = record_type.require_column(filter.column())?;
    let ident = quote_ident(&column.name);

    match filter {
        Filter::Eq(_, Value::Null) => {
            builder.push(format!("{} IS NULL", ident));
        }
        Filter::NotEq(_, Value::Null) => {
            builder.push(format!("{} IS NOT NULL", ident));
        }
        Filter::Eq(_, value) => push_compare(builder, record_type, column, "=", value)?,
        Filter::NotEq(_, value) => push_compare(builder, record_type, column, "!=", value)?,
        Filter::Gt(_, value) => push_compare(builder, record_type, column, ">", value)?,
        Filter::Ge(_, value) => push_compare(builder, record_type, column, ">=", value)?,
        Filter::Lt(_, value) => push_compare(builder, record_type, column, "<", value)?,
        Filter::Le(_, value) => push_compare(builder, record_type, column, "<=", value)?,
        Filter::In(_, values) if values.is_empty() => {
            builder.push("1 = 0");
        }
        Filter::In(_, values) => {
            builder.push(format!("{} IN (", ident));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, &coerce(record_type, column, value)?);
            }
            builder.push(")");
        }
        Filter::IsNull(_) => {
            builder.push(format!("{} IS NULL", ident));
        }
        Filter::NotNull(_) => {
            builder.push(format!("{} IS NOT NULL", ident));
        }
    }
    Ok(())
}

fn push_compare(
    builder: &mut QueryBuilder<'static, Sqlite>,
    record_type: &RecordType,
    column: &Column,
    op: &str,
    value: &Value,
) -> Result<()> {
    builder.push(format!("{} {} ", quote_ident(&column.name), op));
    push_value(builder, &coerce(record_type, column, value)?);
    Ok(())
}

fn decode_row(row: &SqliteRow, columns: &[&Column]) -> Result<Record> {
    let mut record = Record::new();
    for (i, column) in columns.iter().enumerate() {
        let value = match column.ty {
            ColumnType::Text => Value::from(row.try_get::<Option<String>, _>(i)?),
            ColumnType::Integer => Value::from(row.try_get::<Option<i64>, _>(i)?),
            ColumnType::Float => Value::from(row.try_get::<Option<f64>, _>(i)?),
            ColumnType::Timestamp => match row.try_get::<Option<i64>, _>(i)? {
                Some(ms) => Value::Timestamp(time_util::from_timestamp_ms(ms)?),
                None => Value::Null,
            },
        };
        record.set(&column.name, value);
    }
    Ok(record)
}
