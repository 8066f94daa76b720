use thiserror::Error;

/// 数据层错误
#[derive(Error, Debug)]
pub enum DataError {
    /// 记录类型没有注册到任何 store
    #[error("schema not registered: {0}")]
    SchemaNotRegistered(String),

    #[error("provider {provider} is not registered for {record_type}")]
    ProviderNotRegistered {
        record_type: String,
        provider: String,
    },

    /// 同一个 entity_type 被两个不同的记录类型声明
    #[error("entity type {entity_type} is bound to {existing}, refusing to rebind to {incoming}")]
    AmbiguousEntityType {
        entity_type: String,
        existing: String,
        incoming: String,
    },

    #[error("unknown column {column} for {record_type}")]
    UnknownColumn { record_type: String, column: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid interval level: {0}")]
    InvalidLevel(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("no recorder #{index} registered for {record_type}")]
    RecorderNotFound { record_type: String, index: usize },

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    /// 配置类错误：调用方需要修正注册或查询参数，重试无意义
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DataError::SchemaNotRegistered(_)
                | DataError::ProviderNotRegistered { .. }
                | DataError::AmbiguousEntityType { .. }
                | DataError::UnknownColumn { .. }
                | DataError::InvalidQuery(_)
                | DataError::RecorderNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(DataError::SchemaNotRegistered("Stock".to_string()).is_configuration());
        assert!(!DataError::Recorder("boom".to_string()).is_configuration());
        assert_eq!(
            DataError::SchemaNotRegistered("Stock".to_string()).to_string(),
            "schema not registered: Stock"
        );
    }
}
