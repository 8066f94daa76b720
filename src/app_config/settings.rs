use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_config::env::{env_i64, env_or_default, env_u64};

/// 数据层配置
#[derive(Debug, Clone)]
pub struct DataSettings {
    /// 物理库文件所在目录
    pub data_path: PathBuf,
    /// 每个物理库的最大连接数
    pub max_connections: u32,
    /// 实时模式下两次 move_on 之间的间隔
    pub refresh_interval: Duration,
    /// 单次 move_on 的总等待时间
    pub move_on_timeout: Duration,
    /// move_on 重试查询之间的间隔
    pub move_on_retry_interval: Duration,
    pub trading_minutes_per_day: i64,
}

impl DataSettings {
    pub fn new(data_path: impl AsRef<Path>) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            max_connections: 4,
            refresh_interval: Duration::from_secs(10),
            move_on_timeout: Duration::from_secs(20),
            move_on_retry_interval: Duration::from_millis(500),
            trading_minutes_per_day: 24 * 60,
        }
    }

    /// DATA_PATH, DB_MAX_CONNECTIONS, READER_REFRESH_INTERVAL_SECS,
    /// MOVE_ON_TIMEOUT_SECS, MOVE_ON_RETRY_INTERVAL_MS, TRADING_MINUTES_PER_DAY
    pub fn from_env() -> Self {
        let defaults = Self::new(env_or_default("DATA_PATH", "data"));
        Self {
            max_connections: env_u64("DB_MAX_CONNECTIONS", defaults.max_connections as u64) as u32,
            refresh_interval: Duration::from_secs(env_u64(
                "READER_REFRESH_INTERVAL_SECS",
                defaults.refresh_interval.as_secs(),
            )),
            move_on_timeout: Duration::from_secs(env_u64(
                "MOVE_ON_TIMEOUT_SECS",
                defaults.move_on_timeout.as_secs(),
            )),
            move_on_retry_interval: Duration::from_millis(env_u64(
                "MOVE_ON_RETRY_INTERVAL_MS",
                defaults.move_on_retry_interval.as_millis() as u64,
            )),
            trading_minutes_per_day: env_i64("TRADING_MINUTES_PER_DAY", defaults.trading_minutes_per_day),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DataSettings::new("/tmp/quant_data");
        assert_eq!(settings.data_path, PathBuf::from("/tmp/quant_data"));
        assert_eq!(settings.move_on_timeout, Duration::from_secs(20));
        assert_eq!(settings.refresh_interval, Duration::from_secs(10));
        assert_eq!(settings.trading_minutes_per_day, 1440);
    }
}
