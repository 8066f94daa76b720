use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{DataError, Result};

pub const TIME_FORMAT_DAY: &str = "%Y-%m-%d";
pub const TIME_FORMAT_DAY1: &str = "%Y%m%d";
pub const TIME_FORMAT_SECOND: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT_ISO8601: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// 当前 UTC 时间（无时区）
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// 毫秒时间戳，存储层统一使用该格式
pub fn to_timestamp_ms(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn from_timestamp_ms(timestamp_ms: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DataError::InvalidTimestamp(timestamp_ms.to_string()))
}

/// 解析常见的时间字符串：
/// `2019-06-23`、`20190623`、`2019-06-23 15:00:00`、`2019-06-23T15:00:00.000`
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for fmt in [TIME_FORMAT_SECOND, "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(ts);
        }
    }
    for fmt in [TIME_FORMAT_DAY, TIME_FORMAT_DAY1] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(date.and_time(chrono::NaiveTime::MIN));
        }
    }
    Err(DataError::InvalidTimestamp(value.to_string()))
}

pub fn to_time_str(ts: &NaiveDateTime, fmt: &str) -> String {
    ts.format(fmt).to_string()
}
