//! K线周期（采样粒度）

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::time_util;

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// 采样粒度，按时长全序（tick < 1m < ... < 1mon）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalLevel {
    #[serde(rename = "tick")]
    LevelTick,
    #[serde(rename = "1m")]
    Level1Min,
    #[serde(rename = "5m")]
    Level5Min,
    #[serde(rename = "15m")]
    Level15Min,
    #[serde(rename = "30m")]
    Level30Min,
    #[serde(rename = "1h")]
    Level1Hour,
    #[serde(rename = "4h")]
    Level4Hour,
    #[serde(rename = "1d")]
    Level1Day,
    #[serde(rename = "1wk")]
    Level1Week,
    #[serde(rename = "1mon")]
    Level1Mon,
}

/// 根据起始时间估算需要抓取的 bar 数量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// 距离当前 bar 收盘还需等待的秒数，仅日内周期且起始时间在当天时有值
    pub wait_seconds: Option<i64>,
    pub size: i64,
}

impl IntervalLevel {
    pub fn all() -> [IntervalLevel; 10] {
        [
            IntervalLevel::LevelTick,
            IntervalLevel::Level1Min,
            IntervalLevel::Level5Min,
            IntervalLevel::Level15Min,
            IntervalLevel::Level30Min,
            IntervalLevel::Level1Hour,
            IntervalLevel::Level4Hour,
            IntervalLevel::Level1Day,
            IntervalLevel::Level1Week,
            IntervalLevel::Level1Mon,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalLevel::LevelTick => "tick",
            IntervalLevel::Level1Min => "1m",
            IntervalLevel::Level5Min => "5m",
            IntervalLevel::Level15Min => "15m",
            IntervalLevel::Level30Min => "30m",
            IntervalLevel::Level1Hour => "1h",
            IntervalLevel::Level4Hour => "4h",
            IntervalLevel::Level1Day => "1d",
            IntervalLevel::Level1Week => "1wk",
            IntervalLevel::Level1Mon => "1mon",
        }
    }

    /// tick 约定为 5 秒；月按 30 天近似
    pub fn to_ms(&self) -> i64 {
        match self {
            IntervalLevel::LevelTick => 5 * SECOND_MS,
            IntervalLevel::Level1Min => MINUTE_MS,
            IntervalLevel::Level5Min => 5 * MINUTE_MS,
            IntervalLevel::Level15Min => 15 * MINUTE_MS,
            IntervalLevel::Level30Min => 30 * MINUTE_MS,
            IntervalLevel::Level1Hour => HOUR_MS,
            IntervalLevel::Level4Hour => 4 * HOUR_MS,
            IntervalLevel::Level1Day => DAY_MS,
            IntervalLevel::Level1Week => 7 * DAY_MS,
            IntervalLevel::Level1Mon => 30 * DAY_MS,
        }
    }

    pub fn to_second(&self) -> i64 {
        self.to_ms() / SECOND_MS
    }

    pub fn to_minute(&self) -> i64 {
        self.to_second() / 60
    }

    pub fn is_intraday(&self) -> bool {
        *self < IntervalLevel::Level1Day
    }

    /// 把时间向下取整到所在 bar 的起点
    pub fn floor_timestamp(&self, ts: &NaiveDateTime) -> NaiveDateTime {
        match self {
            IntervalLevel::LevelTick => *ts,
            IntervalLevel::Level1Day => ts.date().and_time(NaiveTime::MIN),
            IntervalLevel::Level1Week => {
                let date = ts.date();
                let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                monday.and_time(NaiveTime::MIN)
            }
            IntervalLevel::Level1Mon => {
                let date = ts.date();
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                    .unwrap_or(date)
                    .and_time(NaiveTime::MIN)
            }
            _ => {
                let ms = time_util::to_timestamp_ms(ts);
                let step = self.to_ms();
                let floored = ms - ms.rem_euclid(step);
                time_util::from_timestamp_ms(floored).unwrap_or(*ts)
            }
        }
    }

    /// 估算 `ts` 到现在之间的 bar 数量
    pub fn count_from_timestamp(&self, ts: &NaiveDateTime, one_day_trading_minutes: i64) -> FetchWindow {
        self.count_between(ts, &time_util::now(), one_day_trading_minutes)
    }

    /// 日内周期按每日交易分钟数折算，跳过非交易时段
    pub fn count_between(
        &self,
        start: &NaiveDateTime,
        now: &NaiveDateTime,
        one_day_trading_minutes: i64,
    ) -> FetchWindow {
        let delta = (*now - *start).max(Duration::zero());
        let days = delta.num_days();
        let one_day_trading_seconds = one_day_trading_minutes * 60;

        match self {
            IntervalLevel::Level1Day => FetchWindow {
                wait_seconds: None,
                size: days,
            },
            IntervalLevel::Level1Week => FetchWindow {
                wait_seconds: None,
                size: ceil_div(days, 7) + 1,
            },
            IntervalLevel::Level1Mon => FetchWindow {
                wait_seconds: None,
                size: ceil_div(days, 30) + 1,
            },
            _ if days > 0 => {
                let seconds = (days + 1) * one_day_trading_seconds;
                FetchWindow {
                    wait_seconds: None,
                    size: ceil_div(seconds, self.to_second()) + 1,
                }
            }
            _ => {
                let seconds = delta.num_seconds();
                FetchWindow {
                    wait_seconds: Some(self.to_second() - seconds),
                    size: (ceil_div(seconds, self.to_second()) + 1)
                        .min(one_day_trading_seconds / self.to_second()),
                }
            }
        }
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1).div_euclid(b)
}

impl PartialOrd for IntervalLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IntervalLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_ms().cmp(&other.to_ms())
    }
}

impl fmt::Display for IntervalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalLevel {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntervalLevel::all()
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| DataError::InvalidLevel(s.to_string()))
    }
}
