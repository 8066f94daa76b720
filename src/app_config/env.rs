use std::env;
use std::str::FromStr;

/// 布尔型环境变量：true/1/yes 为真（大小写不敏感），未设置时取默认值
pub fn env_is_true(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 未设置或解析失败都返回默认值
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn env_i64(key: &str, default: i64) -> i64 {
    env_parse(key, default)
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    env_parse(key, default)
}
