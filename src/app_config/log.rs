use std::sync::OnceLock;

use tracing::{info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::app_config::env::{env_is_true, env_or_default};

// 后台写线程随 guard 一起存活到进程结束
static LOG_GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// 日志配置，全部来自环境变量
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// APP_ENV，local 时只输出到控制台
    pub app_env: String,
    pub log_level: String,
    pub log_dir: String,
    pub rotation: Rotation,
    pub info_file_name: String,
    pub error_file_name: String,
    pub console: bool,
    /// LOG_FORMAT=json 时文件按行输出 json
    pub json: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            app_env: env_or_default("APP_ENV", "local"),
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_dir: env_or_default("LOG_DIR", "log_files"),
            rotation: parse_rotation(&env_or_default("LOG_ROTATION", "daily")),
            info_file_name: env_or_default("LOG_INFO_FILE", "quant_data.log"),
            error_file_name: env_or_default("LOG_ERROR_FILE", "quant_data_error.log"),
            console: env_is_true("ENABLE_CONSOLE_LOGGING", true),
            json: env_or_default("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        }
    }

    pub fn is_local(&self) -> bool {
        self.app_env == "local"
    }
}

fn parse_rotation(s: &str) -> Rotation {
    match s.to_lowercase().as_str() {
        "minutely" | "minute" | "min" => Rotation::MINUTELY,
        "hourly" | "hour" | "hr" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn file_layer<S, W>(writer: W, filter: EnvFilter, json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer);
    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

/// 安装全局 subscriber，进程内只能调用一次
pub fn setup_logging() -> anyhow::Result<()> {
    let config = LogConfig::from_env();

    if config.is_local() {
        let subscriber = Registry::default().with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_writer(std::io::stdout)
                .with_filter(EnvFilter::new(&config.log_level)),
        );
        tracing::subscriber::set_global_default(subscriber)?;
        info!("logging to stdout, env:{} level:{}", config.app_env, config.log_level);
        return Ok(());
    }

    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| anyhow::anyhow!("create log dir {} failed: {}", config.log_dir, e))?;

    let info_appender = RollingFileAppender::new(config.rotation.clone(), &config.log_dir, &config.info_file_name);
    let error_appender = RollingFileAppender::new(config.rotation.clone(), &config.log_dir, &config.error_file_name);
    let (info_writer, info_guard) = tracing_appender::non_blocking(info_appender);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);
    LOG_GUARDS
        .set(vec![info_guard, error_guard])
        .map_err(|_| anyhow::anyhow!("logging already initialized"))?;

    let mut layers = vec![
        file_layer(info_writer, EnvFilter::new(&config.log_level), config.json),
        file_layer(error_writer, EnvFilter::new("error"), config.json),
    ];
    if config.console {
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(std::io::stdout)
                .with_filter(EnvFilter::new(&config.log_level))
                .boxed(),
        );
    }
    tracing::subscriber::set_global_default(Registry::default().with(layers))?;

    info!(
        "logging to {} env:{} level:{} console:{}",
        config.log_dir, config.app_env, config.log_level, config.console
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rotation() {
        assert_eq!(parse_rotation("hourly"), Rotation::HOURLY);
        assert_eq!(parse_rotation("MIN"), Rotation::MINUTELY);
        assert_eq!(parse_rotation("weekly"), Rotation::DAILY);
    }
}
