use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::BoxError;

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// 订阅者配置；容器本身只发事件，是否安装订阅者由调用方决定
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 默认过滤级别，`RUST_LOG` 存在时以其为准
    pub level: Level,
    pub format: LogFormat,
    pub ansi: bool,
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            ansi: true,
            show_target: false,
        }
    }
}

impl LoggingConfig {
    /// 包括 `wiring` 的解析与作用域事件（debug/trace）
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Pretty,
            ansi: true,
            show_target: true,
        }
    }

    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            ansi: false,
            show_target: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }
}

/// 安装全局订阅者；已存在时返回错误
pub fn init_logging(config: LoggingConfig) -> Result<(), BoxError> {
    let registry = tracing_subscriber::registry().with(config.filter());
    match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(config.show_target).with_ansi(config.ansi))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(config.show_target))
            .try_init()?,
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(config.show_target).with_ansi(config.ansi))
            .try_init()?,
    }
    tracing::debug!(level = %config.level, format = ?config.format, "subscriber installed");
    Ok(())
}
