use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, FmtSubscriber, Layer, Registry};

use crate::app_config::settings::AppConfig;

/// 非阻塞日志写入的 guard，进程存活期间必须持有，否则缓冲区日志会丢失
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

// 设置日志
pub fn setup_logging(config: &AppConfig) -> anyhow::Result<LogGuards> {
    if config.is_local() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_writer(std::io::stdout)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(LogGuards { _guards: Vec::new() });
    }

    let info_file = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "info.log");
    let error_file = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "error.log");

    let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);
    let (error_non_blocking, error_guard) = tracing_appender::non_blocking(error_file);

    // RUST_LOG 可覆盖 info 文件的过滤级别
    let info_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = Registry::default()
        .with(file_layer(info_non_blocking, info_filter, config.log_json))
        .with(file_layer(
            error_non_blocking,
            EnvFilter::new("error"),
            config.log_json,
        ));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(LogGuards {
        _guards: vec![info_guard, error_guard],
    })
}

fn file_layer<S>(
    writer: NonBlocking,
    filter: EnvFilter,
    json: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(writer);
    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}
