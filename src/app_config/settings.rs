use std::path::PathBuf;
use std::time::Duration;

use crate::app_config::env::{env_is_true, env_opt, env_or_default, env_u64};
use crate::error::{DashboardError, DashboardResult};

pub const DEFAULT_LOG_CAPACITY: usize = 100;
pub const DEFAULT_PNL_CAPACITY: usize = 100;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// 仪表盘客户端配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// LOCAL 输出到终端，其他环境写滚动日志文件
    pub app_env: String,
    /// HTTP 接口前缀，如 http://localhost:8000/api/v1
    pub api_base_url: String,
    /// 实时推送前缀，如 ws://localhost:8000/api/v1/ws
    pub ws_base_url: String,
    pub log_capacity: usize,
    pub pnl_capacity: usize,
    pub reconnect_delay: Duration,
    /// None 表示连接阶段不设超时
    pub connect_timeout: Option<Duration>,
    pub token_file: Option<PathBuf>,
    pub log_dir: String,
    /// 日志文件按 JSON 行输出
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_env: "LOCAL".to_string(),
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            ws_base_url: "ws://localhost:8000/api/v1/ws".to_string(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            pnl_capacity: DEFAULT_PNL_CAPACITY,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            connect_timeout: None,
            token_file: None,
            log_dir: "log_files".to_string(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// 从环境变量读取配置（调用前先加载 .env）
    pub fn from_env() -> DashboardResult<Self> {
        let defaults = Self::default();
        let connect_timeout_ms = env_u64("DASHBOARD_CONNECT_TIMEOUT_MS", 0);

        let config = Self {
            app_env: env_or_default("APP_ENV", &defaults.app_env),
            api_base_url: env_or_default("DASHBOARD_API_BASE_URL", &defaults.api_base_url),
            ws_base_url: env_or_default("DASHBOARD_WS_BASE_URL", &defaults.ws_base_url),
            log_capacity: env_u64("DASHBOARD_LOG_CAPACITY", DEFAULT_LOG_CAPACITY as u64) as usize,
            pnl_capacity: env_u64("DASHBOARD_PNL_CAPACITY", DEFAULT_PNL_CAPACITY as u64) as usize,
            reconnect_delay: Duration::from_millis(env_u64(
                "DASHBOARD_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
            connect_timeout: (connect_timeout_ms > 0)
                .then(|| Duration::from_millis(connect_timeout_ms)),
            token_file: env_opt("DASHBOARD_TOKEN_FILE").map(PathBuf::from),
            log_dir: env_or_default("DASHBOARD_LOG_DIR", &defaults.log_dir),
            log_json: env_is_true("DASHBOARD_LOG_JSON", defaults.log_json),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DashboardResult<()> {
        if self.log_capacity == 0 {
            return Err(DashboardError::Config(
                "DASHBOARD_LOG_CAPACITY 必须大于0".to_string(),
            ));
        }
        if self.pnl_capacity == 0 {
            return Err(DashboardError::Config(
                "DASHBOARD_PNL_CAPACITY 必须大于0".to_string(),
            ));
        }
        if !self.ws_base_url.starts_with("ws://") && !self.ws_base_url.starts_with("wss://") {
            return Err(DashboardError::Config(format!(
                "DASHBOARD_WS_BASE_URL 需以 ws:// 或 wss:// 开头: {}",
                self.ws_base_url
            )));
        }
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("LOCAL")
    }
}
