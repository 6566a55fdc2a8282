pub mod env;
pub mod log;
pub mod settings;

pub use settings::AppConfig;

/// 加载 .env 并读取配置；.env 不存在时直接使用进程环境变量
pub fn load_config() -> crate::error::DashboardResult<AppConfig> {
    dotenv::dotenv().ok();
    AppConfig::from_env()
}
