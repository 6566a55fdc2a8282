//! 仪表盘客户端统一错误类型

use thiserror::Error;

pub type DashboardResult<T> = std::result::Result<T, DashboardError>;

#[derive(Error, Debug)]
pub enum DashboardError {
    /// 连接未建立时调用 send，消息被丢弃
    #[error("实时连接未建立，消息已丢弃")]
    NotConnected,

    #[error("传输错误: {0}")]
    Transport(String),

    #[error("请求失败: status={status}, msg={message}")]
    Http { status: u16, message: String },

    /// 401/403，本地 token 已清除
    #[error("登录已失效，请重新登录")]
    Unauthorized,

    #[error("解析错误: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("推送消息格式错误: {0}")]
    InvalidMessage(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DashboardError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => DashboardError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => DashboardError::Transport(e.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DashboardError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DashboardError::Transport(e.to_string())
    }
}
