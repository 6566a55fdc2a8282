use std::fmt;

/// 实时推送的连接目标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    /// 全局实时推送 `/ws/`
    Global,
    /// 行情/日志数据推送 `/ws/data`
    Data,
    /// 单次回测的推送 `/ws/backtest/{id}`
    Backtest(i64),
}

impl StreamTarget {
    /// 拼接完整地址，`ws_base_url` 形如 ws://host/api/v1/ws
    pub fn url(&self, ws_base_url: &str) -> String {
        let base = ws_base_url.trim_end_matches('/');
        match self {
            StreamTarget::Global => format!("{}/", base),
            StreamTarget::Data => format!("{}/data", base),
            StreamTarget::Backtest(id) => format!("{}/backtest/{}", base, id),
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTarget::Global => write!(f, "global"),
            StreamTarget::Data => write!(f, "data"),
            StreamTarget::Backtest(id) => write!(f, "backtest#{}", id),
        }
    }
}
