//! 交易仪表盘实时数据同步客户端
//!
//! - [`store`]：有界日志/收益缓冲区、账户与持仓快照、回测结果缓存
//! - [`socket`]：实时推送连接管理（连接、断线重连、消息分发）
//! - [`services`]：回测历史与回测触发等 HTTP 调用

pub mod app_config;
pub mod error;
pub mod services;
pub mod session;
pub mod socket;
pub mod store;

pub use error::{DashboardError, DashboardResult};
pub use session::DashboardSession;
