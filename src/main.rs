use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use rust_quant_dashboard::app_config::{self, log::setup_logging};
use rust_quant_dashboard::socket::{ConnectionEvent, StreamTarget};
use rust_quant_dashboard::store::StoreChange;
use rust_quant_dashboard::DashboardSession;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetKind {
    Global,
    Data,
    Backtest,
}

/// 无界面运行仪表盘同步客户端，把实时状态输出到日志
#[derive(Debug, Parser)]
#[command(name = "dashboard", version)]
struct Args {
    #[arg(long, value_enum, default_value = "global")]
    target: TargetKind,

    /// target=backtest 时订阅的回测编号
    #[arg(long)]
    backtest_id: Option<i64>,

    /// 启动时拉取该策略的回测历史
    #[arg(long)]
    strategy_id: Option<i64>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,
}

impl Args {
    fn stream_target(&self) -> Result<StreamTarget> {
        Ok(match self.target {
            TargetKind::Global => StreamTarget::Global,
            TargetKind::Data => StreamTarget::Data,
            TargetKind::Backtest => match self.backtest_id {
                Some(id) => StreamTarget::Backtest(id),
                None => anyhow::bail!("--target backtest 需要同时指定 --backtest-id"),
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = app_config::load_config()?;
    let _log_guards = setup_logging(&config)?;

    let target = args.stream_target()?;
    let session = DashboardSession::start(config).await?;

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        session.api.login(username, password).await?;
    }

    if let Some(strategy_id) = args.strategy_id {
        if let Err(e) = session.history.fetch_history(strategy_id).await {
            warn!("启动时拉取回测历史失败: {}", e);
        }
    }

    // 回测可能仍在运行，报告暂不可用时等待推送结果
    if let StreamTarget::Backtest(backtest_id) = target {
        if let Err(e) = session.history.fetch_report(backtest_id).await {
            warn!("回测报告暂不可用: {}", e);
        }
    }

    let mut events = session.connection.subscribe();
    let mut changes = session.store.subscribe();
    session.connection.connect(target).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl-C，结束会话");
                break;
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::Opened { target, epoch }) => info!("推送已连接 {} (epoch={})", target, epoch),
                Ok(ConnectionEvent::Closed { reason, .. }) => warn!("推送已断开: {}", reason),
                Ok(ConnectionEvent::Error { message, .. }) => error!("推送异常: {}", message),
                Ok(ConnectionEvent::ReconnectScheduled { delay, .. }) => info!("{:?} 后重连", delay),
                Err(RecvError::Lagged(n)) => warn!("连接事件积压，跳过{}条", n),
                Err(RecvError::Closed) => break,
            },
            change = changes.recv() => match change {
                Ok(change) => log_change(&session, change).await,
                Err(RecvError::Lagged(n)) => warn!("状态变更积压，跳过{}条", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.end().await;
    Ok(())
}

async fn log_change(session: &DashboardSession, change: StoreChange) {
    let state = session.store.read().await;
    match change {
        StoreChange::Log => {
            if let Some(line) = state.logs().latest() {
                info!("{}", line);
            }
        }
        StoreChange::PnlPoint => {
            if let Some(point) = state.pnl_history().latest() {
                info!("PnL: {:.2} @ {}", point.value, point.timestamp);
            }
        }
        StoreChange::Account | StoreChange::Position => {
            let account = state.account();
            let position = state.position();
            info!(
                "账户 equity={:.2} available={:.2} | 持仓 {} volume={} avg={:.2}",
                account.equity,
                account.available,
                position.symbol,
                position.volume,
                position.average_price
            );
        }
        StoreChange::OrderEvent => {
            if let Some(event) = state.order_events().last() {
                info!("成交点位 {} {} @ {}", event.date, event.signal, event.price);
            }
        }
        StoreChange::BacktestResult => {
            if let Some(summary) = state.backtest_result().and_then(|r| r.summary()) {
                info!("回测结果: {}", serde_json::Value::Object(summary.clone()));
            }
        }
        StoreChange::BacktestHistory { strategy_id } => {
            let count = state.backtest_history(strategy_id).map(|h| h.len()).unwrap_or(0);
            info!("策略 {} 回测历史 {} 条", strategy_id, count);
        }
        StoreChange::Cleared => info!("实时状态已清空"),
    }
}
