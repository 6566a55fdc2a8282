//! 推送消息分类与分发
//!
//! 服务端推送格式为 `{"type": "...", "data": {...}}`，
//! backtest_result 的字段可能直接平铺在顶层。

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{DashboardError, DashboardResult};
use crate::store::models::{
    AccountUpdate, BacktestResult, LiveUpdate, LogEntry, OrderEvent, PnlPoint,
};
use crate::store::{LiveState, LiveStore, StoreChange};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Log(LogEntry),
    PnlUpdate(PnlPoint),
    AccountUpdate(AccountUpdate),
    OrderEvent(OrderEvent),
    /// 尚未规范化的回测结果
    BacktestResult(Value),
    LiveUpdate(LiveUpdate),
    /// 未识别的类型，直接丢弃
    Unknown(String),
}

/// 分发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// 未识别的类型、解析失败或没有任何字段可更新
    Ignored,
    /// 所属连接已断开或被新连接取代，整帧丢弃
    Stale,
}

fn take_data<T: DeserializeOwned>(obj: &mut Map<String, Value>) -> DashboardResult<T> {
    let data = obj.remove("data").unwrap_or(Value::Null);
    Ok(serde_json::from_value(data)?)
}

impl StreamMessage {
    pub fn parse(text: &str) -> DashboardResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut obj) = value else {
            return Err(DashboardError::InvalidMessage(format!(
                "推送消息不是JSON对象: {}",
                text
            )));
        };

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let message = match kind.as_str() {
            "log" => StreamMessage::Log(take_data(&mut obj)?),
            "pnl_update" => StreamMessage::PnlUpdate(take_data(&mut obj)?),
            "account_update" => StreamMessage::AccountUpdate(take_data(&mut obj)?),
            "order_event" => StreamMessage::OrderEvent(take_data(&mut obj)?),
            "live_update" => StreamMessage::LiveUpdate(take_data(&mut obj)?),
            "backtest_result" => match obj.remove("data") {
                Some(data @ Value::Object(_)) => StreamMessage::BacktestResult(data),
                _ => {
                    obj.remove("type");
                    StreamMessage::BacktestResult(Value::Object(obj))
                }
            },
            _ => StreamMessage::Unknown(kind),
        };
        Ok(message)
    }
}

/// 把一条推送消息写入 store，每种类型只对应一个 mutator
/// （live_update 同时更新账户和持仓）
pub async fn dispatch(store: &LiveStore, message: StreamMessage) -> DispatchOutcome {
    dispatch_if(store, message, || true).await
}

/// 与 [`dispatch`] 相同，但在 store 写锁内先调用 `is_current`，
/// 返回 false 时整帧丢弃。断开连接与 clear_all 之间因此不会再有旧帧写入。
pub async fn dispatch_if<F>(
    store: &LiveStore,
    message: StreamMessage,
    is_current: F,
) -> DispatchOutcome
where
    F: FnOnce() -> bool,
{
    let mut stale = false;
    let changes = store
        .mutate(|state| {
            if !is_current() {
                stale = true;
                return Vec::new();
            }
            apply(state, message, Local::now())
        })
        .await;

    if stale {
        DispatchOutcome::Stale
    } else if changes.is_empty() {
        DispatchOutcome::Ignored
    } else {
        DispatchOutcome::Applied
    }
}

fn apply(
    state: &mut LiveState,
    message: StreamMessage,
    received_at: DateTime<Local>,
) -> Vec<StoreChange> {
    match message {
        StreamMessage::Log(entry) => {
            state.add_log_at(&entry, received_at);
            vec![StoreChange::Log]
        }
        StreamMessage::PnlUpdate(point) => {
            state.add_pnl_point(point);
            vec![StoreChange::PnlPoint]
        }
        StreamMessage::AccountUpdate(update) => {
            state.set_account_snapshot(&update);
            vec![StoreChange::Account]
        }
        StreamMessage::OrderEvent(event) => {
            state.add_order_event(event);
            vec![StoreChange::OrderEvent]
        }
        StreamMessage::BacktestResult(payload) => {
            let (result, events) = BacktestResult::normalize(payload);
            debug!("收到回测结果, 成交点位{}个", events.len());
            let mut changes = Vec::with_capacity(events.len() + 1);
            for event in events {
                state.add_order_event(event);
                changes.push(StoreChange::OrderEvent);
            }
            state.set_backtest_result(result);
            changes.push(StoreChange::BacktestResult);
            changes
        }
        StreamMessage::LiveUpdate(update) => {
            let mut changes = Vec::new();
            if let Some(account) = update.account {
                state.set_account_snapshot(&account);
                changes.push(StoreChange::Account);
            }
            if let Some(position) = update.position {
                state.set_position_snapshot(&position);
                changes.push(StoreChange::Position);
            }
            if changes.is_empty() {
                debug!("live_update 不含账户或持仓，忽略");
            }
            changes
        }
        StreamMessage::Unknown(kind) => {
            debug!("忽略未知推送类型: {:?}", kind);
            Vec::new()
        }
    }
}

/// 解析并分发一帧文本；解析失败只记录日志，不影响连接
pub async fn dispatch_text(store: &LiveStore, text: &str) -> DispatchOutcome {
    dispatch_text_if(store, text, || true).await
}

pub async fn dispatch_text_if<F>(store: &LiveStore, text: &str, is_current: F) -> DispatchOutcome
where
    F: FnOnce() -> bool,
{
    match StreamMessage::parse(text) {
        Ok(message) => dispatch_if(store, message, is_current).await,
        Err(e) => {
            warn!("推送消息解析失败: {}, raw={}", e, text);
            DispatchOutcome::Ignored
        }
    }
}
