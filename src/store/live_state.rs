use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::app_config::AppConfig;
use crate::store::bounded_buffer::{BoundedBuffer, BufferOrder};
use crate::store::models::{
    AccountSnapshot, AccountUpdate, BacktestHistoryEntry, BacktestResult, LogEntry, OrderEvent,
    PnlPoint, PositionSnapshot, PositionUpdate, StrategyId,
};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// 每次 store 变更都会广播一条，供展示层刷新
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Log,
    PnlPoint,
    Account,
    Position,
    OrderEvent,
    BacktestResult,
    BacktestHistory { strategy_id: StrategyId },
    Cleared,
}

/// 仪表盘展示的全部实时状态
#[derive(Debug, Clone)]
pub struct LiveState {
    logs: BoundedBuffer<String>,
    pnl_history: BoundedBuffer<PnlPoint>,
    account: AccountSnapshot,
    position: PositionSnapshot,
    order_events: Vec<OrderEvent>,
    backtest_result: Option<BacktestResult>,
    backtest_history: HashMap<StrategyId, Vec<BacktestHistoryEntry>>,
}

/// `[HH:MM:SS] [Strategy 7] message`
pub fn format_log_line(entry: &LogEntry, received_at: DateTime<Local>) -> String {
    let strategy = entry
        .strategy_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "[{}] [Strategy {}] {}",
        received_at.format("%H:%M:%S"),
        strategy,
        entry.message
    )
}

impl LiveState {
    pub fn new(log_capacity: usize, pnl_capacity: usize) -> Self {
        Self {
            logs: BoundedBuffer::new(log_capacity, BufferOrder::NewestFirst),
            pnl_history: BoundedBuffer::new(pnl_capacity, BufferOrder::OldestFirst),
            account: AccountSnapshot::default(),
            position: PositionSnapshot::default(),
            order_events: Vec::new(),
            backtest_result: None,
            backtest_history: HashMap::new(),
        }
    }

    pub fn logs(&self) -> &BoundedBuffer<String> {
        &self.logs
    }

    pub fn pnl_history(&self) -> &BoundedBuffer<PnlPoint> {
        &self.pnl_history
    }

    pub fn account(&self) -> &AccountSnapshot {
        &self.account
    }

    pub fn position(&self) -> &PositionSnapshot {
        &self.position
    }

    pub fn order_events(&self) -> &[OrderEvent] {
        &self.order_events
    }

    pub fn backtest_result(&self) -> Option<&BacktestResult> {
        self.backtest_result.as_ref()
    }

    pub fn backtest_history(&self, strategy_id: StrategyId) -> Option<&[BacktestHistoryEntry]> {
        self.backtest_history.get(&strategy_id).map(Vec::as_slice)
    }

    pub(crate) fn add_log_at(&mut self, entry: &LogEntry, received_at: DateTime<Local>) {
        self.logs.push(format_log_line(entry, received_at));
    }

    pub(crate) fn add_pnl_point(&mut self, point: PnlPoint) {
        self.pnl_history.push(point);
    }

    pub(crate) fn set_account_snapshot(&mut self, update: &AccountUpdate) {
        self.account.merge(update);
    }

    pub(crate) fn set_position_snapshot(&mut self, update: &PositionUpdate) {
        self.position.merge(update);
    }

    pub(crate) fn add_order_event(&mut self, event: OrderEvent) {
        self.order_events.push(event);
    }

    pub(crate) fn set_backtest_result(&mut self, result: BacktestResult) {
        self.backtest_result = Some(result);
    }

    pub(crate) fn set_backtest_history(
        &mut self,
        strategy_id: StrategyId,
        entries: Vec<BacktestHistoryEntry>,
    ) {
        self.backtest_history.insert(strategy_id, entries);
    }

    pub(crate) fn clear_all(&mut self) {
        self.logs.clear();
        self.pnl_history.clear();
        self.account = AccountSnapshot::default();
        self.position = PositionSnapshot::default();
        self.order_events.clear();
        self.backtest_result = None;
        self.backtest_history.clear();
    }
}

/// LiveState 的共享句柄。
///
/// 所有写操作只能经由这里的方法完成，外部只能拿到读锁或快照。
#[derive(Clone)]
pub struct LiveStore {
    state: Arc<RwLock<LiveState>>,
    changes: broadcast::Sender<StoreChange>,
}

impl LiveStore {
    pub fn new(log_capacity: usize, pnl_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(LiveState::new(log_capacity, pnl_capacity))),
            changes,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.log_capacity, config.pnl_capacity)
    }

    /// 订阅变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// 读锁期间推送分发会被阻塞，不要跨 `.await` 持有；需要长时间使用时用 [`LiveStore::snapshot`]
    pub async fn read(&self) -> RwLockReadGuard<'_, LiveState> {
        self.state.read().await
    }

    pub async fn snapshot(&self) -> LiveState {
        self.state.read().await.clone()
    }

    fn notify(&self, change: StoreChange) {
        // 没有订阅者时发送失败，忽略
        let _ = self.changes.send(change);
    }

    /// 在同一把写锁内完成校验和修改，`apply` 返回实际产生的变更，释放锁后逐条广播
    pub(crate) async fn mutate<F>(&self, apply: F) -> Vec<StoreChange>
    where
        F: FnOnce(&mut LiveState) -> Vec<StoreChange>,
    {
        let changes = {
            let mut state = self.state.write().await;
            apply(&mut state)
        };
        for change in &changes {
            self.notify(change.clone());
        }
        changes
    }

    pub async fn add_log(&self, entry: LogEntry) {
        self.state.write().await.add_log_at(&entry, Local::now());
        self.notify(StoreChange::Log);
    }

    pub async fn add_pnl_point(&self, point: PnlPoint) {
        self.state.write().await.add_pnl_point(point);
        self.notify(StoreChange::PnlPoint);
    }

    pub async fn set_account_snapshot(&self, update: AccountUpdate) {
        self.state.write().await.set_account_snapshot(&update);
        self.notify(StoreChange::Account);
    }

    pub async fn set_position_snapshot(&self, update: PositionUpdate) {
        self.state.write().await.set_position_snapshot(&update);
        self.notify(StoreChange::Position);
    }

    pub async fn add_order_event(&self, event: OrderEvent) {
        self.state.write().await.add_order_event(event);
        self.notify(StoreChange::OrderEvent);
    }

    pub async fn set_backtest_result(&self, result: BacktestResult) {
        self.state.write().await.set_backtest_result(result);
        self.notify(StoreChange::BacktestResult);
    }

    pub async fn set_backtest_history(
        &self,
        strategy_id: StrategyId,
        entries: Vec<BacktestHistoryEntry>,
    ) {
        debug!("更新回测历史: strategy_id={}, 共{}条", strategy_id, entries.len());
        self.state
            .write()
            .await
            .set_backtest_history(strategy_id, entries);
        self.notify(StoreChange::BacktestHistory { strategy_id });
    }

    /// 退出登录 / 会话结束时清空全部状态
    pub async fn clear_all(&self) {
        self.state.write().await.clear_all();
        self.notify(StoreChange::Cleared);
    }
}
