#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use rust_quant_dashboard::error::{DashboardError, DashboardResult};
use rust_quant_dashboard::services::BacktestApi;
use rust_quant_dashboard::socket::{ConnectionManager, Connector, ManagerConfig, Transport};
use rust_quant_dashboard::store::models::{
    BacktestHistoryEntry, BacktestRequest, BacktestRunResponse, StrategyId,
};
use rust_quant_dashboard::store::LiveStore;

pub const WAIT: Duration = Duration::from_secs(2);

enum ServerFrame {
    Text(String),
    Close,
    Error(String),
}

/// 测试侧持有的“服务端”，用于推送帧和读取客户端发出的消息
pub struct MockServer {
    pub url: String,
    to_client: mpsc::UnboundedSender<ServerFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
    client_closed: Arc<AtomicBool>,
}

impl MockServer {
    pub fn push(&self, message: Value) {
        self.push_raw(&message.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.send(ServerFrame::Text(text.to_string()));
    }

    pub fn close(&self) {
        let _ = self.to_client.send(ServerFrame::Close);
    }

    pub fn fail(&self, message: &str) {
        let _ = self.to_client.send(ServerFrame::Error(message.to_string()));
    }

    pub async fn next_sent(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn client_closed(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    incoming: mpsc::UnboundedReceiver<ServerFrame>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&mut self) -> Option<DashboardResult<String>> {
        match self.incoming.recv().await {
            Some(ServerFrame::Text(text)) => Some(Ok(text)),
            Some(ServerFrame::Error(message)) => Some(Err(DashboardError::Transport(message))),
            Some(ServerFrame::Close) | None => None,
        }
    }

    async fn send_text(&mut self, text: String) -> DashboardResult<()> {
        self.outgoing
            .send(text)
            .map_err(|e| DashboardError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> DashboardResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 内存连接器：每次 connect 都把新的 MockServer 交给测试
pub struct MockConnector {
    attempts: AtomicUsize,
    refuse: AtomicBool,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                attempts: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                servers,
            }),
            rx,
        )
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 之后的连接全部失败
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> DashboardResult<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(DashboardError::Transport("connection refused".to_string()));
        }
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.servers.send(MockServer {
            url: url.to_string(),
            to_client,
            from_client,
            client_closed: closed.clone(),
        });
        Ok(Box::new(MockTransport {
            incoming,
            outgoing,
            closed,
        }))
    }
}

pub fn manager_with(
    connector: Arc<MockConnector>,
    reconnect_delay: Duration,
) -> (ConnectionManager, LiveStore) {
    let store = LiveStore::new(100, 100);
    let config = ManagerConfig {
        ws_base_url: "ws://dashboard.test/api/v1/ws".to_string(),
        reconnect_delay,
        connect_timeout: None,
    };
    let manager = ConnectionManager::new(config, connector, store.clone());
    (manager, store)
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<MockServer>) -> MockServer {
    tokio::time::timeout(WAIT, servers.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

/// 轮询直到条件成立或超时
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn history_entry(id: i64, status: &str) -> BacktestHistoryEntry {
    BacktestHistoryEntry {
        id,
        created_at: "2024-05-01T10:00:00+08:00".to_string(),
        status: status.to_string(),
        sharpe_ratio: None,
        max_drawdown: None,
    }
}

/// 可编排返回值的回测接口
#[derive(Default)]
pub struct MockBacktestApi {
    /// None 表示请求失败
    pub history: Mutex<Option<Vec<BacktestHistoryEntry>>>,
    pub run_response: Mutex<Option<BacktestRunResponse>>,
    pub report: Mutex<Option<Value>>,
    pub history_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
}

impl MockBacktestApi {
    pub fn set_history(&self, history: Option<Vec<BacktestHistoryEntry>>) {
        *self.history.lock().unwrap() = history;
    }

    fn server_error() -> DashboardError {
        DashboardError::Http {
            status: 500,
            message: "Internal Server Error".to_string(),
        }
    }
}

#[async_trait]
impl BacktestApi for MockBacktestApi {
    async fn backtest_history(
        &self,
        _strategy_id: StrategyId,
    ) -> DashboardResult<Vec<BacktestHistoryEntry>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(Self::server_error)
    }

    async fn run_backtest(
        &self,
        _strategy_id: StrategyId,
        _request: &BacktestRequest,
    ) -> DashboardResult<BacktestRunResponse> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.run_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(Self::server_error)
    }

    async fn backtest_report(&self, backtest_id: i64) -> DashboardResult<Value> {
        self.report
            .lock()
            .unwrap()
            .clone()
            .ok_or(DashboardError::Http {
                status: 404,
                message: format!("Backtest result {} not found", backtest_id),
            })
    }
}
