//! 实时推送连接管理器
//!
//! 同一时刻只维护一条逻辑连接（全局推送或单次回测推送）。
//! 连接异常断开后按固定间隔无限重连；只有调用 [`ConnectionManager::disconnect`]
//! 才会停止。每次发起连接都会递增 epoch，过期的读任务和重连定时器
//! 发现 epoch 不一致时直接退出。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app_config::AppConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::socket::message::{dispatch_text_if, DispatchOutcome};
use crate::socket::target::StreamTarget;
use crate::socket::transport::{Connector, Transport, WsConnector};
use crate::store::LiveStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 连接生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened { target: StreamTarget, epoch: u64 },
    Closed { epoch: u64, reason: String },
    Error { epoch: u64, message: String },
    ReconnectScheduled { epoch: u64, delay: Duration },
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub ws_base_url: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Option<Duration>,
}

impl From<&AppConfig> for ManagerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            ws_base_url: config.ws_base_url.clone(),
            reconnect_delay: config.reconnect_delay,
            connect_timeout: config.connect_timeout,
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionStats {
    connect_attempts: AtomicU64,
    opened: AtomicU64,
    reconnects_scheduled: AtomicU64,
    frames_applied: AtomicU64,
    frames_ignored: AtomicU64,
    frames_stale: AtomicU64,
}

/// 连接统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connect_attempts: u64,
    pub opened: u64,
    pub reconnects_scheduled: u64,
    pub frames_applied: u64,
    pub frames_ignored: u64,
    /// 连接断开或被取代后才轮到分发、因而被丢弃的帧
    pub frames_stale: u64,
}

enum Outbound {
    Text(String),
    Close,
}

struct InboundFrame {
    epoch: u64,
    text: String,
}

enum LossReason {
    Closed(String),
    Error(String),
}

struct Inner {
    state: ConnectionState,
    epoch: u64,
    target: Option<StreamTarget>,
    /// 主动断开后不再自动重连
    stopped: bool,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    reconnect_task: Option<JoinHandle<()>>,
    inbound_rx: Option<mpsc::UnboundedReceiver<InboundFrame>>,
    dispatcher: Option<JoinHandle<()>>,
}

struct Shared {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    store: LiveStore,
    inner: Mutex<Inner>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
    /// inner.epoch 的镜像，分发任务和读循环无需拿锁即可判断帧是否过期
    live_epoch: Arc<AtomicU64>,
    events: broadcast::Sender<ConnectionEvent>,
    stats: Arc<ConnectionStats>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig, connector: Arc<dyn Connector>, store: LiveStore) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                store,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                    target: None,
                    stopped: false,
                    outbound: None,
                    reconnect_task: None,
                    inbound_rx: Some(inbound_rx),
                    dispatcher: None,
                }),
                inbound_tx,
                live_epoch: Arc::new(AtomicU64::new(0)),
                events,
                stats: Arc::new(ConnectionStats::default()),
            }),
        }
    }

    /// 使用 tokio-tungstenite 连接器
    pub fn with_websocket(config: &AppConfig, store: LiveStore) -> Self {
        Self::new(ManagerConfig::from(config), Arc::new(WsConnector), store)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // 临界区内没有 panic 点，中毒时沿用内部数据
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn store(&self) -> &LiveStore {
        &self.shared.store
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.lock()
            .reconnect_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let stats = &self.shared.stats;
        StatsSnapshot {
            connect_attempts: stats.connect_attempts.load(Ordering::Relaxed),
            opened: stats.opened.load(Ordering::Relaxed),
            reconnects_scheduled: stats.reconnects_scheduled.load(Ordering::Relaxed),
            frames_applied: stats.frames_applied.load(Ordering::Relaxed),
            frames_ignored: stats.frames_ignored.load(Ordering::Relaxed),
            frames_stale: stats.frames_stale.load(Ordering::Relaxed),
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.shared.events.send(event);
    }

    /// 建立连接。已连接或正在连接时直接返回，避免重复建立 socket。
    ///
    /// 连接失败不会返回错误：会广播 `Error` 事件并按配置间隔安排重连。
    pub async fn connect(&self, target: StreamTarget) {
        let epoch = {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    debug!("实时推送已连接或正在连接，忽略本次 connect: {}", target);
                    return;
                }
                ConnectionState::Disconnected => {}
            }
            if let Some(task) = inner.reconnect_task.take() {
                task.abort();
            }
            inner.stopped = false;
            inner.epoch += 1;
            self.shared.live_epoch.store(inner.epoch, Ordering::SeqCst);
            inner.state = ConnectionState::Connecting;
            inner.target = Some(target.clone());
            self.ensure_dispatcher(&mut inner);
            inner.epoch
        };

        let url = target.url(&self.shared.config.ws_base_url);
        self.shared
            .stats
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);
        info!("📡 连接实时推送: {} (epoch={})", url, epoch);

        let attempt = self.shared.connector.connect(&url);
        let result = match self.shared.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(DashboardError::Transport(format!(
                    "连接超时({:?}): {}",
                    limit, url
                ))),
            },
            None => attempt.await,
        };

        let mut transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                error!("❌ 实时推送连接失败: {}, {}", url, e);
                self.handle_loss(epoch, LossReason::Error(e.to_string()));
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let accepted = {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.stopped {
                false
            } else {
                inner.state = ConnectionState::Connected;
                inner.outbound = Some(outbound_tx);
                true
            }
        };
        if !accepted {
            // 握手期间调用方已经 disconnect 或发起了新的连接
            debug!("丢弃过期连接 epoch={}", epoch);
            let _ = transport.close().await;
            return;
        }

        self.shared.stats.opened.fetch_add(1, Ordering::Relaxed);
        info!("✅ 实时推送已连接: {}", url);
        self.emit(ConnectionEvent::Opened {
            target,
            epoch,
        });

        tokio::spawn(self.clone().run_connection(transport, outbound_rx, epoch));
    }

    /// 序列化并发送；未连接时返回 NotConnected，消息直接丢弃
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> DashboardResult<()> {
        let outbound = {
            let inner = self.lock();
            if inner.state == ConnectionState::Connected {
                inner.outbound.clone()
            } else {
                None
            }
        };
        let Some(outbound) = outbound else {
            warn!("实时推送未连接，消息已丢弃");
            return Err(DashboardError::NotConnected);
        };
        let text = serde_json::to_string(message)?;
        outbound
            .send(Outbound::Text(text))
            .map_err(|_| DashboardError::NotConnected)
    }

    /// 主动断开：取消待执行的重连，关闭连接，不再自动重连
    pub fn disconnect(&self) {
        let outbound = {
            let mut inner = self.lock();
            inner.stopped = true;
            inner.epoch += 1;
            self.shared.live_epoch.store(inner.epoch, Ordering::SeqCst);
            inner.state = ConnectionState::Disconnected;
            if let Some(task) = inner.reconnect_task.take() {
                task.abort();
            }
            inner.outbound.take()
        };
        if let Some(outbound) = outbound {
            let _ = outbound.send(Outbound::Close);
        }
        info!("🛑 实时推送已主动断开");
    }

    fn ensure_dispatcher(&self, inner: &mut Inner) {
        if inner.dispatcher.is_some() {
            return;
        }
        let Some(mut inbound_rx) = inner.inbound_rx.take() else {
            return;
        };
        let store = self.shared.store.clone();
        let stats = Arc::clone(&self.shared.stats);
        let live_epoch = Arc::clone(&self.shared.live_epoch);
        inner.dispatcher = Some(tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                // epoch 在 store 写锁内比较：disconnect 之后的 clear_all 不会被旧帧覆盖
                let is_current = || live_epoch.load(Ordering::SeqCst) == frame.epoch;
                match dispatch_text_if(&store, &frame.text, is_current).await {
                    DispatchOutcome::Applied => {
                        stats.frames_applied.fetch_add(1, Ordering::Relaxed);
                    }
                    DispatchOutcome::Ignored => {
                        debug!("epoch={} 的推送未产生状态变更", frame.epoch);
                        stats.frames_ignored.fetch_add(1, Ordering::Relaxed);
                    }
                    DispatchOutcome::Stale => {
                        debug!("丢弃过期连接的推送 epoch={}", frame.epoch);
                        stats.frames_stale.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }

    async fn run_connection(
        self,
        mut transport: Box<dyn Transport>,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        epoch: u64,
    ) {
        let reason = loop {
            // 优先处理出站命令，Close 一到就不再读入新帧
            tokio::select! {
                biased;
                command = outbound_rx.recv() => match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = transport.send_text(text).await {
                            break LossReason::Error(e.to_string());
                        }
                    }
                    Some(Outbound::Close) | None => {
                        if let Err(e) = transport.close().await {
                            debug!("关闭连接时出错: {}", e);
                        }
                        return;
                    }
                },
                frame = transport.recv() => match frame {
                    Some(Ok(text)) => {
                        if self.shared.live_epoch.load(Ordering::SeqCst) != epoch {
                            debug!("连接 epoch={} 已过期，停止转发", epoch);
                            let _ = transport.close().await;
                            return;
                        }
                        if self.shared.inbound_tx.send(InboundFrame { epoch, text }).is_err() {
                            break LossReason::Error("推送分发任务已退出".to_string());
                        }
                    }
                    Some(Err(e)) => break LossReason::Error(e.to_string()),
                    None => break LossReason::Closed("服务端关闭连接".to_string()),
                },
            }
        };
        self.handle_loss(epoch, reason);
    }

    fn handle_loss(&self, epoch: u64, reason: LossReason) {
        let target = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                debug!("忽略过期连接的断开通知 epoch={}", epoch);
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.outbound = None;
            if inner.stopped {
                None
            } else {
                inner.target.clone()
            }
        };

        match reason {
            LossReason::Closed(reason) => {
                warn!("实时推送断开: {}", reason);
                self.emit(ConnectionEvent::Closed { epoch, reason });
            }
            LossReason::Error(message) => {
                error!("实时推送异常: {}", message);
                self.emit(ConnectionEvent::Error {
                    epoch,
                    message: message.clone(),
                });
                self.emit(ConnectionEvent::Closed {
                    epoch,
                    reason: message,
                });
            }
        }

        if let Some(target) = target {
            self.schedule_reconnect(epoch, target);
        }
    }

    fn schedule_reconnect(&self, epoch: u64, target: StreamTarget) {
        let delay = self.shared.config.reconnect_delay;
        {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.stopped {
                return;
            }
            // 持锁 spawn，保证定时器触发时能看到自己的句柄
            let task = tokio::spawn(reconnect_after(self.clone(), epoch, target, delay));
            if let Some(previous) = inner.reconnect_task.replace(task) {
                previous.abort();
            }
        }
        self.shared
            .stats
            .reconnects_scheduled
            .fetch_add(1, Ordering::Relaxed);
        warn!("{:?} 后重连实时推送", delay);
        self.emit(ConnectionEvent::ReconnectScheduled { epoch, delay });
    }
}

// 显式 BoxFuture 打断 connect -> 重连 -> connect 的递归类型
fn reconnect_after(
    manager: ConnectionManager,
    epoch: u64,
    target: StreamTarget,
    delay: Duration,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;
        {
            let mut inner = manager.lock();
            if inner.epoch != epoch || inner.stopped {
                return;
            }
            inner.reconnect_task = None;
        }
        info!("🔄 重连实时推送: {}", target);
        manager.connect(target).await;
    })
}

static CONNECTION_MANAGER: OnceCell<ConnectionManager> = OnceCell::new();

/// 初始化全局连接管理器（首次调用时创建，之后返回同一个实例）
pub fn init_connection_manager(config: &AppConfig, store: LiveStore) -> &'static ConnectionManager {
    CONNECTION_MANAGER.get_or_init(|| ConnectionManager::with_websocket(config, store))
}

/// 获取全局连接管理器，未初始化时返回 None
pub fn get_connection_manager() -> Option<&'static ConnectionManager> {
    CONNECTION_MANAGER.get()
}
