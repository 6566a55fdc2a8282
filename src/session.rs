use std::sync::Arc;

use tracing::info;

use crate::app_config::AppConfig;
use crate::error::DashboardResult;
use crate::services::{ApiClient, HistoryFetcher, TokenStore};
use crate::socket::ConnectionManager;
use crate::store::LiveStore;

/// 一次登录会话内的全部组件
pub struct DashboardSession {
    pub config: AppConfig,
    pub store: LiveStore,
    pub connection: ConnectionManager,
    pub api: Arc<ApiClient>,
    pub history: HistoryFetcher,
}

impl DashboardSession {
    pub async fn start(config: AppConfig) -> DashboardResult<Self> {
        config.validate()?;
        let token = TokenStore::load(config.token_file.clone()).await?;
        let store = LiveStore::from_config(&config);
        let connection = ConnectionManager::with_websocket(&config, store.clone());
        let api = Arc::new(ApiClient::from_config(&config, token));
        let history = HistoryFetcher::new(api.clone(), store.clone());
        info!(
            "仪表盘会话已初始化: api={}, ws={}",
            config.api_base_url, config.ws_base_url
        );
        Ok(Self {
            config,
            store,
            connection,
            api,
            history,
        })
    }

    /// 会话结束：断开推送、清除 token、清空所有实时状态
    pub async fn end(&self) {
        self.connection.disconnect();
        self.api.logout().await;
        self.store.clear_all().await;
        info!("仪表盘会话已结束");
    }
}
