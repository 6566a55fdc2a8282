use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app_config::AppConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::services::auth::TokenStore;
use crate::store::models::{
    BacktestHistoryEntry, BacktestRequest, BacktestRunResponse, StrategyId,
};

/// 回测相关的 HTTP 接口
#[async_trait]
pub trait BacktestApi: Send + Sync {
    async fn backtest_history(
        &self,
        strategy_id: StrategyId,
    ) -> DashboardResult<Vec<BacktestHistoryEntry>>;

    async fn run_backtest(
        &self,
        strategy_id: StrategyId,
        request: &BacktestRequest,
    ) -> DashboardResult<BacktestRunResponse>;

    async fn backtest_report(&self, backtest_id: i64) -> DashboardResult<Value>;
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// 后端 HTTP 客户端，每次请求自动附带 Bearer token
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: TokenStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: TokenStore) -> Self {
        ApiClient {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &AppConfig, token: TokenStore) -> Self {
        Self::new(config.api_base_url.clone(), token)
    }

    pub fn token(&self) -> &TokenStore {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.get().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> DashboardResult<T> {
        let response = self.authorized(builder).await.send().await?;
        let status_code = response.status();
        let response_body = response.text().await?;
        debug!("path:{}, status:{}, response: {}", path, status_code, response_body);

        if status_code.is_success() {
            return Ok(serde_json::from_str(&response_body)?);
        }

        if status_code == StatusCode::UNAUTHORIZED || status_code == StatusCode::FORBIDDEN {
            warn!("登录失效({}), 清除本地 token: {}", status_code, path);
            self.token.clear().await;
            return Err(DashboardError::Unauthorized);
        }

        let parsed = serde_json::from_str::<ErrorResponse>(&response_body);
        let message = match parsed {
            Ok(ErrorResponse {
                detail: Value::String(detail),
            }) => detail,
            Ok(ErrorResponse { detail }) if !detail.is_null() => detail.to_string(),
            _ => response_body,
        };
        Err(DashboardError::Http {
            status: status_code.as_u16(),
            message,
        })
    }

    pub(crate) async fn send_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> DashboardResult<T> {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body);
        }
        self.execute(path, builder).await
    }

    /// 表单登录，成功后保存 token
    pub async fn login(&self, username: &str, password: &str) -> DashboardResult<()> {
        let path = "/login/access-token";
        let builder = self
            .client
            .post(self.url(path))
            .form(&[("username", username), ("password", password)]);
        match self.execute::<TokenResponse>(path, builder).await {
            Ok(token) => {
                info!(
                    "登录成功: {}, token_type={}",
                    username,
                    token.token_type.as_deref().unwrap_or("bearer")
                );
                self.token.set(token.access_token).await
            }
            Err(e) => {
                warn!("登录失败: {}, {}", username, e);
                self.token.clear().await;
                Err(e)
            }
        }
    }

    /// 退出登录只清除 token，store 由调用方清空
    pub async fn logout(&self) {
        self.token.clear().await;
    }
}

#[async_trait]
impl BacktestApi for ApiClient {
    async fn backtest_history(
        &self,
        strategy_id: StrategyId,
    ) -> DashboardResult<Vec<BacktestHistoryEntry>> {
        self.send_request(
            Method::GET,
            &format!("/backtests/history/{}", strategy_id),
            None,
        )
        .await
    }

    async fn run_backtest(
        &self,
        strategy_id: StrategyId,
        request: &BacktestRequest,
    ) -> DashboardResult<BacktestRunResponse> {
        let body = serde_json::to_string(request)?;
        self.send_request(
            Method::POST,
            &format!("/backtests/run/{}", strategy_id),
            Some(body),
        )
        .await
    }

    async fn backtest_report(&self, backtest_id: i64) -> DashboardResult<Value> {
        self.send_request(Method::GET, &format!("/backtests/{}", backtest_id), None)
            .await
    }
}
