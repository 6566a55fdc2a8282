use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::DashboardResult;
use crate::services::api_client::BacktestApi;
use crate::store::models::{
    BacktestHistoryEntry, BacktestRequest, BacktestResult, BacktestRunResponse, StrategyId,
};
use crate::store::LiveStore;

/// 回测历史拉取与回测触发。
///
/// 请求失败时 store 保持原状，错误原样返回给调用方展示。
#[derive(Clone)]
pub struct HistoryFetcher {
    api: Arc<dyn BacktestApi>,
    store: LiveStore,
}

impl HistoryFetcher {
    pub fn new(api: Arc<dyn BacktestApi>, store: LiveStore) -> Self {
        Self { api, store }
    }

    pub async fn fetch_history(
        &self,
        strategy_id: StrategyId,
    ) -> DashboardResult<Vec<BacktestHistoryEntry>> {
        match self.api.backtest_history(strategy_id).await {
            Ok(entries) => {
                info!("拉取回测历史成功: strategy_id={}, 共{}条", strategy_id, entries.len());
                self.store
                    .set_backtest_history(strategy_id, entries.clone())
                    .await;
                Ok(entries)
            }
            Err(e) => {
                error!("拉取回测历史失败: strategy_id={}, {}", strategy_id, e);
                Err(e)
            }
        }
    }

    /// 发起回测。返回的只是任务编号，结果稍后经实时推送到达。
    ///
    /// 受理成功后刷新一次历史列表；刷新失败只记录日志，不影响返回值。
    pub async fn run_backtest(
        &self,
        strategy_id: StrategyId,
        request: &BacktestRequest,
    ) -> DashboardResult<BacktestRunResponse> {
        let response = self.api.run_backtest(strategy_id, request).await?;
        info!(
            "回测已提交: strategy_id={}, backtest_id={}, task_id={:?}",
            strategy_id, response.backtest_id, response.task_id
        );
        if let Err(e) = self.fetch_history(strategy_id).await {
            warn!("回测提交后刷新历史失败: {}", e);
        }
        Ok(response)
    }

    /// 拉取回测报告并设为当前结果，处理方式与推送的 backtest_result 一致
    pub async fn fetch_report(&self, backtest_id: i64) -> DashboardResult<BacktestResult> {
        let payload = self.api.backtest_report(backtest_id).await?;
        let (result, events) = BacktestResult::normalize(payload);
        for event in events {
            self.store.add_order_event(event).await;
        }
        self.store.set_backtest_result(result.clone()).await;
        Ok(result)
    }
}
