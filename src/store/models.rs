//! 实时推送与 HTTP 接口共用的数据结构

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub type StrategyId = i64;

/// 策略日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 服务端时间（展示时使用本地接收时间）
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub strategy_id: Option<StrategyId>,
    pub message: String,
}

/// 收益曲线采样点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlPoint {
    /// unix 秒
    #[serde(default)]
    pub timestamp: f64,
    #[serde(alias = "pnl")]
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub available: f64,
}

/// 账户增量更新，缺失字段保持原值
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub equity: Option<f64>,
    #[serde(default)]
    pub available: Option<f64>,
}

impl AccountSnapshot {
    pub fn merge(&mut self, update: &AccountUpdate) {
        if let Some(equity) = update.equity {
            self.equity = equity;
        }
        if let Some(available) = update.available {
            self.available = available;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub volume: f64,
    pub average_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default, alias = "averagePrice")]
    pub average_price: Option<f64>,
}

impl PositionSnapshot {
    pub fn merge(&mut self, update: &PositionUpdate) {
        if let Some(symbol) = &update.symbol {
            self.symbol = symbol.clone();
        }
        if let Some(volume) = update.volume {
            self.volume = volume;
        }
        if let Some(average_price) = update.average_price {
            self.average_price = average_price;
        }
    }
}

/// live_update 推送：账户与持仓一起下发
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    #[serde(default)]
    pub account: Option<AccountUpdate>,
    #[serde(default)]
    pub position: Option<PositionUpdate>,
}

/// 图表上的买卖点标注
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub date: String,
    pub signal: String,
    pub price: f64,
}

/// 回测成交记录 {date, type, price, shares}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: String,
    #[serde(rename = "type")]
    pub side: String,
    pub price: f64,
    #[serde(default)]
    pub shares: Option<f64>,
}

impl From<&TradeRecord> for OrderEvent {
    fn from(trade: &TradeRecord) -> Self {
        OrderEvent {
            date: trade.date.clone(),
            signal: trade.side.clone(),
            price: trade.price,
        }
    }
}

/// 回测结果，结构不做约束，整体替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BacktestResult(Value);

impl BacktestResult {
    pub fn new(payload: Value) -> Self {
        BacktestResult(payload)
    }

    /// 规范化回测结果：
    /// `daily_pnl: {pnl, trades}` 拆成成交点位和纯收益序列，
    /// 返回的 OrderEvent 需在保存结果前写入 store
    pub fn normalize(mut payload: Value) -> (BacktestResult, Vec<OrderEvent>) {
        let mut events = Vec::new();

        if let Some(obj) = payload.as_object_mut() {
            obj.remove("type");

            let unwrapped = match obj.get_mut("daily_pnl") {
                Some(Value::Object(wrapper))
                    if wrapper.contains_key("pnl") || wrapper.contains_key("trades") =>
                {
                    let trades = wrapper.remove("trades");
                    let pnl = wrapper
                        .remove("pnl")
                        .unwrap_or_else(|| Value::Array(Vec::new()));
                    Some((pnl, trades))
                }
                _ => None,
            };

            if let Some((pnl, trades)) = unwrapped {
                obj.insert("daily_pnl".to_string(), pnl);
                if let Some(Value::Array(trades)) = trades {
                    events = extract_order_events(trades);
                }
            }
        }

        (BacktestResult(payload), events)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn daily_pnl(&self) -> Option<&Value> {
        self.get("daily_pnl")
    }

    pub fn summary(&self) -> Option<&Map<String, Value>> {
        self.get("summary").and_then(Value::as_object)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn extract_order_events(trades: Vec<Value>) -> Vec<OrderEvent> {
    trades
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<TradeRecord>(raw) {
            Ok(trade) => Some(OrderEvent::from(&trade)),
            Err(e) => {
                warn!("忽略无法解析的回测成交记录: {}", e);
                None
            }
        })
        .collect()
}

/// 回测历史列表项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestHistoryEntry {
    pub id: i64,
    pub created_at: String,
    pub status: String,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub max_drawdown: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KlineDuration {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

/// 发起回测的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    pub duration: KlineDuration,
    pub start_dt: NaiveDateTime,
    pub end_dt: NaiveDateTime,
}

/// 回测任务已受理；结果稍后通过实时推送到达
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRunResponse {
    #[serde(default)]
    pub task_id: Option<String>,
    pub backtest_id: i64,
}
