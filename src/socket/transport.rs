use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{DashboardError, DashboardResult};

/// 一条已建立的双工连接
#[async_trait]
pub trait Transport: Send {
    /// 下一条文本帧；返回 None 表示对端已关闭
    async fn recv(&mut self) -> Option<DashboardResult<String>>;

    async fn send_text(&mut self, text: String) -> DashboardResult<()>;

    async fn close(&mut self) -> DashboardResult<()>;
}

/// 建立连接的抽象，测试中替换为内存实现
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> DashboardResult<Box<dyn Transport>>;
}

/// 基于 tokio-tungstenite 的 websocket 连接器
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> DashboardResult<Box<dyn Transport>> {
        let (ws_stream, response) = connect_async(url).await?;
        debug!("websocket 握手完成: {}, status={}", url, response.status());
        Ok(Box::new(WsTransport { ws_stream }))
    }
}

pub struct WsTransport {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<DashboardResult<String>> {
        while let Some(msg) = self.ws_stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => warn!("忽略非UTF-8二进制帧: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    debug!("服务端关闭连接: {:?}", frame);
                    return None;
                }
                // ping/pong 由 tungstenite 自动处理
                Ok(_) => continue,
                Err(e) => return Some(Err(DashboardError::from(e))),
            }
        }
        None
    }

    async fn send_text(&mut self, text: String) -> DashboardResult<()> {
        self.ws_stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> DashboardResult<()> {
        self.ws_stream.close(None).await?;
        Ok(())
    }
}
