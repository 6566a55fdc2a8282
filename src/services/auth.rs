use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::DashboardResult;

/// 登录 token；配置了文件路径时启动读取、登录写入、退出删除
#[derive(Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
    file: Option<PathBuf>,
}

impl TokenStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 从文件恢复上次登录的 token，文件不存在视为未登录
    pub async fn load(file: Option<PathBuf>) -> DashboardResult<Self> {
        let mut token = None;
        if let Some(path) = &file {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    let content = content.trim().to_string();
                    if !content.is_empty() {
                        info!("已从 {} 恢复登录 token", path.display());
                        token = Some(content);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self {
            token: Arc::new(RwLock::new(token)),
            file,
        })
    }

    pub async fn get(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn set(&self, token: String) -> DashboardResult<()> {
        if let Some(path) = &self.file {
            tokio::fs::write(path, &token).await?;
        }
        *self.token.write().await = Some(token);
        Ok(())
    }

    /// 清除失败只记录日志
    pub async fn clear(&self) {
        *self.token.write().await = None;
        if let Some(path) = &self.file {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("删除 token 文件失败: {}, {}", path.display(), e);
                }
            }
        }
    }
}
