use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::User;

/// 访问令牌 + 缓存的用户信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// 对外广播的会话状态
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    /// 服务端返回 401, 需要重新登录
    Expired,
}

/// 进程级会话管理
///
/// 所有请求只读取令牌; 只有登录 (`set`)、登出 (`clear`) 和 401 (`invalidate`) 会修改会话,
/// 状态变化通过 [`SessionManager::subscribe`] 通知观察者。
#[derive(Debug)]
pub struct SessionManager {
    current: RwLock<Option<Session>>,
    state_tx: watch::Sender<SessionState>,
    store_path: Option<PathBuf>,
}

impl SessionManager {
    /// 仅保存在内存中的会话
    pub fn in_memory() -> Self {
        Self::with_session(None, None)
    }

    /// 持久化到文件的会话, 启动时从文件恢复
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let restored = restore(&path);
        if restored.is_some() {
            info!("Restored session from {}", path.display());
        }
        Self::with_session(restored, Some(path))
    }

    fn with_session(session: Option<Session>, store_path: Option<PathBuf>) -> Self {
        let initial = if session.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        };
        let (state_tx, _) = watch::channel(initial);
        Self {
            current: RwLock::new(session),
            state_tx,
            store_path,
        }
    }

    pub fn set(&self, session: Session) {
        if let Some(path) = &self.store_path {
            if let Err(e) = persist(path, &session) {
                warn!("Failed to persist session to {}: {}", path.display(), e);
            }
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.state_tx.send_replace(SessionState::Authenticated);
    }

    /// 主动登出
    pub fn clear(&self) {
        self.drop_session(SessionState::Anonymous);
    }

    /// 令牌失效 (401): 清空会话并通知观察者重新认证
    pub fn invalidate(&self) {
        warn!("Session rejected by server, clearing stored credentials");
        self.drop_session(SessionState::Expired);
    }

    fn drop_session(&self, next: SessionState) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(path) = &self.store_path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove session file {}: {}", path.display(), e),
            }
        }
        self.state_tx.send_replace(next);
    }

    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }
}

fn persist(path: &Path, session: &Session) -> crate::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(session)?)?;
    Ok(())
}

fn restore(path: &Path) -> Option<Session> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read session file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice::<Session>(&bytes) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!("Ignoring unreadable session file {}: {}", path.display(), e);
            None
        }
    }
}
