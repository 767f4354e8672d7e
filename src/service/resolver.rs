use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::InvoiceBackend;
use crate::error::{Error, Result};
use crate::models::PurchaseOrder;

const LOOKUP_FAILURE_MESSAGE: &str = "Failed to load purchase order";

/// PO 查询状态
#[derive(Debug, Clone, PartialEq)]
pub enum LookupState {
    /// 没有查询结果 (输入为空, 或会话失效后中止)
    Idle,
    Loading { po_number: String },
    Resolved(PurchaseOrder),
    Failed { po_number: String, message: String },
}

/// 当前输入值的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOrigin {
    /// 尚无输入
    Empty,
    /// 由发票识别出的 PO 号自动填入
    Seeded,
    /// 用户输入 (包括清空)
    User,
}

#[derive(Debug)]
struct ResolverInner {
    input: String,
    origin: InputOrigin,
    /// 每次输入变化加一; 完成时编号不一致的响应直接丢弃
    generation: u64,
}

/// PO 查询解析器
///
/// 输入变化后按防抖间隔发起一次查询; 以最后一次输入为准, 过期响应不会覆盖当前状态。
/// 只在输入文本变化时查询, 不做自动重试。状态变化通过 [`PoResolver::subscribe`] 广播。
pub struct PoResolver {
    backend: Arc<dyn InvoiceBackend>,
    debounce: Duration,
    inner: Mutex<ResolverInner>,
    state_tx: watch::Sender<LookupState>,
}

impl PoResolver {
    pub fn new(backend: Arc<dyn InvoiceBackend>, debounce: Duration) -> Self {
        let (state_tx, _) = watch::channel(LookupState::Idle);
        Self {
            backend,
            debounce,
            inner: Mutex::new(ResolverInner {
                input: String::new(),
                origin: InputOrigin::Empty,
                generation: 0,
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResolverInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 输入框中的原始文本
    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    pub fn trimmed_input(&self) -> String {
        self.lock().input.trim().to_string()
    }

    pub fn origin(&self) -> InputOrigin {
        self.lock().origin
    }

    pub fn state(&self) -> LookupState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LookupState> {
        self.state_tx.subscribe()
    }

    /// 等待当前查询结束, 返回落定的状态
    pub async fn settled(&self) -> LookupState {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if !matches!(state, LookupState::Loading { .. }) || rx.changed().await.is_err() {
                return state;
            }
        }
    }

    /// 当前输入恰好为 `po_number` 且已解析成功时返回 PO 数据
    pub fn resolved_for(&self, po_number: &str) -> Option<PurchaseOrder> {
        let inner = self.lock();
        if inner.input.trim() != po_number.trim() {
            return None;
        }
        match &*self.state_tx.borrow() {
            LookupState::Resolved(po) => Some(po.clone()),
            _ => None,
        }
    }

    /// 用户修改输入
    ///
    /// 返回本次输入最终落定的状态; 被更新的输入取代时返回 `None`。
    /// 会话失效时返回 `Unauthorized`, 不记录为查询失败。
    pub async fn set_input(&self, raw: &str) -> Result<Option<LookupState>> {
        let started = {
            let mut inner = self.lock();
            self.begin(&mut inner, raw, InputOrigin::User)
        };
        match started {
            Some((ticket, po_number)) => self.finish(ticket, po_number, self.debounce).await,
            None => Ok(Some(LookupState::Idle)),
        }
    }

    /// 用发票识别出的 PO 号填充输入, 查询在后台进行
    ///
    /// 用户已自行输入过, 或输入已经是这个 PO 号 (不论查询结果) 时不做任何事。
    /// 返回是否发起了查询。
    pub fn seed(self: &Arc<Self>, po_number: &str) -> bool {
        let started = {
            let mut inner = self.lock();
            if inner.origin == InputOrigin::User {
                debug!("Keeping user-entered PO '{}', ignoring detected '{}'", inner.input, po_number);
                return false;
            }
            if inner.input.trim() == po_number.trim() {
                return false;
            }
            self.begin(&mut inner, po_number, InputOrigin::Seeded)
        };

        let Some((ticket, po_number)) = started else {
            return false;
        };
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            // 自动填充不需要防抖
            if let Err(e) = resolver.finish(ticket, po_number, Duration::ZERO).await {
                debug!("Detected PO lookup aborted: {}", e);
            }
        });
        true
    }

    /// 清空输入和查询结果 (切换到另一张发票时使用)
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.input.clear();
        inner.origin = InputOrigin::Empty;
        self.state_tx.send_replace(LookupState::Idle);
    }

    /// 记录新输入; 输入非空时进入 `Loading` 并返回本次查询的编号
    fn begin(&self, inner: &mut ResolverInner, raw: &str, origin: InputOrigin) -> Option<(u64, String)> {
        inner.generation += 1;
        inner.input = raw.to_string();
        inner.origin = origin;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            self.state_tx.send_replace(LookupState::Idle);
            return None;
        }
        self.state_tx.send_replace(LookupState::Loading {
            po_number: trimmed.to_string(),
        });
        Some((inner.generation, trimmed.to_string()))
    }

    async fn finish(&self, ticket: u64, po_number: String, debounce: Duration) -> Result<Option<LookupState>> {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
            let superseded = self.lock().generation != ticket;
            if superseded {
                debug!("PO input '{}' superseded before lookup", po_number);
                return Ok(None);
            }
        }

        let next = match self.backend.purchase_order(&po_number).await {
            Ok(payload) => match PurchaseOrder::from_payload(&po_number, &payload) {
                Some(po) => LookupState::Resolved(po),
                None => LookupState::Failed {
                    po_number: po_number.clone(),
                    message: format!("Unexpected purchase order response for {po_number}"),
                },
            },
            Err(Error::Unauthorized) => {
                let inner = self.lock();
                if inner.generation == ticket {
                    self.state_tx.send_replace(LookupState::Idle);
                }
                return Err(Error::Unauthorized);
            }
            Err(e) => LookupState::Failed {
                po_number: po_number.clone(),
                message: e
                    .server_detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| LOOKUP_FAILURE_MESSAGE.to_string()),
            },
        };

        let inner = self.lock();
        if inner.generation != ticket {
            debug!("Discarding stale PO lookup for '{}'", po_number);
            return Ok(None);
        }
        match &next {
            LookupState::Resolved(po) => info!(
                "Resolved PO {} [{}], {} line(s)",
                po.po_number,
                po.status_label(),
                po.line_items.len()
            ),
            LookupState::Failed { message, .. } => {
                warn!("PO lookup for '{}' failed: {}", po_number, message)
            }
            _ => {}
        }
        self.state_tx.send_replace(next.clone());
        Ok(Some(next))
    }
}
