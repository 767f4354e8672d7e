#![allow(dead_code)]

use async_trait::async_trait;
use invoice_reconcile::api::{InvoiceBackend, UploadFile};
use invoice_reconcile::models::{DashboardStats, InvoiceRecord, SyncRequest, SyncResponse};
use invoice_reconcile::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// 同步接口的模拟行为
#[derive(Debug, Clone)]
pub enum SyncBehavior {
    Succeed(String),
    Reject(String),
    Network,
}

/// 内存中的假后端, 行为与真实服务端一致: PATCH 返回完整记录并重算总额, 同步成功后状态变为 synced
pub struct FakeBackend {
    invoices: Mutex<HashMap<i64, Value>>,
    purchase_orders: Mutex<HashMap<String, Value>>,
    sync_behavior: Mutex<SyncBehavior>,
    po_gates: Mutex<HashMap<String, Arc<Notify>>>,
    sync_gate: Mutex<Option<Arc<Notify>>>,
    fail_patches: Mutex<bool>,
    upload_po_numbers: Mutex<Vec<String>>,
    expired: Mutex<bool>,
    next_id: AtomicUsize,
    clock: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub patch_calls: AtomicUsize,
    pub po_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub sync_requests: Mutex<Vec<SyncRequest>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invoices: Mutex::new(HashMap::new()),
            purchase_orders: Mutex::new(HashMap::new()),
            sync_behavior: Mutex::new(SyncBehavior::Succeed("Synced".into())),
            po_gates: Mutex::new(HashMap::new()),
            sync_gate: Mutex::new(None),
            fail_patches: Mutex::new(false),
            upload_po_numbers: Mutex::new(Vec::new()),
            expired: Mutex::new(false),
            next_id: AtomicUsize::new(100),
            clock: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            patch_calls: AtomicUsize::new(0),
            po_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            sync_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn as_backend(self: &Arc<Self>) -> Arc<dyn InvoiceBackend> {
        self.clone()
    }

    pub fn insert_invoice(&self, invoice: Value) {
        let id = invoice["id"].as_i64().expect("invoice id");
        self.invoices.lock().unwrap().insert(id, invoice);
    }

    pub fn invoice(&self, id: i64) -> InvoiceRecord {
        serde_json::from_value(self.invoices.lock().unwrap()[&id].clone()).unwrap()
    }

    pub fn insert_po(&self, po_number: &str, payload: Value) {
        self.purchase_orders
            .lock()
            .unwrap()
            .insert(po_number.to_string(), payload);
    }

    pub fn set_sync_behavior(&self, behavior: SyncBehavior) {
        *self.sync_behavior.lock().unwrap() = behavior;
    }

    pub fn fail_patches(&self, fail: bool) {
        *self.fail_patches.lock().unwrap() = fail;
    }

    /// 之后上传的发票会识别出这些 PO 号
    pub fn detect_on_upload(&self, po_numbers: &[&str]) {
        *self.upload_po_numbers.lock().unwrap() =
            po_numbers.iter().map(|po| po.to_string()).collect();
    }

    /// 之后的读取 (发票详情, PO 查询) 返回 401
    pub fn expire_session(&self) {
        *self.expired.lock().unwrap() = true;
    }

    fn check_session(&self) -> Result<()> {
        if *self.expired.lock().unwrap() {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    /// 该 PO 的查询在 `notify_one` 之前不会返回
    pub fn hold_po(&self, po_number: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.po_gates
            .lock()
            .unwrap()
            .insert(po_number.to_string(), gate.clone());
        gate
    }

    pub fn hold_sync(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.sync_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn tick(&self) -> String {
        let t = self.clock.fetch_add(1, Ordering::SeqCst);
        format!("2024-03-02T10:{:02}:00", t % 60)
    }
}

/// 等待计数器达到指定值
pub async fn wait_for(counter: &AtomicUsize, expected: usize) {
    for _ in 0..200 {
        if counter.load(Ordering::SeqCst) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("counter never reached {expected}");
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

#[async_trait]
impl InvoiceBackend for FakeBackend {
    async fn upload_invoice(&self, file: UploadFile) -> Result<InvoiceRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        let po_numbers = self.upload_po_numbers.lock().unwrap().clone();
        let invoice = json!({
            "id": id,
            "invoice_number": "INV-UPLOADED",
            "vendor_name": "Uploaded Vendor",
            "po_numbers": po_numbers,
            "confidence_score": 91.5,
            "file_path": format!("uploads/{}", file.file_name),
            "status": "pending",
            "created_at": self.tick(),
            "updated_at": self.tick()
        });
        self.insert_invoice(invoice.clone());
        Ok(serde_json::from_value(invoice)?)
    }

    async fn list_invoices(&self) -> Result<Vec<InvoiceRecord>> {
        let mut all: Vec<Value> = self.invoices.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|v| v["id"].as_i64());
        Ok(serde_json::from_value(Value::Array(all))?)
    }

    async fn get_invoice(&self, id: i64) -> Result<InvoiceRecord> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_session()?;
        let invoice = self
            .invoices
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Vendor invoice not found".into()))?;
        Ok(serde_json::from_value(invoice)?)
    }

    async fn patch_invoice(&self, id: i64, changes: &Map<String, Value>) -> Result<InvoiceRecord> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_patches.lock().unwrap() {
            return Err(Error::Transient("database unavailable".into()));
        }
        let tick = self.tick();
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound("Vendor invoice not found".into()))?;

        let mut changed = false;
        for (key, value) in changes {
            if invoice.get(key) != Some(value) {
                invoice[key.as_str()] = value.clone();
                changed = true;
            }
        }
        if changed {
            // 服务端根据小计和税额重算总额
            if changes.contains_key("subtotal") || changes.contains_key("tax_amount") {
                if let (Some(sub), Some(tax)) = (
                    as_f64(&invoice["subtotal"]),
                    as_f64(&invoice["tax_amount"]),
                ) {
                    invoice["total_amount"] = json!(sub + tax);
                }
            }
            invoice["updated_at"] = json!(tick);
        }
        Ok(serde_json::from_value(invoice.clone())?)
    }

    async fn sync_invoice(&self, request: &SyncRequest) -> Result<SyncResponse> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.sync_requests.lock().unwrap().push(request.clone());

        let gate = self.sync_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let behavior = self.sync_behavior.lock().unwrap().clone();
        match behavior {
            SyncBehavior::Succeed(message) => {
                let tick = self.tick();
                if let Some(invoice) = self
                    .invoices
                    .lock()
                    .unwrap()
                    .get_mut(&request.vendor_invoice_id)
                {
                    invoice["status"] = json!("synced");
                    invoice["updated_at"] = json!(tick);
                }
                Ok(SyncResponse {
                    success: true,
                    message: Some(message),
                    error: None,
                    sync_operation_id: Some(1),
                })
            }
            SyncBehavior::Reject(message) => Ok(SyncResponse {
                success: false,
                message: Some(message),
                error: None,
                sync_operation_id: Some(2),
            }),
            SyncBehavior::Network => Err(Error::Transient("connection reset by peer".into())),
        }
    }

    async fn purchase_order(&self, po_number: &str) -> Result<Value> {
        self.po_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.po_gates.lock().unwrap().get(po_number).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_session()?;
        self.purchase_orders
            .lock()
            .unwrap()
            .get(po_number)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Purchase order {po_number} not found")))
    }

    async fn dashboard(&self) -> Result<DashboardStats> {
        Ok(DashboardStats::default())
    }
}
