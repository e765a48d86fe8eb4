//! In-memory port implementations for tests. The mutex-guarded ledger keeps
//! the claim atomic, which is what the concurrency tests exercise.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::transaction::{STATUS_COMPLETED, STATUS_FAILED, TYPE_DEPOSIT};
use crate::domain::{Transaction, User};
use crate::ports::{
    GatewayError, InitializeRequest, InitializedPayment, LedgerError, LedgerResult, LedgerStore,
    Notifier, NotifyOutcome, PaymentGateway, TransactionFilter, VelocityCounts, VerifiedPayment,
};
use crate::services::fraud::VelocityThresholds;
use crate::services::DepositService;
use crate::AppState;

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: "postgres://unused".to_string(),
        paystack_secret_key: "sk_test_secret".to_string(),
        paystack_base_url: "https://api.paystack.test".to_string(),
        fee_rate: "0.03".parse().unwrap(),
        min_deposit: "10".parse().unwrap(),
        max_deposit: "50000".parse().unwrap(),
        sms_api_key: "test-key".to_string(),
        sms_sender_id: "TestSender".to_string(),
        sms_base_url: "http://127.0.0.1:9".to_string(),
        admin_phone: "0240000000".to_string(),
        admin_api_key: "admin-secret-key".to_string(),
        base_url: "http://localhost:5002".to_string(),
        frontend_url: "http://localhost:3000".to_string(),
        fraud: VelocityThresholds {
            max_deposits_by_ip: 10,
            max_deposits_by_user: 5,
            max_large_deposits_by_user: 2,
            large_amount: "5000".parse().unwrap(),
            window_hours: 1,
        },
    }
}

pub fn test_user(balance: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Kwame Mensah".to_string(),
        email: "kwame@example.com".to_string(),
        phone_number: "0244123456".to_string(),
        wallet_balance: balance.parse().unwrap(),
        is_disabled: false,
        disable_reason: None,
        approval_status: "approved".to_string(),
        is_admin: false,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
struct LedgerInner {
    users: std::collections::HashMap<Uuid, User>,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&self, user: User) {
        self.inner.lock().unwrap().users.insert(user.id, user);
    }

    pub fn put_transaction(&self, tx: Transaction) {
        self.inner.lock().unwrap().transactions.push(tx);
    }

    pub fn balance_of(&self, user_id: Uuid) -> BigDecimal {
        self.inner.lock().unwrap().users[&user_id].wallet_balance.clone()
    }

    pub fn by_reference(&self, reference: &str) -> Option<Transaction> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .find(|t| t.reference == reference)
            .cloned()
    }

    pub fn latest_transaction(&self) -> Option<Transaction> {
        self.inner.lock().unwrap().transactions.last().cloned()
    }
}

fn merge_metadata(existing: &mut Option<serde_json::Value>, patch: &serde_json::Value) {
    let base = existing.get_or_insert_with(|| json!({}));
    if let (Some(base_map), Some(patch_map)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_user(&self, id: Uuid) -> LedgerResult<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn insert_transaction(&self, tx: &Transaction) -> LedgerResult<Transaction> {
        let mut inner = self.inner.lock().unwrap();
        inner.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn get_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn get_by_reference(&self, reference: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self.by_reference(reference))
    }

    async fn claim_pending(&self, reference: &str) -> LedgerResult<Option<Transaction>> {
        let mut inner = self.inner.lock().unwrap();
        for tx in inner.transactions.iter_mut() {
            if tx.reference == reference && tx.is_pending() && !tx.processing {
                tx.processing = true;
                return Ok(Some(tx.clone()));
            }
        }
        Ok(None)
    }

    async fn release_claim(&self, id: Uuid) -> LedgerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.transactions.iter_mut().find(|t| t.id == id) {
            tx.processing = false;
        }
        Ok(())
    }

    async fn credit_wallet(&self, user_id: Uuid, amount: &BigDecimal) -> LedgerResult<BigDecimal> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::NotFound(user_id.to_string()))?;
        user.wallet_balance = user.wallet_balance.clone() + amount.clone();
        Ok(user.wallet_balance.clone())
    }

    async fn complete_transaction(
        &self,
        id: Uuid,
        balance_before: &BigDecimal,
        balance_after: &BigDecimal,
        metadata: &serde_json::Value,
    ) -> LedgerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.transactions.iter_mut().find(|t| t.id == id) {
            tx.status = STATUS_COMPLETED.to_string();
            tx.balance_before = balance_before.clone();
            tx.balance_after = balance_after.clone();
            tx.processing = false;
            tx.completed_at = Some(Utc::now());
            merge_metadata(&mut tx.metadata, metadata);
        }
        Ok(())
    }

    async fn fail_transaction(&self, id: Uuid, metadata: &serde_json::Value) -> LedgerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.transactions.iter_mut().find(|t| t.id == id) {
            tx.status = STATUS_FAILED.to_string();
            tx.processing = false;
            merge_metadata(&mut tx.metadata, metadata);
        }
        Ok(())
    }

    async fn velocity_counts(
        &self,
        user_id: Uuid,
        ip: &str,
        window_start: DateTime<Utc>,
        large_amount: &BigDecimal,
    ) -> LedgerResult<VelocityCounts> {
        let inner = self.inner.lock().unwrap();
        let recent: Vec<&Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.tx_type == TYPE_DEPOSIT && t.created_at >= window_start)
            .collect();

        Ok(VelocityCounts {
            deposits_by_ip: recent
                .iter()
                .filter(|t| t.metadata_str("ip") == Some(ip))
                .count() as i64,
            deposits_by_user: recent.iter().filter(|t| t.user_id == user_id).count() as i64,
            large_deposits_by_user: recent
                .iter()
                .filter(|t| t.user_id == user_id && t.amount >= *large_amount)
                .count() as i64,
        })
    }

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<(Vec<Transaction>, i64)> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .filter(|t| filter.status.as_deref().map_or(true, |s| t.status == s))
            .filter(|t| filter.tx_type.as_deref().map_or(true, |ty| t.tx_type == ty))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page: Vec<Transaction> = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_fraud_alerts(&self, limit: i64) -> LedgerResult<Vec<Transaction>> {
        let inner = self.inner.lock().unwrap();
        let mut flagged: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.fraud_detected())
            .cloned()
            .collect();
        flagged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        flagged.truncate(limit.max(0) as usize);
        Ok(flagged)
    }

    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}

pub struct FakeGateway {
    pub verify_calls: AtomicUsize,
    pub fail_initialize: AtomicBool,
    pub fail_verify: AtomicBool,
    verify_status: Mutex<String>,
    verify_amount_minor: AtomicI64,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            verify_calls: AtomicUsize::new(0),
            fail_initialize: AtomicBool::new(false),
            fail_verify: AtomicBool::new(false),
            verify_status: Mutex::new("success".to_string()),
            verify_amount_minor: AtomicI64::new(0),
        }
    }

    pub fn set_verify(&self, status: &str, amount_minor: i64) {
        *self.verify_status.lock().unwrap() = status.to_string();
        self.verify_amount_minor.store(amount_minor, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, req: &InitializeRequest) -> Result<InitializedPayment, GatewayError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("declined by test".to_string()));
        }
        Ok(InitializedPayment {
            authorization_url: format!("https://checkout.test/{}", req.reference),
            access_code: None,
            reference: req.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("connection reset by test".to_string()));
        }
        let status = self.verify_status.lock().unwrap().clone();
        let amount_minor = self.verify_amount_minor.load(Ordering::SeqCst);
        Ok(VerifiedPayment {
            status: status.clone(),
            amount_minor,
            reference: reference.to_string(),
            raw: json!({ "status": status, "amount": amount_minor, "reference": reference }),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saw(&self, prefix: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.starts_with(prefix))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deposit_success(
        &self,
        user: &User,
        amount: &BigDecimal,
        new_balance: &BigDecimal,
    ) -> NotifyOutcome {
        self.events.lock().unwrap().push(format!(
            "deposit-success:{}:{}:{}",
            user.id, amount, new_balance
        ));
        NotifyOutcome::ok()
    }

    async fn fraud_alert(
        &self,
        user: &User,
        reference: &str,
        expected: &BigDecimal,
        actual: &BigDecimal,
    ) -> NotifyOutcome {
        self.events.lock().unwrap().push(format!(
            "fraud-alert:{}:{}:{}:{}",
            user.id, reference, expected, actual
        ));
        NotifyOutcome::ok()
    }
}

pub struct TestApp {
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
}

pub fn test_app() -> TestApp {
    let config = Arc::new(test_config());
    let ledger = Arc::new(MemoryLedger::new());
    let gateway = Arc::new(FakeGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let deposits = Arc::new(DepositService::new(
        ledger.clone(),
        gateway.clone(),
        notifier.clone(),
        config.clone(),
    ));
    let state = AppState {
        config,
        ledger: ledger.clone(),
        deposits,
    };
    TestApp {
        ledger,
        gateway,
        notifier,
        state,
    }
}
