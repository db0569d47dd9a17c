#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use payment_gateway::application::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CreatePaymentRequest, EventStoreService,
    GatewayRegistry, PaymentMethodInput, PaymentService, PaymentServiceDeps, ThreeDSecureConfig,
    ThreeDSecureService, DEFAULT_IDEMPOTENCY_TTL,
};
use payment_gateway::domain::errors::{DomainError, DomainResult};
use payment_gateway::domain::CardDetails;
use payment_gateway::infrastructure::{
    InMemoryCache, InMemoryCircuitBreakerStateStore, InMemoryEventStore,
    InMemoryThreeDSRepository, InMemoryTransactionRepository, SimulationOptions,
};
use payment_gateway::ports::payment_gateway_port::*;
use payment_gateway::ports::{NotificationPort, NotificationType, PaymentGatewayPort};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MERCHANT: &str = "merchant_test";
pub const SUCCESS_CARD: &str = "4242424242424242";
pub const DECLINE_CARD: &str = "4000000000000002";
pub const THREE_DS_CARD: &str = "4000002500003155";

/// 记录所有通知，供断言使用
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, NotificationType, serde_json::Value)>>,
}

impl RecordingNotifier {
    pub fn types(&self) -> Vec<NotificationType> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t, _)| *t)
            .collect()
    }
}

impl NotificationPort for RecordingNotifier {
    fn notify(&self, merchant_id: &str, notification_type: NotificationType, data: serde_json::Value) {
        self.sent
            .lock()
            .unwrap()
            .push((merchant_id.to_string(), notification_type, data));
    }
}

/// 每次调用都返回传输层故障的网关
pub struct UnreachableGateway {
    pub calls: AtomicUsize,
}

impl UnreachableGateway {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> DomainResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::GatewayError("connection refused".to_string()))
    }
}

#[async_trait]
impl PaymentGatewayPort for UnreachableGateway {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn process_payment(&self, _request: GatewayPaymentRequest) -> DomainResult<GatewayPaymentResponse> {
        self.fail()
    }

    async fn capture_payment(&self, _transaction_id: &str, _amount: i64) -> DomainResult<CaptureResponse> {
        self.fail()
    }

    async fn refund_payment(&self, _transaction_id: &str, _amount: i64) -> DomainResult<RefundResponse> {
        self.fail()
    }

    async fn get_payment_status(&self, _transaction_id: &str) -> DomainResult<PaymentStatusResponse> {
        self.fail()
    }

    async fn verify_3d_secure(&self, _data: ThreeDSecureData) -> DomainResult<ThreeDSecureResponse> {
        self.fail()
    }
}

/// 要求3DS认证、请款时传输层故障的网关
pub struct ChallengeThenResetGateway;

#[async_trait]
impl PaymentGatewayPort for ChallengeThenResetGateway {
    fn name(&self) -> &str {
        "flaky_acs"
    }

    async fn process_payment(&self, request: GatewayPaymentRequest) -> DomainResult<GatewayPaymentResponse> {
        Ok(GatewayPaymentResponse::requires_action(
            format!("flaky_{}", request.transaction_id),
            "https://acs.example.test/challenge".to_string(),
        ))
    }

    async fn capture_payment(&self, _transaction_id: &str, _amount: i64) -> DomainResult<CaptureResponse> {
        Err(DomainError::GatewayError("connection reset".to_string()))
    }

    async fn refund_payment(&self, _transaction_id: &str, _amount: i64) -> DomainResult<RefundResponse> {
        Err(DomainError::GatewayError("connection reset".to_string()))
    }

    async fn get_payment_status(&self, _transaction_id: &str) -> DomainResult<PaymentStatusResponse> {
        Err(DomainError::GatewayError("connection reset".to_string()))
    }

    async fn verify_3d_secure(&self, _data: ThreeDSecureData) -> DomainResult<ThreeDSecureResponse> {
        Err(DomainError::GatewayError("connection reset".to_string()))
    }
}

pub struct Harness {
    pub service: Arc<PaymentService>,
    pub gateways: Arc<GatewayRegistry>,
    pub events: EventStoreService,
    pub notifier: Arc<RecordingNotifier>,
}

/// 全内存依赖、无延迟网关；`acceptance_rate` 固定3DS结果
pub fn harness(acceptance_rate: f64) -> Harness {
    let gateways = Arc::new(GatewayRegistry::new(SimulationOptions::instant()));
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        },
        Arc::new(InMemoryCircuitBreakerStateStore::new()),
    ));
    let three_ds = Arc::new(ThreeDSecureService::new(
        Arc::new(InMemoryThreeDSRepository::new()),
        ThreeDSecureConfig {
            acceptance_rate,
            ..ThreeDSecureConfig::default()
        },
    ));
    let events = EventStoreService::new(Arc::new(InMemoryEventStore::new()));
    let notifier = Arc::new(RecordingNotifier::default());

    let service = Arc::new(PaymentService::new(PaymentServiceDeps {
        transactions: Arc::new(InMemoryTransactionRepository::new()),
        events: events.clone(),
        gateways: gateways.clone(),
        breakers,
        three_ds,
        cache: Arc::new(InMemoryCache::new()),
        notifier: notifier.clone(),
        idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
    }));

    Harness {
        service,
        gateways,
        events,
        notifier,
    }
}

pub fn card(number: &str) -> CardDetails {
    CardDetails {
        number: number.to_string(),
        exp_month: 12,
        exp_year: 2030,
        cvv: "123".to_string(),
        cardholder_name: Some("Test Holder".to_string()),
    }
}

pub fn payment_request(amount: i64, number: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        amount,
        currency: Some("USD".to_string()),
        payment_method: Some(PaymentMethodInput::card(card(number))),
        ..Default::default()
    }
}

/// 格式正确的认证响应
pub fn well_formed_pa_res() -> String {
    base64::engine::general_purpose::STANDARD.encode(br#"{"status":"Y","trans_status":"authenticated"}"#)
}
