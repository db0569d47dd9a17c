use crate::application::circuit_breaker::CircuitBreakerRegistry;
use crate::application::dto::{CreatePaymentRequest, NextAction, PaymentResponse};
use crate::application::event_store::EventStoreService;
use crate::application::gateway_registry::{GatewayRegistry, FALLBACK_GATEWAY};
use crate::application::three_ds_service::ThreeDSecureService;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::*;
use crate::domain::value_objects::{CardDetails, Currency, TransactionStatus};
use crate::domain::Transaction;
use crate::ports::payment_gateway_port::{GatewayPaymentRequest, GatewayPaymentResponse};
use crate::ports::{CachePort, NotificationPort, NotificationType, TransactionRepositoryPort};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 幂等结果默认保留时间
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 网关对应的熔断器名称
pub fn breaker_name(gateway: &str) -> String {
    format!("gateway_{}", gateway)
}

fn idempotency_cache_key(merchant_id: &str, key: &str) -> String {
    format!("idempotency:{}:{}", merchant_id, key)
}

/// 支付服务依赖
pub struct PaymentServiceDeps {
    pub transactions: Arc<dyn TransactionRepositoryPort>,
    pub events: EventStoreService,
    pub gateways: Arc<GatewayRegistry>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub three_ds: Arc<ThreeDSecureService>,
    pub cache: Arc<dyn CachePort>,
    pub notifier: Arc<dyn NotificationPort>,
    pub idempotency_ttl: Duration,
}

/// 支付编排服务
///
/// 同一交易上的状态变更操作通过按交易ID分配的异步锁串行执行。
pub struct PaymentService {
    transactions: Arc<dyn TransactionRepositoryPort>,
    events: EventStoreService,
    gateways: Arc<GatewayRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    three_ds: Arc<ThreeDSecureService>,
    cache: Arc<dyn CachePort>,
    notifier: Arc<dyn NotificationPort>,
    idempotency_ttl: Duration,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl PaymentService {
    pub fn new(deps: PaymentServiceDeps) -> Self {
        Self {
            transactions: deps.transactions,
            events: deps.events,
            gateways: deps.gateways,
            breakers: deps.breakers,
            three_ds: deps.three_ds,
            cache: deps.cache,
            notifier: deps.notifier,
            idempotency_ttl: deps.idempotency_ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn three_ds(&self) -> &Arc<ThreeDSecureService> {
        &self.three_ds
    }

    /// 创建支付
    ///
    /// 除校验错误外总是返回结果；网关拒绝与传输故障都记录为 failed 交易。
    pub async fn create_payment(
        &self,
        merchant_id: &str,
        request: CreatePaymentRequest,
    ) -> DomainResult<PaymentResponse> {
        let idempotency_key = request.resolved_idempotency_key();

        // 1. 幂等重放
        if let Some(key) = &idempotency_key {
            if let Some(cached) = self.cached_response(merchant_id, key).await {
                info!("Returning cached result for idempotency key: {}", key);
                return Ok(cached);
            }
        }

        // 2. 校验
        let card = request
            .card()
            .cloned()
            .ok_or_else(|| DomainError::ValidationError("Payment method is required".to_string()))?;
        card.validate()?;

        let currency = match request.currency.as_deref() {
            Some(code) => Currency::parse(code)?,
            None => Currency::default(),
        };

        let adapter = self
            .gateways
            .get_adapter(request.gateway.as_deref().unwrap_or(FALLBACK_GATEWAY));

        let mut transaction = Transaction::new_payment(
            Uuid::new_v4(),
            merchant_id.to_string(),
            request.amount,
            currency,
            adapter.name().to_string(),
        )?;
        transaction.customer_id = request.customer_id.clone();
        transaction.description = request.description.clone();
        transaction.card_last4 = Some(card.last4().to_string());
        transaction.idempotency_key = idempotency_key.clone();
        if let Some(metadata) = request.metadata.clone() {
            transaction.merge_metadata(metadata);
        }

        info!(
            "Creating payment {} for merchant {} via {}: {} {} card {}",
            transaction.id,
            merchant_id,
            transaction.gateway,
            transaction.amount,
            transaction.currency,
            card.masked()
        );

        // 3. 发起事件
        let initiated = PaymentInitiated {
            amount: transaction.amount,
            currency: transaction.currency.to_string(),
            card_number: card.masked(),
            gateway: transaction.gateway.clone(),
            merchant_id: merchant_id.to_string(),
        };
        self.events
            .append_event(
                &DomainEvent::from_payload(transaction.id.to_string(), 1, &initiated)?
                    .with_metadata(json!({ "merchant_id": merchant_id }))
                    .with_correlation_id(idempotency_key.clone()),
            )
            .await?;

        // 4. 经熔断器调用网关
        let gateway_request = GatewayPaymentRequest {
            transaction_id: transaction.id.to_string(),
            amount: transaction.amount,
            currency: transaction.currency.to_string(),
            card: card.clone(),
            description: transaction.description.clone(),
            require_3ds: request.require_3ds,
            merchant_id: merchant_id.to_string(),
            customer_id: transaction.customer_id.clone(),
        };

        let breaker = self.breakers.get_breaker(&breaker_name(adapter.name()));
        let result = breaker
            .execute(|| adapter.process_payment(gateway_request))
            .await;

        // 5. 按结果分支
        let (outcome, next_action) = self
            .apply_gateway_outcome(&mut transaction, &card, request.capture, result)
            .await?;
        self.events.append_event(&outcome).await?;

        // 6. 持久化、生命周期事件、幂等缓存、通知
        self.transactions.save(&transaction).await?;
        self.append_lifecycle(&transaction, EventType::TransactionCreated, None)
            .await?;

        let mut response = PaymentResponse::from(&transaction);
        if let Some(next_action) = next_action {
            response = response.with_next_action(next_action);
        }

        if let Some(key) = &idempotency_key {
            self.cache_response(merchant_id, key, &response).await;
        }

        if let Some(notification_type) = notification_for(transaction.status) {
            self.notify(merchant_id, notification_type, &response);
        }

        info!(
            "Payment {} finished with status {}",
            transaction.id, transaction.status
        );
        Ok(response)
    }

    /// 根据网关结果推进交易状态，返回结果事件与后续动作
    async fn apply_gateway_outcome(
        &self,
        transaction: &mut Transaction,
        card: &CardDetails,
        capture: bool,
        result: DomainResult<GatewayPaymentResponse>,
    ) -> DomainResult<(DomainEvent, Option<NextAction>)> {
        let aggregate_id = transaction.id.to_string();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("Gateway call failed for {}: {}", transaction.id, e);
                transaction.mark_as_failed("GATEWAY_ERROR".to_string(), e.to_string())?;
                return Ok((failed_event(&aggregate_id, transaction)?, None));
            }
        };

        if let Some(network) = response.metadata.get("network") {
            transaction.card_network = Some(network.clone());
        }

        if response.three_d_secure_required {
            let initiation = self
                .three_ds
                .initiate_authentication(
                    &aggregate_id,
                    &card.number,
                    transaction.amount,
                    transaction.currency.as_str(),
                )
                .await;

            return match initiation {
                Ok(initiation) => {
                    transaction.mark_as_requires_action(
                        initiation.id.clone(),
                        response.transaction_id.clone(),
                    )?;
                    let event = DomainEvent::from_payload(
                        &aggregate_id,
                        2,
                        &ThreeDSRequired {
                            challenge_id: initiation.id.clone(),
                        },
                    )?;
                    let next_action = NextAction::three_ds(
                        initiation.id,
                        initiation.challenge_url,
                        initiation.acs_url,
                    );
                    Ok((event, Some(next_action)))
                }
                Err(e) => {
                    error!("3DS initiation failed for {}: {}", transaction.id, e);
                    transaction.mark_as_failed("THREE_DS_ERROR".to_string(), e.to_string())?;
                    Ok((failed_event(&aggregate_id, transaction)?, None))
                }
            };
        }

        if !response.success {
            let (code, message) = match response.decline {
                Some(decline) => (decline.code, decline.message),
                None => ("DECLINED".to_string(), "Payment declined".to_string()),
            };
            info!("Payment {} declined by gateway: {}", transaction.id, code);
            transaction.gateway_transaction_id = Some(response.transaction_id);
            transaction.mark_as_failed(code, message)?;
            return Ok((failed_event(&aggregate_id, transaction)?, None));
        }

        if capture {
            transaction.mark_as_captured(
                response.authorization_code.clone(),
                response.transaction_id.clone(),
            )?;
        } else {
            transaction.mark_as_authorized(
                response.authorization_code.clone(),
                response.transaction_id.clone(),
            )?;
        }

        let event = DomainEvent::from_payload(
            &aggregate_id,
            2,
            &PaymentSucceeded {
                captured: capture,
                amount: transaction.amount,
                authorization_code: response.authorization_code,
                gateway_transaction_id: Some(response.transaction_id),
                eci: None,
                cavv: None,
            },
        )?;
        Ok((event, None))
    }

    /// 完成3DS认证并请款
    pub async fn complete_3ds_authentication(
        &self,
        payment_id: Uuid,
        merchant_id: &str,
        challenge_id: &str,
        pa_res: &str,
    ) -> DomainResult<PaymentResponse> {
        let lock = self.transaction_lock(payment_id);
        let _guard = lock.lock().await;

        let mut transaction = self.load(payment_id, merchant_id).await?;
        if transaction.status != TransactionStatus::RequiresAction {
            return Err(DomainError::InvalidState {
                expected: TransactionStatus::RequiresAction.to_string(),
                actual: transaction.status.to_string(),
            });
        }
        if transaction.three_ds_challenge_id.as_deref() != Some(challenge_id) {
            return Err(DomainError::ValidationError(format!(
                "Challenge {} does not belong to payment {}",
                challenge_id, payment_id
            )));
        }

        let verification = self
            .three_ds
            .verify_authentication(challenge_id, pa_res)
            .await?;
        let aggregate_id = payment_id.to_string();
        let previous_status = transaction.status;

        if !verification.authenticated {
            transaction.mark_as_failed(
                "3DS_AUTHENTICATION_FAILED".to_string(),
                "3D Secure authentication failed".to_string(),
            )?;
            self.transactions.update(&transaction).await?;

            let version = self.next_version(&aggregate_id).await?;
            self.events
                .append_event(&DomainEvent::from_payload(
                    &aggregate_id,
                    version,
                    &ThreeDSCompleted {
                        authenticated: false,
                        challenge_id: challenge_id.to_string(),
                        eci: verification.eci,
                    },
                )?)
                .await?;
            self.append_lifecycle(&transaction, EventType::TransactionUpdated, Some(previous_status))
                .await?;

            let response = PaymentResponse::from(&transaction);
            self.notify(merchant_id, NotificationType::PaymentFailed, &response);

            warn!("3DS authentication failed for payment {}", payment_id);
            return Err(DomainError::ThreeDSAuthenticationFailed);
        }

        let adapter = self.gateways.get_adapter(&transaction.gateway);
        let gateway_transaction_id = transaction
            .gateway_transaction_id
            .clone()
            .unwrap_or_else(|| aggregate_id.clone());
        let amount = transaction.amount;

        let capture = self
            .breakers
            .get_breaker(&breaker_name(adapter.name()))
            .execute(|| adapter.capture_payment(&gateway_transaction_id, amount))
            .await
            .and_then(|capture| {
                if capture.success {
                    Ok(capture)
                } else {
                    Err(DomainError::GatewayError(format!(
                        "Capture rejected by {}: {}",
                        adapter.name(),
                        capture.status
                    )))
                }
            });

        // 挑战已是终态，请款失败时交易同样进入终态
        if let Err(e) = capture {
            warn!("Capture after 3DS failed for payment {}: {}", payment_id, e);
            transaction.mark_as_failed("GATEWAY_ERROR".to_string(), e.to_string())?;
            transaction.merge_metadata(json!({ "three_ds_authenticated": true }));
            self.transactions.update(&transaction).await?;

            let version = self.next_version(&aggregate_id).await?;
            let events = vec![
                DomainEvent::from_payload(
                    &aggregate_id,
                    version,
                    &ThreeDSCompleted {
                        authenticated: true,
                        challenge_id: challenge_id.to_string(),
                        eci: verification.eci.clone(),
                    },
                )?,
                DomainEvent::from_payload(
                    &aggregate_id,
                    version + 1,
                    &PaymentFailed {
                        error_code: "GATEWAY_ERROR".to_string(),
                        error_message: e.to_string(),
                    },
                )?,
            ];
            self.events.append_events(&events).await?;
            self.append_lifecycle(&transaction, EventType::TransactionUpdated, Some(previous_status))
                .await?;

            let response = PaymentResponse::from(&transaction);
            self.notify(merchant_id, NotificationType::PaymentFailed, &response);
            return Err(e);
        }

        transaction.complete_three_ds(verification.xid.clone())?;
        transaction.merge_metadata(json!({
            "three_ds_authenticated": true,
            "eci": verification.eci,
            "cavv": verification.cavv,
        }));
        self.transactions.update(&transaction).await?;

        let version = self.next_version(&aggregate_id).await?;
        let events = vec![
            DomainEvent::from_payload(
                &aggregate_id,
                version,
                &ThreeDSCompleted {
                    authenticated: true,
                    challenge_id: challenge_id.to_string(),
                    eci: verification.eci.clone(),
                },
            )?,
            DomainEvent::from_payload(
                &aggregate_id,
                version + 1,
                &PaymentSucceeded {
                    captured: true,
                    amount,
                    authorization_code: transaction.authorization_code.clone(),
                    gateway_transaction_id: transaction.gateway_transaction_id.clone(),
                    eci: verification.eci,
                    cavv: verification.cavv,
                },
            )?,
        ];
        self.events.append_events(&events).await?;
        self.append_lifecycle(&transaction, EventType::TransactionCompleted, Some(previous_status))
            .await?;

        let response = PaymentResponse::from(&transaction);
        self.notify(merchant_id, NotificationType::PaymentCaptured, &response);

        info!("3DS authentication completed for payment {}", payment_id);
        Ok(response)
    }

    /// 对已授权支付请款
    pub async fn capture_payment(
        &self,
        payment_id: Uuid,
        merchant_id: &str,
        amount: Option<i64>,
    ) -> DomainResult<PaymentResponse> {
        let lock = self.transaction_lock(payment_id);
        let _guard = lock.lock().await;

        let current = self.load(payment_id, merchant_id).await?;
        let mut transaction = current.clone();
        let capture_amount = transaction.capture(amount)?;

        let adapter = self.gateways.get_adapter(&transaction.gateway);
        let gateway_transaction_id = transaction
            .gateway_transaction_id
            .clone()
            .unwrap_or_else(|| payment_id.to_string());

        let capture = self
            .breakers
            .get_breaker(&breaker_name(adapter.name()))
            .execute(|| adapter.capture_payment(&gateway_transaction_id, capture_amount))
            .await?;
        if !capture.success {
            return Err(DomainError::GatewayError(format!(
                "Capture rejected by {}: {}",
                adapter.name(),
                capture.status
            )));
        }

        self.transactions.update(&transaction).await?;

        let aggregate_id = payment_id.to_string();
        let version = self.next_version(&aggregate_id).await?;
        self.events
            .append_event(&DomainEvent::from_payload(
                &aggregate_id,
                version,
                &PaymentSucceeded {
                    captured: true,
                    amount: capture_amount,
                    authorization_code: transaction.authorization_code.clone(),
                    gateway_transaction_id: transaction.gateway_transaction_id.clone(),
                    eci: None,
                    cavv: None,
                },
            )?)
            .await?;
        self.append_lifecycle(&transaction, EventType::TransactionUpdated, Some(current.status))
            .await?;

        let response = PaymentResponse::from(&transaction);
        self.notify(merchant_id, NotificationType::PaymentCaptured, &response);

        info!("Payment {} captured: {}", payment_id, capture_amount);
        Ok(response)
    }

    /// 撤销已授权支付（本地状态变更，不调用网关）
    pub async fn void_payment(&self, payment_id: Uuid, merchant_id: &str) -> DomainResult<PaymentResponse> {
        let lock = self.transaction_lock(payment_id);
        let _guard = lock.lock().await;

        let mut transaction = self.load(payment_id, merchant_id).await?;
        let previous_status = transaction.status;
        transaction.void()?;
        self.transactions.update(&transaction).await?;

        let aggregate_id = payment_id.to_string();
        let version = self.next_version(&aggregate_id).await?;
        self.events
            .append_event(&DomainEvent::from_payload(
                &aggregate_id,
                version,
                &PaymentCancelled {
                    previous_status: previous_status.to_string(),
                },
            )?)
            .await?;
        self.append_lifecycle(&transaction, EventType::TransactionUpdated, Some(previous_status))
            .await?;

        let response = PaymentResponse::from(&transaction);
        self.notify(merchant_id, NotificationType::PaymentVoided, &response);

        info!("Payment {} voided", payment_id);
        Ok(response)
    }

    /// 退款，金额缺省为剩余可退金额；返回新建的退款交易
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        merchant_id: &str,
        amount: Option<i64>,
        reason: Option<String>,
    ) -> DomainResult<PaymentResponse> {
        let lock = self.transaction_lock(payment_id);
        let _guard = lock.lock().await;

        let current = self.load(payment_id, merchant_id).await?;
        let mut payment = current.clone();
        let refund_amount = amount.unwrap_or_else(|| payment.refundable_amount());
        payment.apply_refund(refund_amount)?;

        let adapter = self.gateways.get_adapter(&payment.gateway);
        let gateway_transaction_id = payment
            .gateway_transaction_id
            .clone()
            .unwrap_or_else(|| payment_id.to_string());

        let gateway_refund = self
            .breakers
            .get_breaker(&breaker_name(adapter.name()))
            .execute(|| adapter.refund_payment(&gateway_transaction_id, refund_amount))
            .await?;
        if !gateway_refund.success {
            return Err(DomainError::GatewayError(
                gateway_refund
                    .error_message
                    .unwrap_or_else(|| format!("Refund rejected by {}", adapter.name())),
            ));
        }

        let mut refund = Transaction::new_refund(&payment, refund_amount, reason);
        refund.gateway_transaction_id = Some(gateway_refund.refund_id.clone());

        self.transactions.save(&refund).await?;
        self.transactions.update(&payment).await?;

        let aggregate_id = payment_id.to_string();
        let version = self.next_version(&aggregate_id).await?;
        self.events
            .append_event(&DomainEvent::from_payload(
                &aggregate_id,
                version,
                &PaymentRefunded {
                    refund_id: refund.id,
                    amount: refund_amount,
                    total_refunded: payment.refunded_amount,
                    gateway_refund_id: gateway_refund.refund_id,
                },
            )?)
            .await?;
        self.append_lifecycle(&payment, EventType::TransactionRefunded, Some(current.status))
            .await?;
        self.append_lifecycle(&refund, EventType::TransactionCreated, None)
            .await?;

        let response = PaymentResponse::from(&refund);
        self.notify(merchant_id, NotificationType::PaymentRefunded, &response);

        info!(
            "Payment {} refunded {} ({} total), status {}",
            payment_id, refund_amount, payment.refunded_amount, payment.status
        );
        Ok(response)
    }

    /// 查询单笔交易
    pub async fn get_payment(&self, payment_id: Uuid, merchant_id: &str) -> DomainResult<PaymentResponse> {
        let transaction = self.load(payment_id, merchant_id).await?;
        Ok(PaymentResponse::from(&transaction))
    }

    async fn load(&self, payment_id: Uuid, merchant_id: &str) -> DomainResult<Transaction> {
        self.transactions
            .find_by_id(payment_id, merchant_id)
            .await?
            .ok_or_else(|| DomainError::PaymentNotFound(payment_id.to_string()))
    }

    async fn next_version(&self, aggregate_id: &str) -> DomainResult<i64> {
        Ok(self
            .events
            .get_latest_version(aggregate_id, PAYMENT_AGGREGATE)
            .await?
            + 1)
    }

    async fn append_lifecycle(
        &self,
        transaction: &Transaction,
        kind: EventType,
        previous_status: Option<TransactionStatus>,
    ) -> DomainResult<()> {
        let aggregate_id = transaction.id.to_string();
        let version = self
            .events
            .get_latest_version(&aggregate_id, TRANSACTION_AGGREGATE)
            .await?
            + 1;

        let payload = TransactionLifecycle {
            kind,
            previous_status: previous_status.map(|s| s.to_string()),
            new_status: transaction.status.to_string(),
            gateway: transaction.gateway.clone(),
        };
        let event = DomainEvent::from_payload(aggregate_id, version, &payload)?
            .with_metadata(json!({ "merchant_id": transaction.merchant_id }));
        self.events.append_event(&event).await?;
        Ok(())
    }

    /// 同一交易ID共享一把异步锁；空闲的锁在下次分配时清理
    fn transaction_lock(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    async fn cached_response(&self, merchant_id: &str, key: &str) -> Option<PaymentResponse> {
        let cache_key = idempotency_cache_key(merchant_id, key);
        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!("Discarding unreadable idempotency entry {}: {}", cache_key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Idempotency lookup failed for {}: {}", cache_key, e);
                None
            }
        }
    }

    async fn cache_response(&self, merchant_id: &str, key: &str, response: &PaymentResponse) {
        let cache_key = idempotency_cache_key(merchant_id, key);
        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize payment {} for caching: {}", response.id, e);
                return;
            }
        };

        match self.cache.set(&cache_key, &raw, self.idempotency_ttl).await {
            Ok(()) => debug!("Cached payment {} under {}", response.id, cache_key),
            Err(e) => error!("Failed to cache idempotent result {}: {}", cache_key, e),
        }
    }

    fn notify(&self, merchant_id: &str, notification_type: NotificationType, response: &PaymentResponse) {
        match serde_json::to_value(response) {
            Ok(data) => self.notifier.notify(merchant_id, notification_type, data),
            Err(e) => error!("Failed to build {} notification: {}", notification_type, e),
        }
    }
}

fn failed_event(aggregate_id: &str, transaction: &Transaction) -> DomainResult<DomainEvent> {
    DomainEvent::from_payload(
        aggregate_id,
        2,
        &PaymentFailed {
            error_code: transaction.error_code.clone().unwrap_or_default(),
            error_message: transaction.error_message.clone().unwrap_or_default(),
        },
    )
}

fn notification_for(status: TransactionStatus) -> Option<NotificationType> {
    match status {
        TransactionStatus::Captured => Some(NotificationType::PaymentCaptured),
        TransactionStatus::Authorized => Some(NotificationType::PaymentAuthorized),
        TransactionStatus::RequiresAction => Some(NotificationType::PaymentRequiresAction),
        TransactionStatus::Failed => Some(NotificationType::PaymentFailed),
        _ => None,
    }
}
