use crate::domain::errors::{DomainError, DomainResult};
use crate::ports::{Notification, NotificationPort, NotificationType};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// 签名请求头
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const UPDATES_CAPACITY: usize = 256;

/// 商户回调地址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub merchant_id: String,
    pub url: String,
    pub secret: String,
}

/// Webhook 投递配置
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub endpoints: Vec<WebhookEndpoint>,
    /// 单个地址的最大尝试次数
    pub retry_attempts: u32,
    /// 重试基础间隔，按尝试次数线性增长
    pub retry_delay: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// 投递给商户的事件信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    fn from_notification(notification: &Notification) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event_type: notification.notification_type.to_string(),
            created: Utc::now().timestamp(),
            data: notification.data.clone(),
        }
    }
}

/// 生成签名头：`t=<ts>,v1=<hex(hmac_sha256(secret, "<ts>.<payload>"))>`
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> DomainResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DomainError::InternalError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());

    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// 校验签名头（商户侧使用）
pub fn verify_signature(secret: &str, header: &str, payload: &str) -> bool {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    mac.verify_slice(&signature).is_ok()
}

/// 实际执行HTTP投递的部分，由后台任务持有
struct WebhookDelivery {
    client: Client,
    config: WebhookConfig,
}

impl WebhookDelivery {
    async fn deliver(&self, notification: &Notification) {
        let endpoints = self
            .config
            .endpoints
            .iter()
            .filter(|e| e.merchant_id == notification.merchant_id);

        for endpoint in endpoints {
            let envelope = WebhookEnvelope::from_notification(notification);
            if let Err(e) = self.post_with_retry(endpoint, &envelope).await {
                error!(
                    "Webhook {} for merchant {} failed: {}",
                    envelope.event_type, endpoint.merchant_id, e
                );
            }
        }
    }

    async fn post_with_retry(
        &self,
        endpoint: &WebhookEndpoint,
        envelope: &WebhookEnvelope,
    ) -> DomainResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let signature = sign_payload(&endpoint.secret, Utc::now().timestamp(), &payload)?;

            let result = self
                .client
                .post(&endpoint.url)
                .header("Content-Type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(payload.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        "Webhook {} delivered to {} on attempt {}",
                        envelope.id, endpoint.url, attempt
                    );
                    return Ok(());
                }
                Ok(response) => last_error = format!("HTTP {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                "Webhook {} attempt {}/{} to {} failed: {}",
                envelope.id, attempt, attempts, endpoint.url, last_error
            );

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }
        }

        Err(DomainError::InternalError(format!(
            "Webhook delivery exhausted after {} attempts: {}",
            attempts, last_error
        )))
    }
}

/// Webhook 通知器
///
/// `notify` 只负责入队；后台任务依次广播实时更新并投递到商户地址。
/// 需在 tokio 运行时内调用 `start`，停机时调用 `shutdown` 排空队列。
pub struct WebhookNotifier {
    sender: Mutex<Option<mpsc::UnboundedSender<Notification>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    updates: broadcast::Sender<Notification>,
    delivery: Arc<WebhookDelivery>,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATES_CAPACITY);

        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            worker: tokio::sync::Mutex::new(None),
            updates,
            delivery: Arc::new(WebhookDelivery {
                client: Client::new(),
                config,
            }),
        }
    }

    /// 启动后台投递任务，重复调用无效果
    pub async fn start(&self) {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(mut receiver) = receiver else {
            debug!("Webhook notifier already started");
            return;
        };

        let updates = self.updates.clone();
        let delivery = self.delivery.clone();

        let handle = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                // 无订阅者时发送失败属正常情况
                let _ = updates.send(notification.clone());
                delivery.deliver(&notification).await;
            }
            debug!("Webhook notifier queue drained");
        });

        *self.worker.lock().await = Some(handle);
        info!(
            "Webhook notifier started with {} endpoint(s)",
            self.delivery.config.endpoints.len()
        );
    }

    /// 订阅实时状态更新
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.updates.subscribe()
    }

    /// 关闭队列并等待已入队的通知处理完毕
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Webhook worker terminated abnormally: {}", e);
            }
        }
        info!("Webhook notifier shut down");
    }
}

impl NotificationPort for WebhookNotifier {
    fn notify(&self, merchant_id: &str, notification_type: NotificationType, data: serde_json::Value) {
        let notification = Notification {
            merchant_id: merchant_id.to_string(),
            notification_type,
            data,
        };

        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(sender) => {
                if sender.send(notification).is_err() {
                    warn!("Webhook queue closed, dropping {}", notification_type);
                }
            }
            None => warn!(
                "Webhook notifier is shut down, dropping {} for merchant {}",
                notification_type, merchant_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;

    #[test]
    fn test_sign_and_verify() {
        let header = sign_payload("whsec_test", 1_700_000_000, r#"{"a":1}"#).unwrap();
        assert!(header.starts_with("t=1700000000,v1="));
        assert!(verify_signature("whsec_test", &header, r#"{"a":1}"#));
        assert!(!verify_signature("whsec_other", &header, r#"{"a":1}"#));
        assert!(!verify_signature("whsec_test", &header, r#"{"a":2}"#));
        assert!(!verify_signature("whsec_test", "garbage", r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn test_broadcast_and_drain_on_shutdown() {
        let notifier = WebhookNotifier::new(WebhookConfig::default());
        let mut updates = notifier.subscribe();

        notifier.start().await;
        notifier.notify(
            "merchant_1",
            NotificationType::PaymentCaptured,
            json!({"id": "tx_1"}),
        );
        notifier.shutdown().await;

        let received = updates.recv().await.unwrap();
        assert_eq!(received.merchant_id, "merchant_1");
        assert_eq!(received.notification_type, NotificationType::PaymentCaptured);

        // 关闭后的通知被丢弃，不会 panic
        notifier.notify("merchant_1", NotificationType::PaymentFailed, json!({}));
    }

    #[tokio::test]
    async fn test_signed_delivery_to_merchant_endpoint() {
        let received: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let app = Router::new().route(
            "/hooks",
            post(move |headers: HeaderMap, body: String| {
                let sink = sink.clone();
                async move {
                    let signature = headers
                        .get(SIGNATURE_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    sink.lock().unwrap().push((signature, body));
                    StatusCode::OK
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier = WebhookNotifier::new(WebhookConfig {
            endpoints: vec![WebhookEndpoint {
                merchant_id: "merchant_1".to_string(),
                url: format!("http://{}/hooks", addr),
                secret: "whsec_test".to_string(),
            }],
            retry_attempts: 2,
            retry_delay: Duration::from_millis(10),
        });
        notifier.start().await;
        notifier.notify(
            "merchant_1",
            NotificationType::PaymentRefunded,
            json!({"id": "tx_9"}),
        );
        notifier.notify("merchant_2", NotificationType::PaymentFailed, json!({}));
        notifier.shutdown().await;

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let (signature, body) = &received[0];
        assert!(verify_signature("whsec_test", signature, body));

        let envelope: WebhookEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.event_type, "PAYMENT_REFUNDED");
        assert_eq!(envelope.data["id"], "tx_9");
        assert!(envelope.id.starts_with("evt_"));
    }
}
