use crate::domain::errors::DomainResult;
use crate::domain::value_objects::last4;
use crate::infrastructure::adapters::simulation::{
    key_prefix, random_code, SimulationOptions, SimulationProfile,
};
use crate::ports::payment_gateway_port::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

const DECLINED_CARDS: &[(&str, &str, &str)] = &[
    ("4000000000000002", "INSTRUMENT_DECLINED", "Your card was declined"),
    ("4000000000009995", "INSUFFICIENT_FUNDS", "Insufficient funds"),
    ("4000000000000069", "EXPIRED_CARD", "Your card has expired"),
    (
        "4000000000000127",
        "INCORRECT_CVC",
        "Your card's security code is incorrect",
    ),
    (
        "4000000000006975",
        "PROCESSING_ERROR",
        "An error occurred while processing your card",
    ),
    (
        "4100000000000019",
        "FRAUD_DETECTED",
        "Your card was declined (suspected fraud)",
    ),
    ("4000000000000119", "INSTRUMENT_DECLINED", "Your card was declined"),
];

/// PayPal 网关适配器实现（模拟）
///
/// PayPal 不走传统卡 3DS 流程。
#[derive(Clone)]
pub struct PayPalGatewayAdapter {
    client_id: String,
    client_secret: String,
    profile: SimulationProfile,
}

impl PayPalGatewayAdapter {
    pub fn new(client_id: &str, client_secret: &str, options: SimulationOptions) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            profile: SimulationProfile::new(400, 1200, options),
        }
    }

    fn order_reference() -> String {
        format!("PAYPAL-{}-{}", Utc::now().timestamp_millis(), random_code(15))
    }
}

#[async_trait]
impl PaymentGatewayPort for PayPalGatewayAdapter {
    fn name(&self) -> &str {
        "paypal"
    }

    async fn process_payment(
        &self,
        request: GatewayPaymentRequest,
    ) -> DomainResult<GatewayPaymentResponse> {
        info!(
            "Processing payment through PayPal: client {}..., secret set: {}",
            key_prefix(&self.client_id),
            !self.client_secret.is_empty()
        );

        self.profile.round_trip(self.name()).await?;

        let card_number = request.card.number.as_str();

        if let Some((_, code, message)) = DECLINED_CARDS
            .iter()
            .find(|(number, _, _)| *number == card_number)
        {
            return Ok(GatewayPaymentResponse::declined(
                format!("paypal_{}", Utc::now().timestamp_millis()),
                "DECLINED",
                code,
                message,
            ));
        }

        let metadata = HashMap::from([
            ("gateway".to_string(), "paypal".to_string()),
            ("payer_id".to_string(), format!("PAYER{}", random_code(8))),
            ("last4".to_string(), last4(card_number).to_string()),
        ]);

        Ok(GatewayPaymentResponse::approved(
            Self::order_reference(),
            random_code(8),
            "COMPLETED",
            metadata,
        ))
    }

    async fn capture_payment(
        &self,
        transaction_id: &str,
        amount: i64,
    ) -> DomainResult<CaptureResponse> {
        info!("Capturing PayPal payment: {}", transaction_id);
        self.profile.round_trip(self.name()).await?;

        Ok(CaptureResponse {
            success: true,
            transaction_id: transaction_id.to_string(),
            captured_amount: amount,
            status: "COMPLETED".to_string(),
        })
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: i64,
    ) -> DomainResult<RefundResponse> {
        info!("Refunding PayPal payment: {}", transaction_id);
        self.profile.round_trip(self.name()).await?;

        Ok(RefundResponse {
            success: true,
            refund_id: format!("PAYPAL-REFUND-{}", Utc::now().timestamp_millis()),
            amount,
            status: "COMPLETED".to_string(),
            error_message: None,
        })
    }

    async fn get_payment_status(&self, transaction_id: &str) -> DomainResult<PaymentStatusResponse> {
        info!("Getting PayPal payment status: {}", transaction_id);
        self.profile.round_trip(self.name()).await?;

        Ok(PaymentStatusResponse {
            transaction_id: transaction_id.to_string(),
            status: "COMPLETED".to_string(),
            amount: 1000,
            currency: "USD".to_string(),
        })
    }

    async fn verify_3d_secure(&self, data: ThreeDSecureData) -> DomainResult<ThreeDSecureResponse> {
        info!("PayPal doesn't use traditional 3DS: {}", data.transaction_id);

        Ok(ThreeDSecureResponse {
            success: true,
            authenticated: true,
            eci: None,
            cavv: None,
            xid: None,
            status: "not_applicable".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::CardDetails;

    fn request(card_number: &str) -> GatewayPaymentRequest {
        GatewayPaymentRequest {
            transaction_id: "tx_1".to_string(),
            amount: 2500,
            currency: "EUR".to_string(),
            card: CardDetails {
                number: card_number.to_string(),
                exp_month: 1,
                exp_year: 2031,
                cvv: "999".to_string(),
                cardholder_name: Some("Jane".to_string()),
            },
            description: None,
            require_3ds: true,
            merchant_id: "merchant_1".to_string(),
            customer_id: None,
        }
    }

    #[tokio::test]
    async fn test_paypal_decline_vocabulary() {
        let adapter = PayPalGatewayAdapter::new("client", "secret", SimulationOptions::instant());

        let response = adapter.process_payment(request("4100000000000019")).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.status, "DECLINED");
        assert_eq!(response.decline.unwrap().code, "FRAUD_DETECTED");

        let response = adapter.process_payment(request("4000000000000119")).await.unwrap();
        assert_eq!(response.decline.unwrap().code, "INSTRUMENT_DECLINED");
    }

    #[tokio::test]
    async fn test_paypal_ignores_three_ds() {
        let adapter = PayPalGatewayAdapter::new("client", "secret", SimulationOptions::instant());

        let response = adapter.process_payment(request("4000002500003155")).await.unwrap();
        assert!(response.success);
        assert!(!response.three_d_secure_required);
        assert!(response.transaction_id.starts_with("PAYPAL-"));

        let verification = adapter
            .verify_3d_secure(ThreeDSecureData {
                transaction_id: response.transaction_id,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(verification.status, "not_applicable");
    }
}
