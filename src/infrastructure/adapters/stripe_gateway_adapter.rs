use crate::domain::errors::DomainResult;
use crate::domain::value_objects::{last4, CardNetwork};
use crate::infrastructure::adapters::simulation::{
    gateway_reference, key_prefix, random_code, SimulationOptions, SimulationProfile,
};
use crate::ports::payment_gateway_port::*;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// Stripe 测试卡：卡号 -> (错误码, 错误信息)
const DECLINED_CARDS: &[(&str, &str, &str)] = &[
    ("4000000000000002", "card_declined", "Your card was declined"),
    ("4000000000009995", "insufficient_funds", "Insufficient funds"),
    ("4000000000000069", "expired_card", "Your card has expired"),
    (
        "4000000000000127",
        "incorrect_cvc",
        "Your card's security code is incorrect",
    ),
    (
        "4000000000006975",
        "processing_error",
        "An error occurred while processing your card",
    ),
    (
        "4100000000000019",
        "fraudulent",
        "Your card was declined (suspected fraud)",
    ),
    ("4000000000000119", "generic_decline", "Your card was declined"),
];

/// 需要3DS的测试卡
pub const STRIPE_THREE_DS_CARD: &str = "4000002500003155";

/// Stripe 网关适配器实现（模拟）
#[derive(Clone)]
pub struct StripeGatewayAdapter {
    name: String,
    api_key: String,
    api_secret: String,
    profile: SimulationProfile,
}

impl StripeGatewayAdapter {
    pub fn new(api_key: &str, api_secret: &str, options: SimulationOptions) -> Self {
        Self {
            name: "stripe".to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            profile: SimulationProfile::new(300, 1000, options),
        }
    }

    /// 兜底模拟网关，沿用 Stripe 的测试卡行为
    pub fn simulator(options: SimulationOptions) -> Self {
        Self {
            name: "simulator".to_string(),
            ..Self::new("simulator_key", "simulator_secret", options)
        }
    }

    fn card_network(card_number: &str) -> CardNetwork {
        match card_number.chars().next() {
            Some('4') => CardNetwork::Visa,
            Some('5') => CardNetwork::Mastercard,
            Some('3') => CardNetwork::Amex,
            _ => CardNetwork::Unknown,
        }
    }

    fn decline_for(card_number: &str) -> Option<(&'static str, &'static str)> {
        DECLINED_CARDS
            .iter()
            .find(|(number, _, _)| *number == card_number)
            .map(|(_, code, message)| (*code, *message))
    }
}

#[async_trait]
impl PaymentGatewayPort for StripeGatewayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_payment(
        &self,
        request: GatewayPaymentRequest,
    ) -> DomainResult<GatewayPaymentResponse> {
        info!(
            "Processing payment through Stripe ({}): key {}..., secret set: {}",
            self.name,
            key_prefix(&self.api_key),
            !self.api_secret.is_empty()
        );

        self.profile.round_trip(&self.name).await?;

        let card_number = request.card.number.as_str();

        if card_number == STRIPE_THREE_DS_CARD && request.require_3ds {
            let reference = gateway_reference("stripe_auth");
            let url = format!(
                "https://stripe-3ds-simulator.com/authenticate?id={}",
                reference
            );
            return Ok(GatewayPaymentResponse::requires_action(reference, url));
        }

        if let Some((code, message)) = Self::decline_for(card_number) {
            return Ok(GatewayPaymentResponse::declined(
                gateway_reference("stripe"),
                "failed",
                code,
                message,
            ));
        }

        let metadata = HashMap::from([
            ("gateway".to_string(), self.name.clone()),
            (
                "network".to_string(),
                Self::card_network(card_number).to_string(),
            ),
            ("last4".to_string(), last4(card_number).to_string()),
        ]);

        Ok(GatewayPaymentResponse::approved(
            gateway_reference("stripe"),
            format!("AUTH_{}", random_code(13)),
            "succeeded",
            metadata,
        ))
    }

    async fn capture_payment(
        &self,
        transaction_id: &str,
        amount: i64,
    ) -> DomainResult<CaptureResponse> {
        info!("Capturing Stripe payment: {}", transaction_id);
        self.profile.round_trip(&self.name).await?;

        Ok(CaptureResponse {
            success: true,
            transaction_id: transaction_id.to_string(),
            captured_amount: amount,
            status: "succeeded".to_string(),
        })
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: i64,
    ) -> DomainResult<RefundResponse> {
        info!("Refunding Stripe payment: {}", transaction_id);
        self.profile.round_trip(&self.name).await?;

        Ok(RefundResponse {
            success: true,
            refund_id: gateway_reference("stripe_refund"),
            amount,
            status: "succeeded".to_string(),
            error_message: None,
        })
    }

    async fn get_payment_status(&self, transaction_id: &str) -> DomainResult<PaymentStatusResponse> {
        info!("Getting Stripe payment status: {}", transaction_id);
        self.profile.round_trip(&self.name).await?;

        Ok(PaymentStatusResponse {
            transaction_id: transaction_id.to_string(),
            status: "succeeded".to_string(),
            amount: 1000,
            currency: "USD".to_string(),
        })
    }

    async fn verify_3d_secure(&self, data: ThreeDSecureData) -> DomainResult<ThreeDSecureResponse> {
        info!("Verifying 3D Secure for Stripe: {}", data.transaction_id);
        self.profile.round_trip(&self.name).await?;

        Ok(ThreeDSecureResponse {
            success: true,
            authenticated: true,
            eci: Some("05".to_string()),
            cavv: Some(random_code(13)),
            xid: Some(random_code(13)),
            status: "authenticated".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::CardDetails;

    fn request(card_number: &str, require_3ds: bool) -> GatewayPaymentRequest {
        GatewayPaymentRequest {
            transaction_id: "tx_1".to_string(),
            amount: 1000,
            currency: "USD".to_string(),
            card: CardDetails {
                number: card_number.to_string(),
                exp_month: 12,
                exp_year: 2030,
                cvv: "123".to_string(),
                cardholder_name: None,
            },
            description: None,
            require_3ds,
            merchant_id: "merchant_1".to_string(),
            customer_id: None,
        }
    }

    fn adapter() -> StripeGatewayAdapter {
        StripeGatewayAdapter::new("sk_test_key", "sk_test_secret", SimulationOptions::instant())
    }

    #[tokio::test]
    async fn test_declined_cards_are_deterministic() {
        let adapter = adapter();
        for (number, code, message) in DECLINED_CARDS {
            for _ in 0..3 {
                let response = adapter.process_payment(request(number, false)).await.unwrap();
                assert!(!response.success);
                let decline = response.decline.unwrap();
                assert_eq!(decline.code, *code);
                assert_eq!(decline.message, *message);
            }
        }
    }

    #[tokio::test]
    async fn test_success_card_metadata() {
        let response = adapter()
            .process_payment(request("5555555555554444", false))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.authorization_code.unwrap().starts_with("AUTH_"));
        assert_eq!(response.metadata["network"], "Mastercard");
        assert_eq!(response.metadata["last4"], "4444");
        assert_eq!(response.metadata["gateway"], "stripe");
    }

    #[tokio::test]
    async fn test_three_ds_card() {
        let adapter = adapter();

        let response = adapter
            .process_payment(request(STRIPE_THREE_DS_CARD, true))
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.three_d_secure_required);
        assert!(response.three_d_secure_url.is_some());

        // 未要求3DS时按普通卡处理
        let response = adapter
            .process_payment(request(STRIPE_THREE_DS_CARD, false))
            .await
            .unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_simulator_name() {
        let simulator = StripeGatewayAdapter::simulator(SimulationOptions::instant());
        assert_eq!(simulator.name(), "simulator");
        let response = simulator
            .process_payment(request("4242424242424242", false))
            .await
            .unwrap();
        assert_eq!(response.metadata["gateway"], "simulator");
    }

    #[tokio::test]
    async fn test_transport_fault() {
        let adapter = StripeGatewayAdapter::new(
            "sk",
            "secret",
            SimulationOptions {
                simulate_latency: false,
                fault_rate: 1.0,
            },
        );
        assert!(adapter
            .process_payment(request("4242424242424242", false))
            .await
            .is_err());
    }
}
