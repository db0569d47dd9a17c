use crate::domain::errors::DomainResult;
use crate::domain::value_objects::{last4, CardNetwork};
use crate::infrastructure::adapters::simulation::{
    key_prefix, random_code, SimulationOptions, SimulationProfile,
};
use crate::ports::payment_gateway_port::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

const DECLINED_CARDS: &[(&str, &str, &str)] = &[
    ("4000000000000002", "BAD_REQUEST_ERROR", "Your card was declined"),
    ("4000000000009995", "BAD_REQUEST_ERROR", "Insufficient funds"),
    ("4000000000000069", "BAD_REQUEST_ERROR", "Your card has expired"),
    (
        "4000000000000127",
        "BAD_REQUEST_ERROR",
        "Your card's security code is incorrect",
    ),
    (
        "4000000000006975",
        "GATEWAY_ERROR",
        "An error occurred while processing your card",
    ),
    (
        "4100000000000019",
        "BAD_REQUEST_ERROR",
        "Your card was declined (suspected fraud)",
    ),
    ("4000000000000119", "BAD_REQUEST_ERROR", "Your card was declined"),
];

const THREE_DS_CARD: &str = "4000002500003155";

/// Razorpay 网关适配器实现（模拟）
#[derive(Clone)]
pub struct RazorpayGatewayAdapter {
    key_id: String,
    key_secret: String,
    profile: SimulationProfile,
}

impl RazorpayGatewayAdapter {
    pub fn new(key_id: &str, key_secret: &str, options: SimulationOptions) -> Self {
        Self {
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            profile: SimulationProfile::new(350, 1000, options),
        }
    }

    fn card_network(card_number: &str) -> CardNetwork {
        match card_number.chars().next() {
            Some('4') => CardNetwork::Visa,
            Some('5') => CardNetwork::Mastercard,
            Some('6') => CardNetwork::RuPay,
            _ => CardNetwork::Unknown,
        }
    }

    /// Razorpay 风格的 14 位 ID
    fn razorpay_id(prefix: &str) -> String {
        format!("{}_{}", prefix, random_code(14))
    }
}

#[async_trait]
impl PaymentGatewayPort for RazorpayGatewayAdapter {
    fn name(&self) -> &str {
        "razorpay"
    }

    async fn process_payment(
        &self,
        request: GatewayPaymentRequest,
    ) -> DomainResult<GatewayPaymentResponse> {
        info!(
            "Processing payment through Razorpay: key {}..., secret set: {}",
            key_prefix(&self.key_id),
            !self.key_secret.is_empty()
        );

        self.profile.round_trip(self.name()).await?;

        let card_number = request.card.number.as_str();

        if card_number == THREE_DS_CARD && request.require_3ds {
            let payment_id = Self::razorpay_id("pay");
            let url = format!(
                "https://api.razorpay.com/v1/payments/{}/authenticate",
                payment_id
            );
            return Ok(GatewayPaymentResponse::requires_action(payment_id, url));
        }

        if let Some((_, code, message)) = DECLINED_CARDS
            .iter()
            .find(|(number, _, _)| *number == card_number)
        {
            return Ok(GatewayPaymentResponse::declined(
                Self::razorpay_id("pay"),
                "failed",
                code,
                message,
            ));
        }

        let metadata = HashMap::from([
            ("gateway".to_string(), "razorpay".to_string()),
            (
                "network".to_string(),
                Self::card_network(card_number).to_string(),
            ),
            ("last4".to_string(), last4(card_number).to_string()),
            ("order_id".to_string(), Self::razorpay_id("order")),
        ]);

        Ok(GatewayPaymentResponse::approved(
            Self::razorpay_id("pay"),
            random_code(6),
            "captured",
            metadata,
        ))
    }

    async fn capture_payment(
        &self,
        transaction_id: &str,
        amount: i64,
    ) -> DomainResult<CaptureResponse> {
        info!("Capturing Razorpay payment: {}", transaction_id);
        self.profile.round_trip(self.name()).await?;

        Ok(CaptureResponse {
            success: true,
            transaction_id: transaction_id.to_string(),
            captured_amount: amount,
            status: "captured".to_string(),
        })
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: i64,
    ) -> DomainResult<RefundResponse> {
        info!("Refunding Razorpay payment: {}", transaction_id);
        self.profile.round_trip(self.name()).await?;

        Ok(RefundResponse {
            success: true,
            refund_id: Self::razorpay_id("rfnd"),
            amount,
            status: "processed".to_string(),
            error_message: None,
        })
    }

    async fn get_payment_status(&self, transaction_id: &str) -> DomainResult<PaymentStatusResponse> {
        info!("Getting Razorpay payment status: {}", transaction_id);
        self.profile.round_trip(self.name()).await?;

        Ok(PaymentStatusResponse {
            transaction_id: transaction_id.to_string(),
            status: "captured".to_string(),
            amount: 1000,
            currency: "INR".to_string(),
        })
    }

    async fn verify_3d_secure(&self, data: ThreeDSecureData) -> DomainResult<ThreeDSecureResponse> {
        info!("Verifying 3D Secure for Razorpay: {}", data.transaction_id);
        self.profile.round_trip(self.name()).await?;

        let authenticated = data.pa_res.as_deref().is_some_and(|p| !p.is_empty());

        Ok(ThreeDSecureResponse {
            success: true,
            authenticated,
            eci: Some(if authenticated { "05" } else { "07" }.to_string()),
            cavv: authenticated.then(|| random_code(28)),
            xid: authenticated.then(|| format!("{}{}", random_code(10), Utc::now().timestamp())),
            status: if authenticated { "authenticated" } else { "failed" }.to_string(),
        })
    }
}
