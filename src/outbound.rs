//! Outbound call trigger
//!
//! A stateless pass-through: ask the telephony platform to dial the
//! business owner from the business number, carrying the customer's number
//! as a call argument. The resulting `NEW_OUTBOUND_CALL` event then enters
//! the relay like any other call.

use crate::error::{RelayError, Result};
use crate::nats::NatsClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Call argument carrying the customer's number
pub const CUSTOMER_PHONE_ARGUMENT: &str = "CustomerPhoneNumber";

/// Trigger request, as submitted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundCallRequest {
    pub business_phone_number: String,
    pub business_owner_phone_number: String,
    pub sip_media_application_id: String,
    pub customer_phone_number: String,
}

/// Platform-level call placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCall {
    pub from_number: String,
    pub to_number: String,
    /// Media-control application that will handle the call
    pub engine_id: String,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

impl From<&OutboundCallRequest> for PlaceCall {
    fn from(req: &OutboundCallRequest) -> Self {
        Self {
            from_number: req.business_phone_number.clone(),
            to_number: req.business_owner_phone_number.clone(),
            engine_id: req.sip_media_application_id.clone(),
            arguments: HashMap::from([(
                CUSTOMER_PHONE_ARGUMENT.to_string(),
                req.customer_phone_number.clone(),
            )]),
        }
    }
}

/// Response envelope returned to the trigger's caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallResponse {
    pub status_code: u16,
    /// Platform response, JSON encoded
    pub body: String,
}

/// Places calls on the telephony platform
#[async_trait]
pub trait CallPlacer: Send + Sync {
    async fn place_call(&self, call: &PlaceCall) -> Result<serde_json::Value>;
}

/// Validate the request, place the call, wrap the platform response
pub async fn place_outbound_call(
    placer: &dyn CallPlacer,
    request: &OutboundCallRequest,
) -> Result<OutboundCallResponse> {
    for (field, value) in [
        ("BusinessPhoneNumber", &request.business_phone_number),
        ("BusinessOwnerPhoneNumber", &request.business_owner_phone_number),
        ("SipMediaApplicationId", &request.sip_media_application_id),
    ] {
        if value.is_empty() {
            return Err(RelayError::Placement(format!("{} is required", field)));
        }
    }

    let call = PlaceCall::from(request);
    let response = placer.place_call(&call).await?;
    tracing::info!(
        from = %call.from_number,
        to = %call.to_number,
        engine = %call.engine_id,
        "Outbound call placed"
    );

    Ok(OutboundCallResponse {
        status_code: 200,
        body: serde_json::to_string(&response)?,
    })
}

/// Places calls through a NATS request to the telephony adapter
pub struct NatsCallPlacer {
    client: NatsClient,
}

impl NatsCallPlacer {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallPlacer for NatsCallPlacer {
    async fn place_call(&self, call: &PlaceCall) -> Result<serde_json::Value> {
        let subject = self.client.config().place_call_subject.clone();
        self.client
            .request_json(&subject, call)
            .await
            .map_err(|e| RelayError::Placement(e.to_string()))
    }
}

/// Records placed calls and answers with a synthetic transaction id
#[derive(Default)]
pub struct MemoryCallPlacer {
    placed: Mutex<Vec<PlaceCall>>,
}

impl MemoryCallPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn placed(&self) -> Vec<PlaceCall> {
        self.placed.lock().await.clone()
    }
}

#[async_trait]
impl CallPlacer for MemoryCallPlacer {
    async fn place_call(&self, call: &PlaceCall) -> Result<serde_json::Value> {
        self.placed.lock().await.push(call.clone());
        Ok(serde_json::json!({
            "SipMediaApplicationCall": {
                "TransactionId": uuid::Uuid::new_v4().to_string()
            }
        }))
    }
}
