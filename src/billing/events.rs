use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, BillingError};

/// A reference that Stripe sends either as a bare id or, when expanded, as
/// the full object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    customer: Option<Expandable>,
    subscription: Option<Expandable>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
    current_period_end: Option<i64>,
}

/// The webhook events the subscription ledger reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    CheckoutCompleted {
        customer_id: Option<String>,
        subscription_id: Option<String>,
        user_id: Option<Uuid>,
    },
    SubscriptionChanged {
        subscription_id: String,
        status: String,
        current_period_end: Option<DateTime<Utc>>,
    },
    SubscriptionDeleted {
        subscription_id: String,
        status: String,
    },
    Ignored {
        event_type: String,
    },
}

impl WebhookEvent {
    /// Decodes a verified payload. An unreadable envelope is a malformed
    /// event; a known event whose object has the wrong shape is a handler
    /// failure.
    pub fn parse(payload: &[u8]) -> Result<(String, WebhookEvent), AppError> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        let event = match envelope.kind.as_str() {
            "checkout.session.completed" => {
                let session: CheckoutSessionObject = decode_object(&envelope)?;
                WebhookEvent::CheckoutCompleted {
                    customer_id: session.customer.map(Expandable::into_id),
                    subscription_id: session.subscription.map(Expandable::into_id),
                    user_id: session
                        .metadata
                        .get("userId")
                        .and_then(|id| Uuid::parse_str(id).ok()),
                }
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                let subscription: SubscriptionObject = decode_object(&envelope)?;
                WebhookEvent::SubscriptionChanged {
                    subscription_id: subscription.id,
                    status: subscription.status,
                    current_period_end: subscription
                        .current_period_end
                        .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
                }
            }
            "customer.subscription.deleted" => {
                let subscription: SubscriptionObject = decode_object(&envelope)?;
                WebhookEvent::SubscriptionDeleted {
                    subscription_id: subscription.id,
                    status: subscription.status,
                }
            }
            other => WebhookEvent::Ignored { event_type: other.to_string() },
        };

        Ok((envelope.id, event))
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, AppError> {
    serde_json::from_value(envelope.data.object.clone()).map_err(|e| {
        AppError::InternalError(format!("unexpected {} object: {e}", envelope.kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> WebhookEvent {
        WebhookEvent::parse(value.to_string().as_bytes()).unwrap().1
    }

    #[test]
    fn checkout_accepts_ids_and_expanded_objects() {
        let user = Uuid::new_v4();
        let event = parse(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "customer": {"id": "cus_1", "object": "customer"},
                "subscription": "sub_1",
                "metadata": {"userId": user.to_string()}
            }}
        }));
        assert_eq!(
            event,
            WebhookEvent::CheckoutCompleted {
                customer_id: Some("cus_1".into()),
                subscription_id: Some("sub_1".into()),
                user_id: Some(user),
            }
        );
    }

    #[test]
    fn subscription_update_converts_period_end() {
        let event = parse(json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "data": {"object": {"id": "sub_1", "status": "past_due", "current_period_end": 1_700_000_000}}
        }));
        let WebhookEvent::SubscriptionChanged { status, current_period_end, .. } = event else {
            panic!("expected subscription change");
        };
        assert_eq!(status, "past_due");
        assert_eq!(current_period_end.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn unknown_type_is_ignored() {
        let event = parse(json!({"id": "evt_3", "type": "invoice.paid", "data": {"object": {}}}));
        assert_eq!(event, WebhookEvent::Ignored { event_type: "invoice.paid".into() });
    }

    #[test]
    fn non_json_payload_is_malformed() {
        let err = WebhookEvent::parse(b"not json").unwrap_err();
        assert!(matches!(err, AppError::BillingError(BillingError::MalformedEvent(_))));
    }

    #[test]
    fn known_type_with_bad_object_is_internal() {
        let err = WebhookEvent::parse(
            json!({"type": "customer.subscription.deleted", "data": {"object": {"id": 7}}})
                .to_string()
                .as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InternalError(_)));
    }
}
