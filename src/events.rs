//! Fluid webhook event taxonomy.
//!
//! Inbound payloads are decoded at the boundary into a closed tagged union,
//! one variant per event type the platform emits, plus an `Unknown` catch-all
//! so new platform event types are accepted and stored without code changes
//! (they simply trigger no downstream action).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Closed enumeration of Fluid webhook event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluidEventType {
    OrderCreated,
    OrderUpdated,
    OrderCompleted,
    OrderCancelled,
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    CustomerCreated,
    CustomerUpdated,
    CartUpdated,
    CartAbandoned,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    EventTriggered,
    MarketingCampaignSent,
    DropletInstalled,
    DropletUninstalled,
    AuthRevoked,
    /// Forward-compatible catch-all carrying the raw wire name.
    Unknown(String),
}

/// Coarse dispatch category for an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Order,
    Product,
    Customer,
    Cart,
    Subscription,
    Event,
    Marketing,
    System,
    Auth,
    Unknown,
}

impl FluidEventType {
    /// Parse a wire name into the closed enumeration.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "order_created" => Self::OrderCreated,
            "order_updated" => Self::OrderUpdated,
            "order_completed" => Self::OrderCompleted,
            "order_cancelled" => Self::OrderCancelled,
            "product_created" => Self::ProductCreated,
            "product_updated" => Self::ProductUpdated,
            "product_deleted" => Self::ProductDeleted,
            "customer_created" => Self::CustomerCreated,
            "customer_updated" => Self::CustomerUpdated,
            "cart_updated" => Self::CartUpdated,
            "cart_abandoned" => Self::CartAbandoned,
            "subscription_created" => Self::SubscriptionCreated,
            "subscription_updated" => Self::SubscriptionUpdated,
            "subscription_cancelled" => Self::SubscriptionCancelled,
            "event_triggered" => Self::EventTriggered,
            "marketing_campaign_sent" => Self::MarketingCampaignSent,
            "droplet_installed" => Self::DropletInstalled,
            "droplet_uninstalled" => Self::DropletUninstalled,
            "auth_revoked" => Self::AuthRevoked,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire name stored in the event row.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::OrderCreated => "order_created",
            Self::OrderUpdated => "order_updated",
            Self::OrderCompleted => "order_completed",
            Self::OrderCancelled => "order_cancelled",
            Self::ProductCreated => "product_created",
            Self::ProductUpdated => "product_updated",
            Self::ProductDeleted => "product_deleted",
            Self::CustomerCreated => "customer_created",
            Self::CustomerUpdated => "customer_updated",
            Self::CartUpdated => "cart_updated",
            Self::CartAbandoned => "cart_abandoned",
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::EventTriggered => "event_triggered",
            Self::MarketingCampaignSent => "marketing_campaign_sent",
            Self::DropletInstalled => "droplet_installed",
            Self::DropletUninstalled => "droplet_uninstalled",
            Self::AuthRevoked => "auth_revoked",
            Self::Unknown(name) => name,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::OrderCreated | Self::OrderUpdated | Self::OrderCompleted | Self::OrderCancelled => {
                EventCategory::Order
            }
            Self::ProductCreated | Self::ProductUpdated | Self::ProductDeleted => {
                EventCategory::Product
            }
            Self::CustomerCreated | Self::CustomerUpdated => EventCategory::Customer,
            Self::CartUpdated | Self::CartAbandoned => EventCategory::Cart,
            Self::SubscriptionCreated | Self::SubscriptionUpdated | Self::SubscriptionCancelled => {
                EventCategory::Subscription
            }
            Self::EventTriggered => EventCategory::Event,
            Self::MarketingCampaignSent => EventCategory::Marketing,
            Self::DropletInstalled | Self::DropletUninstalled => EventCategory::System,
            Self::AuthRevoked => EventCategory::Auth,
            Self::Unknown(_) => EventCategory::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// A delivery payload decoded at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct ParsedDelivery {
    pub event_type: FluidEventType,
    /// Platform-assigned event id used as the idempotency key. Not every
    /// delivery carries one; those are stored without deduplication.
    pub external_event_id: Option<String>,
    pub payload: JsonValue,
}

/// Errors raised while decoding a delivery payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON")]
    InvalidJson,
    #[error("payload has no event type field")]
    MissingEventType,
}

/// Decode the raw request body into a [`ParsedDelivery`].
///
/// The event type is read from `event_type` (falling back to `type`); the
/// external event id from `event_id` (falling back to `id`). Unknown event
/// type names decode successfully into [`FluidEventType::Unknown`].
pub fn decode_delivery(raw_body: &[u8]) -> Result<ParsedDelivery, DecodeError> {
    let payload: JsonValue =
        serde_json::from_slice(raw_body).map_err(|_| DecodeError::InvalidJson)?;

    let type_name = payload
        .get("event_type")
        .or_else(|| payload.get("type"))
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingEventType)?;

    let external_event_id = payload
        .get("event_id")
        .or_else(|| payload.get("id"))
        .and_then(|v| match v {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok(ParsedDelivery {
        event_type: FluidEventType::from_wire(type_name),
        external_event_id,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_roundtrip_for_known_types() {
        let names = [
            "order_created",
            "order_completed",
            "product_deleted",
            "customer_updated",
            "cart_abandoned",
            "subscription_cancelled",
            "event_triggered",
            "marketing_campaign_sent",
            "droplet_installed",
            "droplet_uninstalled",
            "auth_revoked",
        ];
        for name in names {
            let parsed = FluidEventType::from_wire(name);
            assert!(!parsed.is_unknown(), "{name} should be a known type");
            assert_eq!(parsed.as_wire(), name);
        }
    }

    #[test]
    fn test_unknown_type_preserved() {
        let parsed = FluidEventType::from_wire("refund_issued");
        assert!(parsed.is_unknown());
        assert_eq!(parsed.as_wire(), "refund_issued");
        assert_eq!(parsed.category(), EventCategory::Unknown);
    }

    #[test]
    fn test_decode_with_event_type_and_event_id() {
        let body = json!({"event_type": "order_completed", "event_id": "evt_42", "order": {"total": 10}});
        let parsed = decode_delivery(body.to_string().as_bytes()).expect("decodes");

        assert_eq!(parsed.event_type, FluidEventType::OrderCompleted);
        assert_eq!(parsed.external_event_id.as_deref(), Some("evt_42"));
    }

    #[test]
    fn test_decode_falls_back_to_type_and_id() {
        let body = json!({"type": "customer_created", "id": 9913});
        let parsed = decode_delivery(body.to_string().as_bytes()).expect("decodes");

        assert_eq!(parsed.event_type, FluidEventType::CustomerCreated);
        assert_eq!(parsed.external_event_id.as_deref(), Some("9913"));
    }

    #[test]
    fn test_decode_without_external_id() {
        let body = json!({"event_type": "cart_updated"});
        let parsed = decode_delivery(body.to_string().as_bytes()).expect("decodes");

        assert_eq!(parsed.external_event_id, None);
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            decode_delivery(b"not json"),
            Err(DecodeError::InvalidJson)
        ));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        let body = json!({"event_id": "evt_1"});
        assert!(matches!(
            decode_delivery(body.to_string().as_bytes()),
            Err(DecodeError::MissingEventType)
        ));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            FluidEventType::OrderCancelled.category(),
            EventCategory::Order
        );
        assert_eq!(
            FluidEventType::DropletInstalled.category(),
            EventCategory::System
        );
        assert_eq!(FluidEventType::AuthRevoked.category(), EventCategory::Auth);
    }
}
