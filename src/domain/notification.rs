//! Push payload shapes and the single notification record they normalize into.
//!
//! A push can arrive either with a `notification` block or with everything
//! packed into `data`. Both are reduced to one [`Notification`] at the
//! boundary so that display and click handling never look at raw payloads.

use crate::error::OrderFlowError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Tag used when a payload names neither an order nor an explicit tag.
pub const DEFAULT_TAG: &str = "vendor-orders";
/// Title used when a payload only carries a body.
pub const DEFAULT_TITLE: &str = "Order update";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw push payload as delivered by the messaging channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub notification: Option<NotificationFields>,
    #[serde(default)]
    pub data: Option<PushData>,
}

/// The two payload shapes, told apart once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PushShape {
    Structured {
        notification: NotificationFields,
        data: PushData,
    },
    DataOnly(PushData),
    Empty,
}

impl From<PushPayload> for PushShape {
    fn from(payload: PushPayload) -> Self {
        match (payload.notification, payload.data) {
            (Some(notification), data) => PushShape::Structured {
                notification,
                data: data.unwrap_or_default(),
            },
            (None, Some(data)) => PushShape::DataOnly(data),
            (None, None) => PushShape::Empty,
        }
    }
}

/// A notification ready to be shown on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Platform coalescing key. Redelivery with the same tag replaces, never stacks.
    pub tag: String,
    pub icon: Option<String>,
    pub url: Option<String>,
    pub order_id: Option<String>,
}

impl PushPayload {
    pub fn from_slice(raw: &[u8]) -> Result<Self, OrderFlowError> {
        serde_json::from_slice(raw)
            .map_err(|e| OrderFlowError::NotificationDecode(format!("malformed payload: {e}")))
    }

    pub fn normalize(self) -> Result<Notification, OrderFlowError> {
        PushShape::from(self).normalize()
    }
}

impl PushShape {
    pub fn normalize(self) -> Result<Notification, OrderFlowError> {
        let (fields, data) = match self {
            PushShape::Structured { notification, data } => (notification, data),
            PushShape::DataOnly(data) => (NotificationFields::default(), data),
            PushShape::Empty => {
                return Err(OrderFlowError::NotificationDecode(
                    "payload has neither notification nor data".to_string(),
                ));
            }
        };

        let title = non_empty(fields.title).or_else(|| non_empty(data.title.clone()));
        let body = non_empty(fields.body).or_else(|| non_empty(data.body.clone()));
        if title.is_none() && body.is_none() {
            return Err(OrderFlowError::NotificationDecode(
                "payload has no title or body".to_string(),
            ));
        }

        let order_id = non_empty(data.order_id);
        let tag = order_id
            .clone()
            .or_else(|| non_empty(data.tag))
            .unwrap_or_else(|| DEFAULT_TAG.to_string());

        Ok(Notification {
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: body.unwrap_or_default(),
            tag,
            icon: non_empty(fields.icon),
            url: non_empty(data.url),
            order_id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(json: &str) -> Result<Notification, OrderFlowError> {
        PushPayload::from_slice(json.as_bytes())?.normalize()
    }

    #[test]
    fn test_both_shapes_normalize_identically() {
        let data_only = normalize(r#"{"data":{"title":"T","body":"B","order_id":"42"}}"#).unwrap();
        let structured =
            normalize(r#"{"notification":{"title":"T","body":"B"},"data":{"order_id":"42"}}"#)
                .unwrap();
        assert_eq!(data_only, structured);
        assert_eq!(data_only.tag, "42");
        assert_eq!(data_only.title, "T");
        assert_eq!(data_only.body, "B");
    }

    #[test]
    fn test_tag_fallbacks() {
        let by_tag = normalize(r#"{"data":{"title":"T","tag":"dues"}}"#).unwrap();
        assert_eq!(by_tag.tag, "dues");

        let generic = normalize(r#"{"notification":{"body":"B"}}"#).unwrap();
        assert_eq!(generic.tag, DEFAULT_TAG);
        assert_eq!(generic.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_numeric_order_id_is_accepted() {
        let n = normalize(r#"{"data":{"title":"T","order_id":42}}"#).unwrap();
        assert_eq!(n.tag, "42");
        assert_eq!(n.order_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_notification_fields_win_over_data() {
        let n = normalize(
            r#"{"notification":{"title":"N"},"data":{"title":"D","body":"data body","url":"/orders"}}"#,
        )
        .unwrap();
        assert_eq!(n.title, "N");
        assert_eq!(n.body, "data body");
        assert_eq!(n.url.as_deref(), Some("/orders"));
    }

    #[test]
    fn test_payload_without_text_is_dropped() {
        assert!(matches!(
            normalize(r#"{"data":{"order_id":"42"}}"#),
            Err(OrderFlowError::NotificationDecode(_))
        ));
        assert!(matches!(
            normalize("{}"),
            Err(OrderFlowError::NotificationDecode(_))
        ));
        assert!(matches!(
            normalize("not json"),
            Err(OrderFlowError::NotificationDecode(_))
        ));
    }

    #[test]
    fn test_extra_data_keys_are_kept() {
        let payload =
            PushPayload::from_slice(br#"{"data":{"title":"T","vendor":"7"}}"#).unwrap();
        let data = payload.data.unwrap();
        assert_eq!(data.extra.get("vendor"), Some(&Value::String("7".to_string())));
    }
}
