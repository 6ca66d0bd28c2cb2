use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sonic_rs::Value;

/// Kind of a one-shot flash message. At most one message per kind is
/// pending at a time; queueing a second one of the same kind overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// A pending flash message, as handed back to callers on drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    #[serde(rename = "type")]
    pub kind: FlashKind,
    pub message: String,
}

/// One-shot echo of a failed form submission: the submitted values plus
/// per-field validation errors, used to repopulate the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormReplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

/// Weak reference to an externally-owned account record. The session core
/// only ever sees the id, never credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
}

/// The serialized session state, stored verbatim under `"session:" + id`.
///
/// Wire keys are camelCase and `expiry` is a unix timestamp in seconds,
/// mirroring the TTL the store enforces on the key itself. Absent optional
/// fields are omitted from the JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub signature: String,
    pub expiry: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_messages: Option<HashMap<FlashKind, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<FormReplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<HashMap<String, Value>>,
}

impl SessionRecord {
    /// A fresh record with no transient state attached.
    pub(crate) fn new(id: String, signature: String, is_bot: bool) -> Self {
        Self {
            id,
            signature,
            expiry: 0,
            is_bot,
            user: None,
            flash_messages: None,
            form_data: None,
            extras: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_keys_are_camel_case_and_sparse() {
        let record = SessionRecord::new("abc".into(), "sig".into(), true);
        let json = sonic_rs::to_string(&record).unwrap();
        assert!(json.contains(r#""isBot":true"#));
        assert!(json.contains(r#""expiry":0"#));
        assert!(!json.contains("flashMessages"));
        assert!(!json.contains("formData"));
        assert!(!json.contains("user"));
        assert!(!json.contains("extras"));
    }

    #[test]
    fn full_record_round_trips() {
        let mut record = SessionRecord::new("abc".into(), "sig".into(), false);
        record.expiry = 1_700_000_000;
        record.user = Some(UserRef { id: "u-1".into() });
        record.flash_messages = Some(HashMap::from([(
            FlashKind::Success,
            "Account created".to_string(),
        )]));
        record.form_data = Some(FormReplay {
            data: Some(HashMap::from([(
                "username".to_string(),
                sonic_rs::json!("alice"),
            )])),
            errors: Some(HashMap::from([(
                "password".to_string(),
                vec!["too short".to_string()],
            )])),
        });

        let json = sonic_rs::to_string(&record).unwrap();
        let parsed: SessionRecord = sonic_rs::from_str(&json).unwrap();

        assert_eq!(parsed.id, "abc");
        assert_eq!(parsed.expiry, 1_700_000_000);
        assert_eq!(parsed.user, Some(UserRef { id: "u-1".into() }));
        let flashes = parsed.flash_messages.unwrap();
        assert_eq!(flashes.get(&FlashKind::Success).unwrap(), "Account created");
        let form = parsed.form_data.unwrap();
        assert_eq!(form.errors.unwrap()["password"], vec!["too short"]);
    }

    #[test]
    fn missing_is_bot_defaults_to_false() {
        let parsed: SessionRecord =
            sonic_rs::from_str(r#"{"id":"abc","signature":"sig","expiry":10}"#).unwrap();
        assert!(!parsed.is_bot);
        assert!(parsed.flash_messages.is_none());
    }

    #[test]
    fn flash_kinds_serialize_lowercase() {
        let flash = Flash {
            kind: FlashKind::Error,
            message: "nope".into(),
        };
        let json = sonic_rs::to_string(&flash).unwrap();
        assert!(json.contains(r#""type":"error""#));
    }
}
