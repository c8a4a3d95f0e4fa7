//! Wire protocol of the remote client: tagged JSON messages, camelCase
//! field names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Echoed back verbatim; used as a connection probe.
    #[serde(rename = "echo")]
    Echo,
    #[serde(rename = "login")]
    Login {
        id: String,
        username: String,
        password: String,
    },
    #[serde(rename = "unlock-key-slot")]
    UnlockKeySlot {
        id: String,
        jwt: String,
        /// 1-based slot number as shown to the operator.
        #[serde(rename = "slotId")]
        slot_id: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Blocked,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnlockStatus {
    Success,
    NoChange,
    Failed,
}

/// One row of the per-slot option list delivered with a login: `key_name`
/// present means remove-allowed, `access_denied` means the key in the slot
/// is not yours, neither means the slot is empty and an insert is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySelectionOption {
    #[serde(rename = "slotId")]
    pub slot_id: usize,
    #[serde(rename = "slotName")]
    pub slot_name: String,
    #[serde(rename = "keyName", skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(rename = "accessDenied", skip_serializing_if = "Option::is_none")]
    pub access_denied: Option<bool>,
}

impl KeySelectionOption {
    pub fn insert_key(slot_id: usize, slot_name: &str) -> Self {
        KeySelectionOption {
            slot_id,
            slot_name: slot_name.to_string(),
            key_name: None,
            access_denied: None,
        }
    }

    pub fn remove_key(slot_id: usize, slot_name: &str, key_name: &str) -> Self {
        KeySelectionOption {
            slot_id,
            slot_name: slot_name.to_string(),
            key_name: Some(key_name.to_string()),
            access_denied: None,
        }
    }

    pub fn access_denied(slot_id: usize, slot_name: &str) -> Self {
        KeySelectionOption {
            slot_id,
            slot_name: slot_name.to_string(),
            key_name: None,
            access_denied: Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "echo")]
    Echo,
    #[serde(rename = "login")]
    Login {
        /// Absent on the unsolicited push after a card login.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        status: LoginStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        jwt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(rename = "keyData", skip_serializing_if = "Option::is_none")]
        key_data: Option<Vec<KeySelectionOption>>,
        #[serde(rename = "currentUser", skip_serializing_if = "Option::is_none")]
        current_user: Option<String>,
    },
    #[serde(rename = "unlock-key-slot")]
    UnlockKeySlot {
        id: String,
        status: UnlockStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "key-stolen")]
    KeyStolen {
        #[serde(rename = "slotName")]
        slot_name: String,
        #[serde(rename = "keyName")]
        key_name: String,
        #[serde(
            rename = "deceptiveReplacement",
            skip_serializing_if = "Option::is_none"
        )]
        deceptive_replacement: Option<String>,
    },
    #[serde(rename = "unauth-key-place-attempt")]
    UnauthKeyPlaceAttempt {
        #[serde(rename = "slotName")]
        slot_name: String,
        #[serde(rename = "keyName")]
        key_name: String,
    },
    #[serde(rename = "unknown-key-placed")]
    UnknownKeyPlaced {
        #[serde(rename = "slotName")]
        slot_name: String,
        #[serde(rename = "keyId")]
        key_id: String,
    },
    #[serde(rename = "unrecognized-user-card")]
    UnrecognizedUserCard {
        #[serde(rename = "cardId")]
        card_id: String,
    },
    #[serde(rename = "user-card-blocked")]
    UserCardBlocked {
        #[serde(rename = "blockedUser")]
        blocked_user: String,
        #[serde(rename = "currentUser")]
        current_user: String,
    },
}

impl ServerMessage {
    pub fn login_success(
        id: Option<String>,
        jwt: String,
        name: String,
        key_data: Vec<KeySelectionOption>,
    ) -> Self {
        ServerMessage::Login {
            id,
            status: LoginStatus::Success,
            jwt: Some(jwt),
            name: Some(name),
            key_data: Some(key_data),
            current_user: None,
        }
    }

    pub fn login_blocked(id: String, current_user: String) -> Self {
        ServerMessage::Login {
            id: Some(id),
            status: LoginStatus::Blocked,
            jwt: None,
            name: None,
            key_data: None,
            current_user: Some(current_user),
        }
    }

    pub fn login_failed(id: String) -> Self {
        ServerMessage::Login {
            id: Some(id),
            status: LoginStatus::Failed,
            jwt: None,
            name: None,
            key_data: None,
            current_user: None,
        }
    }

    pub fn unlock_result(id: String, status: UnlockStatus, reason: Option<String>) -> Self {
        ServerMessage::UnlockKeySlot { id, status, reason }
    }
}
