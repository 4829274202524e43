use serde::{Deserialize, Serialize};

use crate::language::{Doctor, Language};

// -- Agent API (chat) ------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub language: Language,
    pub doctor: Doctor,
}

/// Body of the end-of-consultation summary request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRequest {
    pub language: Language,
    pub doctor: Doctor,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub message: Option<String>,
}

// -- Data API (auth) -------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditUsernamePasswordRequest {
    pub username: String,
    pub new_username: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditPersonalProfileRequest {
    pub username: String,
    /// `true` = male, `false` = female.
    pub gender: bool,
    /// `YYYY-MM-DD`.
    pub birth_date: String,
}

/// User as the backend spells it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendUser {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub can_modify: bool,
    #[serde(default)]
    pub gender: Option<bool>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<BackendUser>,
    #[serde(default)]
    pub token: Option<String>,
}

// -- Data API (history) ----------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ListDialoguesRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueSummary {
    pub dialogue_id: i64,
    #[serde(default)]
    pub dialogue_name: Option<String>,
    pub total_lines: u32,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub edit_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDialoguesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub dialogues: Vec<DialogueSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_wire_names() {
        let req = ChatRequest {
            message: "胸口疼".to_string(),
            language: Language::Zh,
            doctor: Doctor::DeepSeekR1,
        };
        let v: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(v["message"], "胸口疼");
        assert_eq!(v["language"], "zh");
        assert_eq!(v["doctor"], "DeepSeek-R1");
    }

    #[test]
    fn reset_response_message_optional() {
        let r: ResetResponse = serde_json::from_str("{}").unwrap();
        assert!(r.message.is_none());
        let r: ResetResponse = serde_json::from_str(r#"{"message":"memory cleared"}"#).unwrap();
        assert_eq!(r.message.as_deref(), Some("memory cleared"));
    }

    #[test]
    fn auth_response_success() {
        let json = r#"{"success":true,"message":"ok","user":{"user_id":7,"username":"li_wei","can_modify":true},"token":"abc"}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        let user = resp.user.unwrap();
        assert_eq!(user.user_id, 7);
        assert!(user.can_modify);
        assert!(user.gender.is_none());
        assert_eq!(resp.token.as_deref(), Some("abc"));
    }

    #[test]
    fn auth_response_failure_has_no_user() {
        let resp: AuthResponse =
            serde_json::from_str(r#"{"success":false,"message":"bad password"}"#).unwrap();
        assert!(!resp.success);
        assert!(resp.user.is_none());
        assert!(resp.token.is_none());
    }

    #[test]
    fn list_dialogues_defaults_to_empty() {
        let resp: ListDialoguesResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(resp.dialogues.is_empty());
    }
}
