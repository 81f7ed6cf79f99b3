//! Validated views of marketplace API payloads.

use serde::{Deserialize, Serialize};

/// Status of a buyer question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Unanswered,
    Answered,
    Closed,
    Deleted,
    Banned,
    /// Any status this client does not recognize.
    #[serde(other)]
    Unknown,
}

/// The buyer who asked a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAuthor {
    pub id: i64,
}

/// A buyer question on a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub status: QuestionStatus,
    pub item_id: String,
    pub seller_id: i64,
    #[serde(default)]
    pub from: Option<QuestionAuthor>,
    #[serde(default)]
    pub date_created: Option<String>,
}

/// A marketplace listing, reduced to the fields the answer pipeline needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub available_quantity: Option<i64>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// The seller account behind a linked credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerProfile {
    pub id: i64,
    pub nickname: String,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_parses_full_payload() {
        let json = serde_json::json!({
            "id": 5036111111i64,
            "text": "Does it come with a charger?",
            "status": "UNANSWERED",
            "item_id": "MLA850000000",
            "seller_id": 123456789,
            "from": {"id": 987654321},
            "date_created": "2026-08-01T10:15:30.000-04:00",
            "hold": false
        });
        let question: Question = serde_json::from_value(json).unwrap();
        assert_eq!(question.id, 5036111111);
        assert_eq!(question.status, QuestionStatus::Unanswered);
        assert_eq!(question.from.unwrap().id, 987654321);
    }

    #[test]
    fn test_question_rejects_missing_required_fields() {
        let json = serde_json::json!({"id": 1, "text": "hi"});
        assert!(serde_json::from_value::<Question>(json).is_err());
    }

    #[test]
    fn test_unrecognized_status_maps_to_unknown() {
        let json = serde_json::json!({
            "id": 1,
            "text": "q",
            "status": "UNDER_REVIEW",
            "item_id": "MLA1",
            "seller_id": 2
        });
        let question: Question = serde_json::from_value(json).unwrap();
        assert_eq!(question.status, QuestionStatus::Unknown);
    }

    #[test]
    fn test_item_tolerates_absent_optionals() {
        let json = serde_json::json!({"id": "MLA1", "title": "Cable USB-C"});
        let item: Item = serde_json::from_value(json).unwrap();
        assert!(item.price.is_none());
        assert!(item.available_quantity.is_none());
    }

    #[test]
    fn test_seller_profile_parses() {
        let json = serde_json::json!({
            "id": 123456789,
            "nickname": "TECNO.STORE",
            "site_id": "MLA",
            "permalink": "http://perfil.example.com/TECNO.STORE"
        });
        let profile: SellerProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.nickname, "TECNO.STORE");
        assert_eq!(profile.site_id.as_deref(), Some("MLA"));
    }
}
