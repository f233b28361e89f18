use serde::{Deserialize, Serialize};

/// Public user shape visible to everyone in a room. This is the only user
/// data the gateway ever puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

impl RoomParticipant {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let user = RoomParticipant {
            id: 7,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            avatar_url: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["lastName"], "Lovelace");
        assert!(json["avatarUrl"].is_null());
    }

    #[test]
    fn display_name_joins_first_and_last() {
        let user = RoomParticipant {
            id: 1,
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            avatar_url: Some("https://example.com/a.png".to_string()),
        };
        assert_eq!(user.display_name(), "Grace Hopper");
    }
}
