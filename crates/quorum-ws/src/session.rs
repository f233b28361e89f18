/// Per-connection state: `Connected(no room)` → `JoinedRoom` → back on
/// leave, with disconnect terminal. A connection is bound to at most one
/// room at a time; a join while bound supersedes the prior binding.
pub struct Session {
    pub connection_id: String,
    pub user_id: Option<i64>,
    pub room_code: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            room_code: None,
        }
    }

    pub fn bind(&mut self, room_code: &str, user_id: i64) {
        self.room_code = Some(room_code.to_string());
        self.user_id = Some(user_id);
    }

    pub fn unbind(&mut self) {
        self.room_code = None;
        self.user_id = None;
    }

    /// Room-scoped events are delivered only to connections bound to that
    /// room.
    pub fn should_receive_event(&self, room_code: &str) -> bool {
        self.room_code.as_deref() == Some(room_code)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
