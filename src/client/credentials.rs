//! # Session Credentials
//!
//! Per-board display name and facilitator token, kept in memory for the
//! lifetime of the process only. Nothing is written to disk: restarting
//! the client forgets every board, like closing a browser tab.

use std::collections::HashMap;

use crate::client::manager::JoinParams;

/// What we remember about one board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardCredentials {
    pub participant_name: String,
    /// Present only on the device that created the board
    pub facilitator_token: Option<String>,
}

/// In-memory credential map keyed by board id.
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    boards: HashMap<String, BoardCredentials>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the name chosen for `board_id`. The name is trimmed; a
    /// previously remembered facilitator token is kept.
    pub fn remember_name(&mut self, board_id: &str, participant_name: &str) {
        self.boards.entry(board_id.to_string()).or_default().participant_name =
            participant_name.trim().to_string();
    }

    /// Store the facilitator token returned when `board_id` was created.
    pub fn remember_token(&mut self, board_id: &str, facilitator_token: &str) {
        self.boards.entry(board_id.to_string()).or_default().facilitator_token =
            Some(facilitator_token.to_string());
    }

    pub fn get(&self, board_id: &str) -> Option<&BoardCredentials> {
        self.boards.get(board_id)
    }

    pub fn forget(&mut self, board_id: &str) -> Option<BoardCredentials> {
        self.boards.remove(board_id)
    }

    /// Whether the user must be asked for a name before joining.
    ///
    /// Anonymous boards never prompt.
    pub fn needs_name(&self, board_id: &str, is_anonymous: bool) -> bool {
        if is_anonymous {
            return false;
        }
        self.get(board_id)
            .map(|c| c.participant_name.is_empty())
            .unwrap_or(true)
    }

    /// Build the `Join` parameters for `board_id`.
    ///
    /// # Returns
    /// `None` when a name is still required (see [`needs_name`](Self::needs_name)).
    pub fn join_params(&self, board_id: &str, is_anonymous: bool) -> Option<JoinParams> {
        if self.needs_name(board_id, is_anonymous) {
            return None;
        }
        let creds = self.get(board_id).cloned().unwrap_or_default();
        Some(JoinParams {
            board_id: board_id.to_string(),
            participant_name: creds.participant_name,
            facilitator_token: creds.facilitator_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_keyed_by_board() {
        let mut creds = SessionCredentials::new();
        creds.remember_name("b1", "  Alex ");
        creds.remember_token("b1", "tok");
        creds.remember_name("b2", "Sam");

        let b1 = creds.get("b1").unwrap();
        assert_eq!(b1.participant_name, "Alex");
        assert_eq!(b1.facilitator_token.as_deref(), Some("tok"));
        assert_eq!(creds.get("b2").unwrap().facilitator_token, None);

        creds.forget("b1");
        assert!(creds.get("b1").is_none());
    }

    #[test]
    fn name_prompt_only_for_named_boards() {
        let mut creds = SessionCredentials::new();
        assert!(creds.needs_name("b1", false));
        assert!(creds.join_params("b1", false).is_none());

        let anon = creds.join_params("b1", true).unwrap();
        assert_eq!(anon.participant_name, "");

        creds.remember_name("b1", "Alex");
        let params = creds.join_params("b1", false).unwrap();
        assert_eq!(params.participant_name, "Alex");
        assert_eq!(params.facilitator_token, None);
    }
}
