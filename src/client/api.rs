//! Board HTTP API client
//!
//! Creating a board and looking one up happen over plain HTTP before the
//! board channel is opened.

use log::{debug, info};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::common::error::{Result, SyncError};
use crate::common::messages::Board;

#[derive(Debug, Clone, Serialize)]
struct CreateBoardRequest<'a> {
    title: &'a str,
    columns: &'a [String],
}

/// Response of `POST /api/boards`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedBoard {
    pub board: Board,
    /// Possession token granting facilitator rights on this board
    pub facilitator_token: String,
}

/// Client for the board REST endpoints.
#[derive(Debug, Clone)]
pub struct BoardApi {
    base_url: String,
    client: Client,
}

impl BoardApi {
    /// # Arguments
    /// - `base_url`: HTTP(S) base URL of the board server
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a board with the given column names.
    pub async fn create_board(&self, title: &str, columns: &[String]) -> Result<CreatedBoard> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::InvalidCommand("board title is required".to_string()));
        }
        if columns.is_empty() {
            return Err(SyncError::InvalidCommand(
                "at least one column is required".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.url("/api/boards"))
            .json(&CreateBoardRequest { title, columns })
            .send()
            .await?;
        let created: CreatedBoard = check(response).await?.json().await?;
        info!("🆕 Created board '{}' ({})", created.board.title, created.board.id);
        Ok(created)
    }

    /// Fetch the current state of a board, e.g. to learn whether it is
    /// anonymous before asking for a name.
    pub async fn get_board(&self, board_id: &str) -> Result<Board> {
        debug!("Looking up board '{}'", board_id);
        let response = self
            .client
            .get(self.url(&format!("/api/boards/{}", board_id)))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    Err(SyncError::Api {
        status: status.as_u16(),
        message,
    })
}
