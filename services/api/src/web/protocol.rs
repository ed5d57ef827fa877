//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket messages the server pushes to the browser while it
//! watches the signed-in user's account.
//!
//! The stream is one-way: the client only opens and closes the connection.

use serde::Serialize;

use crate::web::rest::AccountView;

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The latest account snapshot. The first one is sent right after the
    /// connection opens; later ones follow every change.
    AccountUpdated { account: AccountView },

    /// The session was ended by a logout. The server closes the connection
    /// after sending this.
    SignedOut,

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },
}
