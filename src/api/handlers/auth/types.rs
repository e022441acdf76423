//! Request/response types for login endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginSrp1Request {
    pub username: String,
}

/// `salt` and `pub_key` are base64.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginSrp1Response {
    pub login_id: String,
    pub salt: String,
    pub pub_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginSrp2Request {
    pub login_id: String,
    pub pub_key: String,
    pub proof: String,
    #[serde(default)]
    pub allow_session_ip_change: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginSrp2Response {
    pub username: String,
    /// Server proof, base64.
    pub proof: String,
    /// Account expiry, unix seconds.
    pub expire: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub username: String,
    pub expire: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct InvalidateSessionsRequest {
    pub username: String,
}
