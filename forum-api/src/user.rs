use uuid::Uuid;

use crate::STUB_UUID;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// Bearer token handed out by the authentication provider
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct AuthToken(pub String);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID.to_string())
    }
}

/// The currently authenticated identity
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Session {
    pub user_id: UserId,

    /// Display name: the provider username, or the e-mail when there is none
    pub name: String,

    pub token: AuthToken,
    pub avatar_url: Option<String>,
}

impl Session {
    pub fn stub() -> Session {
        Session {
            user_id: UserId::stub(),
            name: String::from("stub"),
            token: AuthToken::stub(),
            avatar_url: None,
        }
    }
}
