use anyhow::{anyhow, Context};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Failed fetching from the backend: {0}")]
    FetchFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Rejected by the backend: {0}")]
    Rejected(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Field {0} must not be empty")]
    EmptyField(&'static str),
}

impl Error {
    /// Whether the failure happened while reading, and a later fetch may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::FetchFailed(_))
    }

    /// Parses an error body as returned by the REST, auth or storage endpoints
    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let message = ["message", "error_description", "msg", "error"]
            .iter()
            .find_map(|k| data.get(*k).and_then(|m| m.as_str()))
            .ok_or_else(|| anyhow!("error contents has no message"))?;
        Ok(match data.get("code").and_then(|c| c.as_str()) {
            // PostgREST reports invalid or expired JWTs with these codes
            Some("PGRST301") | Some("PGRST302") => Error::NotAuthenticated,
            _ => Error::Rejected(String::from(message)),
        })
    }

    /// Builds the error for a non-successful response
    pub fn from_response(status: u16, body: &[u8]) -> Error {
        if status == 401 {
            return Error::NotAuthenticated;
        }
        match Error::parse(body) {
            Ok(err) => err,
            Err(e) => {
                tracing::debug!(?e, status, "backend error body is not structured");
                Error::Rejected(format!(
                    "status {status}: {}",
                    String::from_utf8_lossy(body)
                ))
            }
        }
    }
}
