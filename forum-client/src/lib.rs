mod collapse;
pub use collapse::CollapseState;

mod comment;
pub use comment::{CommentForest, CommentNode, NodeIdx, Walk};

mod posts;
pub use posts::{create_community, create_post, load_post, toggle_like};

mod thread;
pub use thread::{CommentThread, FetchTicket, Refresh, DEFAULT_POLL_INTERVAL};

pub mod api {
    pub use forum_api::*;
}

use api::{Error, Session};

/// Mutations are only attempted on behalf of an authenticated user
pub fn require_session(session: Option<&Session>) -> Result<&Session, Error> {
    session.ok_or(Error::NotAuthenticated)
}
