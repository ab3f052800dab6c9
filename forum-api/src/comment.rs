use crate::{Error, PostId, Session, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// A comment as stored by the backend, replies point to their parent
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_comment_id: Option<CommentId>,
    pub content: String,
    pub user_id: UserId,
    pub author: String,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub post_id: PostId,
    pub content: String,
    pub parent_comment_id: Option<CommentId>,
    pub user_id: UserId,
    pub author: String,
}

impl NewComment {
    pub fn new(
        session: &Session,
        post_id: PostId,
        parent_comment_id: Option<CommentId>,
        content: String,
    ) -> NewComment {
        NewComment {
            post_id,
            content,
            parent_comment_id,
            user_id: session.user_id,
            author: session.name.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_required("content", &self.content)?;
        crate::validate_required("author", &self.author)?;
        Ok(())
    }
}
