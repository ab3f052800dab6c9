use async_trait::async_trait;

use crate::{
    Comment, Community, CommunityId, Error, ImageUpload, NewComment, NewCommunity, NewPost, Post,
    PostId, PostSummary, Session,
};

/// The hosted store holding everything the forum shows
///
/// Reads are anonymous. Writes carry the session of the acting user, and the
/// store is free to refuse them with `Error::NotAuthenticated` or
/// `Error::Rejected`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Comments of a post, sorted by ascending creation date
    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error>;
    async fn submit_comment(&self, session: &Session, c: NewComment) -> Result<(), Error>;

    /// All posts with their counters, newest first
    async fn fetch_posts(&self) -> Result<Vec<PostSummary>, Error>;
    async fn fetch_post(&self, id: PostId) -> Result<Post, Error>;
    async fn create_post(
        &self,
        session: &Session,
        p: NewPost,
        image: ImageUpload,
    ) -> Result<(), Error>;

    /// All communities, newest first
    async fn fetch_communities(&self) -> Result<Vec<Community>, Error>;
    /// Posts of a community, newest first
    async fn fetch_community_posts(&self, id: CommunityId) -> Result<Vec<Post>, Error>;
    async fn create_community(&self, session: &Session, c: NewCommunity) -> Result<(), Error>;

    async fn fetch_like_count(&self, post: PostId) -> Result<u64, Error>;
    /// Returns whether the post is now liked by the session's user
    async fn toggle_like(&self, session: &Session, post: PostId) -> Result<bool, Error>;
}
