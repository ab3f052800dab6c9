use crate::api::{
    Backend, CommunityId, Error, ImageUpload, NewCommunity, NewPost, Post, PostId, Session,
};

/// Fetches a post along with its like count
pub async fn load_post<B>(backend: &B, id: PostId) -> Result<(Post, u64), Error>
where
    B: Backend + ?Sized,
{
    futures::try_join!(backend.fetch_post(id), backend.fetch_like_count(id))
}

pub async fn create_post<B>(
    backend: &B,
    session: Option<&Session>,
    title: String,
    content: String,
    community_id: Option<CommunityId>,
    image: ImageUpload,
) -> Result<(), Error>
where
    B: Backend + ?Sized,
{
    let session = crate::require_session(session)?;
    let post = NewPost {
        title,
        content,
        avatar_url: session.avatar_url.clone(),
        community_id,
    };
    post.validate()?;
    image.validate()?;
    backend.create_post(session, post, image).await?;
    tracing::info!(user = ?session.user_id, "created post");
    Ok(())
}

pub async fn create_community<B>(
    backend: &B,
    session: Option<&Session>,
    name: String,
    description: String,
) -> Result<(), Error>
where
    B: Backend + ?Sized,
{
    let session = crate::require_session(session)?;
    let community = NewCommunity { name, description };
    community.validate()?;
    backend.create_community(session, community).await
}

/// Returns whether the post is now liked
pub async fn toggle_like<B>(
    backend: &B,
    session: Option<&Session>,
    post: PostId,
) -> Result<bool, Error>
where
    B: Backend + ?Sized,
{
    let session = crate::require_session(session)?;
    backend.toggle_like(session, post).await
}
