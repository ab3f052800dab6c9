use crate::{CommunityId, Error, Time};

/// Storage bucket holding post images
pub const POST_IMAGES_BUCKET: &str = "post-images";

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct PostId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub created_at: Time,
    pub image_url: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub community_id: Option<CommunityId>,
}

/// A post as listed on the home page, with its counters
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub avatar_url: Option<String>,
    pub community_id: Option<CommunityId>,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_required("title", &self.title)?;
        crate::validate_required("content", &self.content)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_required("image", &self.file_name)?;
        if self.bytes.is_empty() {
            return Err(Error::EmptyField("image"));
        }
        Ok(())
    }

    /// Path of the image inside `POST_IMAGES_BUCKET`, unique per upload instant
    pub fn storage_path(&self, title: &str, now: Time) -> String {
        format!("{}-{}-{}", title, now.timestamp_millis(), self.file_name)
    }
}
