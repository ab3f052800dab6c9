use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod backend;
pub use backend::Backend;

mod comment;
pub use comment::{Comment, CommentId, NewComment};

mod community;
pub use community::{Community, CommunityId, NewCommunity};

mod error;
pub use error::Error;

mod post;
pub use post::{ImageUpload, NewPost, Post, PostId, PostSummary, POST_IMAGES_BUCKET};

mod user;
pub use user::{AuthToken, Session, UserId};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

/// Like `validate_string`, but also refuses empty (or whitespace-only) strings
pub fn validate_required(field: &'static str, s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::EmptyField(field));
    }
    Ok(())
}
