use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use forum_api::{
    AuthToken, Backend, Comment, CommentId, Community, CommunityId, Error, ImageUpload,
    NewComment, NewCommunity, NewPost, Post, PostId, PostSummary, Session, Time, UserId, Uuid,
    POST_IMAGES_BUCKET,
};
use parking_lot::Mutex;

/// In-memory stand-in for the hosted backend
pub struct MockServer(Mutex<State>);

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    last_time: Option<Time>,

    sessions: HashMap<AuthToken, UserId>,
    comments: Vec<Comment>,
    posts: Vec<Post>,
    communities: Vec<Community>,
    likes: BTreeSet<(PostId, UserId)>,
    images: HashMap<String, Vec<u8>>,

    failing_fetches: usize,
    fetch_error: Option<Error>,
    rejection: Option<String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    /// Strictly increasing, so that rows never share a creation date
    fn now(&mut self) -> Time {
        let mut now = Utc::now();
        if let Some(last) = self.last_time {
            if now <= last {
                now = last + chrono::Duration::milliseconds(1);
            }
        }
        self.last_time = Some(now);
        now
    }

    fn fetch(&mut self) -> Result<(), Error> {
        if self.failing_fetches > 0 {
            self.failing_fetches -= 1;
            return Err(self
                .fetch_error
                .clone()
                .unwrap_or_else(|| Error::FetchFailed(String::from("injected fetch failure"))));
        }
        Ok(())
    }

    fn write(&mut self, session: &Session) -> Result<(), Error> {
        match self.sessions.get(&session.token) {
            Some(user) if *user == session.user_id => (),
            _ => return Err(Error::NotAuthenticated),
        }
        match self.rejection.take() {
            Some(msg) => Err(Error::Rejected(msg)),
            None => Ok(()),
        }
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(Mutex::new(State::default()))
    }

    /// Registers a user and returns a valid session for them
    pub fn create_user(&self, name: &str) -> Session {
        let session = Session {
            user_id: UserId(Uuid::new_v4()),
            name: String::from(name),
            token: AuthToken(Uuid::new_v4().to_string()),
            avatar_url: None,
        };
        self.0
            .lock()
            .sessions
            .insert(session.token.clone(), session.user_id);
        session
    }

    /// Stores a comment as-is, without any check
    pub fn insert_comment(&self, c: Comment) {
        self.0.lock().comments.push(c);
    }

    /// Makes the next `n` fetches fail
    pub fn fail_next_fetches(&self, n: usize) {
        let mut s = self.0.lock();
        s.failing_fetches = n;
        s.fetch_error = None;
    }

    /// Makes the next `n` fetches fail with `err`
    pub fn fail_next_fetches_with(&self, n: usize, err: Error) {
        let mut s = self.0.lock();
        s.failing_fetches = n;
        s.fetch_error = Some(err);
    }

    /// Makes the next write fail with `Error::Rejected(msg)`
    pub fn reject_next_submission(&self, msg: &str) {
        self.0.lock().rejection = Some(String::from(msg));
    }

    pub fn test_new_post(&self, title: &str, community_id: Option<CommunityId>) -> PostId {
        let mut s = self.0.lock();
        let id = PostId(s.next_id());
        let created_at = s.now();
        s.posts.push(Post {
            id,
            title: String::from(title),
            content: String::new(),
            created_at,
            image_url: String::new(),
            avatar_url: None,
            community_id,
        });
        id
    }

    pub fn test_num_comments(&self) -> usize {
        self.0.lock().comments.len()
    }

    pub fn test_image(&self, path: &str) -> Option<Vec<u8>> {
        self.0.lock().images.get(path).cloned()
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

#[async_trait]
impl Backend for MockServer {
    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        let mut s = self.0.lock();
        s.fetch()?;
        let mut res = s
            .comments
            .iter()
            .filter(|c| c.post_id == post)
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by_key(|c| c.created_at);
        Ok(res)
    }

    async fn submit_comment(&self, session: &Session, c: NewComment) -> Result<(), Error> {
        let mut s = self.0.lock();
        s.write(session)?;
        c.validate()?;
        if c.user_id != session.user_id {
            return Err(Error::Rejected(String::from(
                "new row violates row-level security policy for table \"comments\"",
            )));
        }
        let id = CommentId(s.next_id());
        let created_at = s.now();
        tracing::debug!(?id, post = ?c.post_id, "mock server stored comment");
        s.comments.push(Comment {
            id,
            post_id: c.post_id,
            parent_comment_id: c.parent_comment_id,
            content: c.content,
            user_id: c.user_id,
            author: c.author,
            created_at,
        });
        Ok(())
    }

    async fn fetch_posts(&self) -> Result<Vec<PostSummary>, Error> {
        let mut s = self.0.lock();
        s.fetch()?;
        let mut res = s
            .posts
            .iter()
            .map(|p| PostSummary {
                post: p.clone(),
                like_count: s.likes.iter().filter(|(post, _)| *post == p.id).count() as u64,
                comment_count: s.comments.iter().filter(|c| c.post_id == p.id).count() as u64,
            })
            .collect::<Vec<_>>();
        res.sort_by_key(|p| std::cmp::Reverse(p.post.created_at));
        Ok(res)
    }

    async fn fetch_post(&self, id: PostId) -> Result<Post, Error> {
        let mut s = self.0.lock();
        s.fetch()?;
        s.posts.iter().find(|p| p.id == id).cloned().ok_or_else(|| {
            Error::Rejected(String::from(
                "JSON object requested, multiple (or no) rows returned",
            ))
        })
    }

    async fn create_post(
        &self,
        session: &Session,
        p: NewPost,
        image: ImageUpload,
    ) -> Result<(), Error> {
        let mut s = self.0.lock();
        s.write(session)?;
        p.validate()?;
        image.validate()?;
        let created_at = s.now();
        let path = image.storage_path(&p.title, created_at);
        if s.images.contains_key(&path) {
            return Err(Error::Rejected(String::from("The resource already exists")));
        }
        s.images.insert(path.clone(), image.bytes);
        let id = PostId(s.next_id());
        s.posts.push(Post {
            id,
            title: p.title,
            content: p.content,
            created_at,
            image_url: format!("mock://{POST_IMAGES_BUCKET}/{path}"),
            avatar_url: p.avatar_url,
            community_id: p.community_id,
        });
        Ok(())
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>, Error> {
        let mut s = self.0.lock();
        s.fetch()?;
        let mut res = s.communities.clone();
        res.sort_by_key(|c| std::cmp::Reverse(c.created_at));
        Ok(res)
    }

    async fn fetch_community_posts(&self, id: CommunityId) -> Result<Vec<Post>, Error> {
        let mut s = self.0.lock();
        s.fetch()?;
        let mut res = s
            .posts
            .iter()
            .filter(|p| p.community_id == Some(id))
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(res)
    }

    async fn create_community(&self, session: &Session, c: NewCommunity) -> Result<(), Error> {
        let mut s = self.0.lock();
        s.write(session)?;
        c.validate()?;
        let id = CommunityId(s.next_id());
        let created_at = s.now();
        s.communities.push(Community {
            id,
            name: c.name,
            description: c.description,
            created_at,
        });
        Ok(())
    }

    async fn fetch_like_count(&self, post: PostId) -> Result<u64, Error> {
        let mut s = self.0.lock();
        s.fetch()?;
        Ok(s.likes.iter().filter(|(p, _)| *p == post).count() as u64)
    }

    async fn toggle_like(&self, session: &Session, post: PostId) -> Result<bool, Error> {
        let mut s = self.0.lock();
        s.write(session)?;
        let key = (post, session.user_id);
        match s.likes.remove(&key) {
            true => Ok(false),
            false => {
                s.likes.insert(key);
                Ok(true)
            }
        }
    }
}
