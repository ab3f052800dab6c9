use std::{sync::Arc, time::Duration};

use crate::{
    api::{Backend, Comment, CommentId, Error, NewComment, PostId, Session},
    CollapseState, CommentForest, CommentNode,
};

/// How often the comments of the displayed post get re-fetched
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Identifies one fetch, tickets are handed out in increasing order
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct FetchTicket(u64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Refresh {
    /// A new forest replaced the previous one
    Updated,

    /// The fetched comments gave the same forest as before
    Unchanged,

    /// A fetch issued later already completed, this result was dropped
    Stale,

    /// The fetch failed, the previous forest is kept
    Failed(Error),
}

/// The comment section of one post: last known forest, plus the local UI state
/// that must outlive rebuilds
pub struct CommentThread {
    post: PostId,
    forest: Arc<CommentForest>,
    collapsed: CollapseState,

    next_ticket: u64,
    applied: Option<FetchTicket>,
    loaded: bool,

    /// Set by the last failed fetch, cleared by the next successful one
    last_error: Option<Error>,
}

impl CommentThread {
    pub fn new(post: PostId) -> CommentThread {
        CommentThread {
            post,
            forest: Arc::new(CommentForest::default()),
            collapsed: CollapseState::default(),
            next_ticket: 0,
            applied: None,
            loaded: false,
            last_error: None,
        }
    }

    pub fn post(&self) -> PostId {
        self.post
    }

    pub fn forest(&self) -> &Arc<CommentForest> {
        &self.forest
    }

    /// Whether at least one fetch succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn is_collapsed(&self, id: CommentId) -> bool {
        self.collapsed.is_collapsed(id)
    }

    pub fn set_collapsed(&mut self, id: CommentId, collapsed: bool) {
        self.collapsed.set_collapsed(id, collapsed)
    }

    pub fn toggle_collapsed(&mut self, id: CommentId) -> bool {
        self.collapsed.toggle(id)
    }

    /// Nodes to display, with their depth: replies of collapsed comments are
    /// skipped
    pub fn visible(&self) -> impl Iterator<Item = (usize, &CommentNode)> + '_ {
        self.forest.walk_where(move |c| !self.collapsed.is_collapsed(c.id))
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    /// Applies the result of the fetch identified by `ticket`
    ///
    /// Results older than the last applied one are discarded, failures leave
    /// the current forest in place.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        res: Result<Vec<Comment>, Error>,
    ) -> Refresh {
        if self.applied.map(|a| a >= ticket).unwrap_or(false) {
            tracing::debug!(?ticket, applied = ?self.applied, "dropping stale comment fetch");
            return Refresh::Stale;
        }
        let comments = match res {
            Ok(comments) => comments,
            Err(err) => {
                tracing::warn!(post = ?self.post, %err, "failed fetching comments");
                self.last_error = Some(err.clone());
                return Refresh::Failed(err);
            }
        };
        let was_loaded = self.loaded;
        self.applied = Some(ticket);
        self.loaded = true;
        self.last_error = None;
        let forest = CommentForest::build(comments);
        if was_loaded && forest == *self.forest {
            return Refresh::Unchanged;
        }
        self.forest = Arc::new(forest);
        Refresh::Updated
    }

    pub async fn refresh<B>(&mut self, backend: &B) -> Refresh
    where
        B: Backend + ?Sized,
    {
        let ticket = self.begin_fetch();
        let res = backend.fetch_comments(self.post).await;
        self.complete_fetch(ticket, res)
    }

    /// Posts a comment, top-level if `parent` is `None`, then re-fetches
    ///
    /// The new comment is not inserted locally, it shows up with the refresh.
    pub async fn submit<B>(
        &mut self,
        backend: &B,
        session: Option<&Session>,
        parent: Option<CommentId>,
        content: String,
    ) -> Result<(), Error>
    where
        B: Backend + ?Sized,
    {
        let session = crate::require_session(session)?;
        let comment = NewComment::new(session, self.post, parent, content);
        comment.validate()?;
        if let Err(err) = backend.submit_comment(session, comment).await {
            tracing::info!(post = ?self.post, ?parent, %err, "comment submission failed");
            return Err(err);
        }
        tracing::info!(post = ?self.post, ?parent, "comment submitted");
        if let Refresh::Failed(err) = self.refresh(backend).await {
            tracing::warn!(%err, "refresh after submission failed, will catch up on next poll");
        }
        Ok(())
    }

    pub async fn submit_reply<B>(
        &mut self,
        backend: &B,
        session: Option<&Session>,
        parent: CommentId,
        content: String,
    ) -> Result<(), Error>
    where
        B: Backend + ?Sized,
    {
        self.submit(backend, session, Some(parent), content).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use forum_mock_server::MockServer;

    use super::*;
    use crate::api::{Time, UserId};

    fn init_logs() {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt::try_init();
        }
    }

    fn at(secs: i64) -> Time {
        chrono::Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn comment(id: i64, parent: Option<i64>, secs: i64) -> Comment {
        Comment {
            id: CommentId(id),
            post_id: PostId(1),
            parent_comment_id: parent.map(CommentId),
            content: format!("comment {id}"),
            user_id: UserId::stub(),
            author: String::from("stub"),
            created_at: at(secs),
        }
    }

    fn visible_ids(t: &CommentThread) -> Vec<i64> {
        t.visible().map(|(_, n)| n.comment.id.0).collect()
    }

    #[test]
    fn collapse_survives_rebuild() {
        init_logs();
        let mut t = CommentThread::new(PostId(1));
        let first = t.begin_fetch();
        let res = t.complete_fetch(
            first,
            Ok(vec![comment(1, None, 0), comment(5, Some(1), 1), comment(6, Some(5), 2)]),
        );
        assert_eq!(res, Refresh::Updated);
        assert!(!t.is_collapsed(CommentId(5)));

        t.set_collapsed(CommentId(5), true);
        assert_eq!(visible_ids(&t), vec![1, 5]);

        let second = t.begin_fetch();
        let res = t.complete_fetch(
            second,
            Ok(vec![
                comment(1, None, 0),
                comment(5, Some(1), 1),
                comment(6, Some(5), 2),
                comment(7, Some(1), 3),
            ]),
        );
        assert_eq!(res, Refresh::Updated);
        assert!(t.is_collapsed(CommentId(5)));
        assert!(!t.is_collapsed(CommentId(7)));
        assert_eq!(visible_ids(&t), vec![1, 5, 7]);

        assert!(!t.toggle_collapsed(CommentId(5)));
        assert_eq!(visible_ids(&t), vec![1, 5, 6, 7]);
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut t = CommentThread::new(PostId(1));
        let early = t.begin_fetch();
        let late = t.begin_fetch();
        assert_eq!(
            t.complete_fetch(late, Ok(vec![comment(1, None, 0), comment(2, None, 1)])),
            Refresh::Updated
        );
        assert_eq!(
            t.complete_fetch(early, Ok(vec![comment(1, None, 0)])),
            Refresh::Stale
        );
        assert_eq!(t.forest().len(), 2);
        assert_eq!(t.complete_fetch(late, Ok(Vec::new())), Refresh::Stale);
    }

    #[test]
    fn failures_keep_previous_forest() {
        let mut t = CommentThread::new(PostId(1));
        let ticket = t.begin_fetch();
        t.complete_fetch(ticket, Ok(vec![comment(1, None, 0)]));
        let before = t.forest().clone();

        let ticket = t.begin_fetch();
        let err = Error::FetchFailed(String::from("connection reset"));
        assert_eq!(
            t.complete_fetch(ticket, Err(err.clone())),
            Refresh::Failed(err.clone())
        );
        assert!(Arc::ptr_eq(&before, t.forest()));
        assert_eq!(t.last_error(), Some(&err));
        assert!(t.is_loaded());

        let ticket = t.begin_fetch();
        assert_eq!(
            t.complete_fetch(ticket, Ok(vec![comment(1, None, 0)])),
            Refresh::Unchanged
        );
        assert_eq!(t.last_error(), None);
        assert!(Arc::ptr_eq(&before, t.forest()));
    }

    #[test]
    fn failure_does_not_block_older_success() {
        let mut t = CommentThread::new(PostId(1));
        let early = t.begin_fetch();
        let late = t.begin_fetch();
        t.complete_fetch(late, Err(Error::FetchFailed(String::from("timeout"))));
        assert_eq!(
            t.complete_fetch(early, Ok(vec![comment(1, None, 0)])),
            Refresh::Updated
        );
        assert!(t.is_loaded());
    }

    #[tokio::test]
    async fn reply_requires_session() {
        init_logs();
        let server = MockServer::new();
        let post = server.test_new_post("hello", None);
        let mut t = CommentThread::new(post);
        assert_eq!(
            t.submit_reply(&server, None, CommentId(1), String::from("hi"))
                .await,
            Err(Error::NotAuthenticated)
        );
        assert_eq!(server.test_num_comments(), 0);
    }

    #[tokio::test]
    async fn empty_comment_is_not_sent() {
        let server = MockServer::new();
        let alice = server.create_user("alice");
        let post = server.test_new_post("hello", None);
        let mut t = CommentThread::new(post);
        assert_eq!(
            t.submit(&server, Some(&alice), None, String::from("   "))
                .await,
            Err(Error::EmptyField("content"))
        );
        assert_eq!(server.test_num_comments(), 0);
    }

    #[tokio::test]
    async fn submit_then_reply_rebuilds_tree() {
        init_logs();
        let server = MockServer::new();
        let alice = server.create_user("alice");
        let bob = server.create_user("bob");
        let post = server.test_new_post("hello", None);
        let mut t = CommentThread::new(post);

        assert_eq!(t.refresh(&server).await, Refresh::Updated);
        assert!(t.forest().is_empty());
        assert!(t.is_loaded());

        t.submit(&server, Some(&alice), None, String::from("first!"))
            .await
            .unwrap();
        let root = t.forest().roots().next().unwrap().comment.clone();
        assert_eq!(root.author, "alice");
        assert_eq!(root.parent_comment_id, None);

        t.submit_reply(&server, Some(&bob), root.id, String::from("second"))
            .await
            .unwrap();
        let forest = t.forest().clone();
        assert_eq!(forest.len(), 2);
        let root = forest.get(root.id).unwrap();
        let replies = forest.children(root).collect::<Vec<_>>();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].comment.content, "second");
        assert_eq!(replies[0].comment.user_id, bob.user_id);
    }

    #[tokio::test]
    async fn rejection_is_surfaced_verbatim() {
        let server = MockServer::new();
        let alice = server.create_user("alice");
        let post = server.test_new_post("hello", None);
        let mut t = CommentThread::new(post);
        server.reject_next_submission("comments are closed");
        assert_eq!(
            t.submit(&server, Some(&alice), None, String::from("hey"))
                .await,
            Err(Error::Rejected(String::from("comments are closed")))
        );
        // not retried
        assert_eq!(server.test_num_comments(), 0);
        t.submit(&server, Some(&alice), None, String::from("hey"))
            .await
            .unwrap();
        assert_eq!(t.forest().len(), 1);
    }

    #[tokio::test]
    async fn refresh_failure_is_reported() {
        let server = MockServer::new();
        let alice = server.create_user("alice");
        let post = server.test_new_post("hello", None);
        let mut t = CommentThread::new(post);
        t.submit(&server, Some(&alice), None, String::from("hey"))
            .await
            .unwrap();

        server.fail_next_fetches(1);
        match t.refresh(&server).await {
            Refresh::Failed(e) => assert!(e.is_transient()),
            r => panic!("unexpected refresh result {r:?}"),
        }
        assert_eq!(t.forest().len(), 1);
        assert_eq!(t.refresh(&server).await, Refresh::Unchanged);
    }

    #[tokio::test]
    async fn seeded_records_are_placed_after_refresh() {
        let server = MockServer::new();
        let post = server.test_new_post("hello", None);
        for c in [
            comment(3, Some(1), 30),
            comment(1, None, 10),
            comment(2, Some(99), 20),
            comment(4, Some(5), 40),
            comment(5, Some(1), 50),
        ] {
            server.insert_comment(Comment { post_id: post, ..c });
        }
        let mut t = CommentThread::new(post);
        assert_eq!(t.refresh(&server).await, Refresh::Updated);

        let forest = t.forest().clone();
        let roots = forest.roots().map(|n| n.comment.id.0).collect::<Vec<_>>();
        assert_eq!(roots, vec![1, 2, 4]);
        assert_eq!(forest.get(CommentId(4)).unwrap().parent, None);
        assert_eq!(forest.reply_count(CommentId(1)), 2);
        assert_eq!(visible_ids(&t), vec![1, 3, 5, 2, 4]);
    }

    #[tokio::test]
    async fn rejected_fetch_keeps_forest() {
        let server = MockServer::new();
        let alice = server.create_user("alice");
        let post = server.test_new_post("hello", None);
        let mut t = CommentThread::new(post);
        t.submit(&server, Some(&alice), None, String::from("hey"))
            .await
            .unwrap();
        let before = t.forest().clone();

        server.fail_next_fetches_with(1, Error::NotAuthenticated);
        match t.refresh(&server).await {
            Refresh::Failed(e) => {
                assert_eq!(e, Error::NotAuthenticated);
                assert!(!e.is_transient());
            }
            r => panic!("unexpected refresh result {r:?}"),
        }
        assert!(Arc::ptr_eq(&before, t.forest()));
        assert_eq!(t.last_error(), Some(&Error::NotAuthenticated));
        assert!(t.is_loaded());

        assert_eq!(t.refresh(&server).await, Refresh::Unchanged);
        assert_eq!(t.last_error(), None);
    }

    #[tokio::test]
    async fn failure_before_first_load() {
        let server = MockServer::new();
        let post = server.test_new_post("hello", None);
        server.insert_comment(Comment {
            post_id: post,
            ..comment(1, None, 0)
        });
        let mut t = CommentThread::new(post);

        let denied = Error::Rejected(String::from("permission denied for table comments"));
        server.fail_next_fetches_with(1, denied.clone());
        assert_eq!(t.refresh(&server).await, Refresh::Failed(denied.clone()));
        assert!(!t.is_loaded());
        assert!(t.forest().is_empty());
        assert_eq!(t.last_error(), Some(&denied));

        assert_eq!(t.refresh(&server).await, Refresh::Updated);
        assert!(t.is_loaded());
        assert_eq!(t.forest().len(), 1);
    }
}
