use chrono::{Duration, Utc};
use forum_api::{Comment, CommentId, PostId, UserId, Uuid};
use rand::{seq::SliceRandom, Rng};

const NUM_USERS: usize = 5;

const POST_ID: i64 = 1;
const NUM_COMMENTS: usize = 200;
const COMMENT_MAX_WORDS: usize = 30;

// out of 100
const REPLY_CHANCE: u32 = 70;
const DELETED_PARENT_CHANCE: u32 = 3;

/// Prints a flat list of comments for one post, as the backend would return
/// it, with deeply nested reply chains and a few replies to deleted comments
fn main() {
    let mut rng = rand::thread_rng();

    let users = (0..NUM_USERS)
        .map(|i| (UserId(Uuid::new_v4()), format!("user{i}")))
        .collect::<Vec<_>>();

    let mut date = Utc::now() - Duration::days(7);
    let mut comments: Vec<Comment> = Vec::with_capacity(NUM_COMMENTS);
    for i in 0..NUM_COMMENTS {
        let id = CommentId(i as i64 + 1);
        let parent_comment_id = match rng.gen_range(0..100) {
            r if r < DELETED_PARENT_CHANCE => Some(CommentId((NUM_COMMENTS + i) as i64 + 1)),
            r if r < REPLY_CHANCE && !comments.is_empty() => {
                // favor recent comments so that chains get deep
                let lo = comments.len().saturating_sub(10);
                Some(comments[rng.gen_range(lo..comments.len())].id)
            }
            _ => None,
        };
        let (user_id, author) = users
            .choose(&mut rng)
            .cloned()
            .expect("NUM_USERS is not zero");
        date = date + Duration::seconds(rng.gen_range(1..3600));
        comments.push(Comment {
            id,
            post_id: PostId(POST_ID),
            parent_comment_id,
            content: lipsum::lipsum_words(rng.gen_range(1..=COMMENT_MAX_WORDS)),
            user_id,
            author,
            created_at: date,
        });
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&comments).expect("serializing comments")
    );
}
