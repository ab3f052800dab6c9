use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use forum_client::{
    api::{
        AuthToken, Backend, CommentId, CommunityId, Error, ImageUpload, PostId, Session, UserId,
        Uuid,
    },
    CommentThread, FetchTicket, Refresh, DEFAULT_POLL_INTERVAL,
};

mod api;
use api::RestBackend;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Base url of the hosted backend
    #[structopt(long, env = "FORUM_URL")]
    url: String,

    /// Public (anonymous) api key of the hosted backend
    #[structopt(long, env = "FORUM_API_KEY", hide_env_values = true)]
    api_key: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List all posts, newest first
    Posts,

    /// Show a post with its likes and comments
    Post { id: i64 },

    /// Show the comments of a post
    Comments {
        post: i64,

        /// Hide the replies of these comments
        #[structopt(long)]
        collapse: Vec<i64>,
    },

    /// Keep showing the comments of a post as they change
    Watch {
        post: i64,

        /// Seconds between two fetches [default: 5]
        #[structopt(long)]
        interval: Option<u64>,

        /// Hide the replies of these comments
        #[structopt(long)]
        collapse: Vec<i64>,
    },

    /// Comment on a post
    Comment {
        post: i64,
        text: String,

        /// Comment to reply to
        #[structopt(long)]
        reply_to: Option<i64>,
    },

    /// Like a post, or remove the like if it is already there
    Like { post: i64 },

    /// List all communities
    Communities,

    /// List the posts of a community
    Community { id: i64 },

    /// Create a community
    CreateCommunity {
        name: String,

        #[structopt(long, default_value = "")]
        description: String,
    },

    /// Create a post with an image
    CreatePost {
        title: String,
        content: String,
        image: PathBuf,

        #[structopt(long)]
        community: Option<i64>,
    },
}

/// Session of the acting user, if the access token is set in the environment
fn session() -> anyhow::Result<Option<Session>> {
    let token = match std::env::var("FORUM_ACCESS_TOKEN") {
        Ok(token) => AuthToken(token),
        Err(_) => return Ok(None),
    };
    let user_id =
        std::env::var("FORUM_USER_ID").context("retrieving FORUM_USER_ID environment variable")?;
    let user_id = Uuid::try_parse(&user_id).context("parsing FORUM_USER_ID as a uuid")?;
    let name = std::env::var("FORUM_USER_NAME")
        .or_else(|_| std::env::var("FORUM_USER_EMAIL"))
        .context("retrieving FORUM_USER_NAME or FORUM_USER_EMAIL environment variable")?;
    Ok(Some(Session {
        user_id: UserId(user_id),
        name,
        token,
        avatar_url: std::env::var("FORUM_AVATAR_URL").ok(),
    }))
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Why nothing can be shown, if the thread never loaded
fn load_failure(thread: &CommentThread) -> Option<&Error> {
    if thread.is_loaded() {
        None
    } else {
        thread.last_error()
    }
}

fn print_thread(thread: &CommentThread) {
    let forest = thread.forest();
    if forest.is_empty() {
        println!("No comments yet.");
        return;
    }
    for (depth, node) in thread.visible() {
        let c = &node.comment;
        let indent = "    ".repeat(depth);
        println!(
            "{indent}[{}] {} ({}):",
            c.id.0,
            c.author,
            c.created_at.format("%Y-%m-%d %H:%M")
        );
        for line in c.content.lines() {
            println!("{indent}  {line}");
        }
        if thread.is_collapsed(c.id) && !node.children().is_empty() {
            println!("{indent}  ({} replies hidden)", forest.reply_count(c.id));
        }
    }
}

async fn load_thread<B: Backend>(
    backend: &B,
    post: PostId,
    collapse: &[i64],
) -> anyhow::Result<CommentThread> {
    let mut thread = CommentThread::new(post);
    for id in collapse {
        thread.set_collapsed(CommentId(*id), true);
    }
    if let Refresh::Failed(e) = thread.refresh(backend).await {
        return Err(e).context("fetching comments");
    }
    Ok(thread)
}

/// Lets at most one fetch run at a time
#[derive(Debug, Default)]
struct Poll {
    in_flight: Option<FetchTicket>,
}

impl Poll {
    /// Ticket for a new fetch, or `None` while the previous one is running
    fn start(&mut self, thread: &mut CommentThread) -> Option<FetchTicket> {
        if let Some(ticket) = self.in_flight {
            tracing::debug!(?ticket, "previous fetch still running, skipping tick");
            return None;
        }
        let ticket = thread.begin_fetch();
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    fn finish(&mut self, ticket: FetchTicket) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
    }
}

async fn watch(
    backend: RestBackend,
    post: PostId,
    interval: Duration,
    collapse: &[i64],
) -> anyhow::Result<()> {
    let backend = Arc::new(backend);
    let mut thread = CommentThread::new(post);
    for id in collapse {
        thread.set_collapsed(CommentId(*id), true);
    }

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut poll = Poll::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopped watching comments");
                return Ok(());
            }
            _ = ticker.tick() => {
                let ticket = match poll.start(&mut thread) {
                    Some(ticket) => ticket,
                    None => continue,
                };
                let backend = backend.clone();
                let sender = sender.clone();
                tokio::spawn(async move {
                    let res = backend.fetch_comments(post).await;
                    // the receiver only goes away on shutdown
                    let _ = sender.send((ticket, res));
                });
            }
            Some((ticket, res)) = receiver.recv() => {
                poll.finish(ticket);
                match thread.complete_fetch(ticket, res) {
                    Refresh::Updated => {
                        println!("--- {}", chrono::Local::now().format("%H:%M:%S"));
                        print_thread(&thread);
                    }
                    Refresh::Failed(e) => eprintln!("Failed refreshing comments, retrying: {e}"),
                    Refresh::Unchanged | Refresh::Stale => (),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let backend = RestBackend::new(&opt.url, opt.api_key)
        .with_context(|| format!("configuring backend at {:?}", opt.url))?;
    let session = session()?;

    match opt.cmd {
        Command::Posts => {
            for s in backend.fetch_posts().await.context("fetching posts")? {
                println!(
                    "[{}] {} ({} likes, {} comments)",
                    s.post.id.0, s.post.title, s.like_count, s.comment_count
                );
            }
        }
        Command::Post { id } => {
            let (post, likes) = forum_client::load_post(&backend, PostId(id))
                .await
                .context("fetching post")?;
            println!("{}", post.title);
            println!("{}", post.image_url);
            println!("{}", post.content);
            println!(
                "Posted on {}, {} likes",
                post.created_at.format("%Y-%m-%d"),
                likes
            );
            println!();
            print_thread(&load_thread(&backend, post.id, &[]).await?);
        }
        Command::Comments { post, collapse } => {
            print_thread(&load_thread(&backend, PostId(post), &collapse).await?);
        }
        Command::Watch {
            post,
            interval,
            collapse,
        } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL);
            watch(backend, PostId(post), interval, &collapse).await?;
        }
        Command::Comment {
            post,
            text,
            reply_to,
        } => {
            let mut thread = CommentThread::new(PostId(post));
            thread
                .submit(&backend, session.as_ref(), reply_to.map(CommentId), text)
                .await
                .context("submitting comment")?;
            match load_failure(&thread) {
                Some(e) => println!("Comment submitted, but reloading the comments failed: {e}"),
                None => print_thread(&thread),
            }
        }
        Command::Like { post } => {
            let liked = forum_client::toggle_like(&backend, session.as_ref(), PostId(post))
                .await
                .context("toggling like")?;
            println!("{}", if liked { "Liked" } else { "Like removed" });
        }
        Command::Communities => {
            for c in backend
                .fetch_communities()
                .await
                .context("fetching communities")?
            {
                println!("[{}] {}: {}", c.id.0, c.name, c.description);
            }
        }
        Command::Community { id } => {
            let posts = backend
                .fetch_community_posts(CommunityId(id))
                .await
                .context("fetching community posts")?;
            if posts.is_empty() {
                println!("No posts in this community yet.");
            }
            for p in posts {
                println!("[{}] {}", p.id.0, p.title);
            }
        }
        Command::CreateCommunity { name, description } => {
            forum_client::create_community(&backend, session.as_ref(), name, description)
                .await
                .context("creating community")?;
        }
        Command::CreatePost {
            title,
            content,
            image,
            community,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading image {image:?}"))?;
            let file_name = image
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
                .with_context(|| format!("image path {image:?} has no utf-8 file name"))?;
            let upload = ImageUpload {
                file_name,
                content_type: String::from(content_type_for(&image)),
                bytes,
            };
            forum_client::create_post(
                &backend,
                session.as_ref(),
                title,
                content,
                community.map(CommunityId),
                upload,
            )
            .await
            .context("creating post")?;
        }
    }

    Ok(())
}
