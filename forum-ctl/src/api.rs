use std::time::Duration;

use async_trait::async_trait;
use forum_client::api::{
    Backend, Comment, Community, CommunityId, Error, ImageUpload, NewComment, NewCommunity,
    NewPost, Post, PostId, PostSummary, Session, POST_IMAGES_BUCKET,
};
use reqwest::{header, Method, Response, Url};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

const MAX_RETRIES: u32 = 3;

/// Applies to each attempt separately
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static::lazy_static! {
    /// Only for idempotent requests
    static ref READ_CLIENT: ClientWithMiddleware = {
        let policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(policy))
            .build()
    };

    /// Writes are sent once: the backend may have stored the row before failing
    static ref WRITE_CLIENT: ClientWithMiddleware =
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
}

/// Talks to the hosted backend through its REST and storage endpoints
#[derive(Clone, Debug)]
pub struct RestBackend {
    url: Url,
    api_key: String,
}

#[derive(serde::Serialize)]
struct PostRow<'a> {
    #[serde(flatten)]
    post: &'a NewPost,
    image_url: &'a str,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct LikeRow {
    post_id: PostId,
    user_id: forum_client::api::UserId,
}

/// Total row count out of a `Content-Range` header, like `0-24/3573` or `*/0`
fn parse_total(range: &str) -> Option<u64> {
    range.split_once('/')?.1.parse().ok()
}

async fn fetched(res: Result<Response, reqwest_middleware::Error>) -> Result<Response, Error> {
    let resp = res.map_err(|e| Error::FetchFailed(e.to_string()))?;
    let status = resp.status();
    if status.is_server_error() {
        return Err(Error::FetchFailed(format!("server answered {status}")));
    }
    if !status.is_success() {
        let body = resp.bytes().await.unwrap_or_default();
        return Err(Error::from_response(status.as_u16(), &body));
    }
    Ok(resp)
}

impl RestBackend {
    pub fn new(url: &str, api_key: String) -> anyhow::Result<RestBackend> {
        let url = Url::parse(url)?;
        if url.cannot_be_a_base() {
            anyhow::bail!("backend url {url} cannot be used as a base url");
        }
        Ok(RestBackend { url, api_key })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .expect("checked in RestBackend::new")
            .pop_if_empty()
            .extend(segments);
        url
    }

    fn table(&self, table: &str, query: &[(&str, String)]) -> Url {
        let mut url = self.endpoint(&["rest", "v1", table]);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    fn request(
        &self,
        client: &ClientWithMiddleware,
        method: Method,
        url: Url,
        session: Option<&Session>,
    ) -> RequestBuilder {
        let token = session
            .map(|s| s.token.0.as_str())
            .unwrap_or(self.api_key.as_str());
        client
            .request(method, url)
            .timeout(REQUEST_TIMEOUT)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    fn reading(&self, method: Method, url: Url, session: Option<&Session>) -> RequestBuilder {
        self.request(&READ_CLIENT, method, url, session)
    }

    fn writing(&self, method: Method, url: Url, session: &Session) -> RequestBuilder {
        self.request(&WRITE_CLIENT, method, url, Some(session))
    }

    async fn read<R>(&self, req: RequestBuilder) -> Result<R, Error>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        fetched(req.send().await)
            .await?
            .json()
            .await
            .map_err(|e| Error::FetchFailed(format!("parsing backend answer: {e}")))
    }

    /// Number of rows matching `url`, without downloading them
    async fn count(&self, url: Url) -> Result<u64, Error> {
        let req = self
            .reading(Method::HEAD, url, None)
            .header("Prefer", "count=exact");
        let resp = fetched(req.send().await).await?;
        let range = resp
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|r| r.to_str().ok())
            .ok_or_else(|| Error::FetchFailed(String::from("backend sent no row count")))?;
        parse_total(range)
            .ok_or_else(|| Error::FetchFailed(format!("unexpected content range {range:?}")))
    }

    async fn write(&self, req: RequestBuilder) -> Result<(), Error> {
        let resp = req
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|e| Error::Unknown(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.bytes().await.unwrap_or_default();
            return Err(Error::from_response(status, &body));
        }
        Ok(())
    }

    async fn insert<T>(&self, session: &Session, table: &str, row: &T) -> Result<(), Error>
    where
        T: serde::Serialize,
    {
        let body = serde_json::to_vec(row).map_err(|e| Error::Unknown(e.to_string()))?;
        let req = self
            .writing(Method::POST, self.table(table, &[]), session)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        self.write(req).await
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        let url = self.table(
            "comments",
            &[
                ("select", String::from("*")),
                ("post_id", format!("eq.{}", post.0)),
                ("order", String::from("created_at.asc")),
            ],
        );
        self.read(self.reading(Method::GET, url, None)).await
    }

    async fn submit_comment(&self, session: &Session, c: NewComment) -> Result<(), Error> {
        self.insert(session, "comments", &c).await
    }

    async fn fetch_posts(&self) -> Result<Vec<PostSummary>, Error> {
        let url = self.endpoint(&["rest", "v1", "rpc", "get_posts"]);
        let req = self
            .reading(Method::POST, url, None)
            .header(header::CONTENT_TYPE, "application/json")
            .body("{}");
        self.read(req).await
    }

    async fn fetch_post(&self, id: PostId) -> Result<Post, Error> {
        let url = self.table(
            "posts",
            &[("select", String::from("*")), ("id", format!("eq.{}", id.0))],
        );
        let req = self
            .reading(Method::GET, url, None)
            .header(header::ACCEPT, "application/vnd.pgrst.object+json");
        self.read(req).await
    }

    async fn create_post(
        &self,
        session: &Session,
        p: NewPost,
        image: ImageUpload,
    ) -> Result<(), Error> {
        let path = image.storage_path(&p.title, chrono::Utc::now());
        let upload = self.endpoint(&["storage", "v1", "object", POST_IMAGES_BUCKET, &path]);
        let req = self
            .writing(Method::POST, upload, session)
            .header(header::CONTENT_TYPE, image.content_type)
            .body(image.bytes);
        self.write(req).await?;
        tracing::debug!(%path, "uploaded post image");

        let public = self.endpoint(&[
            "storage",
            "v1",
            "object",
            "public",
            POST_IMAGES_BUCKET,
            &path,
        ]);
        let row = PostRow {
            post: &p,
            image_url: public.as_str(),
        };
        self.insert(session, "posts", &row).await
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>, Error> {
        let url = self.table(
            "communities",
            &[
                ("select", String::from("*")),
                ("order", String::from("created_at.desc")),
            ],
        );
        self.read(self.reading(Method::GET, url, None)).await
    }

    async fn fetch_community_posts(&self, id: CommunityId) -> Result<Vec<Post>, Error> {
        let url = self.table(
            "posts",
            &[
                ("select", String::from("*")),
                ("community_id", format!("eq.{}", id.0)),
                ("order", String::from("created_at.desc")),
            ],
        );
        self.read(self.reading(Method::GET, url, None)).await
    }

    async fn create_community(&self, session: &Session, c: NewCommunity) -> Result<(), Error> {
        self.insert(session, "communities", &c).await
    }

    async fn fetch_like_count(&self, post: PostId) -> Result<u64, Error> {
        let url = self.table(
            "likes",
            &[
                ("select", String::from("post_id")),
                ("post_id", format!("eq.{}", post.0)),
            ],
        );
        self.count(url).await
    }

    async fn toggle_like(&self, session: &Session, post: PostId) -> Result<bool, Error> {
        let filter = [
            ("post_id", format!("eq.{}", post.0)),
            ("user_id", format!("eq.{}", session.user_id.0)),
        ];
        let mut query = vec![("select", String::from("post_id,user_id"))];
        query.extend(filter.iter().cloned());
        let existing: Vec<LikeRow> = self
            .read(self.reading(Method::GET, self.table("likes", &query), Some(session)))
            .await?;
        if existing.is_empty() {
            let row = LikeRow {
                post_id: post,
                user_id: session.user_id,
            };
            self.insert(session, "likes", &row).await?;
            Ok(true)
        } else {
            let req = self.writing(Method::DELETE, self.table("likes", &filter), session);
            self.write(req).await?;
            Ok(false)
        }
    }
}
