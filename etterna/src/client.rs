use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use std::time::Duration;

use crate::error::{Error, ParseError, Result};
use crate::models::{Score, ScoreQuery, Song, User};
use crate::parse;
use crate::Api;

pub const BASE_API_URL: &str = "https://api.etternaonline.com/v1";
pub const BASE_URL: &str = "https://etternaonline.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const FORBIDDEN: &str = "API access is denied due to insufficient permissions (bad API key?).";

/// User-facing messages for one remote operation.
struct Operation {
    name: &'static str,
    not_found: &'static str,
    unexpected: &'static str,
}

const LOOK_UP_USER: Operation = Operation {
    name: "user_data",
    not_found: "No user with that username exists.",
    unexpected: "Unexpected error trying to look up user.",
};

const LOOK_UP_RANKS: Operation = Operation {
    name: "user_rank",
    not_found: "No user with that username exists.",
    unexpected: "Unexpected error trying to look up user.",
};

const LOOK_UP_USER_ID: Operation = Operation {
    name: "user_page",
    not_found: "No user with that username exists.",
    unexpected: "Unexpected error trying to look up user ID.",
};

const RETRIEVE_SCORES: Operation = Operation {
    name: "user_scores",
    not_found: "User does not exist.",
    unexpected: "Unexpected error trying to retrieve scores.",
};

const RETRIEVE_SCORE_DETAIL: Operation = Operation {
    name: "score",
    not_found: "Score does not exist.",
    unexpected: "Unexpected error trying to retrieve score details.",
};

const RETRIEVE_SONG: Operation = Operation {
    name: "song",
    not_found: "Song does not exist.",
    unexpected: "Unexpected error trying to retrieve song details.",
};

impl Operation {
    fn fail(&self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::unexpected(self.unexpected).with_source(source)
    }
}

/// HTTP client for the EtternaOnline site and its v1 API.
///
/// Every request carries a timeout; a stalled request surfaces as an
/// unexpected error like any other transport failure.
#[derive(Debug, Clone)]
pub struct Client {
    api_key: String,
    base_api_url: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct ClientBuilder {
    api_key: String,
    base_api_url: String,
    base_url: String,
    timeout: Duration,
}

impl ClientBuilder {
    /// Root of the JSON API, `https://api.etternaonline.com/v1` by default.
    pub fn base_api_url(mut self, url: impl Into<String>) -> Self {
        self.base_api_url = url.into();
        self
    }

    /// Root of the website, `https://etternaonline.com` by default.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Client> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::unexpected("Failed to build HTTP client.").with_source(e))?;

        Ok(Client {
            api_key: self.api_key,
            base_api_url: self.base_api_url.trim_end_matches('/').to_string(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

impl Client {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            api_key: api_key.into(),
            base_api_url: BASE_API_URL.to_string(),
            base_url: BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_api_url(&self) -> &str {
        &self.base_api_url
    }

    /// Sends a request and returns the body of a successful response.
    async fn fetch(&self, op: &Operation, request: RequestBuilder) -> Result<String> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation = op.name, error = %e, "request failed");
            op.fail(e)
        })?;

        let status = response.status();
        tracing::debug!(operation = op.name, %status, "response received");

        match status {
            StatusCode::NOT_FOUND => return Err(Error::not_found(op.not_found)),
            StatusCode::FORBIDDEN => return Err(Error::unexpected(FORBIDDEN)),
            _ => {}
        }

        if let Err(e) = response.error_for_status_ref() {
            tracing::warn!(operation = op.name, %status, "unexpected status");
            return Err(op.fail(e));
        }

        response.text().await.map_err(|e| op.fail(e))
    }

    async fn fetch_parsed<T>(
        &self,
        op: &Operation,
        request: RequestBuilder,
        parse: impl FnOnce(&str) -> std::result::Result<T, ParseError>,
    ) -> Result<T> {
        let body = self.fetch(op, request).await?;

        parse(&body).map_err(|e| {
            tracing::warn!(operation = op.name, error = %e, "failed to parse response");
            op.fail(e)
        })
    }

    fn api_get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_api_url, path))
            .query(&[("api_key", self.api_key.as_str())])
    }

    fn api_post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_api_url, path))
            .query(&[("api_key", self.api_key.as_str())])
            .form(&[] as &[(&str, &str)])
    }

    fn user_page_url(&self, username: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| LOOK_UP_USER_ID.fail(e))?;

        url.path_segments_mut()
            .map_err(|_| Error::unexpected(LOOK_UP_USER_ID.unexpected))?
            .pop_if_empty()
            .push("user")
            .push(username);

        Ok(url)
    }
}

#[async_trait]
impl Api for Client {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_by_username(&self, username: &str) -> Result<User> {
        let request = self.api_get("/user_data").query(&[("username", username)]);
        let mut user = self.fetch_parsed(&LOOK_UP_USER, request, parse::user_profile).await?;

        let request = self.api_get("/user_rank").query(&[("username", username)]);
        user.rank = self.fetch_parsed(&LOOK_UP_RANKS, request, parse::user_ranks).await?;

        tracing::debug!(username = %user.username, overall = user.msd.overall, "fetched profile");
        Ok(user)
    }

    async fn get_user_id(&self, username: &str) -> Result<i64> {
        let url = self.user_page_url(username)?;
        let id = self
            .fetch_parsed(&LOOK_UP_USER_ID, self.http.get(url), parse::user_id)
            .await?;

        tracing::debug!(%username, id, "scraped user id");
        Ok(id)
    }

    async fn get_scores(&self, query: &ScoreQuery) -> Result<Vec<Score>> {
        let mut form = vec![
            ("start", query.offset.to_string()),
            ("length", query.count.to_string()),
            ("userid", query.user_id.to_string()),
            ("order[0][column]", query.sort.ordinal().to_string()),
            (
                "order[0][dir]",
                if query.ascending { "asc" } else { "desc" }.to_string(),
            ),
        ];

        if let Some(search) = &query.search {
            form.push(("search[value]", search.clone()));
        }

        let request = self
            .http
            .post(format!("{}/score/userScores", self.base_url))
            .form(&form);

        let scores = self
            .fetch_parsed(&RETRIEVE_SCORES, request, parse::score_list)
            .await?;

        tracing::debug!(user_id = query.user_id, count = scores.len(), "fetched scores");
        Ok(scores)
    }

    async fn get_score_detail(&self, key: &str) -> Result<Score> {
        let (short_key, _) =
            parse::split_score_key(key).map_err(|e| RETRIEVE_SCORE_DETAIL.fail(e))?;

        let request = self.api_post("/score").query(&[("key", short_key)]);

        self.fetch_parsed(&RETRIEVE_SCORE_DETAIL, request, |body| {
            parse::score_detail(body, key)
        })
        .await
    }

    async fn get_song(&self, id: i64) -> Result<Song> {
        let request = self.api_post("/song").query(&[("key", id)]);

        self.fetch_parsed(&RETRIEVE_SONG, request, |body| parse::song(body, id))
            .await
    }
}
