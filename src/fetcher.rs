use crate::error::{FetchError, FetchErrorKind};
use html_escape::decode_html_entities;
use reqwest::blocking::Client;
use rss::Channel;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "gator";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Publish date exactly as the feed wrote it.
    pub pub_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFeed {
    pub title: String,
    pub description: String,
    pub items: Vec<FetchedFeedItem>,
}

pub trait ReadFeed {
    fn read(&self, url: &str) -> Result<FetchedFeed, FetchError>;
}

impl<R: ReadFeed> ReadFeed for &R {
    fn read(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        (**self).read(url)
    }
}

/// Fetches feeds over http, one request at a time.
pub struct HttpReader {
    client: Client,
}

impl HttpReader {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

impl ReadFeed for HttpReader {
    fn read(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::new(url, FetchErrorKind::Request(err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(url, FetchErrorKind::Status(status.as_u16())));
        }

        let body = response
            .bytes()
            .map_err(|err| FetchError::new(url, FetchErrorKind::Body(err)))?;

        FetchedFeed::from_bytes(&body[..])
            .map_err(|err| FetchError::new(url, FetchErrorKind::Decode(err)))
    }
}

impl FetchedFeed {
    pub fn from_bytes(data: &[u8]) -> Result<Self, rss::Error> {
        Channel::read_from(data).map(FetchedFeed::from)
    }
}

impl From<Channel> for FetchedFeed {
    fn from(channel: Channel) -> Self {
        // feeds often double-encode entities, so text fields are decoded once
        // more on top of the xml decoding
        let items = channel
            .items()
            .iter()
            .map(|item| FetchedFeedItem {
                title: unescape(item.title().unwrap_or_default()),
                link: item.link().unwrap_or_default().to_string(),
                description: unescape(item.description().unwrap_or_default()),
                pub_date: item.pub_date().unwrap_or_default().to_string(),
            })
            .collect();

        FetchedFeed {
            title: unescape(channel.title()),
            description: unescape(channel.description()),
            items,
        }
    }
}

fn unescape(text: &str) -> String {
    decode_html_entities(text).into_owned()
}
