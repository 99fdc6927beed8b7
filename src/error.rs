use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to fetch feed {url}: {kind}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
}

#[derive(Debug, Error)]
pub enum FetchErrorKind {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("status code {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to decode rss: {0}")]
    Decode(#[source] rss::Error),
}

impl FetchError {
    pub fn new(url: &str, kind: FetchErrorKind) -> Self {
        Self {
            url: url.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("failed to parse date '{0}'")]
pub struct DateParseError(pub String);

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no feeds available to fetch")]
    NoFeedsAvailable,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration '{0}'")]
    Invalid(String),

    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { input: String, unit: String },

    #[error("duration '{0}' must be positive")]
    NotPositive(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't find home dir")]
    NoHomeDir,

    #[error("failed to access config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not enough arguments: {0}")]
    NotEnoughArguments(&'static str),

    #[error("command {0} not found")]
    UnknownCommand(String),

    #[error("not logged in, run `register <name>` or `login <name>` first")]
    NotLoggedIn,

    #[error("user '{0}' does not exist")]
    UserNotFound(String),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("feed '{0}' not found")]
    FeedNotFound(String),

    #[error("limit must be a positive integer, got '{0}'")]
    InvalidLimit(String),

    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}
