use crate::config::Config;
use crate::db::{CreateFeedFollowParams, CreateFeedParams, CreateUserParams, DB};
use crate::duration::parse_duration;
use crate::error::CommandError;
use crate::fetcher::HttpReader;
use crate::scraper::Aggregator;
use crate::user::User;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

const DEFAULT_BROWSE_LIMIT: i64 = 2;

/// Everything a command needs, passed explicitly to every handler.
pub struct State {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: DB,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    /// Builds a command from `argv` without the program name.
    pub fn from_args(mut args: Vec<String>) -> Option<Self> {
        if args.is_empty() {
            return None;
        }
        let name = args.remove(0);

        Some(Self { name, args })
    }
}

pub type PublicHandler = fn(&mut State, &[String], &mut dyn Write) -> Result<(), CommandError>;
pub type UserHandler =
    fn(&mut State, &[String], &User, &mut dyn Write) -> Result<(), CommandError>;

#[derive(Clone, Copy)]
pub enum Handler {
    Public(PublicHandler),
    /// Runs only with a logged in user, resolved once by the registry.
    LoggedIn(UserHandler),
}

#[derive(Default)]
pub struct Registry {
    commands: HashMap<&'static str, Handler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_commands() -> Self {
        let mut registry = Self::new();

        registry.register("register", Handler::Public(register));
        registry.register("login", Handler::Public(login));
        registry.register("reset", Handler::Public(reset));
        registry.register("users", Handler::Public(users));
        registry.register("agg", Handler::Public(agg));
        registry.register("feeds", Handler::Public(feeds));
        registry.register("addfeed", Handler::LoggedIn(add_feed));
        registry.register("follow", Handler::LoggedIn(follow));
        registry.register("following", Handler::LoggedIn(following));
        registry.register("unfollow", Handler::LoggedIn(unfollow));
        registry.register("browse", Handler::LoggedIn(browse));

        registry
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.commands.insert(name, handler);
    }

    pub fn run(
        &self,
        state: &mut State,
        command: &Command,
        out: &mut dyn Write,
    ) -> Result<(), CommandError> {
        let handler = self
            .commands
            .get(command.name.as_str())
            .ok_or_else(|| CommandError::UnknownCommand(command.name.clone()))?;

        match handler {
            Handler::Public(handler) => handler(state, &command.args, out),
            Handler::LoggedIn(handler) => {
                let user = current_user(state)?;
                handler(state, &command.args, &user, out)
            }
        }
    }
}

fn current_user(state: &State) -> Result<User, CommandError> {
    let name = state
        .config
        .current_user_name
        .as_deref()
        .ok_or(CommandError::NotLoggedIn)?;

    state
        .db
        .get_user(name)?
        .ok_or_else(|| CommandError::UserNotFound(name.to_string()))
}

fn register(state: &mut State, args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
    let name = args
        .first()
        .ok_or(CommandError::NotEnoughArguments("name is required"))?;

    if state.db.get_user(name)?.is_some() {
        return Err(CommandError::UserExists(name.clone()));
    }

    let user = state.db.create_user(CreateUserParams::new(name))?;
    state.config.set_user(&state.config_path, &user.name)?;

    writeln!(out, "User created successfully")?;
    writeln!(out, "User: {} ({})", user.name, user.id)?;
    Ok(())
}

fn login(state: &mut State, args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
    let name = args
        .first()
        .ok_or(CommandError::NotEnoughArguments("name is required"))?;

    let user = state
        .db
        .get_user(name)?
        .ok_or_else(|| CommandError::UserNotFound(name.clone()))?;
    state.config.set_user(&state.config_path, &user.name)?;

    writeln!(out, "User has been set to {}", user.name)?;
    Ok(())
}

fn reset(state: &mut State, _args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
    let deleted = state.db.delete_all_users()?;

    writeln!(out, "Deleted {} users", deleted)?;
    Ok(())
}

fn users(state: &mut State, _args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
    let current = state.config.current_user_name.as_deref();

    for user in state.db.get_users()? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

fn agg(state: &mut State, args: &[String], _out: &mut dyn Write) -> Result<(), CommandError> {
    let interval = args.first().ok_or(CommandError::NotEnoughArguments(
        "time_between_reqs is required (e.g. '1m', '30s')",
    ))?;
    let interval = parse_duration(interval)?;
    let reader = HttpReader::new()?;

    // progress goes to the log, see `Aggregator::run`
    Aggregator::new(&state.db, reader).run(interval);
    Ok(())
}

fn feeds(state: &mut State, _args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
    for feed in state.db.get_feeds_with_user()? {
        writeln!(out, "{}", feed.name)?;
        writeln!(out, "{}", feed.url)?;
        writeln!(out, "{}", feed.user_name)?;
    }
    Ok(())
}

fn add_feed(
    state: &mut State,
    args: &[String],
    user: &User,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let (name, url) = match args {
        [name, url, ..] => (name, url),
        _ => {
            return Err(CommandError::NotEnoughArguments(
                "feed name and url are required",
            ))
        }
    };

    let feed = state
        .db
        .create_feed(CreateFeedParams::new(name, url, user.id))?;
    state
        .db
        .create_feed_follow(CreateFeedFollowParams::new(user.id, feed.id))?;

    writeln!(out, "Feed created successfully")?;
    writeln!(out, "Name: {}", feed.name)?;
    writeln!(out, "URL: {}", feed.url)?;
    Ok(())
}

fn follow(
    state: &mut State,
    args: &[String],
    user: &User,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let url = args
        .first()
        .ok_or(CommandError::NotEnoughArguments("feed url is required"))?;

    let feed = state
        .db
        .get_feed_by_url(url)?
        .ok_or_else(|| CommandError::FeedNotFound(url.clone()))?;
    let follow = state
        .db
        .create_feed_follow(CreateFeedFollowParams::new(user.id, feed.id))?;

    writeln!(out, "{} now follows {}", follow.user_name, follow.feed_name)?;
    Ok(())
}

fn following(
    state: &mut State,
    _args: &[String],
    user: &User,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    for follow in state.db.get_feed_follows_for_user(user.id)? {
        writeln!(out, "- {}", follow.feed_name)?;
    }
    Ok(())
}

fn unfollow(
    state: &mut State,
    args: &[String],
    user: &User,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let url = args
        .first()
        .ok_or(CommandError::NotEnoughArguments("feed url is required"))?;

    if state.db.delete_feed_follow(user.id, url)? == 0 {
        return Err(CommandError::FeedNotFound(url.clone()));
    }

    writeln!(out, "Successfully unfollowed feed: {}", url)?;
    Ok(())
}

fn browse(
    state: &mut State,
    args: &[String],
    user: &User,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    let limit = match args.first() {
        None => DEFAULT_BROWSE_LIMIT,
        Some(arg) => match arg.parse::<i64>() {
            Ok(limit) if limit > 0 => limit,
            _ => return Err(CommandError::InvalidLimit(arg.clone())),
        },
    };

    let posts = state.db.get_posts_for_user(user.id, limit)?;
    if posts.is_empty() {
        writeln!(out, "No posts yet, follow a feed and run `agg`")?;
    }
    for post in posts {
        writeln!(out, "{}", post.draw())?;
        writeln!(out)?;
    }
    Ok(())
}
