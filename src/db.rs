use crate::feed::{Feed, FeedFollow, FeedWithUser};
use crate::post::Post;
use crate::user::User;
use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Result, Row};
use std::path::Path;
use uuid::Uuid;

const FEED_COLUMNS: &str = "id, created_at, updated_at, name, url, user_id, last_fetched_at";
const POST_COLUMNS: &str =
    "p.id, p.created_at, p.updated_at, p.title, p.url, p.description, p.published_at, p.feed_id";

pub struct DB {
    conn: Connection,
}

/// Outcome of a post insert. A post whose url is already stored is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostInsert {
    Inserted,
    Duplicate,
}

impl DB {
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.create_db()?;

        Ok(db)
    }

    pub fn create_db(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id              BLOB PRIMARY KEY,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                name            TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS feeds (
                id              BLOB PRIMARY KEY,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                name            TEXT NOT NULL,
                url             TEXT NOT NULL UNIQUE,
                user_id         BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_fetched_at TEXT
            );
            CREATE TABLE IF NOT EXISTS feed_follows (
                id              BLOB PRIMARY KEY,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                user_id         BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id         BLOB NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                UNIQUE (user_id, feed_id)
            );
            CREATE TABLE IF NOT EXISTS posts (
                id              BLOB PRIMARY KEY,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                title           TEXT NOT NULL,
                url             TEXT NOT NULL UNIQUE,
                description     TEXT,
                published_at    TEXT,
                feed_id         BLOB NOT NULL REFERENCES feeds(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched ON feeds(last_fetched_at);
            CREATE INDEX IF NOT EXISTS idx_posts_feed ON posts(feed_id);",
        )
    }

    pub fn create_user(&self, params: CreateUserParams) -> Result<User> {
        self.conn.execute(
            "INSERT INTO users (id, created_at, updated_at, name) VALUES (?1, ?2, ?3, ?4)",
            params![params.id, params.created_at, params.updated_at, params.name],
        )?;

        Ok(User {
            id: params.id,
            created_at: params.created_at,
            updated_at: params.updated_at,
            name: params.name,
        })
    }

    pub fn get_user(&self, name: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, created_at, updated_at, name FROM users WHERE name = :name",
                named_params! {":name": name},
                user_from_row,
            )
            .optional()
    }

    pub fn get_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, created_at, updated_at, name FROM users ORDER BY name")?;
        let users = stmt.query_map([], user_from_row)?;

        users.collect()
    }

    /// Removes every user; feeds, follows and posts go with them.
    pub fn delete_all_users(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM users", [])
    }

    pub fn create_feed(&self, params: CreateFeedParams) -> Result<Feed> {
        self.conn.execute(
            "INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                params.id,
                params.created_at,
                params.updated_at,
                params.name,
                params.url,
                params.user_id,
            ],
        )?;

        Ok(Feed {
            id: params.id,
            created_at: params.created_at,
            updated_at: params.updated_at,
            name: params.name,
            url: params.url,
            user_id: params.user_id,
            last_fetched_at: None,
        })
    }

    pub fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE url = :url", FEED_COLUMNS),
                named_params! {":url": url},
                feed_from_row,
            )
            .optional()
    }

    pub fn get_feeds_with_user(&self) -> Result<Vec<FeedWithUser>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.name, f.url, u.name
            FROM feeds f
            INNER JOIN users u ON f.user_id = u.id
            ORDER BY f.created_at, f.id",
        )?;
        let feeds = stmt.query_map([], |row| {
            Ok(FeedWithUser {
                name: row.get(0)?,
                url: row.get(1)?,
                user_name: row.get(2)?,
            })
        })?;

        feeds.collect()
    }

    /// All feeds in fetch priority order: never fetched first, then oldest fetch.
    pub fn list_candidate_feeds(&self) -> Result<Vec<Feed>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC",
            FEED_COLUMNS
        ))?;
        let feeds = stmt.query_map([], feed_from_row)?;

        feeds.collect()
    }

    /// Picks the feed with the oldest fetch and stamps it with `now` in a single
    /// statement, so two pollers sharing the file can't claim the same feed.
    pub fn claim_next_feed(&self, now: DateTime<Utc>) -> Result<Option<Feed>> {
        self.conn
            .query_row(
                &format!(
                    "UPDATE feeds
                    SET last_fetched_at = ?1, updated_at = ?1
                    WHERE id = (
                        SELECT id FROM feeds
                        ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
                        LIMIT 1
                    )
                    RETURNING {}",
                    FEED_COLUMNS
                ),
                params![now],
                feed_from_row,
            )
            .optional()
    }

    pub fn mark_feed_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![at, feed_id],
        )?;
        Ok(())
    }

    pub fn create_feed_follow(&self, params: CreateFeedFollowParams) -> Result<FeedFollow> {
        self.conn.execute(
            "INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
            VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                params.id,
                params.created_at,
                params.updated_at,
                params.user_id,
                params.feed_id,
            ],
        )?;

        self.conn.query_row(
            "SELECT ff.id, ff.created_at, ff.updated_at, ff.user_id, ff.feed_id, f.name, u.name
            FROM feed_follows ff
            INNER JOIN feeds f ON ff.feed_id = f.id
            INNER JOIN users u ON ff.user_id = u.id
            WHERE ff.id = :id",
            named_params! {":id": params.id},
            feed_follow_from_row,
        )
    }

    pub fn get_feed_follows_for_user(&self, user_id: Uuid) -> Result<Vec<FeedFollow>> {
        let mut stmt = self.conn.prepare(
            "SELECT ff.id, ff.created_at, ff.updated_at, ff.user_id, ff.feed_id, f.name, u.name
            FROM feed_follows ff
            INNER JOIN feeds f ON ff.feed_id = f.id
            INNER JOIN users u ON ff.user_id = u.id
            WHERE ff.user_id = :user_id
            ORDER BY ff.created_at, f.name",
        )?;
        let follows = stmt.query_map(named_params! {":user_id": user_id}, feed_follow_from_row)?;

        follows.collect()
    }

    /// Returns the number of removed follows (0 when the user didn't follow the url).
    pub fn delete_feed_follow(&self, user_id: Uuid, url: &str) -> Result<usize> {
        self.conn.execute(
            "DELETE FROM feed_follows
            WHERE user_id = ?1
              AND feed_id IN (SELECT id FROM feeds WHERE url = ?2)",
            params![user_id, url],
        )
    }

    pub fn create_post(&self, params: CreatePostParams) -> Result<PostInsert> {
        let inserted = self.conn.execute(
            "INSERT INTO posts (
                id,
                created_at,
                updated_at,
                title,
                url,
                description,
                published_at,
                feed_id
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            )
            ON CONFLICT (url) DO NOTHING",
            params![
                params.id,
                params.created_at,
                params.updated_at,
                params.title,
                params.url,
                params.description,
                params.published_at,
                params.feed_id,
            ],
        )?;

        if inserted == 0 {
            Ok(PostInsert::Duplicate)
        } else {
            Ok(PostInsert::Inserted)
        }
    }

    /// Newest posts from the feeds `user_id` follows. Undated posts come last.
    pub fn get_posts_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Post>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}
            FROM posts p
            INNER JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = :user_id
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
            LIMIT :limit",
            POST_COLUMNS
        ))?;
        let posts = stmt.query_map(
            named_params! {":user_id": user_id, ":limit": limit},
            post_from_row,
        )?;

        posts.collect()
    }

    pub fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}
            FROM posts p
            WHERE p.feed_id = :feed_id
            ORDER BY p.created_at, p.url",
            POST_COLUMNS
        ))?;
        let posts = stmt.query_map(named_params! {":feed_id": feed_id}, post_from_row)?;

        posts.collect()
    }
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        name: row.get(3)?,
    })
}

fn feed_from_row(row: &Row) -> Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        name: row.get(3)?,
        url: row.get(4)?,
        user_id: row.get(5)?,
        last_fetched_at: row.get(6)?,
    })
}

fn feed_follow_from_row(row: &Row) -> Result<FeedFollow> {
    Ok(FeedFollow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        user_id: row.get(3)?,
        feed_id: row.get(4)?,
        feed_name: row.get(5)?,
        user_name: row.get(6)?,
    })
}

fn post_from_row(row: &Row) -> Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        title: row.get(3)?,
        url: row.get(4)?,
        description: row.get(5)?,
        published_at: row.get(6)?,
        feed_id: row.get(7)?,
    })
}

pub struct CreateUserParams {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
}

impl CreateUserParams {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
        }
    }
}

pub struct CreateFeedParams {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
}

impl CreateFeedParams {
    pub fn new(name: &str, url: &str, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            url: url.trim().to_string(),
            user_id,
        }
    }
}

pub struct CreateFeedFollowParams {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub feed_id: Uuid,
}

impl CreateFeedFollowParams {
    pub fn new(user_id: Uuid, feed_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            user_id,
            feed_id,
        }
    }
}

pub struct CreatePostParams {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_id: Uuid,
}
