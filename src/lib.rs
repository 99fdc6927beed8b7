pub mod commands;
pub mod config;
pub mod db;
pub mod duration;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod post;
pub mod scraper;
pub mod user;
pub mod utils;
