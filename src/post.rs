use crate::utils;
use chrono::{DateTime, Utc};
use ellipse::Ellipse;
use uuid::Uuid;

const TITLE_WIDTH: usize = 70;
const TEXT_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_id: Uuid,
}

impl Post {
    pub fn published(&self) -> String {
        self.published_at
            .map(utils::formatted_pub_date)
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Description rendered from html to plain text.
    pub fn description_text(&self) -> String {
        match self.description.as_deref() {
            Some(html) if !html.trim().is_empty() => {
                html2text::from_read(html.as_bytes(), TEXT_WIDTH)
                    .trim_end()
                    .to_string()
            }
            _ => "No description available.".to_string(),
        }
    }

    pub fn draw(&self) -> String {
        format!(
            "Title: {}\nPublished: {}\nDescription: {}\nURL: {}",
            self.title.as_str().truncate_ellipse(TITLE_WIDTH),
            self.published(),
            self.description_text(),
            self.url,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Post;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn post(description: Option<&str>) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title: "Hello".to_string(),
            url: "https://example.com/hello".to_string(),
            description: description.map(|s| s.to_string()),
            published_at: None,
            feed_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn it_renders_missing_description_placeholder() {
        assert_eq!(post(None).description_text(), "No description available.");
        assert_eq!(post(Some("  ")).description_text(), "No description available.");
    }

    #[test]
    fn it_strips_html_from_description() {
        let text = post(Some("<p>Some <b>bold</b> text</p>")).description_text();

        assert!(text.contains("Some"));
        assert!(text.contains("text"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn it_draws_published_date() {
        let mut post = post(None);
        assert!(post.draw().contains("Published: N/A"));

        post.published_at = Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap());
        assert!(post.draw().contains("Published: Mon, 02 Jan 2006 22:04:05 UTC"));
    }

    #[test]
    fn it_truncates_long_titles() {
        let mut post = post(None);
        post.title = "a".repeat(200);

        let drawn = post.draw();
        let title_line = drawn.lines().next().unwrap();

        assert!(title_line.len() < 200);
    }
}
