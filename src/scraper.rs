use crate::db::{CreatePostParams, PostInsert, DB};
use crate::error::{AggregateError, DateParseError};
use crate::feed::Feed;
use crate::fetcher::{FetchedFeed, ReadFeed};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc, Weekday};
use log::{debug, error, info, warn};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const RFC1123Z: &str = "%d %b %Y %H:%M:%S %z";
const RFC1123: &str = "%d %b %Y %H:%M:%S";

pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub saved: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub feed: Feed,
    pub ingest: IngestReport,
}

/// Parses an item's publish date, `Mon, 02 Jan 2006 15:04:05 -0700` first and
/// `Mon, 02 Jan 2006 15:04:05 MST` second. An empty string means no date.
///
/// The weekday has to be a real day name but is not checked against the date.
pub fn parse_pub_date(date: &str) -> Result<Option<DateTime<Utc>>, DateParseError> {
    let date = date.trim();
    if date.is_empty() {
        return Ok(None);
    }

    let parse_error = || DateParseError(date.to_string());
    let rest = strip_weekday(date).ok_or_else(parse_error)?;
    let zone = rfc1123_zone(rest).ok_or_else(parse_error)?;

    if zone.starts_with(['+', '-']) {
        return DateTime::parse_from_str(rest, RFC1123Z)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| parse_error());
    }

    parse_with_zone_name(rest).map(Some).ok_or_else(parse_error)
}

fn strip_weekday(date: &str) -> Option<&str> {
    let (weekday, rest) = date.split_once(',')?;
    if weekday.len() != 3 || weekday.parse::<Weekday>().is_err() {
        return None;
    }

    Some(rest.trim_start())
}

/// Checks the `02 Jan 2006 15:04:05 <zone>` layout and returns the zone.
fn rfc1123_zone(date: &str) -> Option<&str> {
    let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
    let parts: Vec<&str> = date.split(' ').collect();

    let (day, month, year, time, zone) = match parts.as_slice() {
        [day, month, year, time, zone] => (*day, *month, *year, *time, *zone),
        _ => return None,
    };
    let clock: Vec<&str> = time.split(':').collect();

    let valid = digits(day, 2)
        && month.len() == 3
        && month.chars().all(|c| c.is_ascii_alphabetic())
        && digits(year, 4)
        && clock.len() == 3
        && clock.iter().all(|part| digits(part, 2))
        && !zone.is_empty();

    if valid {
        Some(zone)
    } else {
        None
    }
}

fn parse_with_zone_name(date: &str) -> Option<DateTime<Utc>> {
    let (time, zone) = date.rsplit_once(' ')?;
    if !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    // rfc 822 names (GMT, EST, MST, ...) keep their offsets
    if let Ok(parsed) = DateTime::parse_from_rfc2822(date) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(time, RFC1123)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Stores the items of `fetched` as posts of `feed`, in document order.
///
/// Items without a link are skipped, items already stored are counted as
/// duplicates, and an item whose date can't be parsed or whose insert fails is
/// logged and counted as failed. None of these stop the rest of the batch.
pub fn ingest_posts(db: &DB, feed: &Feed, fetched: &FetchedFeed) -> IngestReport {
    let mut report = IngestReport::default();

    for item in &fetched.items {
        if item.link.is_empty() {
            info!("Skipping post '{}' from {}: missing url", item.title, feed.url);
            report.skipped += 1;
            continue;
        }

        let published_at = match parse_pub_date(&item.pub_date) {
            Ok(published_at) => published_at,
            Err(err) => {
                warn!("Skipping post '{}' ({}): {}", item.title, item.link, err);
                report.failed += 1;
                continue;
            }
        };

        let description = if item.description.is_empty() {
            None
        } else {
            Some(item.description.clone())
        };

        let now = Utc::now();
        let params = CreatePostParams {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title: item.title.clone(),
            url: item.link.clone(),
            description,
            published_at,
            feed_id: feed.id,
        };

        match db.create_post(params) {
            Ok(PostInsert::Inserted) => {
                debug!("Post saved: {}", item.title);
                report.saved += 1;
            }
            Ok(PostInsert::Duplicate) => report.duplicates += 1,
            Err(err) => {
                error!(
                    "Failed to create post '{}' ({}): {}",
                    item.title, item.link, err
                );
                report.failed += 1;
            }
        }
    }

    report
}

/// One cycle: claim the least recently fetched feed, fetch it, store its posts.
///
/// The claim is persisted before the request goes out, so a feed that fails to
/// fetch still moves to the back of the queue.
pub fn scrape_feeds<R: ReadFeed>(db: &DB, reader: &R) -> Result<CycleReport, AggregateError> {
    let feed = db
        .claim_next_feed(Utc::now())?
        .ok_or(AggregateError::NoFeedsAvailable)?;

    info!("Fetching feed '{}' ({})", feed.name, feed.url);
    let fetched = reader.read(&feed.url)?;

    let ingest = ingest_posts(db, &feed, &fetched);

    Ok(CycleReport { feed, ingest })
}

/// Fixed-rate ticker. Ticks missed while a cycle overran are dropped.
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    /// Blocks until the next deadline.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }

        let now = Instant::now();
        while self.next <= now {
            self.next += self.interval;
        }
    }
}

/// Endless: every item is a tick, yielded once its deadline has passed.
impl Iterator for Ticker {
    type Item = ();

    fn next(&mut self) -> Option<()> {
        self.wait();
        Some(())
    }
}

pub struct Aggregator<'a, R: ReadFeed> {
    db: &'a DB,
    reader: R,
}

impl<'a, R: ReadFeed> Aggregator<'a, R> {
    pub fn new(db: &'a DB, reader: R) -> Self {
        Self { db, reader }
    }

    /// Runs one cycle and logs its outcome. Never fails.
    pub fn tick(&self) -> Option<CycleReport> {
        match scrape_feeds(self.db, &self.reader) {
            Ok(cycle) => {
                info!(
                    "Feed '{}' done: {} saved, {} duplicates, {} skipped, {} failed",
                    cycle.feed.name,
                    cycle.ingest.saved,
                    cycle.ingest.duplicates,
                    cycle.ingest.skipped,
                    cycle.ingest.failed
                );
                Some(cycle)
            }
            Err(AggregateError::NoFeedsAvailable) => {
                warn!("No feeds to fetch, add one with `addfeed <name> <url>`");
                None
            }
            Err(err) => {
                error!("Scraping failed: {}", err);
                None
            }
        }
    }

    /// Runs one cycle right away, then one cycle per tick. Returns the number
    /// of cycles run, which only happens once `ticks` runs out.
    pub fn poll<T: IntoIterator<Item = ()>>(&self, ticks: T) -> usize {
        self.tick();
        let mut cycles = 1;

        for _ in ticks {
            self.tick();
            cycles += 1;
        }

        cycles
    }

    /// Polls forever, one cycle per `interval`.
    pub fn run(&self, interval: Duration) {
        if below_min_interval(interval) {
            warn!(
                "Polling every {:?} is below the recommended minimum of {:?}",
                interval, MIN_INTERVAL
            );
        }
        info!("Collecting feeds every {:?}", interval);

        self.poll(Ticker::new(interval));
    }
}

pub fn below_min_interval(interval: Duration) -> bool {
    interval < MIN_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::{
        below_min_interval, ingest_posts, parse_pub_date, scrape_feeds, Aggregator, IngestReport,
        Ticker,
    };
    use crate::db::{CreateFeedParams, CreateUserParams, DB};
    use crate::error::{AggregateError, FetchError, FetchErrorKind};
    use crate::feed::Feed;
    use crate::fetcher::{FetchedFeed, FetchedFeedItem, ReadFeed};
    use chrono::{Duration, TimeZone, Utc};
    use std::cell::RefCell;
    use std::thread;
    use std::time::{Duration as StdDuration, Instant};

    struct StubReader {
        feed: Option<FetchedFeed>,
        urls: RefCell<Vec<String>>,
    }

    impl StubReader {
        fn new(feed: FetchedFeed) -> Self {
            Self {
                feed: Some(feed),
                urls: RefCell::new(vec![]),
            }
        }

        fn failing() -> Self {
            Self {
                feed: None,
                urls: RefCell::new(vec![]),
            }
        }
    }

    impl ReadFeed for StubReader {
        fn read(&self, url: &str) -> Result<FetchedFeed, FetchError> {
            self.urls.borrow_mut().push(url.to_string());
            self.feed
                .clone()
                .ok_or_else(|| FetchError::new(url, FetchErrorKind::Status(500)))
        }
    }

    fn item(title: &str, link: &str, pub_date: &str) -> FetchedFeedItem {
        FetchedFeedItem {
            title: title.to_string(),
            link: link.to_string(),
            description: String::new(),
            pub_date: pub_date.to_string(),
        }
    }

    fn fetched(items: Vec<FetchedFeedItem>) -> FetchedFeed {
        FetchedFeed {
            title: "Example".to_string(),
            description: String::new(),
            items,
        }
    }

    fn setup() -> (DB, Feed) {
        let db = DB::open_in_memory().unwrap();
        let user = db.create_user(CreateUserParams::new("kahya")).unwrap();
        let feed = db
            .create_feed(CreateFeedParams::new(
                "Example",
                "https://example.com/rss",
                user.id,
            ))
            .unwrap();

        (db, feed)
    }

    #[test]
    fn it_parses_numeric_zone_dates() {
        let parsed = parse_pub_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();

        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
        );
    }

    #[test]
    fn it_parses_zone_name_dates() {
        let parsed = parse_pub_date("Mon, 02 Jan 2006 15:04:05 MST").unwrap();
        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
        );

        let parsed = parse_pub_date("Mon, 02 Jan 2006 15:04:05 GMT").unwrap();
        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap())
        );
    }

    #[test]
    fn it_ignores_mismatched_weekday() {
        let parsed = parse_pub_date("Fri, 02 Jan 2006 15:04:05 -0700").unwrap();

        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
        );
    }

    #[test]
    fn it_rejects_unknown_weekday() {
        assert!(parse_pub_date("Xyz, 02 Jan 2006 15:04:05 -0700").is_err());
        assert!(parse_pub_date("Xyz, 02 Jan 2006 15:04:05 MST").is_err());
    }

    #[test]
    fn it_rejects_loose_rfc2822_layouts() {
        assert!(parse_pub_date("Mon, 02 Jan 06 15:04:05 GMT").is_err());
        assert!(parse_pub_date("Mon, 2 Jan 2006 15:04:05 GMT").is_err());
        assert!(parse_pub_date("Mon, 02 Jan 2006 15:04 GMT").is_err());
        assert!(parse_pub_date("Mon, 2 Jan 2006 15:04:05 -0700").is_err());
    }

    #[test]
    fn it_reads_unknown_zone_names_as_utc() {
        let parsed = parse_pub_date("Mon, 02 Jan 2006 15:04:05 CEST").unwrap();

        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap())
        );
    }

    #[test]
    fn it_returns_none_for_empty_dates() {
        assert_eq!(parse_pub_date(""), Ok(None));
    }

    #[test]
    fn it_fails_on_malformed_dates() {
        assert!(parse_pub_date("not-a-date").is_err());
        assert!(parse_pub_date("2006-01-02T15:04:05Z").is_err());
    }

    #[test]
    fn it_ingests_items_in_order() {
        let (db, feed) = setup();
        let document = fetched(vec![
            item("First", "https://example.com/1", "Mon, 02 Jan 2006 15:04:05 -0700"),
            item("Second", "https://example.com/2", ""),
        ]);

        let report = ingest_posts(&db, &feed, &document);

        assert_eq!(
            report,
            IngestReport {
                saved: 2,
                ..IngestReport::default()
            }
        );
        let posts = db.get_posts_for_feed(feed.id).unwrap();
        assert_eq!(posts.len(), 2);
        let second = posts
            .iter()
            .find(|post| post.url == "https://example.com/2")
            .unwrap();
        assert_eq!(second.published_at, None);
        assert_eq!(second.description, None);
    }

    #[test]
    fn it_is_idempotent() {
        let (db, feed) = setup();
        let document = fetched(vec![
            item("First", "https://example.com/1", ""),
            item("Second", "https://example.com/2", ""),
        ]);

        ingest_posts(&db, &feed, &document);
        let report = ingest_posts(&db, &feed, &document);

        assert_eq!(report.saved, 0);
        assert_eq!(report.duplicates, 2);
        assert_eq!(db.get_posts_for_feed(feed.id).unwrap().len(), 2);
    }

    #[test]
    fn it_skips_items_without_link() {
        let (db, feed) = setup();
        let document = fetched(vec![
            item("No link", "", ""),
            item("Linked", "https://example.com/1", ""),
        ]);

        let report = ingest_posts(&db, &feed, &document);

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.saved, 1);
    }

    #[test]
    fn it_saves_shared_link_once() {
        let (db, feed) = setup();
        let document = fetched(vec![
            item("One", "https://example.com/same", ""),
            item("Two", "https://example.com/same", ""),
        ]);

        let report = ingest_posts(&db, &feed, &document);

        assert_eq!(report.saved, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(db.get_posts_for_feed(feed.id).unwrap()[0].title, "One");
    }

    #[test]
    fn it_skips_only_the_item_with_a_bad_date() {
        let (db, feed) = setup();
        let document = fetched(vec![
            item("Bad", "https://example.com/bad", "not-a-date"),
            item("Good", "https://example.com/good", ""),
        ]);

        let report = ingest_posts(&db, &feed, &document);

        assert_eq!(report.failed, 1);
        assert_eq!(report.saved, 1);
        let posts = db.get_posts_for_feed(feed.id).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://example.com/good");
    }

    #[test]
    fn it_fails_cycle_without_feeds() {
        let db = DB::open_in_memory().unwrap();
        let reader = StubReader::new(fetched(vec![]));

        let result = scrape_feeds(&db, &reader);

        assert!(matches!(result, Err(AggregateError::NoFeedsAvailable)));
        assert!(reader.urls.borrow().is_empty());
    }

    #[test]
    fn it_visits_feeds_round_robin() {
        let (db, a) = setup();
        let b = db
            .create_feed(CreateFeedParams::new("B", "https://b.example/rss", a.user_id))
            .unwrap();
        db.mark_feed_fetched(b.id, Utc::now() - Duration::minutes(5))
            .unwrap();
        let reader = StubReader::new(fetched(vec![item("One", "https://example.com/1", "")]));

        let first = scrape_feeds(&db, &reader).unwrap();
        let second = scrape_feeds(&db, &reader).unwrap();
        let third = scrape_feeds(&db, &reader).unwrap();

        assert_eq!(first.feed.id, a.id);
        assert!(first.feed.last_fetched_at.is_some());
        assert_eq!(first.ingest.saved, 1);
        assert_eq!(second.feed.id, b.id);
        assert_eq!(second.ingest.duplicates, 1);
        assert_eq!(third.feed.id, a.id);
        assert_eq!(
            *reader.urls.borrow(),
            vec![
                a.url.clone(),
                "https://b.example/rss".to_string(),
                a.url.clone()
            ]
        );
    }

    #[test]
    fn it_keeps_claim_when_fetch_fails() {
        let (db, feed) = setup();

        let result = scrape_feeds(&db, &StubReader::failing());

        assert!(matches!(result, Err(AggregateError::Fetch(_))));
        let stored = db.get_feed_by_url(&feed.url).unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some());
        assert!(db.get_posts_for_feed(feed.id).unwrap().is_empty());
    }

    #[test]
    fn it_survives_failing_cycles() {
        let (db, _feed) = setup();
        let aggregator = Aggregator::new(&db, StubReader::failing());

        assert!(aggregator.tick().is_none());
        assert!(aggregator.tick().is_none());
    }

    fn two_feeds(db: &DB, first: &Feed) -> Feed {
        let second = db
            .create_feed(CreateFeedParams::new(
                "B",
                "https://b.example/rss",
                first.user_id,
            ))
            .unwrap();
        db.mark_feed_fetched(second.id, Utc::now() - Duration::minutes(5))
            .unwrap();

        second
    }

    #[test]
    fn it_runs_a_cycle_before_the_first_tick_and_one_per_tick() {
        let (db, a) = setup();
        let b = two_feeds(&db, &a);
        let reader = StubReader::new(fetched(vec![item("One", "https://example.com/1", "")]));

        let cycles = Aggregator::new(&db, &reader).poll(vec![(), ()]);

        assert_eq!(cycles, 3);
        assert_eq!(
            *reader.urls.borrow(),
            vec![a.url.clone(), b.url.clone(), a.url.clone()]
        );
        assert_eq!(db.get_posts_for_feed(a.id).unwrap().len(), 1);
    }

    #[test]
    fn it_keeps_polling_when_every_cycle_fails() {
        let (db, a) = setup();
        let b = two_feeds(&db, &a);
        let reader = StubReader::failing();

        let cycles = Aggregator::new(&db, &reader).poll(vec![(), ()]);

        assert_eq!(cycles, 3);
        assert_eq!(
            *reader.urls.borrow(),
            vec![a.url.clone(), b.url.clone(), a.url.clone()]
        );
        assert!(db.get_posts_for_feed(a.id).unwrap().is_empty());
    }

    #[test]
    fn it_runs_the_first_cycle_without_ticks() {
        let (db, a) = setup();
        let reader = StubReader::new(fetched(vec![]));

        let cycles = Aggregator::new(&db, &reader).poll(std::iter::empty());

        assert_eq!(cycles, 1);
        assert_eq!(*reader.urls.borrow(), vec![a.url.clone()]);
    }

    #[test]
    fn it_flags_short_intervals() {
        assert!(below_min_interval(StdDuration::from_secs(1)));
        assert!(below_min_interval(StdDuration::from_millis(4999)));
        assert!(!below_min_interval(StdDuration::from_secs(5)));
        assert!(!below_min_interval(StdDuration::from_secs(60)));
    }

    #[test]
    fn it_yields_ticks_at_the_interval() {
        let interval = StdDuration::from_millis(20);
        let started = Instant::now();

        let ticks = Ticker::new(interval).take(2).count();

        assert_eq!(ticks, 2);
        assert!(started.elapsed() >= interval * 2);
    }

    #[test]
    fn it_drops_missed_ticks() {
        let interval = StdDuration::from_millis(10);
        let mut ticker = Ticker::new(interval);

        thread::sleep(StdDuration::from_millis(35));
        let before = Instant::now();
        ticker.wait();

        assert!(before.elapsed() < interval);
        assert!(ticker.next > Instant::now());
        assert!(ticker.next <= Instant::now() + interval);
    }
}
