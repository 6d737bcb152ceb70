//! Command handlers behind the `gator` subcommands.
//!
//! Handlers write user-facing output to any `std::io::Write` so they can be
//! exercised against a buffer in tests. Text that originates from remote
//! feeds passes through [`strip_control_chars`] before it is printed.
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::feed::Fetcher;
use crate::scheduler::{CycleOutcome, CycleReport, Scheduler, SchedulerError};
use crate::storage::{Database, DatabaseError, User};
use crate::util::{strip_control_chars, validate_feed_url, UrlValidationError};

/// Posts shown by `browse` when no limit is given.
pub const DEFAULT_BROWSE_LIMIT: u32 = 2;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not logged in: run `gator register <name>` or `gator login <name>` first")]
    NotLoggedIn,
    #[error("current user '{0}' no longer exists: log in again")]
    StaleSession(String),
    #[error("user '{0}' is not registered")]
    UnknownUser(String),
    #[error("user '{0}' is already registered")]
    UserExists(String),
    #[error("no feed with url {0}")]
    UnknownFeed(String),
    #[error("a feed with url {0} already exists: use `gator follow {0}`")]
    FeedExists(String),
    #[error("already following {0}")]
    AlreadyFollowing(String),
    #[error("not following {0}")]
    NotFollowing(String),
    #[error("invalid feed url: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("limit must be greater than zero")]
    InvalidLimit,
    #[error("feed fetcher setup failed: {0}")]
    Fetcher(String),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// The logged-in user, for commands that act on behalf of one.
pub async fn require_user(db: &Database) -> Result<User, CommandError> {
    let name = db.current_user().await?.ok_or(CommandError::NotLoggedIn)?;
    db.get_user_by_name(&name)
        .await?
        .ok_or(CommandError::StaleSession(name))
}

// ============================================================================
// Users
// ============================================================================

pub async fn register<W: Write>(db: &Database, out: &mut W, name: &str) -> Result<(), CommandError> {
    let user = match db.create_user(name).await {
        Ok(user) => user,
        Err(DatabaseError::AlreadyExists(_)) => return Err(CommandError::UserExists(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    db.set_current_user(&user.name).await?;
    tracing::info!(user = %user.name, id = user.id, "Registered user");
    writeln!(out, "user '{}' registered and logged in", user.name)?;
    Ok(())
}

pub async fn login<W: Write>(db: &Database, out: &mut W, name: &str) -> Result<(), CommandError> {
    let user = db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(name.to_string()))?;
    db.set_current_user(&user.name).await?;
    writeln!(out, "logged in as '{}'", user.name)?;
    Ok(())
}

/// Deletes every user along with their feeds, follows and those feeds' posts.
pub async fn reset<W: Write>(db: &Database, out: &mut W) -> Result<(), CommandError> {
    let removed = db.reset_users().await?;
    tracing::info!(users = removed, "Reset database");
    writeln!(out, "database reset: removed {removed} user(s)")?;
    Ok(())
}

pub async fn users<W: Write>(db: &Database, out: &mut W) -> Result<(), CommandError> {
    let current = db.current_user().await?;
    for user in db.list_users().await? {
        if current.as_deref() == Some(user.name.as_str()) {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

// ============================================================================
// Feeds and follows
// ============================================================================

/// Adds a feed owned by the current user and follows it.
pub async fn add_feed<W: Write>(
    db: &Database,
    config: &Config,
    out: &mut W,
    name: &str,
    url: &str,
) -> Result<(), CommandError> {
    let user = require_user(db).await?;
    let url = url.trim();
    validate_feed_url(url, config.allow_private_hosts)?;

    let feed = match db.create_feed(name, url, user.id).await {
        Ok(feed) => feed,
        Err(DatabaseError::AlreadyExists(_)) => return Err(CommandError::FeedExists(url.to_string())),
        Err(e) => return Err(e.into()),
    };
    db.create_feed_follow(user.id, feed.id).await?;

    tracing::info!(feed = %feed.url, id = feed.id, owner = %user.name, "Added feed");
    writeln!(out, "added feed '{}' ({}) for {}", feed.name, feed.url, user.name)?;
    Ok(())
}

pub async fn feeds<W: Write>(db: &Database, out: &mut W) -> Result<(), CommandError> {
    for feed in db.list_feeds_with_owner().await? {
        writeln!(out, "* '{}' ({}) - {}", feed.name, feed.url, feed.owner_name)?;
    }
    Ok(())
}

pub async fn follow<W: Write>(db: &Database, out: &mut W, url: &str) -> Result<(), CommandError> {
    let user = require_user(db).await?;
    let url = url.trim();
    let feed = db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| CommandError::UnknownFeed(url.to_string()))?;

    match db.create_feed_follow(user.id, feed.id).await {
        Ok(_) => {}
        Err(DatabaseError::AlreadyExists(_)) => {
            return Err(CommandError::AlreadyFollowing(feed.name))
        }
        Err(e) => return Err(e.into()),
    }
    writeln!(out, "{} is now following '{}'", user.name, feed.name)?;
    Ok(())
}

pub async fn following<W: Write>(db: &Database, out: &mut W) -> Result<(), CommandError> {
    let user = require_user(db).await?;
    for follow in db.get_feed_follows_for_user(user.id).await? {
        writeln!(out, "* {}", follow.feed_name)?;
    }
    Ok(())
}

pub async fn unfollow<W: Write>(db: &Database, out: &mut W, url: &str) -> Result<(), CommandError> {
    let user = require_user(db).await?;
    let url = url.trim();
    match db.delete_feed_follow_by_url(user.id, url).await {
        Ok(()) => {}
        Err(DatabaseError::NotFound(_)) => return Err(CommandError::NotFollowing(url.to_string())),
        Err(e) => return Err(e.into()),
    }
    writeln!(out, "{} unfollowed {}", user.name, url)?;
    Ok(())
}

// ============================================================================
// Posts
// ============================================================================

/// Prints the newest posts from the current user's followed feeds.
pub async fn browse<W: Write>(
    db: &Database,
    out: &mut W,
    limit: Option<u32>,
) -> Result<(), CommandError> {
    let limit = limit.unwrap_or(DEFAULT_BROWSE_LIMIT);
    if limit == 0 {
        return Err(CommandError::InvalidLimit);
    }
    let user = require_user(db).await?;

    let posts = db.get_posts_for_user(user.id, limit).await?;
    if posts.is_empty() {
        writeln!(out, "no posts yet: follow some feeds and run `gator agg`")?;
        return Ok(());
    }

    for post in posts {
        writeln!(out, "Title: {}", strip_control_chars(&post.title))?;
        writeln!(out, "Link: {}", strip_control_chars(&post.url))?;
        writeln!(
            out,
            "Published At: {}",
            post.published_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        if !post.description.is_empty() {
            writeln!(out, "{}", strip_control_chars(&post.description))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

// ============================================================================
// Aggregator
// ============================================================================

/// Runs the scheduler every `interval` until `shutdown` resolves, printing
/// the titles of new posts as they arrive.
pub async fn agg<W, F>(
    db: &Database,
    config: &Config,
    out: &mut W,
    interval: Duration,
    shutdown: F,
) -> Result<(), CommandError>
where
    W: Write,
    F: Future<Output = ()>,
{
    let fetcher = Fetcher::from_config(config).map_err(|e| CommandError::Fetcher(e.to_string()))?;
    writeln!(out, "collecting feeds every {}", humanize(interval))?;
    out.flush()?;

    let (tx, mut rx) = mpsc::channel::<CycleReport>(16);
    let scheduler = Scheduler::new(Arc::new(db.clone()), fetcher).with_reports(tx);

    // The scheduler owns the sender; dropping it ends the printer below.
    let run = async move { scheduler.run_forever(interval, shutdown).await };
    let print = async {
        while let Some(report) = rx.recv().await {
            if let Err(e) = print_report(&mut *out, &report) {
                tracing::warn!(error = %e, "Failed to print cycle report");
            }
        }
    };

    let (result, ()) = tokio::join!(run, print);
    result?;
    Ok(())
}

fn print_report<W: Write>(out: &mut W, report: &CycleReport) -> std::io::Result<()> {
    let Some(feed) = &report.feed else {
        return Ok(());
    };
    match &report.outcome {
        CycleOutcome::Idle => {}
        CycleOutcome::FetchFailed(e) => {
            let what = if e.is_network() { "fetch failed" } else { "not a readable feed" };
            writeln!(out, "{}: {}: {}", strip_control_chars(&feed.name), what, e)?;
        }
        CycleOutcome::Ingested(tally) => {
            if !tally.created.is_empty() {
                writeln!(out, "{}:", strip_control_chars(&feed.name))?;
                for title in &tally.created {
                    writeln!(out, "* {}", strip_control_chars(title))?;
                }
            }
        }
    }
    out.flush()
}

fn humanize(interval: Duration) -> String {
    let millis = interval.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = interval.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, 0) => format!("{m}m"),
        (0, m, s) => format!("{m}m{s}s"),
        (h, 0, 0) => format!("{h}h"),
        (h, m, s) => format!("{h}h{m}m{s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_register_sets_current_user() {
        let db = test_db().await;
        let mut out = Vec::new();

        register(&db, &mut out, "kahya").await.unwrap();

        assert_eq!(db.current_user().await.unwrap().as_deref(), Some("kahya"));
        assert_eq!(output(out), "user 'kahya' registered and logged in\n");
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let db = test_db().await;
        register(&db, &mut Vec::new(), "kahya").await.unwrap();

        let err = register(&db, &mut Vec::new(), "kahya").await.unwrap_err();
        assert!(matches!(err, CommandError::UserExists(name) if name == "kahya"));
    }

    #[tokio::test]
    async fn test_login_requires_registered_user() {
        let db = test_db().await;
        let err = login(&db, &mut Vec::new(), "ghost").await.unwrap_err();
        assert!(matches!(err, CommandError::UnknownUser(_)));

        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        register(&db, &mut Vec::new(), "holgith").await.unwrap();
        login(&db, &mut Vec::new(), "kahya").await.unwrap();
        assert_eq!(db.current_user().await.unwrap().as_deref(), Some("kahya"));
    }

    #[tokio::test]
    async fn test_users_marks_current() {
        let db = test_db().await;
        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        register(&db, &mut Vec::new(), "holgith").await.unwrap();

        let mut out = Vec::new();
        users(&db, &mut out).await.unwrap();
        assert_eq!(output(out), "* holgith (current)\n* kahya\n");
    }

    #[tokio::test]
    async fn test_logged_in_commands_require_session() {
        let db = test_db().await;
        let config = Config::default();

        let err = following(&db, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::NotLoggedIn));

        let err = add_feed(&db, &config, &mut Vec::new(), "HN", "https://news.ycombinator.com/rss")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_reset_invalidates_session() {
        let db = test_db().await;
        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        reset(&db, &mut Vec::new()).await.unwrap();

        assert!(db.list_users().await.unwrap().is_empty());
        let err = browse(&db, &mut Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, CommandError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_stale_session_reported() {
        let db = test_db().await;
        db.set_current_user("deleted").await.unwrap();
        let err = following(&db, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::StaleSession(name) if name == "deleted"));
    }

    #[tokio::test]
    async fn test_add_feed_follows_it() {
        let db = test_db().await;
        let config = Config::default();
        register(&db, &mut Vec::new(), "kahya").await.unwrap();

        let mut out = Vec::new();
        add_feed(&db, &config, &mut out, "Hacker News", "https://news.ycombinator.com/rss")
            .await
            .unwrap();
        assert_eq!(
            output(out),
            "added feed 'Hacker News' (https://news.ycombinator.com/rss) for kahya\n"
        );

        let mut out = Vec::new();
        following(&db, &mut out).await.unwrap();
        assert_eq!(output(out), "* Hacker News\n");

        let mut out = Vec::new();
        feeds(&db, &mut out).await.unwrap();
        assert_eq!(
            output(out),
            "* 'Hacker News' (https://news.ycombinator.com/rss) - kahya\n"
        );
    }

    #[tokio::test]
    async fn test_add_feed_rejects_bad_and_duplicate_urls() {
        let db = test_db().await;
        let config = Config::default();
        register(&db, &mut Vec::new(), "kahya").await.unwrap();

        let err = add_feed(&db, &config, &mut Vec::new(), "Local", "http://127.0.0.1/rss")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidUrl(_)));

        add_feed(&db, &config, &mut Vec::new(), "Lanes", "https://wagslane.dev/index.xml")
            .await
            .unwrap();
        let err = add_feed(&db, &config, &mut Vec::new(), "Again", "https://wagslane.dev/index.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::FeedExists(_)));
    }

    #[tokio::test]
    async fn test_follow_unfollow() {
        let db = test_db().await;
        let config = Config::default();
        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        add_feed(&db, &config, &mut Vec::new(), "TechCrunch", "https://techcrunch.com/feed/")
            .await
            .unwrap();
        register(&db, &mut Vec::new(), "holgith").await.unwrap();

        let err = follow(&db, &mut Vec::new(), "https://nowhere.example/rss")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownFeed(_)));

        let mut out = Vec::new();
        follow(&db, &mut out, "https://techcrunch.com/feed/").await.unwrap();
        assert_eq!(output(out), "holgith is now following 'TechCrunch'\n");

        let err = follow(&db, &mut Vec::new(), "https://techcrunch.com/feed/")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::AlreadyFollowing(_)));

        unfollow(&db, &mut Vec::new(), "https://techcrunch.com/feed/")
            .await
            .unwrap();
        let mut out = Vec::new();
        following(&db, &mut out).await.unwrap();
        assert_eq!(output(out), "");

        let err = unfollow(&db, &mut Vec::new(), "https://techcrunch.com/feed/")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFollowing(_)));
    }

    #[tokio::test]
    async fn test_browse_newest_first_with_limit() {
        let db = test_db().await;
        let config = Config::default();
        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        add_feed(&db, &config, &mut Vec::new(), "Blog", "https://blog.example/rss")
            .await
            .unwrap();
        let feed = db.get_feed_by_url("https://blog.example/rss").await.unwrap().unwrap();

        for (day, title) in [(1, "Old"), (3, "Newest"), (2, "Middle")] {
            let url = format!("https://blog.example/{day}");
            let description = format!("{title} body");
            db.create_post(&crate::storage::NewPost {
                feed_id: feed.id,
                title,
                url: &url,
                description: &description,
                published_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        }

        let mut out = Vec::new();
        browse(&db, &mut out, None).await.unwrap();
        assert_eq!(
            output(out),
            "Title: Newest\nLink: https://blog.example/3\nPublished At: 2024-05-03 12:00:00 UTC\nNewest body\n\n\
             Title: Middle\nLink: https://blog.example/2\nPublished At: 2024-05-02 12:00:00 UTC\nMiddle body\n\n"
        );

        let mut out = Vec::new();
        browse(&db, &mut out, Some(10)).await.unwrap();
        assert_eq!(output(out).matches("Title: ").count(), 3);

        let err = browse(&db, &mut Vec::new(), Some(0)).await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidLimit));
    }

    #[tokio::test]
    async fn test_browse_strips_terminal_escapes() {
        let db = test_db().await;
        let config = Config::default();
        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        add_feed(&db, &config, &mut Vec::new(), "Blog", "https://blog.example/rss")
            .await
            .unwrap();
        let feed = db.get_feed_by_url("https://blog.example/rss").await.unwrap().unwrap();
        db.create_post(&crate::storage::NewPost {
            feed_id: feed.id,
            title: "\x1b[2JGotcha",
            url: "https://blog.example/x",
            description: "",
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        })
        .await
        .unwrap();

        let mut out = Vec::new();
        browse(&db, &mut out, None).await.unwrap();
        let text = output(out);
        assert!(text.starts_with("Title: Gotcha\n"));
        assert!(!text.contains('\x1b'));
    }

    #[tokio::test]
    async fn test_agg_prints_new_titles_then_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<rss><channel><title>Local</title>\
                 <item><title>Fresh &amp;amp; new</title><link>https://local.example/1</link>\
                 <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate></item>\
                 </channel></rss>",
            ))
            .mount(&server)
            .await;

        let db = test_db().await;
        let config = Config {
            allow_private_hosts: true,
            ..Config::default()
        };
        register(&db, &mut Vec::new(), "kahya").await.unwrap();
        add_feed(&db, &config, &mut Vec::new(), "Local", &format!("{}/rss", server.uri()))
            .await
            .unwrap();

        // Stop once the first cycle has had time to finish
        let shutdown = tokio::time::sleep(Duration::from_millis(1500));
        let mut out = Vec::new();
        agg(&db, &config, &mut out, Duration::from_secs(60), shutdown)
            .await
            .unwrap();

        assert_eq!(
            output(out),
            "collecting feeds every 1m\nLocal:\n* Fresh & new\n"
        );
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[test]
    fn test_report_separates_unreachable_from_unreadable() {
        use crate::feed::{FetchError, ParseError};
        use crate::scheduler::FeedRef;

        let feed = FeedRef {
            id: 1,
            name: "Local".into(),
            url: "http://127.0.0.1/feed".into(),
        };
        let mut out = Vec::new();
        for err in [FetchError::HttpStatus(503), FetchError::Parse(ParseError::MissingChannel)] {
            let report = CycleReport {
                feed: Some(feed.clone()),
                outcome: CycleOutcome::FetchFailed(err),
            };
            print_report(&mut out, &report).unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Local: fetch failed: "), "{}", lines[0]);
        assert!(lines[1].starts_with("Local: not a readable feed: "), "{}", lines[1]);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_millis(1500)), "1500ms");
        assert_eq!(humanize(Duration::from_secs(30)), "30s");
        assert_eq!(humanize(Duration::from_secs(90)), "1m30s");
        assert_eq!(humanize(Duration::from_secs(3600)), "1h");
        assert_eq!(humanize(Duration::from_secs(3660)), "1h1m0s");
    }
}
