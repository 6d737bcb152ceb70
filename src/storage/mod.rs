mod feeds;
mod follows;
mod posts;
mod preferences;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{
    CreatePostOutcome, DatabaseError, Feed, FeedFollow, FeedWithOwner, NewPost, Post, User,
};
