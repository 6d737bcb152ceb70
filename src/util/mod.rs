//! Utility functions for common operations.
//!
//! - **Text**: HTML-entity decoding for feed fields and control-character
//!   stripping before feed text reaches the terminal
//! - **URL validation**: scheme and private-network checks for `addfeed`
//! - **Durations**: parsing `agg` intervals such as `30s` or `1m30s`

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_interval, IntervalError};
pub use text::{decode_html_entities, strip_control_chars};
pub use url_validator::{validate_feed_url, UrlValidationError};
