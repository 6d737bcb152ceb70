use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::util::decode_html_entities;

/// Maximum element nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 64;

/// Errors produced while turning a response body into a [`FetchedFeedDocument`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The body is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),
    /// The document ended with elements still open.
    #[error("Unexpected end of document")]
    UnexpectedEof,
    /// Well-formed XML without a `<channel>` element.
    #[error("Document has no <channel> element")]
    MissingChannel,
    /// Nesting deeper than [`MAX_DEPTH`].
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// A single `<item>` from an RSS channel.
///
/// Fields missing from the source are empty strings. `pub_date_raw` is kept
/// verbatim for the time normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date_raw: String,
}

/// Normalized result of fetching and parsing one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFeedDocument {
    pub channel_title: String,
    pub channel_description: String,
    /// Items in document order.
    pub items: Vec<FeedItem>,
}

/// Parses an RSS 2.0 document.
///
/// Only the direct children of `<channel>` and `<item>` are read, so nested
/// elements such as `<image><title>` do not leak into the channel title.
/// Namespaced elements (`<atom:link>`, `<dc:date>`) are ignored.
///
/// Text is decoded leniently: character references are resolved against the
/// full HTML entity table one at a time; a stray `&` or unknown entity stays
/// as written.
/// CDATA sections are taken literally. Titles and descriptions then get a
/// second round of entity decoding, since many feeds escape HTML twice.
///
/// # Errors
///
/// - [`ParseError::Xml`] for malformed markup
/// - [`ParseError::UnexpectedEof`] for truncated documents
/// - [`ParseError::MissingChannel`] when there is no `<channel>`
/// - [`ParseError::MaxDepthExceeded`] for pathologically nested input
pub fn parse_rss(bytes: &[u8]) -> Result<FetchedFeedDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut doc = FetchedFeedDocument::default();
    let mut item: Option<FeedItem> = None;
    let mut saw_channel = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"channel" => saw_channel = true,
                    b"item" => item = Some(FeedItem::default()),
                    _ => {}
                }
                stack.push(name);
                if stack.len() > MAX_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"channel" {
                    saw_channel = true;
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(done) = item.take() {
                        doc.items.push(done.finish());
                    }
                }
                stack.pop();
            }
            Ok(Event::Text(e)) => {
                if let Some(slot) = text_slot(&stack, &mut doc, item.as_mut()) {
                    let raw = String::from_utf8_lossy(&e);
                    slot.push_str(&decode_html_entities(&raw));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(slot) = text_slot(&stack, &mut doc, item.as_mut()) {
                    slot.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Xml(format!(
                    "at byte {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ParseError::UnexpectedEof);
    }
    if !saw_channel {
        return Err(ParseError::MissingChannel);
    }

    doc.channel_title = unescape_field(&doc.channel_title);
    doc.channel_description = unescape_field(&doc.channel_description);
    Ok(doc)
}

impl FeedItem {
    fn finish(self) -> Self {
        Self {
            title: unescape_field(&self.title),
            link: self.link.trim().to_string(),
            description: unescape_field(&self.description),
            pub_date_raw: self.pub_date_raw.trim().to_string(),
        }
    }
}

/// Picks the field that text at the current position belongs to.
fn text_slot<'a>(
    stack: &[Vec<u8>],
    doc: &'a mut FetchedFeedDocument,
    item: Option<&'a mut FeedItem>,
) -> Option<&'a mut String> {
    let [.., parent, leaf] = stack else {
        return None;
    };
    match (parent.as_slice(), item) {
        (b"item", Some(item)) => match leaf.as_slice() {
            b"title" => Some(&mut item.title),
            b"link" => Some(&mut item.link),
            b"description" => Some(&mut item.description),
            b"pubDate" => Some(&mut item.pub_date_raw),
            _ => None,
        },
        (b"channel", _) => match leaf.as_slice() {
            b"title" => Some(&mut doc.channel_title),
            b"description" => Some(&mut doc.channel_description),
            _ => None,
        },
        _ => None,
    }
}

fn unescape_field(s: &str) -> String {
    decode_html_entities(s.trim()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BOOT_DEV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <description>Recent content on Boot.dev Blog</description>
    <atom:link href="https://blog.boot.dev/index.xml" rel="self" type="application/rss+xml"/>
    <image>
      <title>Logo</title>
      <url>https://blog.boot.dev/logo.png</url>
    </image>
    <item>
      <title>The Zen of Proverbs</title>
      <link>https://blog.boot.dev/education/zen-of-proverbs/</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <description>20 rules of thumb</description>
    </item>
    <item>
      <title>Learn Go</title>
      <link>https://blog.boot.dev/golang/learn-go/</link>
      <pubDate>Tue, 03 Jan 2006 10:00:00 GMT</pubDate>
      <description>A course</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let doc = parse_rss(BOOT_DEV.as_bytes()).unwrap();
        assert_eq!(doc.channel_title, "Boot.dev Blog");
        assert_eq!(doc.channel_description, "Recent content on Boot.dev Blog");
        assert_eq!(
            doc.items,
            vec![
                FeedItem {
                    title: "The Zen of Proverbs".into(),
                    link: "https://blog.boot.dev/education/zen-of-proverbs/".into(),
                    description: "20 rules of thumb".into(),
                    pub_date_raw: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
                },
                FeedItem {
                    title: "Learn Go".into(),
                    link: "https://blog.boot.dev/golang/learn-go/".into(),
                    description: "A course".into(),
                    pub_date_raw: "Tue, 03 Jan 2006 10:00:00 GMT".into(),
                },
            ]
        );
    }

    #[test]
    fn test_double_encoded_entities_unescaped() {
        let xml = r#"<rss><channel>
            <title>Tom &amp;amp; Jerry</title>
            <description>It&amp;rsquo;s &lt;b&gt;bold&lt;/b&gt;</description>
            <item>
                <title>Q&amp;amp;A &amp;#8212; part 1</title>
                <link>https://example.com/a?x=1&amp;y=2</link>
                <description>&amp;lt;p&amp;gt;Hi&amp;lt;/p&amp;gt;</description>
            </item>
        </channel></rss>"#;
        let doc = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(doc.channel_title, "Tom & Jerry");
        assert_eq!(doc.channel_description, "It\u{2019}s <b>bold</b>");
        let item = &doc.items[0];
        assert_eq!(item.title, "Q&A \u{2014} part 1");
        assert_eq!(item.link, "https://example.com/a?x=1&y=2");
        assert_eq!(item.description, "<p>Hi</p>");
    }

    #[test]
    fn test_mixed_single_and_double_escaping() {
        let xml = r#"<rss><channel><title>News</title>
            <item><title>Tom &amp; Jerry&amp;#8217;s</title></item>
            <item><title>Q&amp;A: &amp;lt;script&amp;gt; tags</title></item>
            <item><title>AT&amp;T &amp;bogus; &amp;mdash; done</title></item>
        </channel></rss>"#;
        let doc = parse_rss(xml.as_bytes()).unwrap();
        let titles: Vec<&str> = doc.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Tom & Jerry\u{2019}s", "Q&A: <script> tags", "AT&T &bogus; \u{2014} done"]
        );
    }

    #[test]
    fn test_cdata_fields() {
        let xml = r#"<rss><channel><title><![CDATA[Caf&eacute; <News>]]></title>
            <item><title><![CDATA[Hello & goodbye]]></title>
            <link><![CDATA[https://example.com/p/1]]></link>
            <description><![CDATA[<p>Body</p>]]></description></item>
        </channel></rss>"#;
        let doc = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(doc.channel_title, "Caf\u{e9} <News>");
        assert_eq!(doc.items[0].title, "Hello & goodbye");
        assert_eq!(doc.items[0].link, "https://example.com/p/1");
        assert_eq!(doc.items[0].description, "<p>Body</p>");
    }

    #[test]
    fn test_stray_ampersand_kept() {
        let xml = "<rss><channel><title>AT&T News</title></channel></rss>";
        let doc = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(doc.channel_title, "AT&T News");
    }

    #[test]
    fn test_item_without_link_kept_empty() {
        let xml = "<rss><channel><item><title>No link</title></item></channel></rss>";
        let doc = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "No link");
        assert_eq!(doc.items[0].link, "");
        assert_eq!(doc.items[0].pub_date_raw, "");
    }

    #[test]
    fn test_whitespace_around_fields_trimmed() {
        let xml = "<rss><channel><item>
            <link>
                https://example.com/x
            </link>
            <pubDate>  Mon, 02 Jan 2006 15:04:05 -0700 </pubDate>
        </item></channel></rss>";
        let doc = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].link, "https://example.com/x");
        assert_eq!(doc.items[0].pub_date_raw, "Mon, 02 Jan 2006 15:04:05 -0700");
    }

    #[test]
    fn test_empty_channel() {
        let doc = parse_rss(b"<rss version=\"2.0\"><channel></channel></rss>").unwrap();
        assert_eq!(doc, FetchedFeedDocument::default());

        let doc = parse_rss(b"<rss><channel/></rss>").unwrap();
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_missing_channel() {
        assert_eq!(
            parse_rss(b"<html><body>Not a feed</body></html>"),
            Err(ParseError::MissingChannel)
        );
        assert_eq!(parse_rss(b""), Err(ParseError::MissingChannel));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            parse_rss(b"<rss><channel></rss>"),
            Err(ParseError::Xml(_))
        ));
        assert!(matches!(
            parse_rss(b"<not valid xml"),
            Err(ParseError::Xml(_) | ParseError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_truncated_document() {
        let truncated = b"<rss><channel><item><title>Cut off</title>";
        assert!(matches!(
            parse_rss(truncated),
            Err(ParseError::UnexpectedEof | ParseError::Xml(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut xml = String::from("<rss><channel>");
        for _ in 0..MAX_DEPTH {
            xml.push_str("<x>");
        }
        assert_eq!(
            parse_rss(xml.as_bytes()),
            Err(ParseError::MaxDepthExceeded(MAX_DEPTH))
        );
    }
}
