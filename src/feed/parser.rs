use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Invalid RSS document: {0}")]
pub struct ParseError(String);

/// One `<item>` of a fetched document, fields kept as raw strings.
///
/// Missing elements decode as empty strings. `pub_date` is left unparsed;
/// the scraper applies its own strict format to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// A fetched and decoded feed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedDocument {
    pub title: String,
    /// Items in document order
    pub items: Vec<ScrapedItem>,
}

/// Decode an RSS 2.0 document (`<rss><channel>…</channel></rss>`).
///
/// Only the unprefixed channel `title` and the item `title`, `link`,
/// `description` and `pubDate` are read. Extension elements such as
/// `itunes:title` or `atom:link` are ignored. A field keeps its own
/// character data: markup nested inside it is skipped, and the text is
/// trimmed at both ends.
pub fn parse_feed(bytes: &[u8]) -> Result<ScrapedDocument, ParseError> {
    // SEC-002: quick-xml 0.37 never expands DOCTYPE entities; `unescape()`
    // resolves only the five predefined ones and rejects the rest.
    let mut reader = Reader::from_reader(bytes);
    let decoder = reader.decoder();
    let mut builder = DocumentBuilder::default();
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError(format!("{e} at byte {}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(e) => builder.start(e.name().as_ref()),
            Event::Empty(e) => {
                builder.start(e.name().as_ref());
                builder.end();
            }
            Event::End(_) => builder.end(),
            Event::Text(e) if builder.wants_text() => {
                let text = e.unescape().map_err(|e| ParseError(e.to_string()))?;
                builder.text(&text);
            }
            Event::CData(e) if builder.wants_text() => {
                let text = decoder
                    .decode(&e)
                    .map_err(|e| ParseError(e.to_string()))?;
                builder.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    builder.finish()
}

#[derive(Debug, Clone, Copy)]
enum Field {
    ChannelTitle,
    Title,
    Link,
    Description,
    PubDate,
}

/// Tracks where the reader is: root at depth 1, `<channel>` at depth 2,
/// its children at 3, item children at 4.
#[derive(Default)]
struct DocumentBuilder {
    doc: ScrapedDocument,
    depth: usize,
    in_channel: bool,
    seen_channel: bool,
    item: Option<ScrapedItem>,
    /// Field being collected and the depth of its element.
    field: Option<(Field, usize)>,
    text: String,
}

impl DocumentBuilder {
    fn start(&mut self, name: &[u8]) {
        self.depth += 1;
        if self.field.is_some() {
            return;
        }

        match (self.depth, self.item.is_some()) {
            (2, _) if name == b"channel" && !self.seen_channel => {
                self.in_channel = true;
                self.seen_channel = true;
            }
            (3, false) if self.in_channel => match name {
                b"title" => self.collect(Field::ChannelTitle),
                b"item" => self.item = Some(ScrapedItem::default()),
                _ => {}
            },
            (4, true) => {
                let field = match name {
                    b"title" => Field::Title,
                    b"link" => Field::Link,
                    b"description" => Field::Description,
                    b"pubDate" => Field::PubDate,
                    _ => return,
                };
                self.collect(field);
            }
            _ => {}
        }
    }

    fn collect(&mut self, field: Field) {
        self.field = Some((field, self.depth));
        self.text.clear();
    }

    fn wants_text(&self) -> bool {
        matches!(self.field, Some((_, depth)) if depth == self.depth)
    }

    fn text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn end(&mut self) {
        match self.field {
            Some((field, depth)) if depth == self.depth => {
                let value = self.text.trim().to_string();
                self.store(field, value);
                self.field = None;
            }
            Some(_) => {}
            None if self.in_channel && self.depth == 3 => {
                if let Some(item) = self.item.take() {
                    self.doc.items.push(item);
                }
            }
            None if self.in_channel && self.depth == 2 => self.in_channel = false,
            None => {}
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn store(&mut self, field: Field, value: String) {
        match (field, self.item.as_mut()) {
            (Field::ChannelTitle, _) => self.doc.title = value,
            (Field::Title, Some(item)) => item.title = value,
            (Field::Link, Some(item)) => item.link = value,
            (Field::Description, Some(item)) => item.description = value,
            (Field::PubDate, Some(item)) => item.pub_date = value,
            (_, None) => {}
        }
    }

    fn finish(self) -> Result<ScrapedDocument, ParseError> {
        if self.depth != 0 {
            return Err(ParseError("unexpected end of document".into()));
        }
        if !self.seen_channel {
            return Err(ParseError("missing <channel> element".into()));
        }
        Ok(self.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_items_in_document_order() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Channel</title>
    <link>https://example.com/</link>
    <description>Channel description</description>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <description>One</description>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <guid isPermaLink="false">1</guid>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/2</link>
      <pubDate>Tue, 03 Jan 2006 15:04:05 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.title, "Example Channel");
        assert_eq!(
            doc.items,
            vec![
                ScrapedItem {
                    title: "First".into(),
                    link: "https://example.com/1".into(),
                    description: "One".into(),
                    pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
                },
                ScrapedItem {
                    title: "Second".into(),
                    link: "https://example.com/2".into(),
                    description: String::new(),
                    pub_date: "Tue, 03 Jan 2006 15:04:05 +0000".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_channel() {
        let xml = r#"<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.title, "Empty");
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_parse_cdata_and_entities() {
        let xml = r#"<rss version="2.0"><channel>
<item>
  <title>Fish &amp; Chips</title>
  <link>https://example.com/fish</link>
  <description><![CDATA[<p>Hot</p>]]></description>
</item>
</channel></rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "Fish & Chips");
        assert_eq!(doc.items[0].description, "<p>Hot</p>");
        assert_eq!(doc.items[0].pub_date, "");
    }

    #[test]
    fn test_parse_malformed_xml() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }

    #[test]
    fn test_parse_missing_channel() {
        assert!(parse_feed(b"<rss version=\"2.0\"></rss>").is_err());
    }

    #[test]
    fn test_namespaced_duplicates_ignored() {
        let xml = r#"<rss version="2.0"
    xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
    xmlns:media="http://search.yahoo.com/mrss/"
    xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
  <title>Podcast</title>
  <atom:link href="https://example.com/feed" rel="self"/>
  <item>
    <title>Ep 1</title>
    <itunes:title>Episode One</itunes:title>
    <link>https://example.com/ep1</link>
    <atom:link href="https://example.com/ep1.json" rel="alternate"/>
    <description>Show notes</description>
    <media:description>Media notes</media:description>
    <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
  </item>
</channel></rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.title, "Podcast");
        assert_eq!(
            doc.items,
            vec![ScrapedItem {
                title: "Ep 1".into(),
                link: "https://example.com/ep1".into(),
                description: "Show notes".into(),
                pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
            }]
        );
    }

    #[test]
    fn test_inline_markup_in_description_is_skipped() {
        let xml = r#"<rss version="2.0"><channel>
<item>
  <title>Markup</title>
  <link>https://example.com/m</link>
  <description>plain <b>bold</b> text</description>
</item>
</channel></rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].description, "plain  text");
        assert_eq!(doc.items[0].link, "https://example.com/m");
    }

    #[test]
    fn test_field_text_is_trimmed() {
        let xml = r#"<rss><channel><item>
  <pubDate>
    Mon, 02 Jan 2006 15:04:05 -0700
  </pubDate>
</item></channel></rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].pub_date, "Mon, 02 Jan 2006 15:04:05 -0700");
    }

    #[test]
    fn test_nested_items_outside_channel_ignored() {
        let xml = r#"<rss><channel><title>T</title>
<image><title>Logo</title></image>
<item><title>Real</title></item>
</channel></rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.title, "T");
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "Real");
    }

    #[test]
    fn test_empty_item_elements() {
        let xml = r#"<rss><channel><item><title/><link>https://x/1</link></item><item/></channel></rss>"#;

        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].title, "");
        assert_eq!(doc.items[0].link, "https://x/1");
        assert_eq!(doc.items[1], ScrapedItem::default());
    }

    #[test]
    fn test_truncated_document_rejected() {
        assert!(parse_feed(b"<rss><channel><item><title>Cut").is_err());
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let xml = r#"<rss><channel><item><title>&xxe;</title></item></channel></rss>"#;
        assert!(parse_feed(xml.as_bytes()).is_err());
    }
}
