//! RSS 2.0 channel metadata.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("feed body is not valid UTF-8")]
    NotUtf8,
    #[error("feed body is not valid XML: {0}")]
    Xml(String),
    #[error("document has no rss channel")]
    NotAFeed,
}

/// What the feed endpoint reports about a fetched feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSummary {
    pub title: String,
    pub link: String,
    pub description: String,
    pub item_count: usize,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
}

/// Extract the channel title, link, description and item count.
pub fn parse_feed(body: &str) -> Result<FeedSummary, FeedError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut summary = FeedSummary::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut seen_channel = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FeedError::Xml(e.to_string()))?;
        match event {
            Event::Start(e) => {
                path.push(e.local_name().as_ref().to_vec());
                if in_channel(&path[..path.len() - 1]) {
                    if path[2] == b"item" {
                        summary.item_count += 1;
                    }
                } else if in_channel(&path) {
                    seen_channel = true;
                }
            }
            Event::Empty(e) => {
                if in_channel(&path) && e.local_name().as_ref() == b"item" {
                    summary.item_count += 1;
                }
            }
            Event::Text(t) => {
                if let Some(field) = channel_field(&path) {
                    let text = t.unescape().map_err(|e| FeedError::Xml(e.to_string()))?;
                    push_text(&mut summary, field, &text);
                }
            }
            Event::CData(c) => {
                if let Some(field) = channel_field(&path) {
                    let raw = c.into_inner();
                    push_text(&mut summary, field, &String::from_utf8_lossy(&raw));
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_channel {
        return Err(FeedError::NotAFeed);
    }
    Ok(summary)
}

fn in_channel(path: &[Vec<u8>]) -> bool {
    path.len() == 2 && path[0] == b"rss" && path[1] == b"channel"
}

fn channel_field(path: &[Vec<u8>]) -> Option<Field> {
    if path.len() != 3 || !in_channel(&path[..2]) {
        return None;
    }
    match path[2].as_slice() {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" => Some(Field::Description),
        _ => None,
    }
}

fn push_text(summary: &mut FeedSummary, field: Field, text: &str) {
    let target = match field {
        Field::Title => &mut summary.title,
        Field::Link => &mut summary.link,
        Field::Description => &mut summary.description,
    };
    target.push_str(text);
}
