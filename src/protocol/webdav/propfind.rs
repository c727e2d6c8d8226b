//! `PROPFIND` request body and multistatus response parsing.

use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{ReaderError, ReaderResult};

pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:getcontentlength/>
    <D:resourcetype/>
  </D:prop>
</D:propfind>"#;

/// One `<response>` of a multistatus document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropEntry {
    pub href: String,
    pub content_length: Option<u64>,
    pub is_collection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    ContentLength,
    Status,
}

/// Text of a general entity reference such as `amp` or `#x20`.
fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Append `raw`, resolving any entity references left in it.
fn push_unescaped(out: &mut String, raw: &str) {
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';').and_then(|end| Some((end, resolve_entity(&after[..end])?))) {
            Some((end, c)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
}

/// Parse a `207 Multi-Status` body. Properties are only taken from
/// `propstat` blocks whose status is 200.
pub fn parse_multistatus(xml: &str) -> ReaderResult<Vec<PropEntry>> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();

    let mut entry: Option<PropEntry> = None;
    let mut in_propstat = false;
    let mut prop_length = None;
    let mut prop_collection = false;
    let mut status = String::new();
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ReaderError::protocol(format!("malformed PROPFIND response: {e}")))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => entry = Some(PropEntry::default()),
                b"propstat" => {
                    in_propstat = true;
                    prop_length = None;
                    prop_collection = false;
                    status.clear();
                }
                b"href" if !in_propstat => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::ContentLength),
                b"status" if in_propstat => field = Some(Field::Status),
                b"collection" => prop_collection = true,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection" {
                    prop_collection = true;
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    push_unescaped(&mut text, &String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if field.is_some() {
                    if let Some(c) = resolve_entity(&String::from_utf8_lossy(&r)) {
                        text.push(c);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"href" | b"getcontentlength" | b"status" => {
                    let value = std::mem::take(&mut text);
                    let value = value.trim();
                    match (field.take(), entry.as_mut()) {
                        (Some(Field::Href), Some(entry)) => entry.href = value.to_string(),
                        (Some(Field::ContentLength), _) => prop_length = value.parse().ok(),
                        (Some(Field::Status), _) => status = value.to_string(),
                        _ => {}
                    }
                }
                b"propstat" => {
                    in_propstat = false;
                    // "HTTP/1.1 200 OK"
                    let ok = status.split_whitespace().nth(1) == Some("200");
                    if let (true, Some(entry)) = (ok, entry.as_mut()) {
                        entry.content_length = entry.content_length.or(prop_length);
                        entry.is_collection |= prop_collection;
                    }
                }
                b"response" => entries.extend(entry.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// Decoded path of an href, which may be absolute or a full URL.
fn href_path(href: &str) -> String {
    let path = match href.find("://") {
        Some(i) => href[i + 3..].find('/').map_or("/", |p| &href[i + 3 + p..]),
        None => href,
    };
    percent_decode_str(path)
        .decode_utf8_lossy()
        .trim_end_matches('/')
        .to_string()
}

/// Pick the entry for `target_path` (percent-encoded, as in the request URL).
///
/// A lone entry is taken as the target whatever its href, since some
/// servers report hrefs relative to a different root.
pub fn select_entry<'a>(entries: &'a [PropEntry], target_path: &str) -> Option<&'a PropEntry> {
    let target = href_path(target_path);
    entries
        .iter()
        .find(|e| href_path(&e.href) == target)
        .or(match entries {
            [only] => Some(only),
            _ => None,
        })
}
