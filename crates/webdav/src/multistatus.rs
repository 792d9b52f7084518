use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::{RemoteFile, WebDavError};

#[derive(Default)]
struct Entry {
    href: String,
    size: u64,
    collection: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Href,
    Length,
}

/// Parses a PROPFIND multistatus body. Namespace prefixes are ignored and
/// hrefs come back percent-decoded, host stripped.
pub fn parse_multistatus(xml: &str) -> Result<Vec<RemoteFile>, WebDavError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut files = Vec::new();
    let mut current: Option<Entry> = None;
    let mut field = Field::None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(Entry::default()),
                b"href" => field = Field::Href,
                b"getcontentlength" => field = Field::Length,
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.collection = true;
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|err| WebDavError::Xml(err.to_string()))?;
                if let Some(entry) = current.as_mut() {
                    match field {
                        Field::Href => entry.href.push_str(value.trim()),
                        Field::Length => entry.size = value.trim().parse().unwrap_or(0),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(entry) = current.take() {
                        if !entry.href.is_empty() {
                            files.push(to_remote_file(entry));
                        }
                    }
                }
                b"href" | b"getcontentlength" => field = Field::None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(WebDavError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(files)
}

fn to_remote_file(entry: Entry) -> RemoteFile {
    let path = normalize_href(&entry.href);
    let name = path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
        .to_string();
    RemoteFile {
        path,
        name,
        size: if entry.collection { 0 } else { entry.size },
        is_directory: entry.collection,
    }
}

pub(crate) fn normalize_href(href: &str) -> String {
    let without_host = match href.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|idx| &rest[idx..]).unwrap_or("/"),
        None => href,
    };
    let decoded = urlencoding::decode(without_host)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| without_host.to_string());
    trim_dir_path(&decoded)
}

/// Decoded path component of a base URL, empty when the URL has none.
pub(crate) fn base_path(url: &str) -> String {
    let path = normalize_href(url);
    if path == "/" {
        String::new()
    } else {
        path
    }
}

/// Makes a server path relative to the base path. Paths outside it are
/// returned unchanged.
pub(crate) fn strip_base(path: &str, base: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(base) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

/// Drops trailing slashes, keeping "/" for the root.
pub(crate) fn trim_dir_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
