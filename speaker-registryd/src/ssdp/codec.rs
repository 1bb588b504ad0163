//! SSDP search request building and response parsing.
//!
//! Responses are HTTP-shaped header blocks carried in a single datagram.
//! Devices in the wild omit the final blank line or use bare `\n` line
//! endings, so the parser normalizes both before reading headers.

use std::net::SocketAddr;
use std::sync::OnceLock;
use regex::Regex;
use thiserror::Error;

/// Canonical end-of-headers marker.
const END_OF_HEADERS: &[u8] = b"\r\n\r\n";

/// Returned by [`Service::max_age`] when no `max-age` directive is present.
pub const MAX_AGE_UNSET: i64 = -1;

#[derive(Debug, Error)]
pub enum ParseError {
    /// Payload does not start with `HTTP`; not a response to our search.
    #[error("payload is not an HTTP response")]
    NotResponse,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A service found by an SSDP search.
#[derive(Debug, Clone)]
pub struct Service {
    /// Value of `ST`
    pub search_target: String,
    /// Value of `USN`
    pub usn: String,
    /// Value of `LOCATION`, the descriptor URL
    pub location: String,
    /// Value of `SERVER`
    pub server: String,
    headers: Vec<(String, String)>,
    max_age: OnceLock<i64>,
}

impl Service {
    /// Case-insensitive lookup of the first header with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `max-age` from `CACHE-CONTROL`, or [`MAX_AGE_UNSET`]. Computed once.
    pub fn max_age(&self) -> i64 {
        *self.max_age.get_or_init(|| {
            self.header("CACHE-CONTROL")
                .map(extract_max_age)
                .unwrap_or(MAX_AGE_UNSET)
        })
    }
}

fn max_age_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bmax-age\s*=\s*(\d+)\b").ok())
        .as_ref()
}

fn extract_max_age(value: &str) -> i64 {
    max_age_regex()
        .and_then(|re| re.captures(value))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .map(i64::from)
        .unwrap_or(MAX_AGE_UNSET)
}

/// Build an M-SEARCH request for `search_target`.
pub fn build_search(destination: SocketAddr, search_target: &str, wait_secs: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        destination, wait_secs, search_target
    )
}

/// Parse a search response or advertisement datagram.
pub fn parse_response(data: &[u8]) -> Result<Service, ParseError> {
    if !data.starts_with(b"HTTP") {
        return Err(ParseError::NotResponse);
    }

    let mut buf = data.to_vec();
    if !buf.ends_with(END_OF_HEADERS) {
        buf.extend_from_slice(END_OF_HEADERS);
    }
    let text = String::from_utf8_lossy(&buf);

    let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let status_line = lines.next().unwrap_or_default();
    parse_status_line(status_line)?;

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        // obsolete line folding
        if line.starts_with(' ') || line.starts_with('\t') {
            match headers.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                    continue;
                }
                None => {
                    return Err(ParseError::Malformed(
                        "continuation before first header".to_string(),
                    ))
                }
            }
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::Malformed(format!("header without colon: {:?}", line)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::Malformed("empty header name".to_string()));
        }
        headers.push((key.to_string(), value.trim().to_string()));
    }

    let get = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    };

    Ok(Service {
        search_target: get("ST"),
        usn: get("USN"),
        location: get("LOCATION"),
        server: get("SERVER"),
        headers,
        max_age: OnceLock::new(),
    })
}

fn parse_status_line(line: &str) -> Result<u16, ParseError> {
    let mut parts = line.split_whitespace();
    let proto = parts.next().unwrap_or_default();
    if !proto.starts_with("HTTP/") {
        return Err(ParseError::Malformed(format!("bad status line: {:?}", line)));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ParseError::Malformed(format!("bad status code: {:?}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
        CACHE-CONTROL: max-age=1800\r\n\
        EXT:\r\n\
        LOCATION: http://192.168.1.20:49154/MediaRenderer/desc.xml\r\n\
        SERVER: Network_Module/1.0 UPnP/1.0\r\n\
        ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
        USN: uuid:9ab0c000-f668-11de-9976-00a0de000001::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
        \r\n";

    #[test]
    fn test_build_search() {
        let dest: SocketAddr = "239.255.255.250:1900".parse().unwrap();
        let msg = build_search(dest, "urn:schemas-upnp-org:device:MediaRenderer:1", 3);
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(msg.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(msg.contains("MX: 3\r\n"));
        assert!(msg.contains("ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n"));
        assert!(msg.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_parse_response() {
        let service = parse_response(RESPONSE.as_bytes()).unwrap();
        assert_eq!(service.search_target, "urn:schemas-upnp-org:device:MediaRenderer:1");
        assert!(service.usn.starts_with("uuid:9ab0c000"));
        assert_eq!(service.location, "http://192.168.1.20:49154/MediaRenderer/desc.xml");
        assert_eq!(service.server, "Network_Module/1.0 UPnP/1.0");
        assert_eq!(service.header("ext"), Some(""));
        assert_eq!(service.headers.len(), 6);
    }

    #[test]
    fn test_missing_trailing_blank_line_parses_identically() {
        let truncated = RESPONSE.strip_suffix("\r\n").unwrap();
        let full = parse_response(RESPONSE.as_bytes()).unwrap();
        let short = parse_response(truncated.as_bytes()).unwrap();

        assert_eq!(full.search_target, short.search_target);
        assert_eq!(full.usn, short.usn);
        assert_eq!(full.location, short.location);
        assert_eq!(full.server, short.server);
        assert_eq!(full.headers, short.headers);

        let no_crlf_at_all = RESPONSE.strip_suffix("\r\n\r\n").unwrap();
        let shortest = parse_response(no_crlf_at_all.as_bytes()).unwrap();
        assert_eq!(full.headers, shortest.headers);
    }

    #[test]
    fn test_bare_newlines_accepted() {
        let response = RESPONSE.replace("\r\n", "\n");
        let service = parse_response(response.as_bytes()).unwrap();
        assert_eq!(service.location, "http://192.168.1.20:49154/MediaRenderer/desc.xml");
        assert_eq!(service.max_age(), 1800);
    }

    #[test]
    fn test_non_http_payload_is_not_a_response() {
        let notify = b"NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\n\r\n";
        assert!(matches!(parse_response(notify), Err(ParseError::NotResponse)));

        let msearch = b"M-SEARCH * HTTP/1.1\r\n\r\n";
        assert!(matches!(parse_response(msearch), Err(ParseError::NotResponse)));

        assert!(matches!(parse_response(b""), Err(ParseError::NotResponse)));
        assert!(matches!(parse_response(b"foo"), Err(ParseError::NotResponse)));
    }

    #[test]
    fn test_garbage_after_prefix_is_malformed() {
        let garbage = b"HTTPX\r\nno colon here\r\n\r\n";
        assert!(matches!(parse_response(garbage), Err(ParseError::Malformed(_))));

        let bad_header = b"HTTP/1.1 200 OK\r\nno colon here\r\n\r\n";
        assert!(matches!(parse_response(bad_header), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = "HTTP/1.1 200 OK\r\nlocation: http://a/\r\nusn: uuid:x\r\n\r\n";
        let service = parse_response(response.as_bytes()).unwrap();
        assert_eq!(service.location, "http://a/");
        assert_eq!(service.usn, "uuid:x");
        assert_eq!(service.header("LOCATION"), Some("http://a/"));
    }

    #[test]
    fn test_max_age_extraction() {
        assert_eq!(extract_max_age("max-age=120"), 120);
        assert_eq!(extract_max_age("no-cache, max-age = 60"), 60);
        assert_eq!(extract_max_age("no-cache"), MAX_AGE_UNSET);
        assert_eq!(extract_max_age(""), MAX_AGE_UNSET);
    }

    #[test]
    fn test_max_age_missing_header() {
        let response = "HTTP/1.1 200 OK\r\nUSN: uuid:x\r\n\r\n";
        let service = parse_response(response.as_bytes()).unwrap();
        assert_eq!(service.max_age(), MAX_AGE_UNSET);
    }

    #[test]
    fn test_max_age_is_memoized() {
        let service = parse_response(RESPONSE.as_bytes()).unwrap();
        assert!(service.max_age.get().is_none());
        assert_eq!(service.max_age(), 1800);
        assert_eq!(service.max_age.get(), Some(&1800));
        assert_eq!(service.max_age(), 1800);
    }
}
