use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

/// Parse a `Name: Value` string and add it to the HeaderMap
pub fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) {
    let Some((name, value)) = header_str.split_once(':') else {
        warn!(header = %header_str, "Invalid header format, expected 'Name: Value'");
        return;
    };
    let (name, value) = (name.trim(), value.trim());

    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        warn!(name = %name, "Invalid header name");
        return;
    };

    let Ok(header_value) = HeaderValue::from_str(value) else {
        warn!(name = %name, "Invalid header value");
        return;
    };

    debug!(name = %name, "Adding header");
    headers.insert(header_name, header_value);
}

/// Parse a collection of header strings and return a HeaderMap
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&[
            "Referer: https://example.com/watch".to_string(),
            "X-Token:abc:def".to_string(),
            "missing-colon".to_string(),
            "Bad Name: value".to_string(),
        ]);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["referer"], "https://example.com/watch");
        // Only the first colon separates name from value.
        assert_eq!(headers["x-token"], "abc:def");
    }
}
