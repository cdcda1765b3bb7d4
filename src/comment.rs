//! Reading, stripping and writing `sourceMappingURL` reference comments.

use crate::sourcemap::DATA_URL_PREFIX;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

pub const SOURCE_MAPPING_URL: &str = "sourceMappingURL";

lazy_static! {
    static ref LINE_COMMENT: Regex =
        Regex::new(r"\n*//[@#]\s*sourceMappingURL=[^\n]+\s*$").expect("valid line comment regex");
    static ref BLOCK_COMMENT: Regex = Regex::new(r#"\n*/\*#?\s*sourceMappingURL=[^'"]+\s\*/\s*$"#)
        .expect("valid block comment regex");
}

/// Returns the raw (still percent-encoded) value of the last
/// `sourceMappingURL=` reference in `content`.
pub fn find_source_mapping_url(content: &str) -> Option<&str> {
    let marker = format!("{SOURCE_MAPPING_URL}=");
    let start = content.rfind(&marker)? + marker.len();
    let rest = &content[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let url = rest[..end].strip_suffix("*/").unwrap_or(&rest[..end]);

    if url.is_empty() { None } else { Some(url) }
}

pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

pub fn is_css(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
}

/// Removes a trailing reference comment. CSS only recognizes the block
/// form; everything else recognizes both.
pub fn strip_source_mapping_comment<'a>(content: &'a str, dest: &Path) -> std::borrow::Cow<'a, str> {
    if is_css(dest) {
        return BLOCK_COMMENT.replace(content, "");
    }

    match LINE_COMMENT.replace(content, "") {
        std::borrow::Cow::Borrowed(unchanged) => BLOCK_COMMENT.replace(unchanged, ""),
        stripped => stripped,
    }
}

/// Characters a URI keeps as-is besides the unreserved set.
const URI_RESERVED: &str = ";,/?:@&=+$!*'()#";

/// Percent-encodes a map URL the way a browser's `encodeURI` does: path
/// separators and URI punctuation survive. Data URLs are emitted as-is.
pub fn encode_url(url: &str) -> String {
    if url.starts_with(DATA_URL_PREFIX) {
        return url.to_string();
    }

    let mut out = String::with_capacity(url.len());
    let mut buf = [0u8; 4];
    for c in url.chars() {
        if URI_RESERVED.contains(c) {
            out.push(c);
        } else {
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

pub fn decode_url(url: &str) -> String {
    urlencoding::decode(url).map_or_else(|_| url.to_string(), std::borrow::Cow::into_owned)
}

/// Builds the comment appended after the content, including the
/// surrounding newlines.
pub fn source_mapping_comment(url: &str, dest: &Path) -> String {
    let url = encode_url(url);
    if is_css(dest) {
        format!("\n/*# {SOURCE_MAPPING_URL}={url} */\n")
    } else {
        format!("\n//# {SOURCE_MAPPING_URL}={url}\n")
    }
}
