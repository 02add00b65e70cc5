use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Location of the OCF container document inside every EPUB.
pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";

regex!(ROOTFILE_REGEX, r#"(?is)<(?:[\w-]+:)?rootfile\b[^>]*\bfull-path\s*=\s*["']([^"']+)["']"#);
regex!(METADATA_REGEX, r"(?is)<(?:[\w-]+:)?metadata\b[^>]*>(.*?)</(?:[\w-]+:)?metadata>");
regex!(TITLE_REGEX, r"(?is)<(?:[\w-]+:)?title\b[^>]*>(.*?)</(?:[\w-]+:)?title>");
regex!(CREATOR_REGEX, r"(?is)<(?:[\w-]+:)?creator\b[^>]*>(.*?)</(?:[\w-]+:)?creator>");
regex!(PUBLISHER_REGEX, r"(?is)<(?:[\w-]+:)?publisher\b[^>]*>(.*?)</(?:[\w-]+:)?publisher>");
regex!(TAG_REGEX, r"(?s)<[^>]+>");
regex!(ENTITY_REGEX, r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos);");
regex!(WHITESPACE_REGEX, r"\s+");
