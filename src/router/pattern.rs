use std::fmt;

use regex::Regex;

use crate::router::RouteError;

/// A compiled path expression together with the text it was compiled from.
///
/// Equality is by pattern text only. The expression is anchored at both
/// ends, so a pattern has to match the whole normalized path.
#[derive(Clone)]
pub struct UriPattern {
    text: String,
    matcher: Regex,
}

impl UriPattern {
    /// `text` must already be normalized. Lowercasing turns `\D` into
    /// `\d`, so `Router` refuses uppercase escapes before normalizing.
    pub fn new(text: &str) -> Result<Self, RouteError> {
        let matcher =
            Regex::new(&format!("^(?:{})$", text)).map_err(|err| RouteError::InvalidPattern {
                pattern: text.to_string(),
                reason: err.to_string(),
            })?;

        Ok(Self {
            text: text.to_string(),
            matcher,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_match(&self, uri: &str) -> bool {
        self.matcher.is_match(uri)
    }
}

impl PartialEq for UriPattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for UriPattern {}

impl fmt::Debug for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UriPattern").field(&self.text).finish()
    }
}

impl fmt::Display for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
