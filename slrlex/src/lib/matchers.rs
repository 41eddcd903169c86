use regex::{self, Regex, RegexBuilder};

/// Recognise rule text at a fixed position in the input.
pub trait Matcher: Send + Sync {
    /// If this matcher matches a prefix of `input[off..]`, return the match's length in bytes.
    /// Matches must start at exactly `off`.
    fn find(&self, input: &str, off: usize) -> Option<usize>;
}

/// Matches a literal string.
pub struct StrMatcher {
    s: String,
}

impl StrMatcher {
    pub fn new(s: &str) -> StrMatcher {
        StrMatcher { s: s.to_string() }
    }
}

impl Matcher for StrMatcher {
    fn find(&self, input: &str, off: usize) -> Option<usize> {
        if input[off..].starts_with(&self.s) {
            Some(self.s.len())
        } else {
            None
        }
    }
}

/// Matches a regular expression, anchored so that it can only match at the position the lexer
/// has reached.
pub struct RegexMatcher {
    re: Regex,
}

impl RegexMatcher {
    pub fn new(re_str: &str) -> Result<RegexMatcher, regex::Error> {
        let re = RegexBuilder::new(&format!("\\A(?:{})", re_str))
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()?;
        Ok(RegexMatcher { re })
    }
}

impl Matcher for RegexMatcher {
    fn find(&self, input: &str, off: usize) -> Option<usize> {
        self.re.find(&input[off..]).map(|m| m.end())
    }
}

#[cfg(test)]
mod test {
    use super::{Matcher, RegexMatcher, StrMatcher};

    #[test]
    fn test_str_matcher() {
        let m = StrMatcher::new("if");
        assert_eq!(m.find("if x", 0), Some(2));
        assert_eq!(m.find("xif", 0), None);
        assert_eq!(m.find("xif", 1), Some(2));
        assert_eq!(m.find("i", 0), None);
    }

    #[test]
    fn test_regex_matcher() {
        let m = RegexMatcher::new("[0-9]+").unwrap();
        assert_eq!(m.find("123x", 0), Some(3));
        assert_eq!(m.find("x123", 0), None);
        assert_eq!(m.find("x123", 1), Some(3));
        assert!(RegexMatcher::new("[").is_err());
    }

    #[test]
    fn test_regex_matcher_multiline() {
        // `.` matches newlines, so a single rule can span lines.
        let m = RegexMatcher::new("'.*?'").unwrap();
        assert_eq!(m.find("'a\nb' x", 0), Some(5));
    }
}
