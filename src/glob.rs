//! Shell-style glob patterns for `delete`
//!
//! Supported syntax: `?` (one character), `*` (any run without `/`), `**`
//! (any run), `[abc]`/`[!abc]`/`[^abc]` sets with ranges, `{a,b}` groups
//! (nestable) and `\` escapes. Patterns are matched against whole names.

use crate::error::CommandError;
use regex::Regex;

/// Compile a glob into an anchored regex.
pub fn compile(glob: &str) -> Result<Regex, CommandError> {
    Regex::new(&to_regex(glob)).map_err(|source| CommandError::Pattern {
        pattern: glob.to_string(),
        source,
    })
}

/// Translate a glob into anchored regex source.
pub fn to_regex(glob: &str) -> String {
    let mut t = Translator {
        glob: glob.chars().collect(),
        pos: 0,
        out: String::from("^"),
    };
    while t.pos < t.glob.len() {
        t.terms(false);
    }
    t.out.push('$');
    t.out
}

struct Translator {
    glob: Vec<char>,
    pos: usize,
    out: String,
}

impl Translator {
    fn peek(&self) -> Option<char> {
        self.glob.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.glob.get(self.pos + ahead).copied()
    }

    fn terms(&mut self, in_group: bool) {
        while let Some(c) = self.peek() {
            if in_group && (c == ',' || c == '}') {
                break;
            }
            match c {
                '[' => self.set(),
                '{' => self.group(),
                '?' | '*' => self.wildcard(),
                _ => {
                    let mut c = c;
                    if c == '\\' {
                        if let Some(next) = self.peek_at(1) {
                            self.pos += 1;
                            c = next;
                        }
                    }
                    self.pos += 1;
                    self.out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
                }
            }
        }
    }

    /// A run of `?` and `*`, or a `**`.
    fn wildcard(&mut self) {
        let mut min = 0usize;
        let mut unbounded = false;

        if self.peek() == Some('*') && self.peek_at(1) == Some('*') {
            self.out.push('.');
            while self.peek() == Some('*') {
                self.pos += 1;
            }
        } else {
            self.out.push_str("[^/]");
            loop {
                match self.peek() {
                    Some('?') => min += 1,
                    Some('*') if self.peek_at(1) == Some('*') => break,
                    Some('*') => unbounded = true,
                    _ => break,
                }
                self.pos += 1;
            }
        }

        match (min, unbounded) {
            (0, _) => self.out.push('*'),
            (1, true) => self.out.push('+'),
            (1, false) => {}
            (n, true) => self.out.push_str(&format!("{{{n},}}")),
            (n, false) => self.out.push_str(&format!("{{{n}}}")),
        }
    }

    /// A `[...]` character set; an unterminated set runs to the end.
    fn set(&mut self) {
        self.out.push('[');
        self.pos += 1;
        if matches!(self.peek(), Some('^' | '!')) {
            self.out.push('^');
            self.pos += 1;
        }
        while let Some(mut c) = self.peek() {
            self.pos += 1;
            if c == ']' {
                break;
            }
            if c != '-' {
                if c == '\\' {
                    if let Some(next) = self.peek() {
                        self.pos += 1;
                        c = next;
                    }
                }
                if "]\\-[&~^".contains(c) {
                    self.out.push('\\');
                }
            }
            self.out.push(c);
        }
        self.out.push(']');
    }

    /// A `{a,b,...}` alternation.
    fn group(&mut self) {
        self.out.push('(');
        self.pos += 1;
        while let Some(c) = self.peek() {
            match c {
                ',' => {
                    self.out.push('|');
                    self.pos += 1;
                }
                '}' => {
                    self.pos += 1;
                    break;
                }
                _ => self.terms(true),
            }
        }
        self.out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(glob: &str, name: &str) -> bool {
        compile(glob).unwrap().is_match(name)
    }

    #[test]
    fn test_translation() {
        assert_eq!(to_regex("G1"), "^G1$");
        assert_eq!(to_regex("G*"), "^G[^/]*$");
        assert_eq!(to_regex("G?"), "^G[^/]$");
        assert_eq!(to_regex("G??"), "^G[^/]{2}$");
        assert_eq!(to_regex("G?*"), "^G[^/]+$");
        assert_eq!(to_regex("**"), "^.*$");
        assert_eq!(to_regex("{M,L}[1-3]"), "^(M|L)[1-3]$");
        assert_eq!(to_regex("a.b"), "^a\\.b$");
    }

    #[test]
    fn test_star_matches_whole_name() {
        assert!(matches("G*", "G1"));
        assert!(matches("G*", "G22"));
        assert!(matches("G*", "G"));
        assert!(!matches("G*", "MG1"));
        assert!(!matches("G1", "G10"));
    }

    #[test]
    fn test_question_marks() {
        assert!(matches("G?", "G5"));
        assert!(!matches("G?", "G15"));
        assert!(matches("G??", "G15"));
        assert!(matches("G?*", "G15"));
        assert!(!matches("G?*", "G"));
    }

    #[test]
    fn test_sets() {
        assert!(matches("M[1-3]", "M2"));
        assert!(!matches("M[1-3]", "MR"));
        assert!(matches("M[!1-3]", "MR"));
        assert!(matches("M[^1-3]", "MR"));
        assert!(matches("L[\\]]", "L]"));
    }

    #[test]
    fn test_groups() {
        assert!(matches("{M,L}1", "M1"));
        assert!(matches("{M,L}1", "L1"));
        assert!(!matches("{M,L}1", "G1"));
        assert!(matches("STICK_{UP,DO{WN,NE}}", "STICK_DONE"));
        assert!(matches("{G1*,BD}", "G17"));
        assert!(matches("{G1*,BD}", "BD"));
    }

    #[test]
    fn test_escapes_and_literals() {
        assert!(matches("a\\*", "a*"));
        assert!(!matches("a\\*", "ab"));
        assert!(matches("x+y", "x+y"));
        assert!(matches("(p)", "(p)"));
    }

    #[test]
    fn test_slash_only_crossed_by_double_star() {
        assert!(!matches("a*", "a/b"));
        assert!(matches("a**", "a/b"));
    }
}
