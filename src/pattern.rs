//! Path template compilation.
//!
//! A template is turned into an anchored [`regex::Regex`] plus the ordered list
//! of parameter keys it declares. Supported syntax:
//!
//! | Template          | Matches                 | Params                  |
//! |-------------------|-------------------------|-------------------------|
//! | `/users/:id`      | `/users/42`             | `id = "42"`             |
//! | `/files/:name.:ext` | `/files/a.txt`        | `name = "a"`, `ext = "txt"` |
//! | `/post/:id(\d+)`  | `/post/7`, not `/post/x`| `id = "7"`              |
//! | `/tags/:tag?`     | `/tags`, `/tags/rust`   | `tag` only when present |
//! | `/src/:path*`     | `/src`, `/src/a/b`      | `path = "a/b"`          |
//! | `/src/:path+`     | `/src/a/b`, not `/src`  | `path = "a/b"`          |
//! | `/assets/*`       | `/assets/css/site.css`  | `0 = "css/site.css"`    |
//! | `*`               | anything                | `0 = <whole path>`      |
//!
//! A `/` or `.` directly before a parameter belongs to that parameter, so an
//! optional parameter drops its separator along with its value.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use crate::error::{Error, PatternError};

/// Name of the group spanning the whole matched prefix.
const PREFIX_GROUP: &str = "prefix";

/// Compilation flags. Routers derive these from their [`RouterOptions`]
/// and from whether a layer is a mount point (`end = false`) or a route
/// (`end = true`).
///
/// [`RouterOptions`]: crate::RouterOptions
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PatternOptions {
    pub(crate) case_sensitive: bool,
    pub(crate) strict: bool,
    pub(crate) end: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Key {
    name: String,
    group: String,
}

impl Key {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
enum Matcher {
    /// `/` mounted without `end`: every path, nothing consumed.
    Slash,
    /// `*`: every path, bound whole to `"0"`.
    Star,
    Regex(Regex),
}

/// The result of a successful match.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Match {
    /// The matched prefix of the path, used for trimming.
    pub(crate) path: String,
    pub(crate) params: HashMap<String, String>,
}

#[derive(Debug)]
pub(crate) struct Pattern {
    matcher: Matcher,
    keys: Vec<Key>,
}

impl Pattern {
    pub(crate) fn compile(template: &str, options: PatternOptions) -> Result<Self, PatternError> {
        if template == "/" && !options.end && !options.strict {
            return Ok(Self { matcher: Matcher::Slash, keys: Vec::new() });
        }
        if template == "*" {
            let key = Key { name: "0".to_owned(), group: group_name(0) };
            return Ok(Self { matcher: Matcher::Star, keys: vec![key] });
        }

        let mut compiler = Compiler::default();
        compiler.run(template)?;
        let Compiler { mut body, keys, pending, .. } = compiler;

        match pending {
            Some('/') if !options.strict => body.push_str("/?"),
            other => {
                push_literal(&mut body, other);
                if !options.strict {
                    body.push_str("/?");
                }
            }
        }

        let source = if options.end {
            format!("^(?P<{PREFIX_GROUP}>{body})$")
        } else if template.ends_with('/') {
            format!("^(?P<{PREFIX_GROUP}>{body})")
        } else {
            // `regex` has no lookahead: consume the boundary outside the
            // prefix group instead.
            format!("^(?P<{PREFIX_GROUP}>{body})(?:/|$)")
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .build()?;

        Ok(Self { matcher: Matcher::Regex(regex), keys })
    }

    pub(crate) fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Matches `path`, returning the matched prefix and decoded params.
    ///
    /// Nothing is stored on `self`; calling this twice with the same path
    /// yields the same result.
    pub(crate) fn matches(&self, path: &str) -> Result<Option<Match>, Error> {
        let caps = match &self.matcher {
            Matcher::Slash => {
                return Ok(Some(Match { path: String::new(), params: HashMap::new() }));
            }
            Matcher::Star => {
                let params = HashMap::from([("0".to_owned(), decode_param(path)?)]);
                return Ok(Some(Match { path: path.to_owned(), params }));
            }
            Matcher::Regex(regex) => match regex.captures(path) {
                Some(caps) => caps,
                None => return Ok(None),
            },
        };

        let mut params = HashMap::new();
        for key in &self.keys {
            // An absent optional capture never clears an earlier binding.
            if let Some(raw) = caps.name(&key.group) {
                params.insert(key.name.clone(), decode_param(raw.as_str())?);
            }
        }

        let prefix = caps.name(PREFIX_GROUP).map_or("", |m| m.as_str());
        Ok(Some(Match { path: prefix.to_owned(), params }))
    }
}

#[derive(Default)]
struct Compiler {
    body: String,
    keys: Vec<Key>,
    /// A `/` or `.` not yet emitted, kept so a following parameter can own it.
    pending: Option<char>,
    unnamed: usize,
}

impl Compiler {
    fn run(&mut self, template: &str) -> Result<(), PatternError> {
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '/' | '.' => {
                    push_literal(&mut self.body, self.pending.take());
                    self.pending = Some(c);
                }
                ':' if chars.peek().copied().is_some_and(is_word) => {
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if !is_word(n) {
                            break;
                        }
                        name.push(n);
                        chars.next();
                    }

                    let prefix = self.pending.take();
                    let inner = if chars.peek() == Some(&'(') {
                        chars.next();
                        read_group(&mut chars)?
                    } else if prefix == Some('.') {
                        "[^/.]+?".to_owned()
                    } else {
                        "[^/]+?".to_owned()
                    };
                    let modifier = match chars.peek() {
                        Some(&m) if matches!(m, '?' | '*' | '+') => {
                            chars.next();
                            Some(m)
                        }
                        _ => None,
                    };

                    self.push_param(name, prefix, &inner, modifier);
                }
                '(' => {
                    push_literal(&mut self.body, self.pending.take());
                    let inner = read_group(&mut chars)?;
                    self.push_unnamed(&inner);
                }
                '*' => {
                    push_literal(&mut self.body, self.pending.take());
                    self.push_unnamed(".*");
                }
                '\\' => {
                    push_literal(&mut self.body, self.pending.take());
                    let escaped = chars.next().ok_or(PatternError::DanglingEscape)?;
                    self.body.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
                _ => {
                    push_literal(&mut self.body, self.pending.take());
                    self.body.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
                }
            }
        }
        Ok(())
    }

    fn push_param(&mut self, name: String, prefix: Option<char>, inner: &str, modifier: Option<char>) {
        let group = group_name(self.keys.len());
        let p = prefix
            .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
            .unwrap_or_default();

        let expr = match modifier {
            Some('?') => format!("(?:{p}(?P<{group}>{inner}))?"),
            Some('*') => format!("(?:{p}(?P<{group}>(?:{inner})(?:{p}(?:{inner}))*))?"),
            Some('+') => format!("{p}(?P<{group}>(?:{inner})(?:{p}(?:{inner}))*)"),
            _ => format!("{p}(?P<{group}>{inner})"),
        };
        self.body.push_str(&expr);
        self.keys.push(Key { name, group });
    }

    fn push_unnamed(&mut self, inner: &str) {
        let group = group_name(self.keys.len());
        self.body.push_str(&format!("(?P<{group}>{inner})"));
        self.keys.push(Key { name: self.unnamed.to_string(), group });
        self.unnamed += 1;
    }
}

fn group_name(index: usize) -> String {
    format!("p{index}")
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_literal(body: &mut String, c: Option<char>) {
    if let Some(c) = c {
        body.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
    }
}

/// Reads up to the `)` closing an already-consumed `(`, honouring nesting.
fn read_group(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, PatternError> {
    let mut depth = 1usize;
    let mut inner = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                inner.push(c);
                inner.push(chars.next().ok_or(PatternError::DanglingEscape)?);
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(inner);
                }
            }
            _ => {}
        }
        inner.push(c);
    }
    Err(PatternError::UnbalancedGroup)
}

/// Percent-decodes one captured value.
///
/// Malformed escapes (`%` not followed by two hex digits) and sequences that
/// do not decode to UTF-8 are rejected.
pub(crate) fn decode_param(raw: &str) -> Result<String, Error> {
    if raw.is_empty() {
        return Ok(String::new());
    }

    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(Error::DecodeParam(raw.to_owned()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::DecodeParam(raw.to_owned()))
}
