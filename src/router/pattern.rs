//! Route pattern parsing — turns a raw pattern string into tagged segments.
//!
//! A pattern is split on `/` into a sequence of [`RouteSegment`]s. Four kinds
//! are recognized:
//!
//! | Syntax      | Segment kind       | Example                      |
//! |-------------|--------------------|-------------------------------|
//! | `users`     | [`RouteSegment::Static`]   | `/users`               |
//! | `:id`       | [`RouteSegment::Param`]    | `/users/:id`           |
//! | `*`, `*name`| [`RouteSegment::Wildcard`] | `/files/*`, `/files/*slug` |
//! | `**rest`    | [`RouteSegment::CatchAll`] | `/assets/**rest`       |
//!
//! `Wildcard` matches exactly one path segment, optionally capturing it under
//! a name (`*name`) or discarding it (bare `*`); `CatchAll` consumes every
//! remaining segment and must be the last segment in a pattern.

use crate::error::DispatchError;

/// A single tagged segment of a parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSegment {
    /// A literal segment that must match exactly.
    Static(String),
    /// A named single-segment capture (`:name`).
    Param(String),
    /// A single-segment wildcard: `*name` captures the matched segment under
    /// `name`; bare `*` matches one segment without capturing it.
    Wildcard(Option<String>),
    /// A named capture that consumes all remaining segments (`**name`).
    /// Always the final segment of a pattern.
    CatchAll(String),
}

/// A parsed, validated route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    /// The pattern as originally supplied, for error messages and `list_routes`.
    raw: String,
    /// The trailing-slash-normalized canonical form used for trie lookups.
    canonical: String,
    segments: Vec<RouteSegment>,
}

impl RoutePattern {
    /// Parses and validates a raw pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidPattern`] if:
    /// - the pattern contains non-ASCII bytes,
    /// - a segment is empty (e.g. `//`),
    /// - two parameters bind the same name,
    /// - a catch-all (`**name`) segment is not the last segment.
    pub fn parse(pattern: &str) -> Result<Self, DispatchError> {
        if !pattern.is_ascii() {
            return Err(DispatchError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern must be ASCII".to_string(),
            });
        }

        let canonical = canonicalize(pattern);
        let raw_segments: Vec<&str> = canonical.split('/').filter(|s| !s.is_empty()).collect();

        let mut segments = Vec::with_capacity(raw_segments.len());
        let mut seen_params = std::collections::HashSet::new();

        for (i, raw_seg) in raw_segments.iter().enumerate() {
            if raw_seg.is_empty() {
                return Err(DispatchError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: "empty path segment".to_string(),
                });
            }

            let segment = if let Some(name) = raw_seg.strip_prefix("**") {
                if name.is_empty() {
                    return Err(DispatchError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "catch-all segment must have a name, e.g. `**rest`".to_string(),
                    });
                }
                if i != raw_segments.len() - 1 {
                    return Err(DispatchError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "catch-all segment must be last".to_string(),
                    });
                }
                RouteSegment::CatchAll(name.to_string())
            } else if let Some(name) = raw_seg.strip_prefix('*') {
                if name.is_empty() {
                    RouteSegment::Wildcard(None)
                } else {
                    if !seen_params.insert(name.to_string()) {
                        return Err(DispatchError::InvalidPattern {
                            pattern: pattern.to_string(),
                            reason: format!("duplicate parameter name {name:?}"),
                        });
                    }
                    RouteSegment::Wildcard(Some(name.to_string()))
                }
            } else if let Some(name) = raw_seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(DispatchError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "parameter segment must have a name, e.g. `:id`".to_string(),
                    });
                }
                if !seen_params.insert(name.to_string()) {
                    return Err(DispatchError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: format!("duplicate parameter name {name:?}"),
                    });
                }
                RouteSegment::Param(name.to_string())
            } else {
                RouteSegment::Static(raw_seg.to_string())
            };

            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            canonical,
            segments,
        })
    }

    /// Returns the original pattern string as supplied to [`parse`](Self::parse).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the trailing-slash-normalized canonical path.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Returns the tagged segments.
    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    /// Returns `true` if every segment is [`RouteSegment::Static`] — the
    /// pattern can be stored in the static trie as well as looked up by the
    /// patricia matcher.
    pub fn is_fully_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, RouteSegment::Static(_)))
    }

    /// A rough specificity score used to order route registration reports
    /// (not used for match-time tie-breaking, which is structural — see
    /// `router::patricia`). Higher is more specific.
    pub fn specificity(&self) -> u32 {
        self.segments
            .iter()
            .map(|s| match s {
                RouteSegment::Static(_) => 4,
                RouteSegment::Param(_) => 2,
                RouteSegment::Wildcard(_) => 1,
                RouteSegment::CatchAll(_) => 0,
            })
            .sum()
    }
}

/// Normalizes a raw path: collapses a trailing slash (except on the root
/// `/`) so that `/users/` and `/users` compile to the same canonical form.
pub fn canonicalize(path: &str) -> String {
    if path != "/" && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Splits an already-canonical path into its non-empty segments, the same
/// way pattern parsing does, for use at match time.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
