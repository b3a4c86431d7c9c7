//! Media types as declared by `Consumes` / `Produces`.
//!
//! Only simple matching is supported: wildcards on type or subtype, and an
//! `Accept` list ordered by quality value. There is no specificity ranking
//! beyond that.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Represents a media type (MIME type) with optional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaType {
    /// The type (e.g., "application", "text")
    pub type_: String,
    /// The subtype (e.g., "json", "plain")
    pub subtype: String,
    /// Parameters other than `q` (e.g., charset=utf-8)
    pub params: BTreeMap<String, String>,
}

impl MediaType {
    /// Create a new media type.
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            subtype: subtype.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    /// `application/json`
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// `text/plain`
    pub fn plain_text() -> Self {
        Self::new("text", "plain")
    }

    /// `application/octet-stream`
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Parse a media type (without quality value). Returns `None` unless the
    /// input has the `type/subtype` shape.
    pub fn parse(s: &str) -> Option<Self> {
        Self::parse_weighted(s).map(|(media_type, _)| media_type)
    }

    fn parse_weighted(s: &str) -> Option<(Self, f32)> {
        let mut parts = s.trim().split(';');

        let (type_, subtype) = parts.next()?.trim().split_once('/')?;
        let type_ = type_.trim().to_ascii_lowercase();
        let subtype = subtype.trim().to_ascii_lowercase();
        if !is_token(&type_) || !is_token(&subtype) || (type_ == "*" && subtype != "*") {
            return None;
        }

        let mut params = BTreeMap::new();
        let mut quality = 1.0;
        for param in parts {
            let Some((key, value)) = param.trim().split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"');
            if key == "q" {
                quality = value.parse::<f32>().ok()?.clamp(0.0, 1.0);
            } else {
                params.insert(key, value.to_string());
            }
        }

        Some((
            Self {
                type_,
                subtype,
                params,
            },
            quality,
        ))
    }

    /// Check if this media type matches another (considering wildcards).
    pub fn matches(&self, other: &MediaType) -> bool {
        let type_matches = self.type_ == "*" || other.type_ == "*" || self.type_ == other.type_;
        let subtype_matches =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        type_matches && subtype_matches
    }

    /// Check if this is `*/*`.
    pub fn is_any(&self) -> bool {
        self.type_ == "*" && self.subtype == "*"
    }

    /// True when neither type nor subtype is a wildcard.
    pub fn is_concrete(&self) -> bool {
        self.type_ != "*" && self.subtype != "*"
    }

    /// `type/subtype` without parameters.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (key, value) in &self.params {
            write!(f, "; {}={}", key, value)?;
        }
        Ok(())
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$&-^_.+*".contains(&b)
        })
}

/// Parse an `Accept` header into media types ordered by preference.
///
/// Entries with `q=0` and entries that do not parse are dropped. An absent
/// or empty header accepts anything.
pub fn parse_accept(header: Option<&str>) -> Vec<MediaType> {
    let Some(header) = header.filter(|h| !h.trim().is_empty()) else {
        return vec![MediaType::any()];
    };
    let mut weighted: Vec<(MediaType, f32)> = header
        .split(',')
        .filter_map(MediaType::parse_weighted)
        .filter(|(_, q)| *q > 0.0)
        .collect();
    // stable: equal weights keep header order
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    weighted.into_iter().map(|(media_type, _)| media_type).collect()
}

/// Whether a request with `content_type` may be handed to a method that
/// consumes `consumed`. A missing `Content-Type` is accepted.
pub fn is_consumable(consumed: &[MediaType], content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    match MediaType::parse(content_type) {
        Some(actual) => consumed.iter().any(|declared| declared.matches(&actual)),
        None => consumed.iter().any(MediaType::is_any),
    }
}

/// Pick the response media type for a method producing `produced`, given
/// the client's preferences.
///
/// Returns `Err(())` when nothing the method produces is acceptable,
/// `Ok(Some(_))` when the matching produced type is concrete, and `Ok(None)`
/// when it is a wildcard. A wildcard never takes the client's type; the
/// reply decides.
#[allow(clippy::result_unit_err)]
pub fn select_produced(
    produced: &[MediaType],
    accepted: &[MediaType],
) -> Result<Option<MediaType>, ()> {
    for wanted in accepted {
        for offered in produced {
            if offered.matches(wanted) {
                return Ok(offered.is_concrete().then(|| offered.clone()));
            }
        }
    }
    Err(())
}
