//! ipn-scheme endpoint identifiers and wildcard patterns.
//!
//! A BPv7 endpoint in the ipn scheme is the pair `(node, service)`, written
//! `ipn:<node>.<service>`. Security policies select endpoints with patterns
//! in which either component may be the wildcard `*`. Only the forms
//! `ipn:(N|*).(S|*)` are admitted; glob syntax such as `**` is rejected at
//! parse time.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing an EID or EID pattern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EidParseError {
    /// The string does not start with the `ipn:` scheme prefix.
    #[error("missing `ipn:` scheme prefix in `{0}`")]
    MissingScheme(String),

    /// The scheme-specific part is not `<node>.<service>`.
    #[error("expected `<node>.<service>` after scheme in `{0}`")]
    MissingSeparator(String),

    /// A component is empty, non-decimal, or out of range for u64.
    #[error("invalid {axis} component `{component}`")]
    InvalidComponent {
        /// Which axis failed (`node` or `service`).
        axis: &'static str,
        /// The offending component text.
        component: String,
    },
}

/// An ipn-scheme endpoint identifier: `ipn:<node>.<service>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eid {
    /// Node number.
    pub node_id: u64,
    /// Service number.
    pub service_id: u64,
}

impl Eid {
    /// Create an EID from node and service numbers.
    #[must_use]
    pub const fn new(node_id: u64, service_id: u64) -> Self {
        Self {
            node_id,
            service_id,
        }
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node_id, self.service_id)
    }
}

impl FromStr for Eid {
    type Err = EidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, service) = split_ipn(s)?;
        Ok(Self {
            node_id: parse_component(node, "node")?,
            service_id: parse_component(service, "service")?,
        })
    }
}

/// One axis of an EID pattern: a wildcard or an exact number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternMatcher {
    /// `*`: matches any value.
    Any,
    /// A decimal literal: matches equality.
    Exact(u64),
}

impl PatternMatcher {
    /// Whether the matcher accepts `value`.
    #[must_use]
    pub fn matches(self, value: u64) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == value,
        }
    }
}

impl fmt::Display for PatternMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// An EID pattern: `ipn:(N|*).(S|*)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EidPattern {
    /// Node axis matcher.
    pub node: PatternMatcher,
    /// Service axis matcher.
    pub service: PatternMatcher,
}

impl EidPattern {
    /// The all-wildcard pattern `ipn:*.*`.
    pub const ANY: Self = Self {
        node: PatternMatcher::Any,
        service: PatternMatcher::Any,
    };

    /// Whether the pattern matches `eid` on both axes.
    #[must_use]
    pub fn matches(&self, eid: Eid) -> bool {
        self.node.matches(eid.node_id) && self.service.matches(eid.service_id)
    }
}

impl fmt::Display for EidPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}

impl FromStr for EidPattern {
    type Err = EidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, service) = split_ipn(s)?;
        Ok(Self {
            node: parse_matcher(node, "node")?,
            service: parse_matcher(service, "service")?,
        })
    }
}

fn split_ipn(s: &str) -> Result<(&str, &str), EidParseError> {
    let ssp = s
        .strip_prefix("ipn:")
        .ok_or_else(|| EidParseError::MissingScheme(s.to_owned()))?;
    ssp.split_once('.')
        .ok_or_else(|| EidParseError::MissingSeparator(s.to_owned()))
}

fn parse_component(text: &str, axis: &'static str) -> Result<u64, EidParseError> {
    // `u64::from_str` accepts a leading `+`, which is not valid here.
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EidParseError::InvalidComponent {
            axis,
            component: text.to_owned(),
        });
    }
    text.parse::<u64>().map_err(|_| EidParseError::InvalidComponent {
        axis,
        component: text.to_owned(),
    })
}

fn parse_matcher(text: &str, axis: &'static str) -> Result<PatternMatcher, EidParseError> {
    if text == "*" {
        Ok(PatternMatcher::Any)
    } else {
        parse_component(text, axis).map(PatternMatcher::Exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn eid_parse_and_display() {
        let eid: Eid = "ipn:10.1".parse().unwrap();
        assert_eq!(eid, Eid::new(10, 1));
        assert_eq!(eid.to_string(), "ipn:10.1");
    }

    #[test]
    fn eid_rejects_bad_forms() {
        assert!("ipn:".parse::<Eid>().is_err());
        assert!("ipn:1".parse::<Eid>().is_err());
        assert!("ipn:1.".parse::<Eid>().is_err());
        assert!("ipn:.1".parse::<Eid>().is_err());
        assert!("ipn:a.1".parse::<Eid>().is_err());
        assert!("ipn:1.b".parse::<Eid>().is_err());
        assert!("ipn:+1.1".parse::<Eid>().is_err());
        assert!("dtn://node".parse::<Eid>().is_err());
        assert!("".parse::<Eid>().is_err());
    }

    #[test]
    fn pattern_parse_wildcards() {
        let p: EidPattern = "ipn:*.*".parse().unwrap();
        assert_eq!(p, EidPattern::ANY);
        let p: EidPattern = "ipn:1.*".parse().unwrap();
        assert_eq!(p.node, PatternMatcher::Exact(1));
        assert_eq!(p.service, PatternMatcher::Any);
        let p: EidPattern = "ipn:*.7".parse().unwrap();
        assert_eq!(p.node, PatternMatcher::Any);
        assert_eq!(p.service, PatternMatcher::Exact(7));
    }

    #[test]
    fn pattern_rejects_glob_syntax() {
        assert!("ipn:**.*".parse::<EidPattern>().is_err());
        assert!("ipn:*.**".parse::<EidPattern>().is_err());
        assert!("ipn:***.*".parse::<EidPattern>().is_err());
        assert!("ipn:1*.2".parse::<EidPattern>().is_err());
        assert!("ipn:?.1".parse::<EidPattern>().is_err());
    }

    #[test]
    fn pattern_matching() {
        let p: EidPattern = "ipn:1.*".parse().unwrap();
        assert!(p.matches(Eid::new(1, 1)));
        assert!(p.matches(Eid::new(1, 99)));
        assert!(!p.matches(Eid::new(2, 1)));

        assert!(EidPattern::ANY.matches(Eid::new(u64::MAX, 0)));

        let p: EidPattern = "ipn:3.4".parse().unwrap();
        assert!(p.matches(Eid::new(3, 4)));
        assert!(!p.matches(Eid::new(3, 5)));
    }

    #[test]
    fn max_u64_components() {
        let text = format!("ipn:{}.{}", u64::MAX, u64::MAX);
        let eid: Eid = text.parse().unwrap();
        assert_eq!(eid, Eid::new(u64::MAX, u64::MAX));
        // One past u64::MAX must overflow.
        assert!("ipn:18446744073709551616.1".parse::<Eid>().is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_any_eid(node in any::<u64>(), service in any::<u64>()) {
            let eid = Eid::new(node, service);
            let parsed: Eid = eid.to_string().parse().unwrap();
            prop_assert_eq!(eid, parsed);
        }

        #[test]
        fn exact_pattern_matches_only_itself(node in any::<u64>(), service in any::<u64>(), other in any::<u64>()) {
            let pattern: EidPattern = format!("ipn:{node}.{service}").parse().unwrap();
            prop_assert!(pattern.matches(Eid::new(node, service)));
            if other != service {
                prop_assert!(!pattern.matches(Eid::new(node, other)));
            }
        }
    }
}
