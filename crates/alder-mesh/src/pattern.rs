//! Dotted topic patterns with a trailing wildcard.

use crate::MeshError;
use alder_types::EventType;

/// A subscription pattern over dotted event types. Literal segments match
/// exactly; a final `*` matches one or more remaining segments. `*` alone
/// matches every event type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicPattern {
    literals: Vec<String>,
    wildcard: bool,
    source: String,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, MeshError> {
        if pattern.is_empty() {
            return Err(MeshError::InvalidPattern {
                pattern: pattern.to_string(),
                detail: "empty pattern".to_string(),
            });
        }

        let segments: Vec<&str> = pattern.split('.').collect();
        let mut literals = Vec::with_capacity(segments.len());
        let mut wildcard = false;

        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(MeshError::InvalidPattern {
                    pattern: pattern.to_string(),
                    detail: "empty segment".to_string(),
                });
            }
            if *segment == "*" {
                if i + 1 != segments.len() {
                    return Err(MeshError::InvalidPattern {
                        pattern: pattern.to_string(),
                        detail: "wildcard must be the final segment".to_string(),
                    });
                }
                wildcard = true;
            } else if segment.contains('*') {
                return Err(MeshError::InvalidPattern {
                    pattern: pattern.to_string(),
                    detail: "wildcard must be a whole segment".to_string(),
                });
            } else {
                literals.push(segment.to_string());
            }
        }

        Ok(Self {
            literals,
            wildcard,
            source: pattern.to_string(),
        })
    }

    pub fn matches(&self, event_type: &EventType) -> bool {
        let mut segments = event_type.segments();
        for literal in &self.literals {
            match segments.next() {
                Some(segment) if segment == literal => {}
                _ => return false,
            }
        }
        match (self.wildcard, segments.next()) {
            // Wildcard requires at least one remaining segment.
            (true, Some(_)) => true,
            (true, None) => false,
            // Exact pattern must consume everything.
            (false, None) => true,
            (false, Some(_)) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> EventType {
        EventType::new(s)
    }

    #[test]
    fn exact_patterns_match_exactly() {
        let p = TopicPattern::parse("error.detected").unwrap();
        assert!(p.matches(&t("error.detected")));
        assert!(!p.matches(&t("error.detected.extra")));
        assert!(!p.matches(&t("error")));
    }

    #[test]
    fn suffix_wildcard_matches_any_remainder() {
        let p = TopicPattern::parse("error.*").unwrap();
        assert!(p.matches(&t("error.detected")));
        assert!(p.matches(&t("error.parse.failed")));
        assert!(!p.matches(&t("error")));
        assert!(!p.matches(&t("warning.raised")));
    }

    #[test]
    fn bare_star_matches_everything() {
        let p = TopicPattern::parse("*").unwrap();
        assert!(p.matches(&t("boot.complete")));
        assert!(p.matches(&t("mission.phase.completed")));
    }

    #[test]
    fn malformed_patterns_are_rejected()  {
        assert!(TopicPattern::parse("").is_err());
        assert!(TopicPattern::parse("a..b").is_err());
        assert!(TopicPattern::parse("*.detected").is_err());
        assert!(TopicPattern::parse("err*.detected").is_err());
    }
}
