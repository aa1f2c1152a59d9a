//! Condition combinators used by acceptance, finish and fail lists.

use serde::{Deserialize, Serialize};

/// How the per-condition results of a list combine into one verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicType {
    /// No combinator configured; every condition must hold
    #[default]
    None,
    And,
    Or,
    Not,
    AAndEtcOr,
    AOrEtcAnd,
    AAndBAndEtcOr,
    AOrBOrEtcAnd,
}

impl LogicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicType::None => "none",
            LogicType::And => "and",
            LogicType::Or => "or",
            LogicType::Not => "not",
            LogicType::AAndEtcOr => "a_and_etcor",
            LogicType::AOrEtcAnd => "a_or_etcand",
            LogicType::AAndBAndEtcOr => "a_and_b_and_etcor",
            LogicType::AOrBOrEtcAnd => "a_or_b_or_etcand",
        }
    }

    /// Accepts both the short form (`and`) and the prefixed one (`LOGIC_AND`)
    pub fn from_name(s: &str) -> Option<Self> {
        let lowered = s.to_ascii_lowercase();
        let name = lowered.strip_prefix("logic_").unwrap_or(&lowered);
        match name {
            "" | "none" => Some(LogicType::None),
            "and" => Some(LogicType::And),
            "or" => Some(LogicType::Or),
            "not" => Some(LogicType::Not),
            "a_and_etcor" => Some(LogicType::AAndEtcOr),
            "a_or_etcand" => Some(LogicType::AOrEtcAnd),
            "a_and_b_and_etcor" => Some(LogicType::AAndBAndEtcOr),
            "a_or_b_or_etcand" => Some(LogicType::AOrBOrEtcAnd),
            _ => None,
        }
    }

    /// Combine condition results. An empty list never satisfies.
    pub fn calculate(&self, results: &[bool]) -> bool {
        if results.is_empty() {
            return false;
        }
        let all = |r: &[bool]| r.iter().all(|v| *v);
        let any_or_empty = |r: &[bool]| r.is_empty() || r.iter().any(|v| *v);
        let all_nonempty = |r: &[bool]| !r.is_empty() && r.iter().all(|v| *v);
        match self {
            LogicType::None | LogicType::And => all(results),
            LogicType::Or => results.iter().any(|v| *v),
            LogicType::Not => !results.iter().any(|v| *v),
            LogicType::AAndEtcOr => results[0] && any_or_empty(&results[1..]),
            LogicType::AOrEtcAnd => results[0] || all_nonempty(&results[1..]),
            LogicType::AAndBAndEtcOr => match results {
                [a, b, rest @ ..] => *a && *b && any_or_empty(rest),
                [a] => *a,
                [] => false,
            },
            LogicType::AOrBOrEtcAnd => match results {
                [a, b, rest @ ..] => *a || *b || all_nonempty(rest),
                [a] => *a,
                [] => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_never_satisfies() {
        assert!(!LogicType::And.calculate(&[]));
        assert!(!LogicType::Not.calculate(&[]));
    }

    #[test]
    fn test_simple_combinators() {
        assert!(LogicType::None.calculate(&[true, true]));
        assert!(!LogicType::And.calculate(&[true, false]));
        assert!(LogicType::Or.calculate(&[false, true]));
        assert!(LogicType::Not.calculate(&[false, false]));
        assert!(!LogicType::Not.calculate(&[false, true]));
    }

    #[test]
    fn test_head_combinators() {
        assert!(LogicType::AAndEtcOr.calculate(&[true, false, true]));
        assert!(!LogicType::AAndEtcOr.calculate(&[false, true, true]));
        assert!(LogicType::AAndEtcOr.calculate(&[true]));

        assert!(LogicType::AOrEtcAnd.calculate(&[true, false]));
        assert!(LogicType::AOrEtcAnd.calculate(&[false, true, true]));
        assert!(!LogicType::AOrEtcAnd.calculate(&[false]));

        assert!(LogicType::AAndBAndEtcOr.calculate(&[true, true, false, true]));
        assert!(!LogicType::AAndBAndEtcOr.calculate(&[true, false, true]));

        assert!(LogicType::AOrBOrEtcAnd.calculate(&[false, true, false]));
        assert!(!LogicType::AOrBOrEtcAnd.calculate(&[false, false, true, false]));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(LogicType::from_name("LOGIC_AND"), Some(LogicType::And));
        assert_eq!(LogicType::from_name("a_or_etcand"), Some(LogicType::AOrEtcAnd));
        assert_eq!(LogicType::from_name("xor"), None);
    }
}
