// Response recovery
// Turns raw model output into a JSON value, repairing common defects


use fancy_regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Model output as received
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Text(String),
    Structured(Map<String, Value>),
}

impl From<String> for RawResponse {
    #[inline]
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawResponse {
    #[inline]
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for RawResponse {
    #[inline]
    fn from(map: Map<String, Value>) -> Self {
        Self::Structured(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    /// Empty object when nothing could be recovered
    pub value: Value,
    /// Set when the strict parse failed
    pub repaired: bool,
}

impl Recovered {
    fn empty() -> Self {
        Self {
            value: Value::Object(Map::new()),
            repaired: true,
        }
    }

    /// The recovered object, or `None` for any other JSON value
    #[inline]
    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self.value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

enum RuleKind {
    ObjectSpan,
    Pattern {
        regex: Regex,
        replacement: &'static str,
    },
}

/// One named text rewrite applied during repair
pub struct RepairRule {
    pub name: &'static str,
    kind: RuleKind,
}

impl std::fmt::Debug for RepairRule {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RepairRule {
    fn pattern(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            kind: RuleKind::Pattern {
                regex: Regex::new(pattern).expect("valid regex"),
                replacement,
            },
        }
    }

    /// Rewrite `text`; the input comes back unchanged when the rule does not apply
    #[inline]
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.kind {
            // Top-level arrays keep their brackets
            RuleKind::ObjectSpan if text.trim_start().starts_with('[') => Cow::Borrowed(text),
            RuleKind::ObjectSpan => match (text.find('{'), text.rfind('}')) {
                (Some(start), Some(end)) if start < end => Cow::Borrowed(&text[start..=end]),
                _ => Cow::Borrowed(text),
            },
            RuleKind::Pattern { regex, replacement } => {
                match regex.try_replacen(text, 0, *replacement) {
                    Ok(replaced) => replaced,
                    Err(e) => {
                        warn!("Repair rule {} failed: {}", self.name, e);
                        Cow::Borrowed(text)
                    }
                }
            }
        }
    }
}

/// Applied in order to the raw text when the strict parse fails
pub static REPAIR_RULES: LazyLock<Vec<RepairRule>> = LazyLock::new(|| {
    vec![
        RepairRule {
            name: "extract_object_span",
            kind: RuleKind::ObjectSpan,
        },
        RepairRule::pattern("strip_trailing_commas", r",\s*([}\]])", "$1"),
        RepairRule::pattern(
            "close_summary_entries",
            r#"(?s)("summary":\s*"(?:[^"\\]|\\.)*")\s*\]"#,
            "$1}\n]",
        ),
        RepairRule::pattern(
            "quick_context_bare_string",
            r#""QUICK CONTEXT":\s*\{\s*"([^"]+)"\s*\}"#,
            r#""QUICK CONTEXT": {"stock_movement": "$1"}"#,
        ),
    ]
});

/// Run every repair rule over `text`
#[inline]
pub fn repair(text: &str) -> String {
    REPAIR_RULES
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc).into_owned())
}

/// Best-effort structured value from a model response. Never fails.
#[inline]
pub fn recover(raw: impl Into<RawResponse>) -> Recovered {
    let text = match raw.into() {
        RawResponse::Structured(map) => {
            return Recovered {
                value: Value::Object(map),
                repaired: false,
            };
        }
        RawResponse::Text(text) => text,
    };

    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        return Recovered {
            value,
            repaired: false,
        };
    }

    debug!("Strict parse failed; repairing {} characters", text.len());
    let repaired = repair(&text);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!("Repaired response parsed");
            Recovered {
                value,
                repaired: true,
            }
        }
        Err(e) => {
            warn!("Response could not be recovered: {}", e);
            Recovered::empty()
        }
    }
}
