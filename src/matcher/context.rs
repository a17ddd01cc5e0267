use anyhow::{bail, Context, Result};
use serde::Deserialize;

const RULES_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/context_rules.json"));

/// One question-word rule: fires when the normalized message contains
/// every `requires` substring.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextRule {
    pub question: String,
    requires: Vec<String>,
    pub response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleGroup {
    pub group: String,
    rules: Vec<ContextRule>,
}

#[derive(Debug)]
pub struct ContextHit<'a> {
    pub group: &'a str,
    pub question: &'a str,
    pub response: &'a str,
}

/// Hand-written (topic, question-word) rules, evaluated before any
/// catalog lookup so that "where is the hub?" gets the directions
/// answer instead of the generic Hub entry.
pub struct ContextRules {
    groups: Vec<RuleGroup>,
}

impl ContextRules {
    pub fn builtin() -> Result<Self> {
        Self::from_json(RULES_JSON).context("embedded context rules are invalid")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut groups: Vec<RuleGroup> =
            serde_json::from_str(raw).context("context rule data did not parse")?;

        for group in &mut groups {
            for rule in &mut group.rules {
                if rule.requires.is_empty() {
                    bail!("context rule {}/{} has no predicate", group.group, rule.question);
                }
                for needle in &mut rule.requires {
                    *needle = needle.trim().to_lowercase();
                    if needle.is_empty() {
                        bail!(
                            "context rule {}/{} has an empty predicate term",
                            group.group,
                            rule.question
                        );
                    }
                }
            }
        }

        Ok(Self { groups })
    }

    /// Groups in declared order, rules within a group in declared order,
    /// first match wins. No ranking.
    pub fn match_message(&self, normalized: &str) -> Option<ContextHit<'_>> {
        for group in &self.groups {
            for rule in &group.rules {
                if rule.requires.iter().all(|needle| normalized.contains(needle.as_str())) {
                    return Some(ContextHit {
                        group: &group.group,
                        question: &rule.question,
                        response: &rule.response,
                    });
                }
            }
        }
        None
    }
}
