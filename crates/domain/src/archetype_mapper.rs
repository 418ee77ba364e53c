//! Archetype mapping: rule-based label assigned from the dominant tier's
//! domain composition (spec.md §4.9). The rule table is JSON configuration,
//! not a closed Rust enum, so new archetypes ship without a code change
//! (SPEC_FULL.md §9).

use crate::{Domain, DomainError, Tiers};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ArchetypeRule {
    pub rule_id: String,
    pub id: String,
    pub label: String,
    /// Domains that must all appear in the dominant tier for this rule to match.
    pub required_domains: Vec<Domain>,
    /// Higher priority rules are tried first; ties broken by file order.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchetypeRules {
    rules: Vec<ArchetypeRule>,
    fallback: ArchetypeRule,
}

impl ArchetypeRules {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|e| {
            DomainError::Configuration(format!(
                "failed to read archetype rules {}: {e}",
                path_ref.display()
            ))
        })?;
        let mut rules: ArchetypeRules = serde_json::from_str(&raw).map_err(|e| {
            DomainError::Configuration(format!(
                "failed to parse archetype rules {}: {e}",
                path_ref.display()
            ))
        })?;
        rules.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    /// A minimal built-in table, used when no rule file is configured yet.
    pub fn default_rules() -> Self {
        Self {
            rules: Vec::new(),
            fallback: ArchetypeRule {
                rule_id: "balanced".to_string(),
                id: "balanced-generalist".to_string(),
                label: "Balanced Generalist".to_string(),
                required_domains: Vec::new(),
                priority: 0,
            },
        }
    }
}

pub struct ArchetypeMapper;

impl ArchetypeMapper {
    pub fn map(tiers: &Tiers, rules: &ArchetypeRules) -> crate::Archetype {
        let dominant_domains: BTreeSet<Domain> =
            tiers.dominant.iter().map(|d| d.domain()).collect();

        for rule in &rules.rules {
            let required: BTreeSet<Domain> = rule.required_domains.iter().copied().collect();
            if !required.is_empty() && required.is_subset(&dominant_domains) {
                return crate::Archetype {
                    id: rule.id.clone(),
                    label: rule.label.clone(),
                    rule_id: rule.rule_id.clone(),
                };
            }
        }

        crate::Archetype {
            id: rules.fallback.id.clone(),
            label: rules.fallback.label.clone(),
            rule_id: rules.fallback.rule_id.clone(),
        }
    }
}
