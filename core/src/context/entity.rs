use std::sync::OnceLock;

use regex::Regex;

static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn tokens(label: &str) -> Vec<String> {
    let re = TOKEN_REGEX.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("TOKEN_REGEX is valid"));
    re.find_iter(label)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

/// Infers the entity a migration touches from its descriptive label.
///
/// Inference is a fallback: tasks should declare tables explicitly. The
/// default [`VerbEntityExtractor`] takes the token after `create`, `alter` or
/// `add`, except that `add <x> to <y>` yields `<y>`: the column is not the
/// entity being migrated.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, label: &str) -> Option<String>;
}

/// Keyword heuristic: find `create`, `alter` or `add` and take the next
/// meaningful token. `add <column> to <entity>` resolves to the entity.
#[derive(Debug, Clone)]
pub struct VerbEntityExtractor {
    verbs: Vec<&'static str>,
    fillers: Vec<&'static str>,
}

impl Default for VerbEntityExtractor {
    fn default() -> Self {
        Self {
            verbs: vec!["create", "alter", "add"],
            fillers: vec![
                "table", "tables", "column", "columns", "index", "if", "not", "exists", "the",
                "a", "an", "new", "field", "fields",
            ],
        }
    }
}

impl VerbEntityExtractor {
    fn is_candidate(&self, token: &str) -> bool {
        !self.fillers.contains(&token)
            && !self.verbs.contains(&token)
            && !token.chars().all(|c| c.is_ascii_digit())
    }
}

impl EntityExtractor for VerbEntityExtractor {
    fn extract(&self, label: &str) -> Option<String> {
        let tokens = tokens(label);
        let verb_pos = tokens.iter().position(|t| self.verbs.contains(&t.as_str()))?;
        let rest = &tokens[verb_pos + 1..];

        if tokens[verb_pos] == "add" {
            if let Some(to_pos) = rest.iter().position(|t| t == "to" || t == "on") {
                if let Some(target) = rest[to_pos + 1..].iter().find(|t| self.is_candidate(t)) {
                    return Some(target.clone());
                }
            }
        }

        rest.iter()
            .find(|t| self.is_candidate(t) && *t != "to" && *t != "on")
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_after_create() {
        let x = VerbEntityExtractor::default();
        assert_eq!(x.extract("20240101_create_users_table"), Some("users".into()));
        assert_eq!(x.extract("Create table IF NOT EXISTS Orders"), Some("orders".into()));
    }

    #[test]
    fn test_add_to_prefers_target_entity() {
        let x = VerbEntityExtractor::default();
        assert_eq!(x.extract("add_email_to_profiles"), Some("profiles".into()));
        assert_eq!(x.extract("add index on posts"), Some("posts".into()));
        assert_eq!(x.extract("alter invoices add column due_at"), Some("invoices".into()));
    }

    #[test]
    fn test_no_verb_yields_none() {
        let x = VerbEntityExtractor::default();
        assert_eq!(x.extract("seed_demo_data"), None);
        assert_eq!(x.extract("create_table"), None);
    }
}
