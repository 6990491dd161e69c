//! Keyword classifier splitting incidents into display buckets.
//!
//! Rules are an ordered table of `(category, keywords)`; the first category
//! with a keyword found in `policy_name + condition_name` wins, otherwise the
//! incident is [`Category::Other`].
//!
//! Matching is case-insensitive and on whole words: the text is split on
//! non-alphanumerics and a keyword must equal a run of consecutive words.
//! The last word may carry a plural `s`, so `host` matches "hosts" but not
//! "ghost", and `rds` never fires inside "passwords".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reconcile::Incident;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Infrastructure,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Category::Infrastructure => "Infrastructure",
            Category::Other => "Other",
        })
    }
}

/// Default infrastructure vocabulary.
pub const INFRASTRUCTURE_KEYWORDS: &[&str] = &[
    "cpu",
    "memory",
    "disk",
    "storage",
    "network",
    "host",
    "server",
    "kubernetes",
    "k8s",
    "container",
    "pod",
    "node",
    "database",
    "aws",
    "azure",
    "gcp",
    "ec2",
    "rds",
    "load balancer",
    "infrastructure",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// A keyword split into its lowercase words.
#[derive(Debug, Clone)]
struct Keyword(Vec<String>);

impl Keyword {
    fn new(raw: &str) -> Self {
        Keyword(words(raw))
    }

    fn found_in(&self, text: &[String]) -> bool {
        let n = self.0.len();
        if n == 0 || n > text.len() {
            return false;
        }
        text.windows(n).any(|window| {
            let (last, head) = match window.split_last() {
                Some(split) => split,
                None => return false,
            };
            let want_last = &self.0[n - 1];
            head == &self.0[..n - 1]
                && (last == want_last || last.strip_suffix('s') == Some(want_last.as_str()))
        })
    }
}

/// Ordered keyword table.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<(Category, Vec<Keyword>)>,
    fallback: Category,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(vec![(
            Category::Infrastructure,
            INFRASTRUCTURE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        )])
    }
}

/// Incidents split into their two display buckets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorizedIncidents {
    pub infrastructure: Vec<Incident>,
    pub other: Vec<Incident>,
}

impl Categorizer {
    /// Build a categorizer from ordered rules.
    pub fn new(rules: Vec<(Category, Vec<String>)>) -> Self {
        let rules = rules
            .into_iter()
            .map(|(cat, keywords)| (cat, keywords.iter().map(|k| Keyword::new(k)).collect()))
            .collect();
        Self {
            rules,
            fallback: Category::Other,
        }
    }

    /// Classify free text.
    pub fn classify_text(&self, text: &str) -> Category {
        let text = words(text);
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| k.found_in(&text)))
            .map(|(cat, _)| *cat)
            .unwrap_or(self.fallback)
    }

    pub fn classify(&self, incident: &Incident) -> Category {
        let text = format!(
            "{} {}",
            incident.policy_name.as_deref().unwrap_or_default(),
            incident.condition_name
        );
        self.classify_text(&text)
    }

    pub fn split(&self, incidents: &[Incident]) -> CategorizedIncidents {
        let mut out = CategorizedIncidents::default();
        for incident in incidents {
            match self.classify(incident) {
                Category::Infrastructure => out.infrastructure.push(incident.clone()),
                Category::Other => out.other.push(incident.clone()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Status;
    use chrono::Utc;

    fn incident(policy: Option<&str>, condition: &str) -> Incident {
        let now = Utc::now();
        Incident {
            incident_id: "1".into(),
            account_label: "Acme".into(),
            condition_name: condition.into(),
            policy_name: policy.map(String::from),
            priority: "critical".into(),
            entity_name: "svc".into(),
            entity_type: None,
            start_time: now,
            end_time: now,
            distinct_event_kinds_count: 1,
            status: Status::Active,
        }
    }

    #[test]
    fn test_cpu_condition_is_infrastructure() {
        let c = Categorizer::default();
        assert_eq!(c.classify(&incident(None, "CPU utilization > 90%")), Category::Infrastructure);
    }

    #[test]
    fn test_security_text_falls_back_to_other() {
        let c = Categorizer::default();
        assert_eq!(c.classify(&incident(None, "Unauthorized access attempt")), Category::Other);
    }

    #[test]
    fn test_short_keywords_do_not_fire_inside_words() {
        let c = Categorizer::default();
        for text in [
            "Excessive failed passwords",
            "Violation of data retention laws",
            "Ghost user login detected",
            "Audit records tampered",
        ] {
            assert_eq!(c.classify_text(text), Category::Other, "{}", text);
        }
    }

    #[test]
    fn test_whole_words_plurals_and_phrases_match() {
        let c = Categorizer::default();
        assert_eq!(c.classify_text("3 hosts not reporting"), Category::Infrastructure);
        assert_eq!(c.classify_text("RDS replica lag"), Category::Infrastructure);
        assert_eq!(c.classify_text("Pods crash-looping"), Category::Infrastructure);
        assert_eq!(c.classify_text("Load-Balancer 5xx spike"), Category::Infrastructure);
        assert_eq!(c.classify_text("load shedding enabled"), Category::Other);
    }

    #[test]
    fn test_policy_name_is_scanned_too() {
        let c = Categorizer::default();
        assert_eq!(
            c.classify(&incident(Some("Kubernetes cluster"), "Error budget burn")),
            Category::Infrastructure
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let c = Categorizer::new(vec![
            (Category::Other, vec!["login".into()]),
            (Category::Infrastructure, vec!["HOST".into()]),
        ]);
        assert_eq!(c.classify_text("login failures on host"), Category::Other);
        assert_eq!(c.classify_text("host not reporting"), Category::Infrastructure);
    }

    #[test]
    fn test_split_preserves_every_incident() {
        let c = Categorizer::default();
        let incidents = vec![
            incident(None, "Memory pressure"),
            incident(None, "Checkout latency"),
            incident(Some("AWS"), "Lambda throttles"),
        ];
        let split = c.split(&incidents);
        assert_eq!(split.infrastructure.len(), 2);
        assert_eq!(split.other.len(), 1);
        assert_eq!(split.other[0].condition_name, "Checkout latency");
    }
}
