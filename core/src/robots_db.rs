use std::collections::HashMap;

use parking_lot::RwLock;

use crate::parse::AgentRules;
use crate::url::Url;

/// One disallowed path prefix, together with whichever allowed prefixes
/// nest inside it (an `Allow:` rule only matters when it carves an
/// exception out of a `Disallow:` rule that would otherwise cover it).
#[derive(Debug, Clone)]
struct Rule {
    prohibited: String,
    allowed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RobotsRuleSet {
    rules: Vec<Rule>,
    pub crawl_delay: Option<f64>,
}

impl RobotsRuleSet {
    /// Builds the nesting of disallow/allow prefixes the way `add_rules`
    /// does: prohibited prefixes are ordered longest-first, and an allowed
    /// prefix is consumed into the first (longest) prohibited prefix it
    /// nests under.
    fn from_agent_rules(agent: &AgentRules) -> Self {
        let mut prohibited: Vec<String> = agent.disallow.clone();
        prohibited.sort_by_key(|s| std::cmp::Reverse(s.len()));
        let mut allowed: Vec<String> = agent.allow.clone();
        allowed.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut rules = Vec::with_capacity(prohibited.len());
        for proh in prohibited {
            let mut nested = Vec::new();
            allowed.retain(|allo| {
                if allo.len() >= proh.len() && allo.starts_with(&proh) {
                    nested.push(allo.clone());
                    false
                } else {
                    true
                }
            });
            rules.push(Rule {
                prohibited: proh,
                allowed: nested,
            });
        }
        RobotsRuleSet {
            rules,
            crawl_delay: agent.crawl_delay,
        }
    }

    /// No rules at all means nothing is disallowed.
    fn is_permitted(&self, path: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        for rule in &self.rules {
            if path.starts_with(&rule.prohibited) {
                return rule.allowed.iter().any(|a| path.starts_with(a.as_str()));
            }
        }
        true
    }
}

/// Picks the most specific matching `User-agent` block for `agent` out of a
/// parsed `robots.txt`'s blocks: an exact (case-insensitive) match wins,
/// falling back to a wildcard (`*`) block, and finally no block at all.
pub fn select_agent_block<'a>(blocks: &'a [AgentRules], agent: &str) -> Option<&'a AgentRules> {
    let agent = agent.to_ascii_lowercase();
    blocks
        .iter()
        .find(|b| b.user_agents.iter().any(|ua| ua == &agent))
        .or_else(|| blocks.iter().find(|b| b.user_agents.iter().any(|ua| ua == "*")))
}

/// Per-origin robots rules, shared across every worker crawling that
/// origin's domain.
pub struct RobotsDb {
    origins: RwLock<HashMap<String, RobotsRuleSet>>,
}

impl RobotsDb {
    pub fn new() -> Self {
        RobotsDb {
            origins: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, origin: &str, agent: &AgentRules) {
        let rule_set = RobotsRuleSet::from_agent_rules(agent);
        self.origins.write().insert(origin.to_string(), rule_set);
    }

    pub fn has_rules_for(&self, origin: &str) -> bool {
        self.origins.read().contains_key(origin)
    }

    pub fn is_permitted(&self, url: &Url) -> bool {
        match self.origins.read().get(&url.origin()) {
            Some(rules) => rules.is_permitted(url.path()),
            None => true,
        }
    }

    pub fn crawl_delay(&self, origin: &str) -> Option<f64> {
        self.origins.read().get(origin).and_then(|r| r.crawl_delay)
    }

    pub fn remove(&self, origin: &str) {
        self.origins.write().remove(origin);
    }
}

impl Default for RobotsDb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_robots_txt;

    #[test]
    fn nested_allow_inside_disallow_is_permitted() {
        let parsed = parse_robots_txt(
            "User-agent: *\nDisallow: /private\nAllow: /private/public\n",
        );
        let block = select_agent_block(&parsed.blocks, "any-bot").unwrap();
        let db = RobotsDb::new();
        db.add("https://example.com", block);

        assert!(db.is_permitted(&Url::parse("https://example.com/private/public/page", None).unwrap()));
        assert!(!db.is_permitted(&Url::parse("https://example.com/private/secret", None).unwrap()));
        assert!(db.is_permitted(&Url::parse("https://example.com/open", None).unwrap()));
    }

    #[test]
    fn no_rules_for_origin_means_permitted() {
        let db = RobotsDb::new();
        assert!(db.is_permitted(&Url::parse("https://unknown.example.com/x", None).unwrap()));
    }

    #[test]
    fn longest_prohibited_prefix_wins() {
        let parsed = parse_robots_txt(
            "User-agent: *\nDisallow: /a\nDisallow: /a/b\nAllow: /a/b/c\n",
        );
        let block = select_agent_block(&parsed.blocks, "bot").unwrap();
        let db = RobotsDb::new();
        db.add("https://example.com", block);
        // /a/b/c/d matches the longer /a/b rule first, which allows /a/b/c
        assert!(db.is_permitted(&Url::parse("https://example.com/a/b/c/d", None).unwrap()));
        assert!(!db.is_permitted(&Url::parse("https://example.com/a/b/x", None).unwrap()));
    }
}
