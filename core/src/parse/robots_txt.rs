/// A parsed `robots.txt` block, for a single `User-agent`.
///
/// `Noindex:`/`Nofollow:` directives are folded straight into `disallow`:
/// the spec treats their path value as just another disallowed prefix,
/// there is no separate indexing/following distinction at this layer.
#[derive(Debug, Clone, Default)]
pub struct AgentRules {
    pub user_agents: Vec<String>,
    pub disallow: Vec<String>,
    pub allow: Vec<String>,
    pub crawl_delay: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    pub blocks: Vec<AgentRules>,
    pub sitemaps: Vec<String>,
}

/// Scans `robots.txt` content line by line.
///
/// A `User-agent:` or `Sitemap:` line always terminates whatever per-agent
/// block is currently open — a `Sitemap:` line is never folded into the
/// block it happens to follow, it is recorded at the outer scan level and
/// then the current block is closed exactly as a new `User-agent:` would
/// close it. This matches directive grouping as most real robots.txt files
/// are written (Sitemap declarations trail a ruleset, they don't belong to
/// the agent above them) rather than the stricter per-RFC reading.
pub fn parse_robots_txt(text: &str) -> RobotsTxt {
    let mut blocks: Vec<AgentRules> = Vec::new();
    let mut sitemaps: Vec<String> = Vec::new();
    let mut current: Option<AgentRules> = None;

    for raw_line in text.lines() {
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_ascii_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(AgentRules {
                    user_agents: vec![value.to_ascii_lowercase()],
                    ..Default::default()
                });
            }
            "sitemap" => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                sitemaps.push(value.to_string());
            }
            "disallow" | "noindex" | "nofollow" => {
                if let Some(block) = current.as_mut() {
                    if !value.is_empty() {
                        block.disallow.push(value.to_string());
                    }
                }
            }
            "allow" => {
                if let Some(block) = current.as_mut() {
                    if !value.is_empty() {
                        block.allow.push(value.to_string());
                    }
                }
            }
            "crawl-delay" => {
                if let Some(block) = current.as_mut() {
                    block.crawl_delay = value.parse::<f64>().ok();
                }
            }
            _ => {}
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }

    RobotsTxt { blocks, sitemaps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_disallow_under_user_agent() {
        let txt = "User-agent: *\nDisallow: /private\nAllow: /private/ok\n";
        let parsed = parse_robots_txt(txt);
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].user_agents, vec!["*"]);
        assert_eq!(parsed.blocks[0].disallow, vec!["/private"]);
        assert_eq!(parsed.blocks[0].allow, vec!["/private/ok"]);
    }

    #[test]
    fn sitemap_line_closes_current_block_and_is_not_assigned_to_it() {
        let txt = "User-agent: *\nDisallow: /a\nSitemap: https://example.com/sitemap.xml\nDisallow: /b\n";
        let parsed = parse_robots_txt(txt);
        assert_eq!(parsed.sitemaps, vec!["https://example.com/sitemap.xml"]);
        // the Disallow: /b line has no open block to attach to, since
        // Sitemap: closed the previous one, so it is simply dropped.
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].disallow, vec!["/a"]);
    }

    #[test]
    fn new_user_agent_closes_previous_block() {
        let txt = "User-agent: a\nDisallow: /x\nUser-agent: b\nDisallow: /y\n";
        let parsed = parse_robots_txt(txt);
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[0].user_agents, vec!["a"]);
        assert_eq!(parsed.blocks[0].disallow, vec!["/x"]);
        assert_eq!(parsed.blocks[1].user_agents, vec!["b"]);
        assert_eq!(parsed.blocks[1].disallow, vec!["/y"]);
    }

    #[test]
    fn crawl_delay_and_comments() {
        let txt = "# comment\nUser-agent: *\nCrawl-delay: 2.5 # inline comment\n";
        let parsed = parse_robots_txt(txt);
        assert_eq!(parsed.blocks[0].crawl_delay, Some(2.5));
    }

    #[test]
    fn noindex_and_nofollow_become_disallow_prefixes() {
        let txt = "User-agent: *\nNoindex: /drafts\nNofollow: /private\n";
        let parsed = parse_robots_txt(txt);
        assert_eq!(parsed.blocks[0].disallow, vec!["/drafts", "/private"]);
    }
}
