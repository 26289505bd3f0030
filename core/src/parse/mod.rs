pub mod html;
pub mod robots_txt;
pub mod sitemap;

pub use html::{HtmlDoc, PageMetadata};
pub use robots_txt::{parse_robots_txt, AgentRules, RobotsTxt};
pub use sitemap::{parse_sitemap, NewsEntry, SitemapDoc, SitemapIndexEntry, SitemapUrlEntry};
