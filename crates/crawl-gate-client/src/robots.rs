//! robots.txt crawl-delay discovery.
//!
//! `Crawl-delay` is not part of the robots exclusion standard, so the
//! `robotstxt` parser hands it to us as an unknown directive. We collect it
//! per user-agent group and answer allow/disallow questions with the
//! crate's own matcher.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crawl_gate_core::config::parse_delay_secs;
use crawl_gate_core::error::AppError;
use crawl_gate_core::traits::Fetcher;
use robotstxt::{DefaultMatcher, RobotsParseHandler, parse_robotstxt};
use url::Url;

const WILDCARD: &str = "*";

/// Parsed robots.txt for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    body: String,
    /// Lowercased product token (or `*`) -> declared delay.
    delays: HashMap<String, Duration>,
    /// Every product token that has a group of its own.
    groups: HashSet<String>,
}

impl RobotsPolicy {
    /// A policy that allows everything and declares no delay.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(body: &str) -> Self {
        let mut collector = DelayCollector::default();
        parse_robotstxt(body, &mut collector);

        Self {
            body: body.to_string(),
            delays: collector.delays,
            groups: collector.groups,
        }
    }

    /// Fetch and parse the robots.txt governing `page_url`.
    ///
    /// A robots.txt that cannot be fetched is treated as absent: everything
    /// is allowed and no delay is declared.
    pub async fn fetch<F: Fetcher>(fetcher: &F, page_url: &str) -> Result<Self, AppError> {
        let robots = robots_url(page_url)?;
        match fetcher.fetch(&robots).await {
            Ok(body) => {
                tracing::debug!(url = %robots, bytes = body.len(), "Fetched robots.txt");
                Ok(Self::parse(&body))
            }
            Err(e) => {
                tracing::info!(url = %robots, error = %e, "No usable robots.txt, assuming no restrictions");
                Ok(Self::empty())
            }
        }
    }

    /// The `Crawl-delay` that applies to `user_agent`.
    ///
    /// A group naming the agent takes precedence over `*` even when it
    /// declares no delay itself.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let token = product_token(user_agent).to_ascii_lowercase();
        if self.groups.contains(&token) {
            self.delays.get(&token).copied()
        } else {
            self.delays.get(WILDCARD).copied()
        }
    }

    pub fn is_allowed(&self, user_agent: &str, url: &str) -> bool {
        if self.body.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, product_token(user_agent), url)
    }
}

/// robots.txt URL for the origin of `page_url`.
pub fn robots_url(page_url: &str) -> Result<String, AppError> {
    let parsed = Url::parse(page_url)
        .map_err(|e| AppError::RobotsError(format!("Invalid URL '{page_url}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::RobotsError(format!(
                "URL scheme '{scheme}' has no robots.txt (only http/https)"
            )));
        }
    }
    if parsed.host_str().is_none() {
        return Err(AppError::RobotsError(format!("URL '{page_url}' has no host")));
    }

    parsed
        .join("/robots.txt")
        .map(String::from)
        .map_err(|e| AppError::RobotsError(e.to_string()))
}

/// Leading `[A-Za-z_-]` run of a User-Agent string, e.g. `mybot` for
/// `mybot/1.2 (+https://example.com)`.
fn product_token(user_agent: &str) -> &str {
    let trimmed = user_agent.trim();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '-' || c == '_' || c == '*'))
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Parse callback that records `Crawl-delay` per user-agent group.
#[derive(Default)]
struct DelayCollector {
    current: Vec<String>,
    in_agent_lines: bool,
    delays: HashMap<String, Duration>,
    groups: HashSet<String>,
}

impl DelayCollector {
    fn end_agent_lines(&mut self) {
        self.in_agent_lines = false;
    }
}

impl RobotsParseHandler for DelayCollector {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        // A user-agent line after rules opens a new group.
        if !self.in_agent_lines {
            self.current.clear();
            self.in_agent_lines = true;
        }
        let token = product_token(user_agent).to_ascii_lowercase();
        if token.is_empty() {
            return;
        }
        self.groups.insert(token.clone());
        self.current.push(token);
    }

    fn handle_allow(&mut self, _line_num: u32, _value: &str) {
        self.end_agent_lines();
    }

    fn handle_disallow(&mut self, _line_num: u32, _value: &str) {
        self.end_agent_lines();
    }

    fn handle_sitemap(&mut self, _line_num: u32, _value: &str) {}

    fn handle_unknown_action(&mut self, line_num: u32, action: &str, value: &str) {
        self.end_agent_lines();
        if !action.eq_ignore_ascii_case("crawl-delay") {
            return;
        }
        let delay = match parse_delay_secs(value) {
            Ok(delay) => delay,
            Err(e) => {
                tracing::warn!(line = line_num, value = %value, error = %e, "Ignoring invalid Crawl-delay");
                return;
            }
        };
        for agent in &self.current {
            self.delays.entry(agent.clone()).or_insert(delay);
        }
    }
}
