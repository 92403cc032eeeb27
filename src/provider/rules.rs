//! Path-pattern cache and invalidation rules.
//!
//! Rules are keyed by their glob pattern: adding a rule for a pattern that already
//! exists replaces it in place. At apply time every matching rule is applied, in
//! insertion order, so later rules override earlier ones field by field.

use crate::error::Result;
use crate::pattern::GlobPattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upload-time cache behaviour for matching paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheRule {
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub cache_control: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl CacheRule {
    pub fn ttl(ttl_secs: u64) -> Self {
        Self {
            ttl_secs: Some(ttl_secs),
            ..Self::default()
        }
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Extra invalidation triggered when a matching path is invalidated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvalidationRule {
    /// Paths invalidated alongside the matching one.
    #[serde(default)]
    pub also_invalidate: Vec<String>,
    /// Forces a recursive invalidation.
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone)]
struct Keyed<R> {
    pattern: GlobPattern,
    rule: R,
}

/// Ordered, pattern-keyed rule map.
#[derive(Debug, Clone)]
pub struct RuleSet<R> {
    rules: Vec<Keyed<R>>,
}

impl<R> Default for RuleSet<R> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<R> RuleSet<R> {
    /// Inserts a rule. Returns true if it replaced an existing rule for the pattern.
    pub fn insert(&mut self, pattern: &str, rule: R) -> Result<bool> {
        if let Some(existing) = self.rules.iter_mut().find(|k| k.pattern.as_str() == pattern) {
            existing.rule = rule;
            return Ok(true);
        }

        self.rules.push(Keyed {
            pattern: GlobPattern::new(pattern)?,
            rule,
        });
        Ok(false)
    }

    /// Every rule matching the path, in insertion order, with its pattern.
    pub fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a str, &'a R)> + 'a {
        self.rules
            .iter()
            .filter(move |k| k.pattern.matches(path))
            .map(|k| (k.pattern.as_str(), &k.rule))
    }

    pub fn patterns(&self) -> Vec<String> {
        self.rules.iter().map(|k| k.pattern.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Effective upload settings for a path after all matching cache rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedCacheRules {
    pub ttl_secs: Option<u64>,
    pub cache_control: Option<String>,
    pub headers: HashMap<String, String>,
    pub matched: usize,
}

impl RuleSet<CacheRule> {
    pub fn apply(&self, path: &str) -> AppliedCacheRules {
        let mut applied = AppliedCacheRules::default();

        for (_, rule) in self.matching(path) {
            applied.matched += 1;
            if let Some(ttl) = rule.ttl_secs {
                applied.ttl_secs = Some(ttl);
                if rule.cache_control.is_none() {
                    applied.cache_control = Some(format!("public, max-age={}", ttl));
                }
            }
            if let Some(cc) = &rule.cache_control {
                applied.cache_control = Some(cc.clone());
            }
            applied
                .headers
                .extend(rule.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        applied
    }
}

/// Invalidation set after rule expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationPlan {
    pub paths: Vec<String>,
    pub recursive: bool,
    /// Patterns of the rules that fired.
    pub triggered: Vec<String>,
}

impl RuleSet<InvalidationRule> {
    /// Expands paths one level through matching rules. Order is preserved and
    /// duplicates are dropped.
    pub fn expand(&self, paths: &[String], recursive: bool) -> InvalidationPlan {
        let mut plan = InvalidationPlan {
            recursive,
            ..InvalidationPlan::default()
        };

        fn push(plan: &mut InvalidationPlan, path: &str) {
            if !plan.paths.iter().any(|p| p == path) {
                plan.paths.push(path.to_string());
            }
        }

        for path in paths {
            push(&mut plan, path);
            for (pattern, rule) in self.matching(path) {
                plan.recursive |= rule.recursive;
                if !plan.triggered.iter().any(|p| p == pattern) {
                    plan.triggered.push(pattern.to_string());
                }
                for extra in &rule.also_invalidate {
                    push(&mut plan, extra);
                }
            }
        }

        plan
    }
}
