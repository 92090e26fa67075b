/*
 * budget.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Token budget accounting.
//!
//! A [`BudgetManager`] is built by the caller for every render. It tracks
//! one main pool plus any number of lanes, a stack of node ceilings, and
//! per-owner floor reservations.
//!
//! Precedence when the three interact is floor > lane > node:
//!
//! - A floor guarantees its owner at least the outstanding reservation, even
//!   when a lane or node ceiling is tighter or the main pool is spent.
//!   Non-owners drawing from the main pool cannot touch unreleased floors.
//! - A declared lane is carved out of the main pool and has its own ledger.
//!   Spending inside a lane never touches the main pool, and the main pool's
//!   floors do not block it. Undeclared lanes fall back to the main pool.
//! - A node ceiling caps whatever pool is active and nests with enclosing
//!   ceilings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Estimates the token cost of text.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u32;
}

/// Fixed characters-per-token estimate, rounded up.
///
/// Non-empty text always costs at least one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRatioEstimator {
    chars_per_token: u32,
}

impl CharRatioEstimator {
    pub const DEFAULT_CHARS_PER_TOKEN: u32 = 4;

    pub fn new(chars_per_token: u32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        chars.div_ceil(self.chars_per_token)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Ledger {
    limit: u32,
    consumed: u32,
}

impl Ledger {
    fn new(limit: u32) -> Self {
        Self { limit, consumed: 0 }
    }

    fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.consumed)
    }

    fn charge(&mut self, tokens: u32) {
        self.consumed = self.consumed.saturating_add(tokens);
    }
}

/// Token accounting for one render.
pub struct BudgetManager {
    main: Ledger,
    lanes: BTreeMap<String, Ledger>,
    /// Outstanding (unspent) floor per owner.
    floors: BTreeMap<String, u32>,
    nodes: Vec<Ledger>,
    active_lane: Option<String>,
    owner: Option<String>,
    consumed: u32,
    estimator: Box<dyn TokenEstimator>,
}

impl std::fmt::Debug for BudgetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetManager")
            .field("main", &self.main)
            .field("lanes", &self.lanes)
            .field("floors", &self.floors)
            .field("nodes", &self.nodes)
            .field("active_lane", &self.active_lane)
            .field("owner", &self.owner)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

impl BudgetManager {
    pub fn new(max_tokens: u32, estimator: impl TokenEstimator + 'static) -> Self {
        Self {
            main: Ledger::new(max_tokens),
            lanes: BTreeMap::new(),
            floors: BTreeMap::new(),
            nodes: Vec::new(),
            active_lane: None,
            owner: None,
            consumed: 0,
            estimator: Box::new(estimator),
        }
    }

    /// Budget with the default character-ratio estimator.
    pub fn with_default_estimator(max_tokens: u32) -> Self {
        Self::new(max_tokens, CharRatioEstimator::default())
    }

    /// Declare a lane, carving its allowance out of the main pool.
    ///
    /// The allowance is capped by what the main pool still has.
    /// Redeclaring a lane returns its old allowance to the pool first.
    pub fn with_lane_budget(mut self, lane: impl Into<String>, max_tokens: u32) -> Self {
        let lane = lane.into();
        if let Some(old) = self.lanes.remove(&lane) {
            self.main.limit = self.main.limit.saturating_add(old.limit);
        }
        let carved = max_tokens.min(self.main.remaining());
        self.main.limit -= carved;
        self.lanes.insert(lane, Ledger::new(carved));
        self
    }

    pub fn estimate_tokens(&self, text: &str) -> u32 {
        self.estimator.estimate(text)
    }

    /// Tokens the current consumer may still spend.
    pub fn remaining(&self) -> u32 {
        let pool = match self.active_lane.as_deref().and_then(|l| self.lanes.get(l)) {
            Some(lane) => lane.remaining(),
            None => self.main.remaining().saturating_sub(self.blocked_by_floors()),
        };
        let capped = self
            .nodes
            .iter()
            .map(Ledger::remaining)
            .fold(pool, u32::min);
        capped.max(self.own_floor())
    }

    pub fn has_any(&self) -> bool {
        self.remaining() > 0
    }

    pub fn can_fit_token_estimate(&self, tokens: u32) -> bool {
        tokens <= self.remaining()
    }

    /// Total tokens charged so far, across the main pool and all lanes.
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Charge tokens to the active pool, every open node ceiling and, for a
    /// floor owner spending from the main pool, its outstanding floor. Never
    /// goes negative.
    pub fn consume(&mut self, tokens: u32) {
        let in_lane = self.in_declared_lane();
        self.consumed = self.consumed.saturating_add(tokens);
        for node in &mut self.nodes {
            node.charge(tokens);
        }
        match self
            .active_lane
            .as_deref()
            .and_then(|l| self.lanes.get_mut(l))
        {
            Some(lane) => lane.charge(tokens),
            None => self.main.charge(tokens),
        }
        if !in_lane {
            if let Some(floor) = self.owner_floor_mut() {
                *floor = floor.saturating_sub(tokens);
            }
        }
        trace!(tokens, remaining = self.remaining(), "consumed");
    }

    /// Run `f` with up to `tokens` of the current owner's floor set aside.
    ///
    /// The set-aside part is neither available nor charged inside `f`, and
    /// is returned to the floor afterwards.
    pub fn with_floor_held_back<R>(&mut self, tokens: u32, f: impl FnOnce(&mut Self) -> R) -> R {
        let held = match self.owner_floor_mut() {
            Some(floor) => {
                let held = tokens.min(*floor);
                *floor -= held;
                held
            }
            None => 0,
        };
        let result = f(self);
        if let Some(floor) = self.owner_floor_mut() {
            *floor = floor.saturating_add(held);
        }
        result
    }

    /// Run `f` under an additional ceiling of `max_tokens`.
    pub fn with_node_budget<R>(&mut self, max_tokens: u32, f: impl FnOnce(&mut Self) -> R) -> R {
        self.nodes.push(Ledger::new(max_tokens));
        let result = f(self);
        self.nodes.pop();
        result
    }

    /// Run `f` with spending charged to `lane`.
    pub fn with_lane<R>(&mut self, lane: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.active_lane.replace(lane.to_string());
        let result = f(self);
        self.active_lane = previous;
        result
    }

    /// Reserve `tokens` of the main pool for `owner`.
    pub fn reserve_floor(&mut self, owner: impl Into<String>, tokens: u32) {
        let owner = owner.into();
        trace!(owner = %owner, tokens, "floor reserved");
        self.floors.insert(owner, tokens);
    }

    /// Return whatever is left of `owner`'s floor to the main pool.
    pub fn release_floor(&mut self, owner: &str) {
        if let Some(left) = self.floors.remove(owner) {
            trace!(owner, left, "floor released");
        }
    }

    /// Run `f` as `owner`, so its floor is available and charged.
    pub fn with_floor_owner<R>(&mut self, owner: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.owner.replace(owner.to_string());
        let result = f(self);
        self.owner = previous;
        result
    }

    /// Unspent floor of the current owner, when drawing from the main pool.
    fn own_floor(&self) -> u32 {
        if self.in_declared_lane() {
            return 0;
        }
        self.owner
            .as_deref()
            .and_then(|o| self.floors.get(o))
            .copied()
            .unwrap_or(0)
    }

    fn owner_floor_mut(&mut self) -> Option<&mut u32> {
        let owner = self.owner.as_deref()?;
        self.floors.get_mut(owner)
    }

    /// Unspent floors belonging to anyone but the current owner.
    fn blocked_by_floors(&self) -> u32 {
        self.floors
            .iter()
            .filter(|(owner, _)| Some(owner.as_str()) != self.owner.as_deref())
            .fold(0u32, |sum, (_, left)| sum.saturating_add(*left))
    }

    fn in_declared_lane(&self) -> bool {
        self.active_lane
            .as_deref()
            .is_some_and(|l| self.lanes.contains_key(l))
    }
}

/// Serializable description of a budget, for callers that load it from a
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    pub max_tokens: u32,
    #[serde(default)]
    pub lanes: BTreeMap<String, u32>,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u32,
}

fn default_chars_per_token() -> u32 {
    CharRatioEstimator::DEFAULT_CHARS_PER_TOKEN
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            lanes: BTreeMap::new(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl BudgetConfig {
    /// Build a fresh manager; lanes are carved in name order.
    pub fn build(&self) -> BudgetManager {
        self.lanes.iter().fold(
            BudgetManager::new(self.max_tokens, CharRatioEstimator::new(self.chars_per_token)),
            |budget, (lane, tokens)| budget.with_lane_budget(lane.clone(), *tokens),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max: u32) -> BudgetManager {
        BudgetManager::with_default_estimator(max)
    }

    #[test]
    fn test_char_ratio_estimator() {
        let est = CharRatioEstimator::default();
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("a"), 1);
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcde"), 2);
        assert_eq!(est.estimate("ééééé"), 2);
        assert_eq!(CharRatioEstimator::new(0).estimate("abc"), 3);
    }

    #[test]
    fn test_consume_saturates() {
        let mut b = budget(10);
        assert!(b.has_any());
        assert!(b.can_fit_token_estimate(10));
        assert!(!b.can_fit_token_estimate(11));
        b.consume(7);
        assert_eq!(b.remaining(), 3);
        b.consume(7);
        assert_eq!(b.remaining(), 0);
        assert!(!b.has_any());
        assert_eq!(b.consumed(), 14);
    }

    #[test]
    fn test_node_budgets_nest_and_restore() {
        let mut b = budget(100);
        b.with_node_budget(30, |b| {
            assert_eq!(b.remaining(), 30);
            b.consume(10);
            b.with_node_budget(50, |b| {
                assert_eq!(b.remaining(), 20);
                b.consume(5);
            });
            assert_eq!(b.remaining(), 15);
        });
        assert_eq!(b.remaining(), 85);
    }

    #[test]
    fn test_lane_is_carved_and_isolated() {
        let mut b = budget(100).with_lane_budget("attachments", 20);
        assert_eq!(b.remaining(), 80);
        b.with_lane("attachments", |b| {
            assert_eq!(b.remaining(), 20);
            b.consume(25);
            assert_eq!(b.remaining(), 0);
        });
        assert_eq!(b.remaining(), 80);

        // Undeclared lanes draw from the main pool.
        b.with_lane("other", |b| b.consume(10));
        assert_eq!(b.remaining(), 70);
    }

    #[test]
    fn test_lane_carve_is_capped_by_pool() {
        let b = budget(10).with_lane_budget("a", 8).with_lane_budget("b", 8);
        assert_eq!(b.remaining(), 0);
        let b = b.with_lane_budget("a", 1);
        assert_eq!(b.remaining(), 7);
    }

    #[test]
    fn test_floor_blocks_other_consumers() {
        let mut b = budget(100);
        b.reserve_floor("history", 40);
        assert_eq!(b.remaining(), 60);
        b.with_floor_owner("characters", |b| {
            assert_eq!(b.remaining(), 60);
            b.consume(60);
            assert!(!b.has_any());
        });
        b.with_floor_owner("history", |b| {
            assert_eq!(b.remaining(), 40);
            b.consume(15);
            assert_eq!(b.remaining(), 25);
        });
        b.release_floor("history");
        assert_eq!(b.remaining(), 25);
    }

    #[test]
    fn test_floor_beats_node_ceiling() {
        let mut b = budget(100);
        b.reserve_floor("history", 40);
        b.with_floor_owner("history", |b| {
            b.with_node_budget(10, |b| {
                assert_eq!(b.remaining(), 40);
                b.consume(35);
                assert_eq!(b.remaining(), 5);
            });
        });
    }

    #[test]
    fn test_floor_survives_exhausted_pool() {
        let mut b = budget(50);
        b.reserve_floor("history", 30);
        b.reserve_floor("lore", 30);
        assert_eq!(b.remaining(), 0);
        b.with_floor_owner("history", |b| {
            assert_eq!(b.remaining(), 30);
            b.consume(30);
        });
        b.release_floor("history");
        b.with_floor_owner("lore", |b| {
            assert_eq!(b.remaining(), 30);
            b.consume(30);
        });
        assert_eq!(b.consumed(), 60);
        assert!(b.consumed() <= 50 + 30 + 30);
    }

    #[test]
    fn test_lane_ignores_main_floors_and_respects_nodes() {
        let mut b = budget(100).with_lane_budget("attachments", 30);
        b.reserve_floor("history", 70);
        assert_eq!(b.remaining(), 0);
        b.with_lane("attachments", |b| {
            assert_eq!(b.remaining(), 30);
            b.with_node_budget(12, |b| assert_eq!(b.remaining(), 12));
        });
    }

    #[test]
    fn test_budget_config_builds_lanes() {
        let config: BudgetConfig = serde_json::from_str(
            r#"{ "maxTokens": 100, "lanes": { "attachments": 25 } }"#,
        )
        .unwrap();
        assert_eq!(config.chars_per_token, 4);
        let mut b = config.build();
        assert_eq!(b.remaining(), 75);
        b.with_lane("attachments", |b| assert_eq!(b.remaining(), 25));
    }

    #[test]
    fn test_floor_held_back_is_restored() {
        let mut b = budget(10);
        b.reserve_floor("history", 6);
        b.with_floor_owner("history", |b| {
            b.with_node_budget(2, |b| {
                b.with_floor_held_back(1, |b| {
                    assert_eq!(b.remaining(), 5);
                    b.consume(5);
                    assert_eq!(b.remaining(), 0);
                });
                // The held-back token is still reserved for the owner.
                assert_eq!(b.remaining(), 1);
            });
        });
        b.with_floor_owner("other", |b| assert_eq!(b.remaining(), 4));
    }

    #[test]
    fn test_floor_held_back_without_floor_is_a_no_op() {
        let mut b = budget(10);
        b.with_floor_held_back(3, |b| assert_eq!(b.remaining(), 10));
        assert_eq!(b.remaining(), 10);
    }
}
