//! Pluggable reward strategies.

use crate::domain::env::PortfolioEnv;

/// Converts simulation state into a scalar reward. Strategies are injected
/// at environment construction and queried once per tick.
pub trait RewardStrategy {
    fn reward(&self, env: &PortfolioEnv) -> f64;
}

/// Net return since inception: `profit - 1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineRewardStrategy;

impl RewardStrategy for BaselineRewardStrategy {
    fn reward(&self, env: &PortfolioEnv) -> f64 {
        env.profit() - 1.0
    }
}

/// Baseline net return plus independent, summable shaping terms:
///
/// - a momentum bonus of `±momentum_bonus`, evaluated every
///   `momentum_period` ticks against the profit one period earlier;
/// - a greedy-trader penalty when a position is closed before
///   `min_holding_ticks`;
/// - a passive-trader penalty while a position is held beyond
///   `max_holding_ticks`.
///
/// A zero period or threshold disables the corresponding term.
#[derive(Debug, Clone, Copy)]
pub struct MixedRewardStrategy {
    pub momentum_period: usize,
    pub momentum_bonus: f64,
    pub min_holding_ticks: usize,
    pub greedy_penalty: f64,
    pub max_holding_ticks: usize,
    pub passive_penalty: f64,
}

impl Default for MixedRewardStrategy {
    fn default() -> Self {
        Self {
            momentum_period: 50,
            momentum_bonus: 0.25,
            min_holding_ticks: 0,
            greedy_penalty: 0.0,
            max_holding_ticks: 0,
            passive_penalty: 0.0,
        }
    }
}

impl RewardStrategy for MixedRewardStrategy {
    fn reward(&self, env: &PortfolioEnv) -> f64 {
        let tick = env.current_tick();
        let mut total = env.profit() - 1.0;

        if self.momentum_period > 0 && tick % self.momentum_period == 0 {
            let previous = tick.saturating_sub(self.momentum_period);
            let increased = env.profit_at(tick) > env.profit_at(previous);
            total += if increased {
                self.momentum_bonus
            } else {
                -self.momentum_bonus
            };
        }

        if self.min_holding_ticks > 0
            && let Some(event) = env.recent_event()
            && let Some(source) = &event.source
            && source.held_ticks < self.min_holding_ticks
        {
            total -= self.greedy_penalty;
        }

        if self.max_holding_ticks > 0 && env.position_age() > self.max_holding_ticks {
            total -= self.passive_penalty;
        }

        total
    }
}
