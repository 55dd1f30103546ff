//! Scheduling strategies: pure functions mapping a flow's current state to the
//! delay before the dispatcher re-checks it.
//!
//! Every strategy sees the same observable state — how many nodes are active,
//! failed, and newly started since the last tick — and decides whether to
//! keep polling at all (`None` once nothing is active) and how hard to back
//! off. Only [`random`] is non-deterministic given its inputs, which is the
//! point: retry storms are exactly the case where perfect synchrony across
//! flow instances is undesirable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelinonError};

/// `{function, args}` — selects a strategy function and its keyword
/// arguments, as bound in a flow's `strategy:` YAML block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBinding {
    pub function: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// The observable state a strategy function is allowed to react to. No access
/// to wall-clock time or task identities: strategies schedule *pace*, not
/// *policy*.
///
/// `new_started_nodes`/`new_fallback_nodes` count nodes (ordinary or
/// fallback) that started since the previous tick — this is the "did
/// progress happen" signal the increase/decrease strategies key off, as
/// opposed to `failed_nodes`, which only reports current failure count.
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput {
    pub active_nodes: usize,
    pub failed_nodes: usize,
    pub new_started_nodes: usize,
    pub new_fallback_nodes: usize,
    /// `None` on the first scheduling decision for a flow instance.
    pub previous_retry: Option<Duration>,
}

impl StrategyInput {
    fn progressed(&self) -> bool {
        self.new_started_nodes > 0 || self.new_fallback_nodes > 0
    }
}

fn arg_f64(args: &serde_json::Map<String, serde_json::Value>, key: &str, default: f64) -> f64 {
    args.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

/// Always the same delay, ignoring progress — `None` once nothing is active,
/// since there's nothing left to re-check.
pub fn constant(args: &serde_json::Map<String, serde_json::Value>, input: StrategyInput) -> Option<Duration> {
    if input.active_nodes == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(arg_f64(args, "retry", 2.0).max(0.0)))
}

/// Uniformly random delay in `[start_retry, max_retry]`, or `None` once
/// nothing is active.
pub fn random(args: &serde_json::Map<String, serde_json::Value>, input: StrategyInput) -> Option<Duration> {
    if input.active_nodes == 0 {
        return None;
    }
    let start_retry = arg_f64(args, "start_retry", 1.0);
    let max_retry = arg_f64(args, "max_retry", 16.0);
    let (lo, hi) = if start_retry <= max_retry {
        (start_retry, max_retry)
    } else {
        (max_retry, start_retry)
    };
    let value = rand::Rng::gen_range(&mut rand::thread_rng(), lo..=hi);
    Some(Duration::from_secs_f64(value))
}

/// Increases linearly by `step` while nodes keep starting, resets hard to
/// `start_retry` the moment a tick passes with no progress.
pub fn linear_increase(args: &serde_json::Map<String, serde_json::Value>, input: StrategyInput) -> Option<Duration> {
    if input.active_nodes == 0 {
        return None;
    }
    let start_retry = arg_f64(args, "start_retry", 2.0);
    let max_retry = arg_f64(args, "max_retry", 128.0);
    let step = arg_f64(args, "step", 2.0);
    if input.progressed() {
        let previous = input.previous_retry.map(|d| d.as_secs_f64()).unwrap_or(start_retry);
        let next = (previous + step).min(max_retry);
        Some(Duration::from_secs_f64(next))
    } else {
        Some(Duration::from_secs_f64(start_retry))
    }
}

/// Like [`linear_increase`], but backs off by `step` rather than resetting
/// outright once progress stalls, floored at `start_retry`.
pub fn linear_adapt(args: &serde_json::Map<String, serde_json::Value>, input: StrategyInput) -> Option<Duration> {
    if input.active_nodes == 0 {
        return None;
    }
    let start_retry = arg_f64(args, "start_retry", 2.0);
    let max_retry = arg_f64(args, "max_retry", 128.0);
    let step = arg_f64(args, "step", 2.0);
    let previous = input.previous_retry.map(|d| d.as_secs_f64()).unwrap_or(start_retry);
    if input.progressed() {
        Some(Duration::from_secs_f64((previous + step).min(max_retry)))
    } else {
        Some(Duration::from_secs_f64((previous - step).max(start_retry)))
    }
}

/// Doubles on progress up to `max_retry`, resets hard to `start_retry`
/// otherwise.
pub fn biexponential_increase(
    args: &serde_json::Map<String, serde_json::Value>,
    input: StrategyInput,
) -> Option<Duration> {
    let start_retry = arg_f64(args, "start_retry", 2.0);
    let Some(previous) = input.previous_retry else {
        return Some(Duration::from_secs_f64(start_retry));
    };
    if input.active_nodes == 0 {
        return None;
    }
    let max_retry = arg_f64(args, "max_retry", 128.0);
    if input.progressed() {
        Some(Duration::from_secs_f64((previous.as_secs_f64() * 2.0).min(max_retry)))
    } else {
        Some(Duration::from_secs_f64(start_retry))
    }
}

/// Halves every tick regardless of progress, floored at `stop_retry`. Mirrors
/// the original's behavior of only ever decreasing: this strategy doesn't
/// read `new_started_nodes`/`new_fallback_nodes` at all.
pub fn biexponential_decrease(
    args: &serde_json::Map<String, serde_json::Value>,
    input: StrategyInput,
) -> Option<Duration> {
    let start_retry = arg_f64(args, "start_retry", 2.0);
    let Some(previous) = input.previous_retry else {
        return Some(Duration::from_secs_f64(start_retry));
    };
    if input.active_nodes == 0 {
        return None;
    }
    let stop_retry = arg_f64(args, "stop_retry", 1.0);
    Some(Duration::from_secs_f64((previous.as_secs_f64() / 2.0).max(stop_retry)))
}

/// Doubles on progress up to `max_retry`, halves down to `start_retry`
/// otherwise — retry pressure tracks observed flow health instead of a fixed
/// schedule.
pub fn biexponential_adapt(
    args: &serde_json::Map<String, serde_json::Value>,
    input: StrategyInput,
) -> Option<Duration> {
    let start_retry = arg_f64(args, "start_retry", 2.0);
    let Some(previous) = input.previous_retry else {
        return Some(Duration::from_secs_f64(start_retry));
    };
    if input.active_nodes == 0 {
        return None;
    }
    let max_retry = arg_f64(args, "max_retry", 128.0);
    if input.progressed() {
        Some(Duration::from_secs_f64((previous.as_secs_f64() * 2.0).min(max_retry)))
    } else {
        Some(Duration::from_secs_f64((previous.as_secs_f64() / 2.0).max(start_retry)))
    }
}

/// Dispatches `binding.function` by name against the builtin strategy table.
/// `None` means "stop scheduling this flow instance" — nothing is active.
pub fn evaluate(binding: &StrategyBinding, input: StrategyInput) -> Result<Option<Duration>> {
    let f = match binding.function.as_str() {
        "constant" => constant,
        "random" => random,
        "linear_increase" => linear_increase,
        "linear_adapt" => linear_adapt,
        "biexponential_increase" => biexponential_increase,
        "biexponential_decrease" => biexponential_decrease,
        "biexponential_adapt" => biexponential_adapt,
        other => {
            return Err(SelinonError::Configuration(format!(
                "unknown scheduling strategy '{other}'"
            )))
        }
    };
    Ok(f(&binding.args, input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, f64)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect()
    }

    fn input(previous_retry_secs: Option<f64>) -> StrategyInput {
        StrategyInput {
            active_nodes: 1,
            failed_nodes: 0,
            new_started_nodes: 0,
            new_fallback_nodes: 0,
            previous_retry: previous_retry_secs.map(Duration::from_secs_f64),
        }
    }

    #[test]
    fn no_active_nodes_stops_scheduling() {
        let a = args(&[("retry", 5.0)]);
        let mut i = input(Some(1.0));
        i.active_nodes = 0;
        assert_eq!(constant(&a, i), None);
        assert_eq!(linear_increase(&a, i), None);
        assert_eq!(biexponential_increase(&a, i), None);
    }

    #[test]
    fn constant_ignores_progress() {
        let a = args(&[("retry", 5.0)]);
        assert_eq!(constant(&a, input(None)), Some(Duration::from_secs_f64(5.0)));
        assert_eq!(constant(&a, input(Some(100.0))), Some(Duration::from_secs_f64(5.0)));
    }

    #[test]
    fn linear_increase_grows_on_progress_and_resets_without_it() {
        let a = args(&[("start_retry", 2.0), ("step", 2.0), ("max_retry", 10.0)]);
        let mut progressing = input(Some(4.0));
        progressing.new_started_nodes = 1;
        assert_eq!(linear_increase(&a, progressing), Some(Duration::from_secs_f64(6.0)));

        let stalled = input(Some(4.0));
        assert_eq!(linear_increase(&a, stalled), Some(Duration::from_secs_f64(2.0)));

        let mut capped = input(Some(1000.0));
        capped.new_started_nodes = 1;
        assert_eq!(linear_increase(&a, capped), Some(Duration::from_secs_f64(10.0)));
    }

    #[test]
    fn linear_adapt_backs_off_by_step_instead_of_resetting() {
        let a = args(&[("start_retry", 2.0), ("step", 2.0), ("max_retry", 10.0)]);
        let stalled = input(Some(6.0));
        assert_eq!(linear_adapt(&a, stalled), Some(Duration::from_secs_f64(4.0)));
        let floored = input(Some(3.0));
        assert_eq!(linear_adapt(&a, floored), Some(Duration::from_secs_f64(2.0)));
    }

    #[test]
    fn biexponential_increase_starts_cold_and_resets_without_progress() {
        let a = args(&[("start_retry", 2.0), ("max_retry", 64.0)]);
        assert_eq!(biexponential_increase(&a, input(None)), Some(Duration::from_secs_f64(2.0)));
        let mut progressing = input(Some(4.0));
        progressing.new_started_nodes = 1;
        assert_eq!(biexponential_increase(&a, progressing), Some(Duration::from_secs_f64(8.0)));
        let stalled = input(Some(4.0));
        assert_eq!(biexponential_increase(&a, stalled), Some(Duration::from_secs_f64(2.0)));
    }

    #[test]
    fn biexponential_adapt_tracks_progress() {
        let a = args(&[("start_retry", 1.0), ("max_retry", 64.0)]);
        let mut progressing = input(Some(2.0));
        progressing.new_started_nodes = 1;
        let increasing = biexponential_adapt(&a, progressing).unwrap();
        assert!(increasing.as_secs_f64() >= 2.0);

        let stalled = input(Some(8.0));
        let decreasing = biexponential_adapt(&a, stalled).unwrap();
        assert!(decreasing.as_secs_f64() <= 8.0);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let binding = StrategyBinding {
            function: "bogus".to_string(),
            args: Default::default(),
        };
        assert!(evaluate(&binding, input(None)).is_err());
    }
}
