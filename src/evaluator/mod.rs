// =============================================================================
// Breakout evaluator — the heart of the system
// =============================================================================
//
// `evaluate` is a pure function: no I/O, no hidden state, no mutation of its
// arguments. It decides at most one transition per call; the caller applies
// it through `apply` (see `evaluator::apply`).

pub mod apply;

use chrono::{DateTime, Utc};

use crate::model::{
    BookSnap, BreakoutParameters, BreakoutSubState, Candle, InvalidationCondition,
    InvalidationReason, MetricsSnapshot, Pinbar, Plan, PlanLifecycleState, PlanRuntimeState,
    SweepSide,
};

/// Snapshot of market state the evaluator reasons over, built by the engine
/// coordinator each tick.
#[derive(Debug, Clone)]
pub struct MarketContext {
    pub last_price: f64,
    pub ts: DateTime<Utc>,
    pub atr: Option<f64>,
    pub natr_pct: Option<f64>,
    pub rvol: Option<f64>,
    pub last_closed_bar: Option<Candle>,
    pub bar_range: Option<f64>,
    pub curr_book: Option<BookSnap>,
    pub prev_book: Option<BookSnap>,
    pub pinbar_detected: Pinbar,
    pub ob_sweep_detected: bool,
    pub ob_sweep_side: SweepSide,
    pub ob_imbalance_long: Option<f64>,
    pub ob_imbalance_short: Option<f64>,
}

/// Entry mode for a triggered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Momentum,
    Retest,
}

/// Everything the signal formatter (C8) needs beyond the raw transition.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext {
    pub entry_mode: Option<EntryMode>,
}

/// A single proposed state change, produced by `evaluate` and validated by
/// `apply` before being committed to the plan's runtime.
#[derive(Debug, Clone)]
pub struct Transition {
    pub new_state: PlanLifecycleState,
    pub new_substate: BreakoutSubState,
    pub timestamp: DateTime<Utc>,
    pub emit_signal: bool,
    pub invalid_reason: Option<InvalidationReason>,
    pub signal_context: Option<SignalContext>,
    pub mark_break_seen: bool,
    pub mark_break_confirmed: bool,
}

impl Transition {
    fn invalidate(ts: DateTime<Utc>, reason: InvalidationReason) -> Self {
        Self {
            new_state: PlanLifecycleState::Invalid,
            new_substate: BreakoutSubState::None,
            timestamp: ts,
            emit_signal: true,
            invalid_reason: Some(reason),
            signal_context: None,
            mark_break_seen: false,
            mark_break_confirmed: false,
        }
    }
}

/// Evaluate one tick for one plan. Pure: reads `runtime`/`plan`/`market`/
/// `metrics`/`cfg`, returns at most one proposed transition.
pub fn evaluate(
    runtime: &PlanRuntimeState,
    plan: &Plan,
    market: &MarketContext,
    metrics: &MetricsSnapshot,
    cfg: &BreakoutParameters,
) -> Option<Transition> {
    if runtime.state.is_terminal() {
        return None;
    }

    let is_short = plan.direction.is_short();
    let entry = plan.entry_price;

    // Step 1 — pre-invalidations.
    if let Some(reason) = check_pre_invalidations(plan, market, is_short) {
        return Some(Transition::invalidate(market.ts, reason));
    }

    // Step 2 — detect raw break.
    if !runtime.break_seen {
        if detect_break(market.last_price, entry, is_short, cfg, metrics) {
            return Some(Transition {
                new_state: PlanLifecycleState::Pending,
                new_substate: BreakoutSubState::BreakSeen,
                timestamp: market.ts,
                emit_signal: false,
                invalid_reason: None,
                signal_context: None,
                mark_break_seen: true,
                mark_break_confirmed: false,
            });
        }
        return None;
    }

    // Step 3 — fakeout check (still BreakSeen, not yet confirmed).
    if !runtime.break_confirmed {
        if cfg.fakeout_close_invalidate {
            if let Some(bar) = &market.last_closed_bar {
                let fakeout = if is_short { bar.close > entry } else { bar.close < entry };
                if fakeout {
                    return Some(Transition::invalidate(market.ts, InvalidationReason::FakeoutClose));
                }
            }
        }

        // Step 4 — confirmation gates.
        if !confirmation_gates_pass(runtime, market, cfg, metrics, entry, is_short) {
            return None;
        }

        return Some(if cfg.allow_retest_entry {
            Transition {
                new_state: PlanLifecycleState::Armed,
                new_substate: BreakoutSubState::RetestArmed,
                timestamp: market.ts,
                emit_signal: false,
                invalid_reason: None,
                signal_context: None,
                mark_break_seen: false,
                mark_break_confirmed: true,
            }
        } else {
            Transition {
                new_state: PlanLifecycleState::Triggered,
                new_substate: BreakoutSubState::None,
                timestamp: market.ts,
                emit_signal: true,
                invalid_reason: None,
                signal_context: Some(SignalContext {
                    entry_mode: Some(EntryMode::Momentum),
                }),
                mark_break_seen: false,
                mark_break_confirmed: true,
            }
        });
    }

    // Step 5 — retest trigger.
    if runtime.state == PlanLifecycleState::Armed && runtime.substate == BreakoutSubState::RetestArmed {
        let band = cfg.retest_band_pct * entry;
        if (market.last_price - entry).abs() > band {
            return None;
        }
        let signals = count_rejection_signals(is_short, metrics);
        if signals >= 2 {
            return Some(Transition {
                new_state: PlanLifecycleState::Triggered,
                new_substate: BreakoutSubState::RetestTriggered,
                timestamp: market.ts,
                emit_signal: true,
                invalid_reason: None,
                signal_context: Some(SignalContext {
                    entry_mode: Some(EntryMode::Retest),
                }),
                mark_break_seen: false,
                mark_break_confirmed: false,
            });
        }
    }

    None
}

fn check_pre_invalidations(plan: &Plan, market: &MarketContext, is_short: bool) -> Option<InvalidationReason> {
    for condition in &plan.extra.invalidation_conditions {
        match *condition {
            InvalidationCondition::PriceAbove { level } if market.last_price > level => {
                return Some(InvalidationReason::PriceAbove);
            }
            InvalidationCondition::PriceBelow { level } if market.last_price < level => {
                return Some(InvalidationReason::PriceBelow);
            }
            InvalidationCondition::TimeLimit { duration_seconds } => {
                let elapsed = (market.ts - plan.created_at).num_seconds();
                if elapsed > duration_seconds {
                    return Some(InvalidationReason::TimeLimit);
                }
            }
            _ => {}
        }
    }
    if let Some(stop_loss) = plan.stop_loss {
        let hit = if is_short { market.last_price >= stop_loss } else { market.last_price <= stop_loss };
        if hit {
            return Some(InvalidationReason::StopLoss);
        }
    }
    None
}

fn detect_break(
    last_price: f64,
    entry: f64,
    is_short: bool,
    cfg: &BreakoutParameters,
    metrics: &MetricsSnapshot,
) -> bool {
    let pen_raw = cfg.penetration_pct * entry;
    let pen_vol = metrics
        .natr_pct
        .map(|natr| cfg.penetration_natr_mult * (natr / 100.0) * entry)
        .unwrap_or(0.0);
    let pen = pen_raw.max(pen_vol);
    if is_short {
        last_price <= entry - pen
    } else {
        last_price >= entry + pen
    }
}

fn confirmation_gates_pass(
    runtime: &PlanRuntimeState,
    market: &MarketContext,
    cfg: &BreakoutParameters,
    metrics: &MetricsSnapshot,
    entry: f64,
    is_short: bool,
) -> bool {
    // 1. RVOL gate.
    if cfg.min_rvol > 0.0 {
        match metrics.rvol {
            Some(rvol) if rvol >= cfg.min_rvol => {}
            _ => return false,
        }
    }

    // 2. Volatility gate.
    if cfg.min_break_range_atr > 0.0 {
        match (market.bar_range, metrics.atr) {
            (Some(range), Some(atr)) if range >= cfg.min_break_range_atr * atr => {}
            _ => return false,
        }
    }

    // 3. Confirmation gate: close-based or time-based.
    if cfg.confirm_close {
        match &market.last_closed_bar {
            Some(bar) if bar.is_closed => {
                let beyond = if is_short { bar.close < entry } else { bar.close > entry };
                if !beyond {
                    return false;
                }
            }
            _ => return false,
        }
    } else {
        match runtime.break_ts {
            Some(break_ts) => {
                let held_ms = (market.ts - break_ts).num_milliseconds();
                if held_ms < cfg.confirm_time_ms {
                    return false;
                }
            }
            None => return false,
        }
        let still_beyond = if is_short { market.last_price <= entry } else { market.last_price >= entry };
        if !still_beyond {
            return false;
        }
    }

    // 4. Order-book sweep gate.
    if cfg.ob_sweep_check {
        let expected_side = if is_short { SweepSide::Bid } else { SweepSide::Ask };
        if !metrics.ob_sweep_detected || metrics.ob_sweep_side != expected_side {
            return false;
        }
    }

    true
}

fn count_rejection_signals(is_short: bool, metrics: &MetricsSnapshot) -> u32 {
    let mut signals = 0;

    let expected_pinbar = if is_short { Pinbar::Bearish } else { Pinbar::Bullish };
    if metrics.pinbar == expected_pinbar {
        signals += 1;
    }
    if metrics.ob_sweep_detected {
        signals += 1;
    }
    if let Some(rvol) = metrics.rvol {
        if rvol < 0.8 {
            signals += 1;
        }
    }
    let imbalance = if is_short { metrics.ob_imbalance_short } else { metrics.ob_imbalance_long };
    if let Some(imb) = imbalance {
        if imb > 2.0 {
            signals += 1;
        }
    }
    signals
}
