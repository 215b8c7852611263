// =============================================================================
// Engine coordinator — per-tick orchestration
// =============================================================================
//
// Owns every instrument store and every plan's runtime state. A tick flows
// ingest -> metrics -> per-plan evaluate/apply/emit, with per-plan errors
// isolated so one plan's fault never corrupts another's state or aborts the
// rest of the tick.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::{GlobalConfig, InstrumentOverrides};
use crate::errors::PlanAdmissionError;
use crate::evaluator::{self, MarketContext};
use crate::ingest::{self, IngestConfig, IngestOutcome};
use crate::metrics_calc;
use crate::model::{BookSnap, Candle, MetricsSnapshot, Plan, PlanLifecycleState, PlanRuntimeState};
use crate::signal::emitter::Emitter;
use crate::signal::{format_signal, SignalRecord};
use crate::store::InstrumentStore;

struct PlanEntry {
    plan: Plan,
    runtime: PlanRuntimeState,
}

/// Per-state plan counts, returned by [`Engine::runtime_stats`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeStats {
    pub total_plans: usize,
    pub pending: usize,
    pub armed: usize,
    pub triggered: usize,
    pub invalid: usize,
    pub expired: usize,
}

pub struct Engine {
    global_config: GlobalConfig,
    instrument_overrides: HashMap<String, InstrumentOverrides>,
    instruments: HashMap<String, InstrumentStore>,
    plans: HashMap<String, PlanEntry>,
    emitter: Arc<Emitter>,
}

impl Engine {
    pub fn new(global_config: GlobalConfig, emitter: Arc<Emitter>) -> Self {
        Self {
            global_config,
            instrument_overrides: HashMap::new(),
            instruments: HashMap::new(),
            plans: HashMap::new(),
            emitter,
        }
    }

    pub fn set_instrument_overrides(&mut self, instrument_id: impl Into<String>, overrides: InstrumentOverrides) {
        self.instrument_overrides.insert(instrument_id.into(), overrides);
    }

    /// Admit a new plan. Rejects malformed shapes before the plan
    /// ever reaches the evaluator.
    pub fn add_plan(&mut self, plan: Plan) -> Result<(), PlanAdmissionError> {
        if plan.id.is_empty() {
            return Err(PlanAdmissionError::MissingField("id"));
        }
        if plan.instrument_id.is_empty() {
            return Err(PlanAdmissionError::MissingField("instrument_id"));
        }
        if !plan.is_breakout_entry() {
            return Err(PlanAdmissionError::UnsupportedEntryType(plan.entry_type.clone()));
        }
        if !plan.entry_price.is_finite() || plan.entry_price <= 0.0 {
            return Err(PlanAdmissionError::InvalidEntryPrice(plan.entry_price));
        }
        crate::config::validate_breakout_overrides(&plan.extra.breakout_params)?;
        crate::model::validate_invalidation_conditions(&plan.extra.invalidation_conditions)?;

        self.instruments
            .entry(plan.instrument_id.clone())
            .or_insert_with(|| InstrumentStore::new(self.global_config.bars_window_size, self.global_config.volume_window_size));

        self.plans.insert(
            plan.id.clone(),
            PlanEntry {
                plan,
                runtime: PlanRuntimeState::new(),
            },
        );
        Ok(())
    }

    /// Remove a plan, freeing its runtime and clearing its emitted-state
    /// dedup keys so a later plan re-admitted under the same id starts
    /// clean rather than inheriting its predecessor's emission history.
    pub fn remove_plan(&mut self, plan_id: &str) -> Option<Plan> {
        let removed = self.plans.remove(plan_id).map(|entry| entry.plan);
        if removed.is_some() {
            self.emitter.forget_plan(plan_id);
        }
        removed
    }

    pub fn plan_state(&self, plan_id: &str) -> Option<PlanRuntimeState> {
        self.plans.get(plan_id).map(|entry| entry.runtime)
    }

    pub fn runtime_stats(&self) -> RuntimeStats {
        let mut stats = RuntimeStats {
            total_plans: self.plans.len(),
            ..Default::default()
        };
        for entry in self.plans.values() {
            match entry.runtime.state {
                PlanLifecycleState::Pending => stats.pending += 1,
                PlanLifecycleState::Armed => stats.armed += 1,
                PlanLifecycleState::Triggered => stats.triggered += 1,
                PlanLifecycleState::Invalid => stats.invalid += 1,
                PlanLifecycleState::Expired => stats.expired += 1,
            }
        }
        stats
    }

    fn effective_ingest_config(&self, instrument_id: &str) -> IngestConfig {
        let cfg = self.global_config.merge(self.instrument_overrides.get(instrument_id), None);
        IngestConfig {
            atr_period: cfg.atr_period,
            spike_filter_enable: cfg.spike_filter_enable,
            spike_atr_multiplier: cfg.spike_filter_atr_multiplier,
            spike_fallback_pct: cfg.spike_filter_fallback_pct,
            max_age_seconds: cfg.max_age_seconds,
        }
    }

    /// Ingest a candle tick for `instrument_id` and evaluate every plan
    /// resting on that instrument. Returns the signals emitted this tick.
    pub async fn evaluate_candle_tick(
        &mut self,
        instrument_id: &str,
        timeframe: &str,
        candle: Candle,
        now: DateTime<Utc>,
    ) -> Vec<SignalRecord> {
        let ingest_cfg = self.effective_ingest_config(instrument_id);
        let store = self
            .instruments
            .entry(instrument_id.to_string())
            .or_insert_with(|| InstrumentStore::new(self.global_config.bars_window_size, self.global_config.volume_window_size));

        match ingest::ingest_candle(store, candle, timeframe, &ingest_cfg, now) {
            IngestOutcome::Accepted { .. } => {}
            IngestOutcome::Skipped(reason) => {
                info!(instrument_id, ?reason, "candle skipped at ingest");
                return Vec::new();
            }
            IngestOutcome::Rejected(kind) => {
                warn!(instrument_id, %kind, "candle rejected at ingest");
                return Vec::new();
            }
        }

        let eff = self.global_config.merge(self.instrument_overrides.get(instrument_id), None);
        let metrics = metrics_calc::compute(
            store,
            &candle,
            timeframe,
            eff.atr_period,
            eff.rvol_period,
            eff.orderbook_max_levels,
            eff.orderbook_depletion_threshold,
            eff.orderbook_imbalance_threshold,
        );

        let last_price = store.last_price.unwrap_or(candle.close);
        let market = MarketContext {
            last_price,
            ts: candle.ts,
            atr: metrics.atr,
            natr_pct: metrics.natr_pct,
            rvol: metrics.rvol,
            last_closed_bar: store.newest_closed_bar(timeframe),
            bar_range: store.newest_closed_bar(timeframe).map(|bar| bar.range()),
            curr_book: store.curr_book.clone(),
            prev_book: store.prev_book.clone(),
            pinbar_detected: metrics.pinbar,
            ob_sweep_detected: metrics.ob_sweep_detected,
            ob_sweep_side: metrics.ob_sweep_side,
            ob_imbalance_long: metrics.ob_imbalance_long,
            ob_imbalance_short: metrics.ob_imbalance_short,
        };

        self.evaluate_plans_for_instrument(instrument_id, &market, &metrics).await
    }

    /// Ingest an order-book snapshot for `instrument_id` and evaluate every
    /// resting plan against it (no new candle this tick).
    pub async fn evaluate_book_tick(&mut self, instrument_id: &str, book: BookSnap, now: DateTime<Utc>) -> Vec<SignalRecord> {
        let store = self
            .instruments
            .entry(instrument_id.to_string())
            .or_insert_with(|| InstrumentStore::new(self.global_config.bars_window_size, self.global_config.volume_window_size));

        let ts = book.ts;
        match ingest::ingest_book(store, book) {
            IngestOutcome::Accepted { .. } => {}
            IngestOutcome::Skipped(reason) => {
                info!(instrument_id, ?reason, "book update skipped at ingest");
                return Vec::new();
            }
            IngestOutcome::Rejected(kind) => {
                warn!(instrument_id, %kind, "book update rejected at ingest");
                return Vec::new();
            }
        }

        let eff = self.global_config.merge(self.instrument_overrides.get(instrument_id), None);
        let (sweep_detected, sweep_side, imb_long, imb_short) = match (&store.prev_book, &store.curr_book) {
            (Some(prev), Some(curr)) => {
                let (swept, side) = metrics_calc::orderbook::detect_sweep(
                    prev,
                    curr,
                    eff.orderbook_max_levels,
                    eff.orderbook_depletion_threshold,
                    eff.orderbook_imbalance_threshold,
                );
                let imb = metrics_calc::orderbook::imbalance(curr, eff.orderbook_max_levels);
                (swept, side, imb.long, imb.short)
            }
            (None, Some(curr)) => {
                let imb = metrics_calc::orderbook::imbalance(curr, eff.orderbook_max_levels);
                (false, crate::model::SweepSide::None, imb.long, imb.short)
            }
            _ => (false, crate::model::SweepSide::None, None, None),
        };

        let metrics = MetricsSnapshot {
            ts,
            ob_sweep_detected: sweep_detected,
            ob_sweep_side: sweep_side,
            ob_imbalance_long: imb_long,
            ob_imbalance_short: imb_short,
            ..metrics_calc::empty(ts)
        };

        let last_price = store.last_price.unwrap_or(0.0);
        let market = MarketContext {
            last_price,
            ts,
            atr: None,
            natr_pct: None,
            rvol: None,
            last_closed_bar: None,
            bar_range: None,
            curr_book: store.curr_book.clone(),
            prev_book: store.prev_book.clone(),
            pinbar_detected: crate::model::Pinbar::None,
            ob_sweep_detected: sweep_detected,
            ob_sweep_side: sweep_side,
            ob_imbalance_long: imb_long,
            ob_imbalance_short: imb_short,
        };
        let _ = now;

        self.evaluate_plans_for_instrument(instrument_id, &market, &metrics).await
    }

    async fn evaluate_plans_for_instrument(
        &mut self,
        instrument_id: &str,
        market: &MarketContext,
        metrics: &MetricsSnapshot,
    ) -> Vec<SignalRecord> {
        if let Some(field) = metrics.fault() {
            let fault = crate::errors::SystemFault::Metrics(field.to_string());
            error!(instrument_id, error = %fault, "metrics snapshot failed sanity check, skipping this tick's plans");
            return Vec::new();
        }

        let mut emitted = Vec::new();
        let plan_ids: Vec<String> = self
            .plans
            .iter()
            .filter(|(_, entry)| entry.plan.instrument_id == instrument_id)
            .map(|(id, _)| id.clone())
            .collect();

        for plan_id in plan_ids {
            let (plan, runtime) = {
                let entry = self.plans.get(&plan_id).expect("plan_id collected above");
                (entry.plan.clone(), entry.runtime)
            };
            let eff = self.global_config.merge(self.instrument_overrides.get(instrument_id), Some(&plan.extra.breakout_params));

            let transition = match evaluator::evaluate(&runtime, &plan, market, metrics, &eff.breakout) {
                Some(t) => t,
                None => continue,
            };

            let new_runtime = match evaluator::apply::apply(&runtime, &transition) {
                Ok(next) => next,
                Err(fault) => {
                    error!(plan_id = %plan_id, error = %fault, "evaluator produced an illegal transition, plan left unchanged");
                    continue;
                }
            };

            if let Some(entry) = self.plans.get_mut(&plan_id) {
                entry.runtime = new_runtime;
            }

            if transition.emit_signal {
                let signal = format_signal(&plan, &new_runtime, &transition, metrics, market.last_price);
                self.emitter.emit(signal.clone()).await;
                emitted.push(signal);
            }
        }

        emitted
    }
}
