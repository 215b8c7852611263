// =============================================================================
// InstrumentStore — per-instrument rolling data store
// =============================================================================
//
// Owned exclusively by the engine coordinator; no cross-instrument sharing.
// Accessors only ever hand back read-only views — callers cannot mutate the
// ring in place.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{BookSnap, Candle};
use crate::store::ring::Ring;

/// Default candle ring capacity per timeframe.
pub const DEFAULT_BARS_WINDOW: usize = 500;
/// Default volume ring capacity per timeframe.
pub const DEFAULT_VOLUME_WINDOW: usize = 20;

/// Per-instrument state: bars and volumes per timeframe, current/previous
/// book, and the last observed price.
pub struct InstrumentStore {
    bars: HashMap<String, Ring<Candle>>,
    volumes: HashMap<String, Ring<f64>>,
    bars_capacity: usize,
    volume_capacity: usize,
    pub prev_book: Option<BookSnap>,
    pub curr_book: Option<BookSnap>,
    pub last_price: Option<f64>,
    pub last_update_ts: Option<DateTime<Utc>>,
}

impl InstrumentStore {
    pub fn new(bars_capacity: usize, volume_capacity: usize) -> Self {
        Self {
            bars: HashMap::new(),
            volumes: HashMap::new(),
            bars_capacity,
            volume_capacity,
            prev_book: None,
            curr_book: None,
            last_price: None,
            last_update_ts: None,
        }
    }

    fn bars_ring(&mut self, timeframe: &str) -> &mut Ring<Candle> {
        self.bars
            .entry(timeframe.to_string())
            .or_insert_with(|| Ring::new(self.bars_capacity))
    }

    fn volume_ring(&mut self, timeframe: &str) -> &mut Ring<f64> {
        self.volumes
            .entry(timeframe.to_string())
            .or_insert_with(|| Ring::new(self.volume_capacity))
    }

    /// Read-only view over the candle ring for a timeframe, oldest-first.
    pub fn bars(&self, timeframe: &str) -> Vec<Candle> {
        self.bars
            .get(timeframe)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Read-only view over the volume ring for a timeframe, oldest-first.
    pub fn volumes(&self, timeframe: &str) -> Vec<f64> {
        self.volumes
            .get(timeframe)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn newest_closed_bar(&self, timeframe: &str) -> Option<Candle> {
        self.bars
            .get(timeframe)
            .and_then(|r| r.iter().rev().find(|c| c.is_closed).copied())
    }

    pub fn newest_bar(&self, timeframe: &str) -> Option<Candle> {
        self.bars.get(timeframe).and_then(|r| r.back()).copied()
    }

    /// Find the index (oldest-first) of an existing bar with this exact
    /// timestamp, if any, for the duplicate/replace policy.
    fn find_index_by_ts(&self, timeframe: &str, ts: DateTime<Utc>) -> Option<usize> {
        self.bars.get(timeframe).and_then(|r| {
            r.iter().enumerate().find_map(|(i, c)| if c.ts == ts { Some(i) } else { None })
        })
    }

    /// Append or in-place replace a candle, per the duplicate policy in
    /// `crate::ingest`. Returns true if inserted/replaced, false if this is
    /// the caller's responsibility to reject (caller decides policy; this
    /// only performs the mechanical write).
    pub(crate) fn upsert_bar(&mut self, timeframe: &str, candle: Candle) {
        if let Some(idx) = self.find_index_by_ts(timeframe, candle.ts) {
            self.bars_ring(timeframe).replace_at(idx, candle);
        } else {
            self.bars_ring(timeframe).push(candle);
        }
        if candle.is_closed {
            self.volume_ring(timeframe).push(candle.volume);
        }
    }

    pub(crate) fn set_book(&mut self, book: BookSnap) {
        self.prev_book = self.curr_book.take();
        if let Some(mid) = book.mid() {
            self.last_price = Some(mid);
            self.last_update_ts = Some(book.ts);
        }
        self.curr_book = Some(book);
    }

    pub(crate) fn set_last_price(&mut self, price: f64, ts: DateTime<Utc>) {
        self.last_price = Some(price);
        self.last_update_ts = Some(ts);
    }

    pub fn existing_bar_at(&self, timeframe: &str, ts: DateTime<Utc>) -> Option<Candle> {
        self.find_index_by_ts(timeframe, ts)
            .and_then(|idx| self.bars.get(timeframe).and_then(|r| r.get(idx)).copied())
    }
}

impl Default for InstrumentStore {
    fn default() -> Self {
        Self::new(DEFAULT_BARS_WINDOW, DEFAULT_VOLUME_WINDOW)
    }
}
