//! Reduction of raw per-glyph metrics into the compact class table a
//! Japanese font metric stores.
//!
//! A JFM groups characters into at most 256 classes, each carrying one
//! width/height/depth triple. The reducers here choose such a table
//! within tunable error bounds: [`reduce`] is the classic fixed-budget
//! variant, [`reduce_jpl`] balances heights and depths against a width
//! bound, and [`reduce_jpl_x`] drives everything from a single parameter.

use crate::charlist::Charlist;
use crate::pl::{List, PlFile, Prefix};
use crate::{Config, Number};
use std::collections::BTreeMap;

/// One glyph of a raw metric: code and lengths in design-size units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEntry {
    pub code: u32,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

/// A reduced metric: a slot per code and a value table whose slot 0 is
/// the reserved zero triple, with the remaining entries in descending
/// frequency of reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub index: BTreeMap<u32, usize>,
    pub values: Vec<(f64, f64, f64)>,
}

/// Error produced by the reducers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ReduceError {
    /// The classic reducer requires at most 255 distinct widths.
    TooManyWidths(usize),
    /// No bound within the search domain brings the table under 256
    /// entries.
    CannotReduce,
}

impl std::error::Error for ReduceError {}

impl std::fmt::Display for ReduceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceError::TooManyWidths(n) => {
                write!(f, "{n} distinct widths; at most 255 are representable")
            }
            ReduceError::CannotReduce => {
                write!(f, "no error bound brings the value table under 256 entries")
            }
        }
    }
}

/// Which point of a class becomes its representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Midpoint,
    Lower,
    Upper,
}

/// The result of covering a sorted value set with classes of width `e`.
pub struct Cover {
    /// Per input element, the index of its class.
    pub slots: Vec<usize>,
    /// Per class, its representative value.
    pub reps: Vec<f64>,
    /// The smallest error bound that would merge two adjacent classes,
    /// or infinity if there is at most one class.
    pub next_gap: f64,
}

/// Partition a sorted distinct value set greedily from the left: a new
/// class opens when the next element exceeds the current class's first
/// element by more than `e`. With a midpoint representative every
/// element is within `e/2` of its representative.
pub fn cover(sorted: &[f64], e: f64, anchor: Anchor) -> Cover {
    let mut slots = Vec::with_capacity(sorted.len());
    let mut reps = vec![];
    let mut bounds: Vec<(f64, f64)> = vec![];
    let mut i = 0;
    while i < sorted.len() {
        let first = sorted[i];
        let mut last = first;
        while i + 1 < sorted.len() && sorted[i + 1] - first <= e {
            i += 1;
            last = sorted[i];
        }
        i += 1;
        reps.push(match anchor {
            Anchor::Midpoint => (first + last) / 2.0,
            Anchor::Lower => first,
            Anchor::Upper => last,
        });
        let slot = reps.len() - 1;
        bounds.push((first, last));
        while slots.len() < i {
            slots.push(slot);
        }
    }
    let next_gap = bounds
        .windows(2)
        .map(|w| w[1].1 - w[0].0)
        .fold(f64::INFINITY, f64::min);
    Cover {
        slots,
        reps,
        next_gap,
    }
}

/// The smallest error bound that covers `sorted` with at most `m`
/// classes: probe by doubling, halve once, then walk the next-needed
/// gaps upward. Each gap step strictly reduces the class count, so this
/// terminates within the size of the set.
pub fn shorten(sorted: &[f64], m: usize) -> f64 {
    if sorted.len() <= m {
        return 0.0;
    }
    let count = |e: f64| cover(sorted, e, Anchor::Midpoint).reps.len();
    let mut e = cover(sorted, 0.0, Anchor::Midpoint).next_gap;
    while count(e) > m {
        e *= 2.0;
    }
    let mut lo = e / 2.0;
    loop {
        let c = cover(sorted, lo, Anchor::Midpoint);
        if c.reps.len() <= m {
            return lo;
        }
        lo = c.next_gap;
    }
}

fn sorted_distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v.dedup();
    v
}

/// Map each input value to its class representative.
struct ValueMap {
    sorted: Vec<f64>,
    cover: Cover,
}

impl ValueMap {
    fn new(values: impl Iterator<Item = f64>, e: f64) -> ValueMap {
        let sorted = sorted_distinct(values);
        let cover = cover(&sorted, e, Anchor::Midpoint);
        ValueMap { sorted, cover }
    }
    fn rep(&self, value: f64) -> f64 {
        let i = self
            .sorted
            .partition_point(|v| v.total_cmp(&value) == std::cmp::Ordering::Less);
        debug_assert_eq!(self.sorted[i], value, "value came from the same set");
        self.cover.reps[self.cover.slots[i]]
    }
}

fn build(
    rmt: &[RawEntry],
    widths: &ValueMap,
    heights: &ValueMap,
    depths: &ValueMap,
) -> Reduced {
    // Count triple frequencies, remembering first-seen order so the
    // descending sort below stays stable.
    let mut order: Vec<(f64, f64, f64)> = vec![];
    let mut counts: BTreeMap<(u64, u64, u64), usize> = BTreeMap::new();
    let key = |t: (f64, f64, f64)| (t.0.to_bits(), t.1.to_bits(), t.2.to_bits());
    let triple = |entry: &RawEntry| {
        (
            widths.rep(entry.width),
            heights.rep(entry.height),
            depths.rep(entry.depth),
        )
    };
    for entry in rmt {
        let t = triple(entry);
        if t == (0.0, 0.0, 0.0) {
            continue;
        }
        match counts.get_mut(&key(t)) {
            Some(n) => *n += 1,
            None => {
                counts.insert(key(t), 1);
                order.push(t);
            }
        }
    }
    let mut sorted = order.clone();
    sorted.sort_by_key(|t| std::cmp::Reverse(counts[&key(*t)]));
    let mut values = vec![(0.0, 0.0, 0.0)];
    values.extend(sorted.iter().copied());
    let slot_of: BTreeMap<(u64, u64, u64), usize> = values
        .iter()
        .enumerate()
        .map(|(slot, t)| (key(*t), slot))
        .collect();
    let index = rmt
        .iter()
        .map(|entry| (entry.code, slot_of[&key(triple(entry))]))
        .collect();
    Reduced { index, values }
}

fn triple_count(rmt: &[RawEntry], dw: f64, dh: f64) -> usize {
    let widths = ValueMap::new(rmt.iter().map(|e| e.width), dw);
    let heights = ValueMap::new(rmt.iter().map(|e| e.height), dh);
    let depths = ValueMap::new(rmt.iter().map(|e| e.depth), dh);
    let key = |t: (f64, f64, f64)| (t.0.to_bits(), t.1.to_bits(), t.2.to_bits());
    let set: std::collections::BTreeSet<_> = rmt
        .iter()
        .map(|e| key((widths.rep(e.width), heights.rep(e.height), depths.rep(e.depth))))
        .collect();
    set.len()
}

/// Classic reduction: widths must already be at most 255 distinct
/// values; heights and depths are each covered into 15 classes above the
/// reserved zero.
pub fn reduce(rmt: &[RawEntry]) -> Result<Reduced, ReduceError> {
    let widths = ValueMap::new(rmt.iter().map(|e| e.width), 0.0);
    if widths.sorted.len() > 255 {
        return Err(ReduceError::TooManyWidths(widths.sorted.len()));
    }
    let heights = {
        let sorted = sorted_distinct(rmt.iter().map(|e| e.height));
        let e = shorten(&sorted, 15);
        ValueMap::new(rmt.iter().map(|e2| e2.height), e)
    };
    let depths = {
        let sorted = sorted_distinct(rmt.iter().map(|e| e.depth));
        let e = shorten(&sorted, 15);
        ValueMap::new(rmt.iter().map(|e2| e2.depth), e)
    };
    Ok(build(rmt, &widths, &heights, &depths))
}

/// The height/depth bound search domain and convergence thresholds.
const DH_MAX: f64 = 2048.0;
const JPL_THRESHOLD: f64 = 9e-7;
const JPL_X_THRESHOLD: f64 = 1e-7;

fn search_bound(
    rmt: &[RawEntry],
    count: impl Fn(f64) -> usize,
    threshold: f64,
) -> Result<f64, ReduceError> {
    debug_assert!(!rmt.is_empty());
    if count(0.0) <= 256 {
        return Ok(0.0);
    }
    // Doubling probe for an upper bound, then bisect.
    let mut hi = 1.0 / (1 << 20) as f64;
    while count(hi) > 256 {
        if hi >= DH_MAX {
            return Err(ReduceError::CannotReduce);
        }
        hi *= 2.0;
    }
    let mut lo = hi / 2.0;
    while hi - lo > threshold {
        let mid = (lo + hi) / 2.0;
        if count(mid) <= 256 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(hi)
}

/// Balanced reduction: widths are covered within `dw`; a shared
/// height/depth bound is searched so the triple table fits in 256
/// entries. Returns the effective bounds and the table.
pub fn reduce_jpl(rmt: &[RawEntry], dw: f64) -> Result<(f64, f64, Reduced), ReduceError> {
    let dh = search_bound(rmt, |dh| triple_count(rmt, dw, dh), JPL_THRESHOLD)?;
    let widths = ValueMap::new(rmt.iter().map(|e| e.width), dw);
    let heights = ValueMap::new(rmt.iter().map(|e| e.height), dh);
    let depths = ValueMap::new(rmt.iter().map(|e| e.depth), dh);
    Ok((dw, dh, build(rmt, &widths, &heights, &depths)))
}

/// Ratio-balanced reduction: a single bound `d` covers heights and
/// depths, and `d / bal` covers widths.
pub fn reduce_jpl_x(rmt: &[RawEntry], bal: f64) -> Result<(f64, Reduced), ReduceError> {
    let d = search_bound(rmt, |d| triple_count(rmt, d / bal, d), JPL_X_THRESHOLD)?;
    let widths = ValueMap::new(rmt.iter().map(|e| e.width), d / bal);
    let heights = ValueMap::new(rmt.iter().map(|e| e.height), d);
    let depths = ValueMap::new(rmt.iter().map(|e| e.depth), d);
    Ok((d, build(rmt, &widths, &heights, &depths)))
}

/// Collect the raw metric of a property list file's `CHARACTER` entries.
pub fn raw_metric_from_pl(file: &PlFile) -> Vec<RawEntry> {
    let dimension = |l: &List, head: &str| {
        l.child(head)
            .and_then(|c| c.value())
            .map(|c| c.real().to_f64())
            .unwrap_or(0.0)
    };
    file.children("CHARACTER")
        .filter_map(|l| {
            l.value().map(|code| RawEntry {
                code: code.value as u32,
                width: dimension(l, "CHARWD"),
                height: dimension(l, "CHARHT"),
                depth: dimension(l, "CHARDP"),
            })
        })
        .collect()
}

/// Render a reduced metric as `TYPE`/`CHARSINTYPE` lists. Slot 0 (the
/// reserved zero triple) produces neither.
pub fn reduced_to_lists(reduced: &Reduced, cfg: &Config) -> Vec<List> {
    let mut out = vec![];
    let real = |v: f64| Number::from_f64(v).unwrap_or(Number::ZERO);
    for (slot, (w, h, d)) in reduced.values.iter().enumerate().skip(1) {
        out.push(
            List::new("TYPE")
                .with_number(Prefix::D, slot as i64)
                .with_list(List::new("CHARWD").with_real(real(*w)))
                .with_list(List::new("CHARHT").with_real(real(*h)))
                .with_list(List::new("CHARDP").with_real(real(*d))),
        );
        let members = Charlist::from_codes(
            reduced
                .index
                .iter()
                .filter(|(_, s)| **s == slot)
                .map(|(code, _)| *code),
        );
        let mut cit = List::new("CHARSINTYPE").with_number(Prefix::D, slot as i64);
        for node in members.to_nodes(cfg) {
            cit.push(node);
        }
        out.push(cit);
    }
    out
}
