//! Measurement sink
//!
//! Checkpoints push named measurements into a [`Collector`]. The default
//! [`MemoryCollector`] keeps aggregated results in memory; hosts can plug
//! in their own sink through [`crate::Simulation::with_collector`].

use crate::{Error, Result, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a measured value is aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureKind {
    /// Count, mean, min, max and standard deviation in O(1) memory
    Stat,
    /// Occurrences of each distinct value
    Counter,
    /// Every value in order
    List,
    /// Rendered as a diagnostic, never stored
    Log,
}

impl MeasureKind {
    /// Parse the name used in documents
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "stat" => Some(MeasureKind::Stat),
            "counter" => Some(MeasureKind::Counter),
            "list" => Some(MeasureKind::List),
            "log" => Some(MeasureKind::Log),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MeasureKind::Stat => "stat",
            MeasureKind::Counter => "counter",
            MeasureKind::List => "list",
            MeasureKind::Log => "log",
        }
    }
}

/// Running statistics (Welford)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Stat {
    pub fn add(&mut self, x: f64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Sample standard deviation; needs at least two values
    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }
}

/// Aggregated values of one (sub)collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Stat(Stat),
    Counter(IndexMap<String, u64>),
    List(Vec<Value>),
}

impl Aggregate {
    fn new(kind: MeasureKind) -> Self {
        match kind {
            MeasureKind::Stat => Aggregate::Stat(Stat::default()),
            MeasureKind::Counter => Aggregate::Counter(IndexMap::new()),
            MeasureKind::List | MeasureKind::Log => Aggregate::List(Vec::new()),
        }
    }

    fn add(&mut self, value: &Value) -> Result<()> {
        match self {
            Aggregate::Stat(stat) => {
                let x = value.as_float().ok_or_else(|| Error::TypeError {
                    expected: "number".to_string(),
                    got: value.type_name().to_string(),
                })?;
                stat.add(x);
            }
            Aggregate::Counter(counts) => {
                *counts.entry(value.key_string()).or_insert(0) += 1;
            }
            Aggregate::List(values) => values.push(value.clone()),
        }
        Ok(())
    }

    pub fn as_stat(&self) -> Option<&Stat> {
        match self {
            Aggregate::Stat(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<&IndexMap<String, u64>> {
        match self {
            Aggregate::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Aggregate::List(l) => Some(l),
            _ => None,
        }
    }
}

/// A named measurement category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    kind: MeasureKind,
    all: Aggregate,
    keyed: IndexMap<String, Aggregate>,
}

impl Category {
    fn new(kind: MeasureKind) -> Self {
        Self {
            kind,
            all: Aggregate::new(kind),
            keyed: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> MeasureKind {
        self.kind
    }

    /// Aggregate over every collected value
    pub fn all(&self) -> &Aggregate {
        &self.all
    }

    /// Sub-collector for a key value
    pub fn keyed(&self, key: &Value) -> Option<&Aggregate> {
        self.keyed.get(&key.key_string())
    }

    /// Key values seen so far
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keyed.keys().map(String::as_str)
    }
}

/// A sink for checkpoint measurements
pub trait Collector: fmt::Debug {
    /// Record one value; `key` selects a sub-collector
    fn collect(&mut self, category: &str, value: Value, kind: MeasureKind, key: Option<Value>)
        -> Result<()>;

    /// Look up a category
    fn get(&self, category: &str) -> Result<&Category>;
}

/// Collector keeping every category in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCollector {
    categories: IndexMap<String, Category>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Collector for MemoryCollector {
    fn collect(
        &mut self,
        category: &str,
        value: Value,
        kind: MeasureKind,
        key: Option<Value>,
    ) -> Result<()> {
        if kind == MeasureKind::Log {
            return Ok(());
        }
        let entry = self
            .categories
            .entry(category.to_string())
            .or_insert_with(|| Category::new(kind));
        if entry.kind != kind {
            return Err(Error::TypeError {
                expected: entry.kind.name().to_string(),
                got: kind.name().to_string(),
            });
        }
        entry.all.add(&value)?;
        if let Some(key) = key {
            entry
                .keyed
                .entry(key.key_string())
                .or_insert_with(|| Aggregate::new(kind))
                .add(&value)?;
        }
        Ok(())
    }

    fn get(&self, category: &str) -> Result<&Category> {
        self.categories
            .get(category)
            .ok_or_else(|| Error::CategoryNotFound(category.to_string()))
    }
}
