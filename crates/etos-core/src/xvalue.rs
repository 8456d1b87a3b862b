//! Scoped lazy values
//!
//! An [`XValue`] is a scalar that may be fixed, drawn at random or computed
//! from time. Random and time-dependent values live in a slot of exactly
//! one [`Context`]. Entering the context starts a new activation: random
//! slots forget their draw and time-dependent slots forget their sample.
//! Within one activation every read of a random value returns the same
//! draw.
//!
//! Contexts are kept in the [`Scopes`] arena and addressed by [`ScopeId`].
//! A value only holds the index of its slot; releasing a scope drops the
//! slots, and later reads through stale handles fail with
//! [`Error::ScopeReleased`].

use crate::{Distribution, Error, Result, ScopeId, SimRng};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// A function of a scope's local time
pub type TimeFn = Rc<dyn Fn(f64) -> f64>;

/// How a scope measures its local time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeBase {
    /// Time elapsed since the scope was last entered
    Elapsed,
    /// Absolute clock shifted by a constant (the simulation scope)
    Offset(f64),
}

/// Source of a lazily evaluated slot
#[derive(Clone)]
pub enum XSource {
    /// Drawn once per activation
    Random(Distribution),
    /// Recomputed whenever local time changes
    TimeDependent(TimeFn),
}

impl fmt::Debug for XSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XSource::Random(d) => f.debug_tuple("Random").field(d).finish(),
            XSource::TimeDependent(_) => f.write_str("TimeDependent(..)"),
        }
    }
}

#[derive(Debug)]
struct Slot {
    source: XSource,
    cached: Option<f64>,
    sampled_at: Option<f64>,
}

/// Handle to a slot of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRef {
    scope: ScopeId,
    slot: usize,
}

impl XRef {
    /// Scope owning the slot
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

/// A lazily evaluated scalar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XValue {
    /// Constant
    Fixed(f64),
    /// Random or time-dependent value owned by a context
    Scoped(XRef),
}

impl XValue {
    /// Evaluate the value at virtual time `now`
    pub fn read(&self, scopes: &mut Scopes, now: f64, rng: &mut SimRng) -> Result<f64> {
        match self {
            XValue::Fixed(v) => Ok(*v),
            XValue::Scoped(xref) => scopes.read(*xref, now, rng),
        }
    }

    /// Whether the value is a constant
    pub fn is_fixed(&self) -> bool {
        matches!(self, XValue::Fixed(_))
    }
}

impl From<f64> for XValue {
    fn from(v: f64) -> Self {
        XValue::Fixed(v)
    }
}

/// A reset scope for lazy values
#[derive(Debug)]
pub struct Context {
    base: TimeBase,
    origin: f64,
    activations: u64,
    slots: Vec<Slot>,
}

impl Context {
    fn new(base: TimeBase) -> Self {
        Self {
            base,
            origin: 0.0,
            activations: 0,
            slots: Vec::new(),
        }
    }

    /// Local time of this scope at virtual time `now`
    pub fn local_time(&self, now: f64) -> f64 {
        match self.base {
            TimeBase::Elapsed => now - self.origin,
            TimeBase::Offset(offset) => now + offset,
        }
    }

    /// Virtual time of the last activation
    pub fn origin(&self) -> f64 {
        self.origin
    }

    /// Number of times the scope was entered
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Number of lazy slots in the scope
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the scope has no lazy slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn enter(&mut self, now: f64) {
        self.origin = now;
        self.activations += 1;
        for slot in &mut self.slots {
            slot.cached = None;
            slot.sampled_at = None;
        }
    }
}

/// Arena of contexts owned by the simulation
#[derive(Debug, Default)]
pub struct Scopes {
    contexts: IndexMap<ScopeId, Context>,
    next_id: u64,
}

impl Scopes {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new context
    pub fn create(&mut self, base: TimeBase) -> ScopeId {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        self.contexts.insert(id, Context::new(base));
        id
    }

    /// Drop a context and all of its slots
    pub fn release(&mut self, id: ScopeId) -> bool {
        self.contexts.shift_remove(&id).is_some()
    }

    /// Get a context
    pub fn get(&self, id: ScopeId) -> Result<&Context> {
        self.contexts.get(&id).ok_or(Error::ScopeReleased(id.0))
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Check if no context is alive
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    fn context_mut(&mut self, id: ScopeId) -> Result<&mut Context> {
        self.contexts.get_mut(&id).ok_or(Error::ScopeReleased(id.0))
    }

    /// Register a lazy value in a context
    pub fn bind(&mut self, id: ScopeId, source: XSource) -> Result<XValue> {
        if let XSource::Random(dist) = &source {
            dist.validate()?;
        }
        let context = self.context_mut(id)?;
        context.slots.push(Slot {
            source,
            cached: None,
            sampled_at: None,
        });
        Ok(XValue::Scoped(XRef {
            scope: id,
            slot: context.slots.len() - 1,
        }))
    }

    /// A value tracking the local time of a context
    pub fn clock(&mut self, id: ScopeId) -> Result<XValue> {
        self.bind(id, XSource::TimeDependent(Rc::new(|t| t)))
    }

    /// Start a new activation of a context at virtual time `now`
    pub fn enter(&mut self, id: ScopeId, now: f64) -> Result<()> {
        self.context_mut(id)?.enter(now);
        Ok(())
    }

    /// Local time of a context
    pub fn local_time(&self, id: ScopeId, now: f64) -> Result<f64> {
        Ok(self.get(id)?.local_time(now))
    }

    /// Evaluate a slot
    pub fn read(&mut self, xref: XRef, now: f64, rng: &mut SimRng) -> Result<f64> {
        let context = self.context_mut(xref.scope)?;
        let local = context.local_time(now);
        let slot = context
            .slots
            .get_mut(xref.slot)
            .ok_or(Error::ScopeReleased(xref.scope.0))?;
        match &slot.source {
            XSource::Random(dist) => {
                if slot.cached.is_none() {
                    slot.cached = Some(dist.sample(rng)?);
                }
            }
            XSource::TimeDependent(f) => {
                if slot.sampled_at != Some(local) {
                    slot.cached = Some(f(local));
                    slot.sampled_at = Some(local);
                }
            }
        }
        Ok(slot.cached.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn uniform() -> XSource {
        XSource::Random(Distribution::Uniform {
            min: 0.0,
            max: 1000.0,
        })
    }

    #[test]
    fn test_fixed() {
        let mut scopes = Scopes::new();
        let mut rng = SimRng::new(1);
        assert_eq!(XValue::Fixed(4.0).read(&mut scopes, 10.0, &mut rng).unwrap(), 4.0);
    }

    #[test]
    fn test_random_cached_within_activation() {
        let mut scopes = Scopes::new();
        let mut rng = SimRng::new(1);
        let scope = scopes.create(TimeBase::Elapsed);
        let v = scopes.bind(scope, uniform()).unwrap();
        scopes.enter(scope, 0.0).unwrap();

        let a = v.read(&mut scopes, 0.0, &mut rng).unwrap();
        let b = v.read(&mut scopes, 5.0, &mut rng).unwrap();
        assert_eq!(a, b);

        scopes.enter(scope, 5.0).unwrap();
        let c = v.read(&mut scopes, 5.0, &mut rng).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_reproducible_for_seed() {
        let draws = |seed| {
            let mut scopes = Scopes::new();
            let mut rng = SimRng::new(seed);
            let scope = scopes.create(TimeBase::Elapsed);
            let v = scopes.bind(scope, uniform()).unwrap();
            (0..3)
                .map(|i| {
                    scopes.enter(scope, i as f64).unwrap();
                    v.read(&mut scopes, i as f64, &mut rng).unwrap()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(draws(99), draws(99));
    }

    #[test]
    fn test_time_dependent_resampled_on_time_change() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut scopes = Scopes::new();
        let mut rng = SimRng::new(1);
        let scope = scopes.create(TimeBase::Elapsed);
        let v = scopes
            .bind(
                scope,
                XSource::TimeDependent(Rc::new(move |t| {
                    counter.set(counter.get() + 1);
                    2.0 * t
                })),
            )
            .unwrap();
        scopes.enter(scope, 10.0).unwrap();

        assert_eq!(v.read(&mut scopes, 13.0, &mut rng).unwrap(), 6.0);
        assert_eq!(v.read(&mut scopes, 13.0, &mut rng).unwrap(), 6.0);
        assert_eq!(calls.get(), 1);
        assert_eq!(v.read(&mut scopes, 14.0, &mut rng).unwrap(), 8.0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_offset_clock() {
        let mut scopes = Scopes::new();
        let mut rng = SimRng::new(1);
        let scope = scopes.create(TimeBase::Offset(100.0));
        let t = scopes.clock(scope).unwrap();
        assert_eq!(t.read(&mut scopes, 5.0, &mut rng).unwrap(), 105.0);
    }

    #[test]
    fn test_released_scope() {
        let mut scopes = Scopes::new();
        let mut rng = SimRng::new(1);
        let scope = scopes.create(TimeBase::Elapsed);
        let v = scopes.bind(scope, uniform()).unwrap();
        assert!(scopes.release(scope));
        assert_eq!(
            v.read(&mut scopes, 0.0, &mut rng).unwrap_err(),
            Error::ScopeReleased(scope.0)
        );
        assert!(scopes.enter(scope, 0.0).is_err());
    }

    #[test]
    fn test_invalid_distribution_rejected() {
        let mut scopes = Scopes::new();
        let scope = scopes.create(TimeBase::Elapsed);
        let err = scopes
            .bind(scope, XSource::Random(Distribution::Exponential { lambda: -1.0 }))
            .unwrap_err();
        assert!(err.is_structural());
    }
}
