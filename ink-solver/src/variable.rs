//! Scalar variables and the canonical/absorbed unification scheme.
//!
//! Chained equalities are never emitted as residuals. Instead, one variable
//! of each equal group is *canonical* and every other member is *absorbed*
//! into it through an affine [`Offset`]. Reads and writes always resolve to
//! the canonical instance.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{
    EPSILON,
    handle::Component,
    error::SolverError,
    id::{ConstraintId, HandleId, VarId},
};

/// Affine relationship between an absorbed variable and its canonical instance:
/// `canonical = m * absorbed + b`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// Scale.
    pub m: f64,
    /// Shift.
    pub b: f64,
}

impl Default for Offset {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Offset {
    /// `canonical = absorbed`.
    pub const IDENTITY: Self = Self { m: 1.0, b: 0.0 };

    /// Create a new offset.
    pub fn new(m: f64, b: f64) -> Self {
        Self { m, b }
    }

    /// Evaluate `m * x + b`.
    pub fn apply(self, x: f64) -> f64 {
        self.m * x + self.b
    }

    /// `self ∘ inner`, i.e. `x ↦ self(inner(x))`.
    pub fn then(self, inner: Self) -> Self {
        Self {
            m: self.m * inner.m,
            b: self.m * inner.b + self.b,
        }
    }

    /// If `y = self(x)` this gives the offset with `x = inverse(y)`.
    /// Only meaningful when `m` is nonzero.
    pub fn inverse(self) -> Self {
        Self {
            m: self.m.recip(),
            b: -self.b / self.m,
        }
    }

    /// Is this (numerically) the identity?
    pub fn is_identity(self) -> bool {
        self.nearly_eq(Self::IDENTITY)
    }

    /// A zero scale loses `x` entirely, so it can't be inverted or unified.
    /// Any representable nonzero scale is fine, however small.
    pub fn is_degenerate(self) -> bool {
        self.m.abs() < f64::MIN_POSITIVE
    }

    pub(crate) fn nearly_eq(self, other: Self) -> bool {
        (self.m - other.m).abs() < EPSILON && (self.b - other.b).abs() < EPSILON
    }
}

/// Which quantity of a constraint a variable stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
    /// Distance between two handles.
    Distance,
    /// Angle from one handle to another.
    Angle,
    /// Output of a formula.
    Result,
}

/// Informational annotation saying what a variable stands for.
/// Never used by the solver itself; handy for labels and debugging.
#[derive(Clone, Debug, PartialEq)]
pub enum Represents {
    /// One coordinate of a handle.
    Handle(HandleId, Component),
    /// A quantity owned by a constraint.
    Constraint(ConstraintId, Quantity),
    /// Free-form label.
    Label(String),
}

#[derive(Clone, Debug)]
enum Link {
    Canonical { absorbed: IndexSet<VarId> },
    Absorbed { canonical: VarId, offset: Offset },
}

impl Link {
    fn canonical() -> Self {
        Self::Canonical {
            absorbed: IndexSet::new(),
        }
    }
}

/// A named scalar number.
#[derive(Clone, Debug)]
pub struct Variable {
    id: VarId,
    value: f64,
    represents: Option<Represents>,
    link: Link,
}

impl Variable {
    /// This variable's ID.
    pub fn id(&self) -> VarId {
        self.id
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// What this variable stands for, if anyone said.
    pub fn represents(&self) -> Option<&Represents> {
        self.represents.as_ref()
    }

    /// Is this variable absorbed into another?
    pub fn is_absorbed(&self) -> bool {
        matches!(self.link, Link::Absorbed { .. })
    }
}

/// Arena of every live variable, indexed by ID.
#[derive(Default, Clone, Debug)]
pub(crate) struct Variables {
    map: IndexMap<VarId, Variable>,
}

impl Variables {
    pub fn insert(&mut self, id: VarId, value: f64, represents: Option<Represents>) {
        self.map.insert(
            id,
            Variable {
                id,
                value,
                represents,
                link: Link::canonical(),
            },
        );
    }

    pub fn get(&self, id: VarId) -> Result<&Variable, SolverError> {
        self.map.get(&id).ok_or(SolverError::VariableNotFound(id))
    }

    fn get_mut(&mut self, id: VarId) -> Result<&mut Variable, SolverError> {
        self.map
            .get_mut(&id)
            .ok_or(SolverError::VariableNotFound(id))
    }

    pub fn contains(&self, id: VarId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Remove a variable, keeping the unification groups consistent.
    /// Members absorbed into it are promoted back to canonical.
    pub fn remove(&mut self, id: VarId) -> Option<Variable> {
        let removed = self.map.shift_remove(&id)?;
        match &removed.link {
            Link::Absorbed { canonical, .. } => {
                if let Some(Variable {
                    link: Link::Canonical { absorbed },
                    ..
                }) = self.map.get_mut(canonical)
                {
                    absorbed.shift_remove(&id);
                }
            }
            Link::Canonical { absorbed } => {
                for member in absorbed {
                    if let Some(v) = self.map.get_mut(member) {
                        v.link = Link::canonical();
                    }
                }
            }
        }
        Some(removed)
    }

    /// The canonical instance of `id` and the offset relating them
    /// (`canonical = offset(id)`).
    /// A canonical variable maps to itself with the identity offset.
    /// An alias whose canonical instance has vanished is treated as canonical.
    pub fn resolve(&self, id: VarId) -> (VarId, Offset) {
        match self.map.get(&id).map(|v| &v.link) {
            Some(Link::Absorbed { canonical, offset }) if self.map.contains_key(canonical) => {
                (*canonical, *offset)
            }
            _ => (id, Offset::IDENTITY),
        }
    }

    pub fn canonical(&self, id: VarId) -> VarId {
        self.resolve(id).0
    }

    pub fn value(&self, id: VarId) -> Result<f64, SolverError> {
        self.get(id).map(Variable::value)
    }

    /// Set a value.
    /// On a canonical variable this cascades to every absorbed member;
    /// on an absorbed variable the request is rewritten against its canonical instance.
    pub fn set_value(&mut self, id: VarId, value: f64) -> Result<(), SolverError> {
        let (canonical, offset) = self.resolve(id);
        if canonical != id {
            return self.set_value(canonical, offset.apply(value));
        }
        let var = self.get_mut(id)?;
        var.value = value;
        let members: Vec<VarId> = match &var.link {
            Link::Canonical { absorbed } => absorbed.iter().copied().collect(),
            Link::Absorbed { .. } => Vec::new(),
        };
        for member in members {
            let Some(v) = self.map.get_mut(&member) else {
                continue;
            };
            if let Link::Absorbed { offset, .. } = v.link {
                v.value = offset.inverse().apply(value);
            }
        }
        Ok(())
    }

    /// Variables currently absorbed into `id`'s canonical instance (excluding the canonical itself).
    pub fn absorbed_members(&self, id: VarId) -> Vec<VarId> {
        let canonical = self.canonical(id);
        match self.map.get(&canonical).map(|v| &v.link) {
            Some(Link::Canonical { absorbed }) => absorbed.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Make `this = offset.m * that + offset.b` hold from now on, by merging
    /// the two unification groups. `this`'s current value wins.
    ///
    /// Returns whether anything was merged. Merging a group with itself is a
    /// no-op if the offset is the identity, and rejected otherwise, as is a
    /// zero scale.
    pub fn unify(&mut self, this: VarId, that: VarId, offset: Offset) -> Result<bool, SolverError> {
        self.unify_bounded(this, that, offset, 0)
    }

    // Absorption is always flattened to one level, so each side is rewritten
    // at most once before both are canonical: depth never exceeds 2.
    fn unify_bounded(
        &mut self,
        this: VarId,
        that: VarId,
        offset: Offset,
        depth: u8,
    ) -> Result<bool, SolverError> {
        debug_assert!(depth <= 2, "unification rewrote more than twice");
        // Both must exist.
        self.get(this)?;
        self.get(that)?;

        let (this_canonical, this_offset) = self.resolve(this);
        if this_canonical != this {
            // C = o1(this) and this = offset(that), so C = o1(offset(that)).
            return self.unify_bounded(this_canonical, that, this_offset.then(offset), depth + 1);
        }
        let (that_canonical, that_offset) = self.resolve(that);
        if that_canonical != that {
            // D = o2(that), so that = o2⁻¹(D) and this = offset(o2⁻¹(D)).
            return self.unify_bounded(
                this,
                that_canonical,
                offset.then(that_offset.inverse()),
                depth + 1,
            );
        }

        if this == that {
            if !offset.is_identity() {
                tracing::warn!(
                    variable = %this,
                    m = offset.m,
                    b = offset.b,
                    "ignoring inconsistent self-unification"
                );
            }
            return Ok(false);
        }
        if offset.is_degenerate() {
            tracing::warn!(%this, %that, "ignoring unification with a zero scale");
            return Ok(false);
        }

        // `this` absorbs `that`, and everything `that` had absorbed.
        let that_var = self.get_mut(that)?;
        let previously_absorbed = match std::mem::replace(
            &mut that_var.link,
            Link::Absorbed {
                canonical: this,
                offset,
            },
        ) {
            Link::Canonical { absorbed } => absorbed,
            Link::Absorbed { .. } => IndexSet::new(),
        };
        let mut adopted = vec![that];
        for member in previously_absorbed {
            let Some(v) = self.map.get_mut(&member) else {
                continue;
            };
            if let Link::Absorbed {
                offset: member_offset,
                ..
            } = v.link
            {
                // that = member_offset(member), so this = offset(member_offset(member)).
                v.link = Link::Absorbed {
                    canonical: this,
                    offset: offset.then(member_offset),
                };
                adopted.push(member);
            }
        }
        if let Link::Canonical { absorbed } = &mut self.get_mut(this)?.link {
            absorbed.extend(adopted);
        }

        // Self-assignment cascades the winning value to every new member.
        let value = self.value(this)?;
        self.set_value(this, value)?;
        Ok(true)
    }

    /// Detach one absorbed variable so it becomes canonical again.
    /// Returns whether it was absorbed.
    pub fn detach(&mut self, id: VarId) -> Result<bool, SolverError> {
        let (canonical, _) = self.resolve(id);
        if canonical == id {
            return Ok(false);
        }
        self.get_mut(id)?.link = Link::canonical();
        if let Link::Canonical { absorbed } = &mut self.get_mut(canonical)?.link {
            absorbed.shift_remove(&id);
        }
        Ok(true)
    }

    /// Forget every unification. Values are left as they are.
    pub fn reset_unification(&mut self) {
        for v in self.map.values_mut() {
            v.link = Link::canonical();
        }
    }

    /// Do `a` and `b` denote the same quantity?
    /// True if they share a canonical instance under the same offset.
    pub fn equals(&self, a: VarId, b: VarId) -> bool {
        let (ca, oa) = self.resolve(a);
        let (cb, ob) = self.resolve(b);
        ca == cb && oa.nearly_eq(ob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_nearly_eq;

    fn arena(values: &[f64]) -> (Variables, Vec<VarId>) {
        let mut vars = Variables::default();
        let ids: Vec<VarId> = (0..values.len() as u32).map(VarId).collect();
        for (id, value) in ids.iter().zip(values) {
            vars.insert(*id, *value, None);
        }
        (vars, ids)
    }

    #[test]
    fn offset_algebra() {
        let a = Offset::new(2.0, 3.0);
        let b = Offset::new(-1.0, 4.0);
        assert_nearly_eq(a.then(b).apply(5.0), a.apply(b.apply(5.0)));
        assert_nearly_eq(a.inverse().apply(a.apply(7.5)), 7.5);
        assert!(a.then(a.inverse()).is_identity());
    }

    #[test]
    fn affine_scenario() {
        // y = 2x + 3
        let (mut vars, ids) = arena(&[0.0, 0.0]);
        let (x, y) = (ids[0], ids[1]);
        assert!(vars.unify(y, x, Offset::new(2.0, 3.0)).unwrap());
        vars.set_value(x, 5.0).unwrap();
        assert_nearly_eq(vars.value(y).unwrap(), 13.0);
        vars.set_value(y, 13.0).unwrap();
        assert_nearly_eq(vars.value(x).unwrap(), 5.0);
        vars.set_value(y, 1.0).unwrap();
        assert_nearly_eq(vars.value(x).unwrap(), -1.0);
    }

    #[test]
    fn transitive_unification() {
        let (mut vars, ids) = arena(&[1.0, 2.0, 3.0]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        vars.unify(a, b, Offset::IDENTITY).unwrap();
        vars.unify(b, c, Offset::IDENTITY).unwrap();
        assert!(vars.equals(a, c));
        assert!(vars.equals(c, a));
        vars.set_value(a, 9.0).unwrap();
        assert_nearly_eq(vars.value(c).unwrap(), 9.0);
        // The first merge let `a` win.
        assert_eq!(vars.canonical(c), a);
    }

    #[test]
    fn composed_offsets_through_absorbed_sides() {
        // b = 2a, c = b + 1  =>  c = 2a + 1.
        let (mut vars, ids) = arena(&[1.0, 0.0, 0.0]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        vars.unify(b, a, Offset::new(2.0, 0.0)).unwrap();
        vars.unify(c, b, Offset::new(1.0, 1.0)).unwrap();
        vars.set_value(a, 4.0).unwrap();
        assert_nearly_eq(vars.value(b).unwrap(), 8.0);
        assert_nearly_eq(vars.value(c).unwrap(), 9.0);
        vars.set_value(c, 3.0).unwrap();
        assert_nearly_eq(vars.value(a).unwrap(), 1.0);
        assert_nearly_eq(vars.value(b).unwrap(), 2.0);
        assert!(!vars.equals(a, c));
    }

    #[test]
    fn self_unification() {
        let (mut vars, ids) = arena(&[1.0, 1.0]);
        let (a, b) = (ids[0], ids[1]);
        vars.unify(a, b, Offset::IDENTITY).unwrap();
        // Already merged, identity: nothing to do.
        assert!(!vars.unify(b, a, Offset::IDENTITY).unwrap());
        // Inconsistent: rejected.
        assert!(!vars.unify(b, a, Offset::new(1.0, 5.0)).unwrap());
        assert!(vars.equals(a, b));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let (mut vars, ids) = arena(&[1.0, 1.0]);
        assert!(!vars.unify(ids[0], ids[1], Offset::new(0.0, 2.0)).unwrap());
        assert!(!vars.equals(ids[0], ids[1]));
    }

    #[test]
    fn tiny_scale_still_unifies() {
        // y = 1e-6 * x
        let (mut vars, ids) = arena(&[1.0, 1e6]);
        let (y, x) = (ids[0], ids[1]);
        assert!(vars.unify(y, x, Offset::new(1e-6, 0.0)).unwrap());
        assert_eq!(vars.canonical(x), y);
        assert_nearly_eq(vars.value(x).unwrap() * 1e-6, 1.0);
        vars.set_value(x, 3e6).unwrap();
        assert_nearly_eq(vars.value(y).unwrap(), 3.0);
    }

    #[test]
    fn missing_variable_is_an_error() {
        let (mut vars, ids) = arena(&[1.0]);
        let err = vars.unify(ids[0], VarId(99), Offset::IDENTITY).unwrap_err();
        assert!(matches!(err, SolverError::VariableNotFound(VarId(99))));
        assert!(vars.value(VarId(42)).is_err());
    }

    #[test]
    fn remove_promotes_members() {
        let (mut vars, ids) = arena(&[1.0, 2.0, 3.0]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        vars.unify(a, b, Offset::IDENTITY).unwrap();
        vars.unify(a, c, Offset::IDENTITY).unwrap();
        vars.remove(a);
        assert_eq!(vars.canonical(b), b);
        assert_eq!(vars.canonical(c), c);
        vars.set_value(b, 7.0).unwrap();
        assert_nearly_eq(vars.value(c).unwrap(), 1.0);
    }

    #[test]
    fn detach_and_reset() {
        let (mut vars, ids) = arena(&[1.0, 2.0, 3.0]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        vars.unify(a, b, Offset::IDENTITY).unwrap();
        vars.unify(a, c, Offset::IDENTITY).unwrap();
        assert!(vars.detach(b).unwrap());
        assert!(!vars.detach(b).unwrap());
        assert_eq!(vars.absorbed_members(a), vec![c]);
        vars.reset_unification();
        assert!(vars.absorbed_members(a).is_empty());
        assert!(!vars.get(c).unwrap().is_absorbed());
    }
}
