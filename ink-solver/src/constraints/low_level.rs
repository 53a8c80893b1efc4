//! Residual and propagation units that high-level constraints are built from.

use std::f64::consts::PI;

use indexmap::IndexSet;

use crate::{
    EPSILON,
    error::SolverError,
    handle::Point,
    id::VarId,
    knowns::Knowns,
    variable::{Offset, Variables},
    vector::V,
};

/// The two coordinate variables of a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PointVars {
    pub x: VarId,
    pub y: VarId,
}

impl PointVars {
    pub(crate) fn read(self, vars: &Variables) -> Result<V, SolverError> {
        Ok(V::new(vars.value(self.x)?, vars.value(self.y)?))
    }

    fn write(self, vars: &mut Variables, knowns: &mut Knowns, p: V) -> Result<bool, SolverError> {
        let x = knowns.mark(vars, self.x, p.x)?;
        let y = knowns.mark(vars, self.y, p.y)?;
        Ok(x || y)
    }

    pub(crate) fn is_known(self, vars: &Variables, knowns: &Knowns) -> bool {
        knowns.contains(vars, self.x) && knowns.contains(vars, self.y)
    }

    fn same_as(self, other: Self, vars: &Variables) -> bool {
        vars.equals(self.x, other.x) && vars.equals(self.y, other.y)
    }
}

/// A pure numeric function of N arguments.
pub type FormulaFn = fn(&[f64]) -> f64;

/// Internal constraint. Each contributes one residual term to its cluster's
/// error function, and may pin down variables before the minimizer runs.
#[derive(Clone, Debug)]
pub(crate) enum LowLevel {
    /// Drags a point towards a live touch position.
    Finger { point: PointVars, position: Point },
    /// Owns the distance between two points.
    Distance {
        a: PointVars,
        b: PointVars,
        distance: VarId,
    },
    /// Owns the angle of the vector from `a` to `b`.
    Angle {
        a: PointVars,
        b: PointVars,
        angle: VarId,
    },
    /// Owns `result = func(args)`.
    Formula {
        args: Vec<VarId>,
        result: VarId,
        func: FormulaFn,
    },
}

impl LowLevel {
    /// Every variable this constraint reads or writes, owned variables first.
    pub fn variables(&self) -> Vec<VarId> {
        match self {
            Self::Finger { point, .. } => vec![point.x, point.y],
            Self::Distance { a, b, distance } => vec![*distance, a.x, a.y, b.x, b.y],
            Self::Angle { a, b, angle } => vec![*angle, a.x, a.y, b.x, b.y],
            Self::Formula { args, result, .. } => {
                let mut out = Vec::with_capacity(args.len() + 1);
                out.push(*result);
                out.extend(args.iter().copied());
                out
            }
        }
    }

    /// The variable this constraint created and owns, if any.
    pub fn owned(&self) -> Option<VarId> {
        match self {
            Self::Finger { .. } => None,
            Self::Distance { distance, .. } => Some(*distance),
            Self::Angle { angle, .. } => Some(*angle),
            Self::Formula { result, .. } => Some(*result),
        }
    }

    #[mutants::skip]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Finger { .. } => "Finger",
            Self::Distance { .. } => "Distance",
            Self::Angle { .. } => "Angle",
            Self::Formula { .. } => "Formula",
        }
    }

    /// Add this constraint to a cluster's list, unless an existing one
    /// already relates the same two points. In that case the owned variables
    /// are unified instead, so the relationship only contributes one residual.
    pub fn add_to(self, existing: &mut Vec<Self>, vars: &mut Variables) -> Result<(), SolverError> {
        match &self {
            Self::Distance { a, b, distance } => {
                for other in &*existing {
                    let Self::Distance {
                        a: oa,
                        b: ob,
                        distance: od,
                    } = other
                    else {
                        continue;
                    };
                    let same = oa.same_as(*a, vars) && ob.same_as(*b, vars);
                    let reversed = oa.same_as(*b, vars) && ob.same_as(*a, vars);
                    if same || reversed {
                        vars.unify(*od, *distance, Offset::IDENTITY)?;
                        return Ok(());
                    }
                }
            }
            Self::Angle { a, b, angle } => {
                for other in &*existing {
                    let Self::Angle {
                        a: oa,
                        b: ob,
                        angle: oangle,
                    } = other
                    else {
                        continue;
                    };
                    if oa.same_as(*a, vars) && ob.same_as(*b, vars) {
                        vars.unify(*oangle, *angle, Offset::IDENTITY)?;
                        return Ok(());
                    }
                    if oa.same_as(*b, vars) && ob.same_as(*a, vars) {
                        // angle(a, b) = angle(b, a) + π
                        vars.unify(*oangle, *angle, Offset::new(1.0, -PI))?;
                        return Ok(());
                    }
                }
            }
            Self::Finger { .. } | Self::Formula { .. } => {}
        }
        existing.push(self);
        Ok(())
    }

    /// If enough inputs are known, compute the output and mark it known.
    /// Returns whether anything new became known.
    pub fn propagate_knowns(
        &self,
        vars: &mut Variables,
        knowns: &mut Knowns,
        finger_of_god: bool,
    ) -> Result<bool, SolverError> {
        match self {
            Self::Finger { point, position } => {
                if !finger_of_god {
                    return Ok(false);
                }
                point.write(vars, knowns, V::new(position.x, position.y))
            }
            Self::Distance { a, b, distance } => {
                if knowns.contains(vars, *distance)
                    || !a.is_known(vars, knowns)
                    || !b.is_known(vars, knowns)
                {
                    return Ok(false);
                }
                let d = a.read(vars)?.euclidean_distance(b.read(vars)?);
                knowns.mark(vars, *distance, d)
            }
            Self::Angle { a, b, angle } => {
                if knowns.contains(vars, *angle)
                    || !a.is_known(vars, knowns)
                    || !b.is_known(vars, knowns)
                {
                    return Ok(false);
                }
                let theta = compute_angle(a.read(vars)?, b.read(vars)?, vars.value(*angle)?);
                knowns.mark(vars, *angle, theta)
            }
            Self::Formula { args, result, func } => {
                if knowns.contains(vars, *result) || !args.iter().all(|a| knowns.contains(vars, *a)) {
                    return Ok(false);
                }
                let inputs = read_all(vars, args)?;
                knowns.mark(vars, *result, func(&inputs))
            }
        }
    }

    /// This constraint's residual at the current variable values.
    ///
    /// If the owned variable is free, it is assigned its exact value here
    /// and the residual is zero.
    pub fn error(
        &self,
        vars: &mut Variables,
        knowns: &Knowns,
        free: &IndexSet<VarId>,
        finger_of_god: bool,
    ) -> Result<f64, SolverError> {
        let is_free = |vars: &Variables, id: VarId| free.contains(&vars.canonical(id));
        match self {
            Self::Finger { point, position } => {
                if finger_of_god {
                    // Already pinned through knowns.
                    return Ok(0.0);
                }
                let p = point.read(vars)?;
                Ok(p.euclidean_distance(V::new(position.x, position.y)))
            }
            Self::Distance { a, b, distance } => {
                let actual = a.read(vars)?.euclidean_distance(b.read(vars)?);
                if is_free(vars, *distance) {
                    vars.set_value(*distance, actual)?;
                    return Ok(0.0);
                }
                Ok(actual - vars.value(*distance)?)
            }
            Self::Angle { a, b, angle } => {
                let pa = a.read(vars)?;
                let pb = b.read(vars)?;
                if is_free(vars, *angle) {
                    let theta = compute_angle(pa, pb, vars.value(*angle)?);
                    vars.set_value(*angle, theta)?;
                    return Ok(0.0);
                }
                let known = [
                    knowns.contains(vars, a.x),
                    knowns.contains(vars, a.y),
                    knowns.contains(vars, b.x),
                    knowns.contains(vars, b.y),
                ];
                Ok(angle_error(pa, pb, vars.value(*angle)?, known))
            }
            Self::Formula { args, result, func } => {
                let computed = func(&read_all(vars, args)?);
                if is_free(vars, *result) {
                    vars.set_value(*result, computed)?;
                    return Ok(0.0);
                }
                Ok(computed - vars.value(*result)?)
            }
        }
    }
}

fn read_all(vars: &Variables, ids: &[VarId]) -> Result<Vec<f64>, SolverError> {
    ids.iter().map(|id| vars.value(*id)).collect()
}

/// Angle of the vector from `a` to `b`, choosing the representative
/// nearest `previous` so the value never jumps by 2π.
/// Coincident points have no direction, so `previous` is kept.
pub(crate) fn compute_angle(a: V, b: V, previous: f64) -> f64 {
    if a.euclidean_distance(b) < EPSILON {
        return previous;
    }
    let raw = a.angle_to(b);
    previous + wrap_angle_delta(raw - previous)
}

/// Wrap an angle difference into (-π, π].
fn wrap_angle_delta(delta: f64) -> f64 {
    if delta > -PI && delta <= PI {
        delta
    } else {
        let (sin, cos) = libm::sincos(delta);
        libm::atan2(sin, cos)
    }
}

/// Distance `b` must move to sit on the ray from `a` at angle `theta`,
/// keeping its distance from `a`.
fn rotate_b_error(a: V, b: V, theta: f64) -> f64 {
    let target = a + V::from_angle(theta) * a.euclidean_distance(b);
    b.euclidean_distance(target)
}

/// Distance `a` must move so that `b` is at angle `theta` from it,
/// keeping its distance from `b`.
fn rotate_a_error(a: V, b: V, theta: f64) -> f64 {
    let target = b - V::from_angle(theta) * a.euclidean_distance(b);
    a.euclidean_distance(target)
}

/// Minimum displacement of the movable endpoint(s) that makes the angle
/// from `a` to `b` equal `theta`.
/// `known` flags which of `[a.x, a.y, b.x, b.y]` are pinned.
fn angle_error(a: V, b: V, theta: f64, known: [bool; 4]) -> f64 {
    let (sin, cos) = libm::sincos(theta);
    match known {
        // b is free to rotate about a.
        [_, _, false, false] => rotate_b_error(a, b, theta),
        // a is free to rotate about b.
        [false, false, _, _] => rotate_a_error(a, b, theta),
        // Only b.y may move: intersect the ray from a with the line x = b.x.
        [_, _, true, false] => {
            if cos.abs() < EPSILON {
                return rotate_b_error(a, b, theta);
            }
            let t = (b.x - a.x) / cos;
            if t < 0.0 {
                return rotate_b_error(a, b, theta);
            }
            (b.y - (a.y + t * sin)).abs()
        }
        // Only b.x may move: intersect the ray from a with the line y = b.y.
        [_, _, false, true] => {
            if sin.abs() < EPSILON {
                return rotate_b_error(a, b, theta);
            }
            let t = (b.y - a.y) / sin;
            if t < 0.0 {
                return rotate_b_error(a, b, theta);
            }
            (b.x - (a.x + t * cos)).abs()
        }
        // Only a.y may move: intersect the backwards ray from b with x = a.x.
        [true, false, true, true] => {
            if cos.abs() < EPSILON {
                return rotate_a_error(a, b, theta);
            }
            let t = (b.x - a.x) / cos;
            if t < 0.0 {
                return rotate_a_error(a, b, theta);
            }
            (a.y - (b.y - t * sin)).abs()
        }
        // Only a.x may move: intersect the backwards ray from b with y = a.y.
        [false, true, true, true] => {
            if sin.abs() < EPSILON {
                return rotate_a_error(a, b, theta);
            }
            let t = (b.y - a.y) / sin;
            if t < 0.0 {
                return rotate_a_error(a, b, theta);
            }
            (a.x - (b.x - t * cos)).abs()
        }
        // Nothing may move. Report the smaller one-sided error anyway.
        [true, true, true, true] => {
            libm::fmin(rotate_b_error(a, b, theta), rotate_a_error(a, b, theta))
        }
    }
}
