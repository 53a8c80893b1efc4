use serde::{Deserialize, Serialize};

use crate::{
    error::SolverError,
    handle::{Handles, Point},
    id::{HandleId, VarId},
    knowns::Knowns,
    variable::{Offset, Quantity, Variables},
    vector::V,
};

pub(crate) use self::low_level::{LowLevel, PointVars};

/// Residual and propagation units shared by the user-facing constraints.
pub(crate) mod low_level;

/// Each kind of relationship a user can place on a sketch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    /// Locks a variable to a value.
    Constant {
        /// The locked variable.
        variable: VarId,
        /// Its value.
        value: f64,
    },
    /// Locks a handle to a position.
    Pin {
        /// The pinned handle.
        handle: HandleId,
        /// Where it is pinned.
        position: Point,
    },
    /// Drags a handle towards a live touch position.
    /// Transient: fingers are never persisted.
    Finger {
        /// The dragged handle.
        handle: HandleId,
        /// Where the finger is.
        position: Point,
    },
    /// `y = m * x + b`.
    LinearRelationship {
        /// Dependent variable.
        y: VarId,
        /// Scale.
        m: f64,
        /// Independent variable.
        x: VarId,
        /// Shift.
        b: f64,
    },
    /// Merges two handles into one point, e.g. after one was dragged onto the other.
    Absorb {
        /// The surviving handle.
        parent: HandleId,
        /// The handle merged into it.
        child: HandleId,
    },
    /// Owns the distance and angle of the vector from `a` to `b`.
    PolarVector {
        /// Start of the vector.
        a: HandleId,
        /// End of the vector.
        b: HandleId,
        /// Owned variable: length of the vector.
        distance: VarId,
        /// Owned variable: angle of the vector, counter-clockwise from +X.
        angle: VarId,
    },
    /// Owns the distance between two handles.
    Distance {
        /// One end.
        a: HandleId,
        /// The other end.
        b: HandleId,
        /// Owned variable: the distance.
        distance: VarId,
    },
    /// Owns the angle of the vector from `a` to `b`.
    Angle {
        /// Start of the vector.
        a: HandleId,
        /// End of the vector.
        b: HandleId,
        /// Owned variable: the angle.
        angle: VarId,
    },
    /// Owns `result = m * x + b`, where all of `m`, `x` and `b` are variables.
    LinearFormula {
        /// Scale.
        m: VarId,
        /// Input.
        x: VarId,
        /// Shift.
        b: VarId,
        /// Owned variable: the formula's output.
        result: VarId,
    },
}

/// Identifies "the same" constraint, so re-issuing it updates the existing
/// one instead of adding a duplicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ConstraintKey {
    Constant(VarId),
    Pin(HandleId),
    Finger(HandleId),
    LinearRelationship { y: VarId, x: VarId },
    /// Lower handle ID first: absorbing is symmetric.
    Absorb(HandleId, HandleId),
    PolarVector { a: HandleId, b: HandleId },
}

fn linear(args: &[f64]) -> f64 {
    match args {
        [m, x, b] => m * x + b,
        _ => f64::NAN,
    }
}

impl Constraint {
    /// Memoisation key. Constraints without one can be repeated freely.
    pub(crate) fn key(&self) -> Option<ConstraintKey> {
        match self {
            Self::Constant { variable, .. } => Some(ConstraintKey::Constant(*variable)),
            Self::Pin { handle, .. } => Some(ConstraintKey::Pin(*handle)),
            Self::Finger { handle, .. } => Some(ConstraintKey::Finger(*handle)),
            Self::LinearRelationship { y, x, .. } => {
                Some(ConstraintKey::LinearRelationship { y: *y, x: *x })
            }
            Self::Absorb { parent, child } => Some(ConstraintKey::Absorb(
                (*parent).min(*child),
                (*parent).max(*child),
            )),
            Self::PolarVector { a, b, .. } => Some(ConstraintKey::PolarVector { a: *a, b: *b }),
            Self::Distance { .. } | Self::Angle { .. } | Self::LinearFormula { .. } => None,
        }
    }

    /// Human-readable constraint name, useful for debugging.
    #[mutants::skip]
    pub fn constraint_kind(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "Constant",
            Self::Pin { .. } => "Pin",
            Self::Finger { .. } => "Finger",
            Self::LinearRelationship { .. } => "LinearRelationship",
            Self::Absorb { .. } => "Absorb",
            Self::PolarVector { .. } => "PolarVector",
            Self::Distance { .. } => "Distance",
            Self::Angle { .. } => "Angle",
            Self::LinearFormula { .. } => "LinearFormula",
        }
    }

    /// Handles this constraint refers to.
    pub fn handles(&self) -> Vec<HandleId> {
        match self {
            Self::Pin { handle, .. } | Self::Finger { handle, .. } => vec![*handle],
            Self::Absorb {
                parent: a,
                child: b,
            }
            | Self::PolarVector { a, b, .. }
            | Self::Distance { a, b, .. }
            | Self::Angle { a, b, .. } => vec![*a, *b],
            Self::Constant { .. } | Self::LinearRelationship { .. } | Self::LinearFormula { .. } => {
                Vec::new()
            }
        }
    }

    /// Variables this constraint created, and which die with it.
    pub fn owned_variables(&self) -> Vec<VarId> {
        self.owned_quantities().into_iter().map(|(v, _)| v).collect()
    }

    /// Owned variables, with what each one measures.
    pub(crate) fn owned_quantities(&self) -> Vec<(VarId, Quantity)> {
        match self {
            Self::PolarVector {
                distance, angle, ..
            } => vec![(*distance, Quantity::Distance), (*angle, Quantity::Angle)],
            Self::Distance { distance, .. } => vec![(*distance, Quantity::Distance)],
            Self::Angle { angle, .. } => vec![(*angle, Quantity::Angle)],
            Self::LinearFormula { result, .. } => vec![(*result, Quantity::Result)],
            Self::Constant { .. }
            | Self::Pin { .. }
            | Self::Finger { .. }
            | Self::LinearRelationship { .. }
            | Self::Absorb { .. } => Vec::new(),
        }
    }

    /// Every variable this constraint refers to, including handle coordinates.
    pub(crate) fn variables(&self, handles: &Handles) -> Result<Vec<VarId>, SolverError> {
        let mut out = Vec::new();
        for h in self.handles() {
            let (x, y) = handles.coords(h)?;
            out.push(x);
            out.push(y);
        }
        match self {
            Self::Constant { variable, .. } => out.push(*variable),
            Self::LinearRelationship { y, x, .. } => out.extend([*y, *x]),
            Self::LinearFormula { m, x, b, .. } => out.extend([*m, *x, *b]),
            Self::Pin { .. }
            | Self::Finger { .. }
            | Self::Absorb { .. }
            | Self::PolarVector { .. }
            | Self::Distance { .. }
            | Self::Angle { .. } => {}
        }
        out.extend(self.owned_variables());
        Ok(out)
    }

    /// Does this constraint refer to the variable, directly or through a handle?
    pub(crate) fn mentions(&self, var: VarId, handles: &Handles) -> bool {
        let through_handle = self.handles().into_iter().any(|h| {
            handles
                .get(h)
                .map(|h| h.x() == var || h.y() == var)
                .unwrap_or(false)
        });
        through_handle
            || match self {
                Self::Constant { variable, .. } => *variable == var,
                Self::LinearRelationship { y, x, .. } => *y == var || *x == var,
                Self::LinearFormula { m, x, b, result } => [*m, *x, *b, *result].contains(&var),
                _ => self.owned_variables().contains(&var),
            }
    }

    fn point(handles: &Handles, id: HandleId) -> Result<PointVars, SolverError> {
        let (x, y) = handles.coords(id)?;
        Ok(PointVars { x, y })
    }

    /// The low-level constraints expressing this one.
    pub(crate) fn low_level(&self, handles: &Handles) -> Result<Vec<LowLevel>, SolverError> {
        let out = match self {
            Self::Finger { handle, position } => vec![LowLevel::Finger {
                point: Self::point(handles, *handle)?,
                position: *position,
            }],
            Self::PolarVector {
                a,
                b,
                distance,
                angle,
            } => {
                let (a, b) = (Self::point(handles, *a)?, Self::point(handles, *b)?);
                vec![
                    LowLevel::Distance {
                        a,
                        b,
                        distance: *distance,
                    },
                    LowLevel::Angle {
                        a,
                        b,
                        angle: *angle,
                    },
                ]
            }
            Self::Distance { a, b, distance } => vec![LowLevel::Distance {
                a: Self::point(handles, *a)?,
                b: Self::point(handles, *b)?,
                distance: *distance,
            }],
            Self::Angle { a, b, angle } => vec![LowLevel::Angle {
                a: Self::point(handles, *a)?,
                b: Self::point(handles, *b)?,
                angle: *angle,
            }],
            Self::LinearFormula { m, x, b, result } => vec![LowLevel::Formula {
                args: vec![*m, *x, *b],
                result: *result,
                func: linear,
            }],
            Self::Constant { .. }
            | Self::Pin { .. }
            | Self::LinearRelationship { .. }
            | Self::Absorb { .. } => Vec::new(),
        };
        Ok(out)
    }

    /// Establish the variable unifications this constraint implies.
    /// Called once per clustering pass, after every unification was reset.
    pub(crate) fn set_up_variable_relationships(
        &self,
        vars: &mut Variables,
        handles: &mut Handles,
    ) -> Result<(), SolverError> {
        match self {
            Self::LinearRelationship { y, m, x, b } => {
                vars.unify(*y, *x, Offset::new(*m, *b))?;
            }
            Self::Absorb { parent, child } => {
                let (px, py) = handles.coords(*parent)?;
                let (cx, cy) = handles.coords(*child)?;
                vars.unify(px, cx, Offset::IDENTITY)?;
                vars.unify(py, cy, Offset::IDENTITY)?;
                handles.absorb(*parent, *child)?;
            }
            Self::Constant { .. }
            | Self::Pin { .. }
            | Self::Finger { .. }
            | Self::PolarVector { .. }
            | Self::Distance { .. }
            | Self::Angle { .. }
            | Self::LinearFormula { .. } => {}
        }
        Ok(())
    }

    /// Mark whatever this constraint pins down as known.
    /// Returns whether anything new became known.
    pub(crate) fn propagate_knowns(
        &self,
        handles: &Handles,
        vars: &mut Variables,
        knowns: &mut Knowns,
    ) -> Result<bool, SolverError> {
        match self {
            Self::Constant { variable, value } => knowns.mark(vars, *variable, *value),
            Self::Pin { handle, position } => {
                let (x, y) = handles.coords(*handle)?;
                let x = knowns.mark(vars, x, position.x)?;
                let y = knowns.mark(vars, y, position.y)?;
                Ok(x || y)
            }
            // A zero scale cannot be unified, so it pins `y` instead.
            Self::LinearRelationship { y, m, b, .. }
                if Offset::new(*m, *b).is_degenerate() =>
            {
                knowns.mark(vars, *y, *b)
            }
            Self::PolarVector {
                a,
                b,
                distance,
                angle,
            } => {
                if !knowns.contains(vars, *distance) || !knowns.contains(vars, *angle) {
                    return Ok(false);
                }
                let (a, b) = (Self::point(handles, *a)?, Self::point(handles, *b)?);
                let offset = V::from_angle(vars.value(*angle)?) * vars.value(*distance)?;
                let (target, p) = match (a.is_known(vars, knowns), b.is_known(vars, knowns)) {
                    (true, false) => (b, a.read(vars)? + offset),
                    (false, true) => (a, b.read(vars)? - offset),
                    _ => return Ok(false),
                };
                let x = knowns.mark(vars, target.x, p.x)?;
                let y = knowns.mark(vars, target.y, p.y)?;
                Ok(x || y)
            }
            Self::Finger { .. }
            | Self::LinearRelationship { .. }
            | Self::Absorb { .. }
            | Self::Distance { .. }
            | Self::Angle { .. }
            | Self::LinearFormula { .. } => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_nearly_eq;

    fn two_handles() -> (Variables, Handles) {
        let mut vars = Variables::default();
        let mut handles = Handles::default();
        for (i, (x, y)) in [(1.0, 1.0), (5.0, 4.0)].into_iter().enumerate() {
            let i = i as u32;
            vars.insert(VarId(2 * i), x, None);
            vars.insert(VarId(2 * i + 1), y, None);
            handles.insert(HandleId(i), VarId(2 * i), VarId(2 * i + 1));
        }
        vars.insert(VarId(10), 0.0, None);
        vars.insert(VarId(11), 0.0, None);
        (vars, handles)
    }

    #[test]
    fn absorb_key_is_symmetric() {
        let ab = Constraint::Absorb {
            parent: HandleId(0),
            child: HandleId(1),
        };
        let ba = Constraint::Absorb {
            parent: HandleId(1),
            child: HandleId(0),
        };
        assert_eq!(ab.key(), ba.key());
        let polar = |a, b| Constraint::PolarVector {
            a: HandleId(a),
            b: HandleId(b),
            distance: VarId(10),
            angle: VarId(11),
        };
        assert_ne!(polar(0, 1).key(), polar(1, 0).key());
    }

    #[test]
    fn polar_vector_propagates_backwards() {
        let (mut vars, handles) = two_handles();
        let polar = Constraint::PolarVector {
            a: HandleId(0),
            b: HandleId(1),
            distance: VarId(10),
            angle: VarId(11),
        };
        let mut knowns = Knowns::default();
        // Nothing known yet.
        assert!(!polar.propagate_knowns(&handles, &mut vars, &mut knowns).unwrap());
        knowns.mark(&mut vars, VarId(10), 2.0).unwrap();
        knowns.mark(&mut vars, VarId(11), 0.0).unwrap();
        knowns.mark(&mut vars, VarId(2), 5.0).unwrap();
        knowns.mark(&mut vars, VarId(3), 4.0).unwrap();
        assert!(polar.propagate_knowns(&handles, &mut vars, &mut knowns).unwrap());
        assert_nearly_eq(vars.value(VarId(0)).unwrap(), 3.0);
        assert_nearly_eq(vars.value(VarId(1)).unwrap(), 4.0);
    }

    #[test]
    fn absorb_unifies_coordinates() {
        let (mut vars, mut handles) = two_handles();
        let absorb = Constraint::Absorb {
            parent: HandleId(0),
            child: HandleId(1),
        };
        absorb
            .set_up_variable_relationships(&mut vars, &mut handles)
            .unwrap();
        assert!(handles.equals(&vars, HandleId(0), HandleId(1)).unwrap());
        // The parent's position wins.
        assert_nearly_eq(vars.value(VarId(2)).unwrap(), 1.0);
        assert_eq!(
            handles.get(HandleId(1)).unwrap().absorbed_into(),
            Some(HandleId(0))
        );
    }

    #[test]
    fn flat_linear_relationship_pins() {
        let (mut vars, mut handles) = two_handles();
        let rel = Constraint::LinearRelationship {
            y: VarId(10),
            m: 0.0,
            x: VarId(11),
            b: 7.0,
        };
        rel.set_up_variable_relationships(&mut vars, &mut handles)
            .unwrap();
        assert!(!vars.equals(VarId(10), VarId(11)));
        let mut knowns = Knowns::default();
        assert!(rel.propagate_knowns(&handles, &mut vars, &mut knowns).unwrap());
        assert_nearly_eq(vars.value(VarId(10)).unwrap(), 7.0);
    }

    #[test]
    fn variables_include_handle_coordinates() {
        let (_, handles) = two_handles();
        let polar = Constraint::PolarVector {
            a: HandleId(0),
            b: HandleId(1),
            distance: VarId(10),
            angle: VarId(11),
        };
        let vars = polar.variables(&handles).unwrap();
        assert_eq!(
            vars,
            vec![VarId(0), VarId(1), VarId(2), VarId(3), VarId(10), VarId(11)]
        );
        assert!(polar.mentions(VarId(3), &handles));
        assert!(polar.mentions(VarId(11), &handles));
        assert!(!polar.mentions(VarId(12), &handles));
        assert_eq!(polar.low_level(&handles).unwrap().len(), 2);
    }
}
