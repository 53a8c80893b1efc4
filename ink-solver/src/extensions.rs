//! Behaviour that exists for the sake of how the sketch looks while it is
//! being dragged, rather than for correctness. Everything here is opt-in
//! through [`SolveOptions`](crate::SolveOptions).

use indexmap::IndexMap;

use crate::{
    cluster::Cluster,
    constraints::Constraint,
    error::SolverError,
    handle::Handles,
    id::{ConstraintId, HandleId},
    knowns::Knowns,
    variable::Variables,
};

/// Knowns for the gizmo stabilisation: every polar vector in the cluster
/// with neither endpoint under a finger keeps its current length and angle.
/// Without this a drag elsewhere spreads error into every vector it reaches,
/// which reads as jitter.
pub(crate) fn gizmo_knowns(
    cluster: &Cluster,
    constraints: &IndexMap<ConstraintId, Constraint>,
    handles: &Handles,
    vars: &Variables,
) -> Result<Knowns, SolverError> {
    let mut fingered: Vec<HandleId> = Vec::new();
    let mut polar = Vec::new();
    for id in cluster.constraints() {
        match constraints
            .get(id)
            .ok_or(SolverError::ConstraintNotFound(*id))?
        {
            Constraint::Finger { handle, .. } => fingered.push(*handle),
            Constraint::PolarVector {
                a,
                b,
                distance,
                angle,
            } => polar.push((*a, *b, *distance, *angle)),
            _ => {}
        }
    }

    let mut knowns = Knowns::default();
    for (a, b, distance, angle) in polar {
        let mut touched = false;
        for f in &fingered {
            touched |= handles.equals(vars, a, *f)? || handles.equals(vars, b, *f)?;
        }
        if !touched {
            knowns.hold(vars, distance);
            knowns.hold(vars, angle);
        }
    }
    Ok(knowns)
}
