//! Forward propagation of values that are pinned down without numerical search.

use indexmap::IndexSet;

use crate::{
    cluster::Cluster,
    constraints::Constraint,
    error::SolverError,
    handle::Handles,
    id::{ConstraintId, VarId},
    variable::Variables,
};

/// Variables whose values are fixed for the current solve.
/// Stored by canonical instance, so an absorbed alias is known exactly when
/// its canonical instance is.
#[derive(Default, Clone, Debug)]
pub(crate) struct Knowns {
    set: IndexSet<VarId>,
}

impl Knowns {
    /// Is this variable (or its canonical instance) known?
    pub(crate) fn contains(&self, vars: &Variables, id: VarId) -> bool {
        self.set.contains(&vars.canonical(id))
    }

    /// Assign a value and mark it known. Values that are already known are
    /// authoritative, so this does nothing for them.
    /// Returns whether the variable became known.
    pub(crate) fn mark(
        &mut self,
        vars: &mut Variables,
        id: VarId,
        value: f64,
    ) -> Result<bool, SolverError> {
        let canonical = vars.canonical(id);
        if self.set.contains(&canonical) {
            return Ok(false);
        }
        vars.set_value(id, value)?;
        self.set.insert(canonical);
        Ok(true)
    }

    /// Mark a variable known at its current value.
    pub(crate) fn hold(&mut self, vars: &Variables, id: VarId) -> bool {
        self.set.insert(vars.canonical(id))
    }

    /// How many canonical variables are known.
    pub fn len(&self) -> usize {
        self.set.len()
    }
}

/// Grow `knowns` to a fixed point: first every high-level constraint gets a
/// chance to mark variables known, then every low-level constraint.
/// Stops after a full pass that learns nothing. Knowns only ever grow, so
/// this takes at most one pass per variable in the cluster, plus one.
pub(crate) fn propagate(
    cluster: &Cluster,
    constraints: &indexmap::IndexMap<ConstraintId, Constraint>,
    handles: &Handles,
    vars: &mut Variables,
    finger_of_god: bool,
    mut knowns: Knowns,
) -> Result<Knowns, SolverError> {
    loop {
        let mut changed = false;
        for id in cluster.constraints() {
            let constraint = constraints
                .get(id)
                .ok_or(SolverError::ConstraintNotFound(*id))?;
            changed |= constraint.propagate_knowns(handles, vars, &mut knowns)?;
        }
        for ll in cluster.low_level() {
            changed |= ll.propagate_knowns(vars, &mut knowns, finger_of_god)?;
        }
        if !changed {
            return Ok(knowns);
        }
    }
}
