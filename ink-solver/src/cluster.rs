//! Partitioning constraints into independent groups.

use indexmap::{IndexMap, IndexSet};

use crate::{
    constraints::{Constraint, LowLevel, PointVars},
    error::SolverError,
    handle::{Handles, Point},
    id::{ConstraintId, VarId},
    knowns::Knowns,
    variable::Variables,
};

/// A group of constraints whose variables don't overlap with any other group's.
/// Each cluster is solved as its own problem.
#[derive(Clone, Debug, Default)]
pub struct Cluster {
    constraints: Vec<ConstraintId>,
    low_level: Vec<LowLevel>,
    /// Every variable referenced, as written in the constraints.
    referenced: Vec<VarId>,
    /// Canonical instances of `referenced`.
    variables: IndexSet<VarId>,
}

impl Cluster {
    /// High-level constraints in this cluster.
    pub fn constraints(&self) -> &[ConstraintId] {
        &self.constraints
    }

    /// Canonical variables this cluster touches.
    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.variables.iter().copied()
    }

    /// How many residual terms this cluster contributes.
    pub fn num_low_level(&self) -> usize {
        self.low_level.len()
    }

    pub(crate) fn low_level(&self) -> &[LowLevel] {
        &self.low_level
    }

    fn recompute_variables(&mut self, vars: &Variables) {
        self.variables = self.referenced.iter().map(|v| vars.canonical(*v)).collect();
    }

    fn overlaps(&self, other: &Self) -> bool {
        !self.variables.is_disjoint(&other.variables)
    }

    /// Take over another cluster. Its low-level constraints go through the
    /// clash policy, which may unify variables, so the manipulation set is
    /// recomputed afterwards.
    fn merge(&mut self, other: Self, vars: &mut Variables) -> Result<(), SolverError> {
        self.constraints.extend(other.constraints);
        self.referenced.extend(other.referenced);
        for ll in other.low_level {
            ll.add_to(&mut self.low_level, vars)?;
        }
        self.recompute_variables(vars);
        Ok(())
    }
}

/// Rebuild unification and clustering from scratch for the current constraint set.
pub(crate) fn build(
    constraints: &IndexMap<ConstraintId, Constraint>,
    vars: &mut Variables,
    handles: &mut Handles,
) -> Result<Vec<Cluster>, SolverError> {
    vars.reset_unification();
    handles.forget_absorbed_handles();
    for constraint in constraints.values() {
        constraint.set_up_variable_relationships(vars, handles)?;
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    for (id, constraint) in constraints {
        let mut fresh = Cluster {
            constraints: vec![*id],
            referenced: constraint.variables(handles)?,
            ..Default::default()
        };
        for ll in constraint.low_level(handles)? {
            ll.add_to(&mut fresh.low_level, vars)?;
        }
        fresh.recompute_variables(vars);

        let overlapping: Vec<usize> = clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.overlaps(&fresh))
            .map(|(i, _)| i)
            .collect();
        let Some((&first, rest)) = overlapping.split_first() else {
            clusters.push(fresh);
            continue;
        };
        // Back to front, so earlier indices stay valid.
        for &i in rest.iter().rev() {
            let other = clusters.remove(i);
            clusters[first].merge(other, vars)?;
        }
        clusters[first].merge(fresh, vars)?;
    }
    consolidate(&mut clusters, vars)?;
    tracing::debug!(
        clusters = clusters.len(),
        constraints = constraints.len(),
        "rebuilt clustering"
    );
    Ok(clusters)
}

/// Point a cached finger residual somewhere new. Moving a finger doesn't
/// change which variables relate to which, so the clustering stays valid.
pub(crate) fn move_finger(clusters: &mut [Cluster], point: PointVars, to: Point) {
    for ll in clusters.iter_mut().flat_map(|c| c.low_level.iter_mut()) {
        if let LowLevel::Finger { point: p, position } = ll
            && *p == point
        {
            *position = to;
        }
    }
}

/// Clash resolution can unify variables after their clusters were compared,
/// so keep merging until every pair of clusters is disjoint.
fn consolidate(clusters: &mut Vec<Cluster>, vars: &mut Variables) -> Result<(), SolverError> {
    loop {
        for c in &mut *clusters {
            c.recompute_variables(vars);
        }
        let overlap = (0..clusters.len()).find_map(|i| {
            ((i + 1)..clusters.len())
                .find(|&j| clusters[i].overlaps(&clusters[j]))
                .map(|j| (i, j))
        });
        let Some((i, j)) = overlap else {
            return Ok(());
        };
        let other = clusters.remove(j);
        clusters[i].merge(other, vars)?;
    }
}

/// Owned variables that only one low-level constraint refers to.
/// Their owner can compute them exactly, so the minimizer never sees them.
pub(crate) fn free_variables(cluster: &Cluster, vars: &Variables, knowns: &Knowns) -> IndexSet<VarId> {
    let mut references: IndexMap<VarId, usize> = IndexMap::new();
    for ll in &cluster.low_level {
        let distinct: IndexSet<VarId> = ll
            .variables()
            .into_iter()
            .map(|v| vars.canonical(v))
            .collect();
        for v in distinct {
            *references.entry(v).or_default() += 1;
        }
    }
    cluster
        .low_level
        .iter()
        .filter_map(LowLevel::owned)
        .map(|v| vars.canonical(v))
        .filter(|v| !knowns.contains(vars, *v))
        .filter(|v| references.get(v) == Some(&1))
        .collect()
}

/// The unknowns handed to the minimizer: canonical, not known, not free.
pub(crate) fn parameters(
    cluster: &Cluster,
    vars: &Variables,
    knowns: &Knowns,
    free: &IndexSet<VarId>,
) -> Vec<VarId> {
    cluster
        .variables()
        .filter(|v| !knowns.contains(vars, *v) && !free.contains(v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sketch;

    #[test]
    fn unrelated_constraints_get_their_own_clusters() {
        let mut sketch = Sketch::new();
        let a = sketch.add_handle(Point::new(0.0, 0.0));
        let b = sketch.add_handle(Point::new(1.0, 0.0));
        let c = sketch.add_handle(Point::new(5.0, 5.0));
        let d = sketch.add_handle(Point::new(6.0, 5.0));
        sketch.polar_vector(a, b).unwrap();
        sketch.polar_vector(c, d).unwrap();
        assert_eq!(sketch.clusters().unwrap().len(), 2);

        // Bridging them merges everything into one.
        sketch.distance(b, c).unwrap();
        let clusters = sketch.clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].constraints().len(), 3);
        assert_eq!(clusters[0].num_low_level(), 5);
    }

    #[test]
    fn absorbed_handles_share_a_cluster() {
        let mut sketch = Sketch::new();
        let a = sketch.add_handle(Point::new(0.0, 0.0));
        let b = sketch.add_handle(Point::new(1.0, 0.0));
        let c = sketch.add_handle(Point::new(5.0, 5.0));
        let d = sketch.add_handle(Point::new(6.0, 5.0));
        sketch.polar_vector(a, b).unwrap();
        sketch.polar_vector(c, d).unwrap();
        // Created last, but it aliases b and c, so the polar vectors overlap.
        sketch.absorb(b, c).unwrap();
        assert_eq!(sketch.clusters().unwrap().len(), 1);
    }

    #[test]
    fn free_variables_are_referenced_once() {
        use crate::id::HandleId;

        let mut vars = Variables::default();
        let mut handles = Handles::default();
        for (i, (x, y)) in [(0.0, 0.0), (3.0, 4.0), (6.0, 0.0)].into_iter().enumerate() {
            let i = i as u32;
            vars.insert(VarId(2 * i), x, None);
            vars.insert(VarId(2 * i + 1), y, None);
            handles.insert(HandleId(i), VarId(2 * i), VarId(2 * i + 1));
        }
        vars.insert(VarId(6), 5.0, None);
        vars.insert(VarId(7), 5.0, None);
        let mut constraints = IndexMap::new();
        constraints.insert(
            ConstraintId(0),
            Constraint::Distance {
                a: HandleId(0),
                b: HandleId(1),
                distance: VarId(6),
            },
        );
        constraints.insert(
            ConstraintId(1),
            Constraint::Distance {
                a: HandleId(1),
                b: HandleId(2),
                distance: VarId(7),
            },
        );
        let clusters = build(&constraints, &mut vars, &mut handles).unwrap();
        assert_eq!(clusters.len(), 1);
        let free = free_variables(&clusters[0], &vars, &Knowns::default());
        assert_eq!(free.len(), 2);

        // Tie the two distances together: now neither is owned by a single residual.
        constraints.insert(
            ConstraintId(2),
            Constraint::LinearRelationship {
                y: VarId(6),
                m: 1.0,
                x: VarId(7),
                b: 0.0,
            },
        );
        let clusters = build(&constraints, &mut vars, &mut handles).unwrap();
        let free = free_variables(&clusters[0], &vars, &Knowns::default());
        assert!(free.is_empty());
        let params = parameters(&clusters[0], &vars, &Knowns::default(), &free);
        // 6 coordinates plus the single canonical distance.
        assert_eq!(params.len(), 7);
    }
}
