use indexmap::IndexMap;

use crate::{
    Config, SolveOptions,
    cluster::{self, Cluster},
    constraints::{Constraint, ConstraintKey, PointVars, low_level::compute_angle},
    error::SolverError,
    handle::{Component, Handle, Handles, Point},
    id::{ConstraintId, HandleId, IdGenerator, VarId},
    minimizer::{Bfgs, Minimizer},
    solver::{self, Frame, SolveReport},
    variable::{Offset, Quantity, Represents, Variable, Variables},
    vector::V,
};

/// The scene root. Owns every handle, variable and constraint, and solves
/// them once per frame.
///
/// Clustering is cached between solves and rebuilt lazily after any change
/// to the set of constraints, variables or handles.
#[derive(Debug, Default, Clone)]
pub struct Sketch {
    pub(crate) ids: IdGenerator,
    pub(crate) variables: Variables,
    pub(crate) handles: Handles,
    pub(crate) constraints: IndexMap<ConstraintId, Constraint>,
    memo: IndexMap<ConstraintKey, ConstraintId>,
    clusters: Option<Vec<Cluster>>,
    config: Config,
    options: SolveOptions,
    finger_of_god: bool,
}

impl Sketch {
    /// An empty sketch with the default minimizer configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty sketch whose default minimizer uses this configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Tuning for the default minimizer.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Retune the default minimizer.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Optional solver behaviours.
    pub fn options(&self) -> SolveOptions {
        self.options
    }

    /// Turn optional solver behaviours on or off.
    pub fn set_options(&mut self, options: SolveOptions) {
        self.options = options;
    }

    /// In finger-of-god mode, a dragged handle goes exactly where the finger
    /// is instead of merely being pulled towards it.
    pub fn set_finger_of_god(&mut self, enabled: bool) {
        self.finger_of_god = enabled;
    }

    /// Is finger-of-god mode on?
    pub fn finger_of_god(&self) -> bool {
        self.finger_of_god
    }

    fn invalidate(&mut self) {
        self.clusters = None;
    }

    // Variables

    /// Create a fresh, canonical variable.
    pub fn create_variable(&mut self, value: f64) -> VarId {
        self.create_variable_representing(value, None)
    }

    /// Create a fresh variable with a label, handy for debugging.
    pub fn create_labelled_variable(&mut self, value: f64, label: impl Into<String>) -> VarId {
        self.create_variable_representing(value, Some(Represents::Label(label.into())))
    }

    fn create_variable_representing(&mut self, value: f64, represents: Option<Represents>) -> VarId {
        let id = VarId(self.ids.next_id());
        self.variables.insert(id, value, represents);
        self.invalidate();
        id
    }

    /// Look up a variable.
    pub fn variable(&self, id: VarId) -> Result<&Variable, SolverError> {
        self.variables.get(id)
    }

    /// Every variable, in creation order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// A variable's current value.
    pub fn value(&self, id: VarId) -> Result<f64, SolverError> {
        self.variables.value(id)
    }

    /// Set a variable's value. Every variable unified with it follows.
    pub fn set_value(&mut self, id: VarId, value: f64) -> Result<(), SolverError> {
        self.variables.set_value(id, value)
    }

    /// The canonical instance of a variable's unification group.
    pub fn canonical(&self, id: VarId) -> Result<VarId, SolverError> {
        self.variables.get(id)?;
        Ok(self.variables.canonical(id))
    }

    /// Do two variables denote the same quantity, under the same offset?
    pub fn equals(&self, a: VarId, b: VarId) -> Result<bool, SolverError> {
        self.variables.get(a)?;
        self.variables.get(b)?;
        Ok(self.variables.equals(a, b))
    }

    /// Remove a variable and every constraint that mentions it.
    /// Removing a handle coordinate removes the whole handle.
    pub fn remove_variable(&mut self, id: VarId) -> Result<(), SolverError> {
        self.variables.get(id)?;
        if let Some(handle) = self.handles.owner_of(id) {
            return self.remove_handle(handle);
        }
        let dependents = self.dependents(&[id]);
        self.variables.remove(id);
        self.invalidate();
        self.remove_all(dependents)
    }

    fn dependents(&self, vars: &[VarId]) -> Vec<ConstraintId> {
        self.constraints
            .iter()
            .filter(|(_, c)| vars.iter().any(|v| c.mentions(*v, &self.handles)))
            .map(|(id, _)| *id)
            .collect()
    }

    fn remove_all(&mut self, constraints: Vec<ConstraintId>) -> Result<(), SolverError> {
        for id in constraints {
            // Earlier removals may already have cascaded to this one.
            if self.constraints.contains_key(&id) {
                self.remove_constraint(id)?;
            }
        }
        Ok(())
    }

    // Handles

    /// Add a handle at a position.
    pub fn add_handle(&mut self, position: Point) -> HandleId {
        let id = HandleId(self.ids.next_id());
        let x = self.create_variable_representing(
            position.x,
            Some(Represents::Handle(id, Component::X)),
        );
        let y = self.create_variable_representing(
            position.y,
            Some(Represents::Handle(id, Component::Y)),
        );
        self.handles.insert(id, x, y);
        id
    }

    /// Look up a handle.
    pub fn handle(&self, id: HandleId) -> Result<&Handle, SolverError> {
        self.handles.get(id)
    }

    /// Every handle, in creation order.
    pub fn handles(&self) -> impl Iterator<Item = &Handle> {
        self.handles.iter()
    }

    /// Where a handle currently is.
    pub fn position(&self, id: HandleId) -> Result<Point, SolverError> {
        let (x, y) = self.handles.coords(id)?;
        Ok(Point::new(self.variables.value(x)?, self.variables.value(y)?))
    }

    /// Move a handle, without adding any constraint.
    pub fn move_handle(&mut self, id: HandleId, to: Point) -> Result<(), SolverError> {
        let (x, y) = self.handles.coords(id)?;
        self.variables.set_value(x, to.x)?;
        self.variables.set_value(y, to.y)
    }

    /// Remove a handle, its coordinates, and every constraint that mentions them.
    pub fn remove_handle(&mut self, id: HandleId) -> Result<(), SolverError> {
        let (x, y) = self.handles.coords(id)?;
        let dependents = self.dependents(&[x, y]);
        self.handles.remove(id);
        self.variables.remove(x);
        self.variables.remove(y);
        self.invalidate();
        self.remove_all(dependents)
    }

    /// Do two handles denote the same point?
    pub fn handles_equal(&self, a: HandleId, b: HandleId) -> Result<bool, SolverError> {
        self.handles.equals(&self.variables, a, b)
    }

    // Constraints

    /// Look up a constraint.
    pub fn constraint(&self, id: ConstraintId) -> Result<&Constraint, SolverError> {
        self.constraints
            .get(&id)
            .ok_or(SolverError::ConstraintNotFound(id))
    }

    /// Every constraint, in creation order.
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints.iter().map(|(id, c)| (*id, c))
    }

    fn check_references(&self, constraint: &Constraint) -> Result<(), SolverError> {
        for v in constraint.variables(&self.handles)? {
            self.variables.get(v)?;
        }
        Ok(())
    }

    /// Add a constraint, or update the existing one with the same memo key.
    pub(crate) fn insert_constraint(
        &mut self,
        id: Option<ConstraintId>,
        constraint: Constraint,
    ) -> Result<ConstraintId, SolverError> {
        self.check_references(&constraint)?;
        if let Some(key) = constraint.key()
            && let Some(existing) = self.memo.get(&key).copied()
        {
            let previous = self.constraints.insert(existing, constraint);
            self.update_in_place(existing, previous)?;
            return Ok(existing);
        }
        let id = id.unwrap_or_else(|| ConstraintId(self.ids.next_id()));
        if let Some(key) = constraint.key() {
            self.memo.insert(key, id);
        }
        self.constraints.insert(id, constraint);
        self.relate(id)?;
        self.invalidate();
        Ok(id)
    }

    /// A memoised constraint was re-issued. Updates that only move a finger,
    /// pin or constant keep the clustering; anything else rebuilds it.
    fn update_in_place(
        &mut self,
        id: ConstraintId,
        previous: Option<Constraint>,
    ) -> Result<(), SolverError> {
        let current = self
            .constraints
            .get(&id)
            .cloned()
            .ok_or(SolverError::ConstraintNotFound(id))?;
        match (previous, &current) {
            (Some(previous), current) if previous == *current => {}
            (Some(Constraint::Constant { .. }), Constraint::Constant { .. })
            | (Some(Constraint::Pin { .. }), Constraint::Pin { .. }) => {}
            (Some(Constraint::Finger { .. }), Constraint::Finger { handle, position }) => {
                if let Some(clusters) = &mut self.clusters {
                    let (x, y) = self.handles.coords(*handle)?;
                    cluster::move_finger(clusters, PointVars { x, y }, *position);
                }
            }
            _ => {
                self.relate(id)?;
                self.invalidate();
            }
        }
        Ok(())
    }

    /// Apply a new constraint's unifications straight away, so values follow
    /// before the next clustering pass.
    fn relate(&mut self, id: ConstraintId) -> Result<(), SolverError> {
        let constraint = self
            .constraints
            .get(&id)
            .ok_or(SolverError::ConstraintNotFound(id))?;
        constraint.set_up_variable_relationships(&mut self.variables, &mut self.handles)
    }

    /// Remove a constraint, the variables it owns, and (transitively) every
    /// constraint that mentioned those.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), SolverError> {
        let constraint = self
            .constraints
            .shift_remove(&id)
            .ok_or(SolverError::ConstraintNotFound(id))?;
        self.memo.retain(|_, v| *v != id);
        self.invalidate();
        for owned in constraint.owned_variables() {
            if self.variables.contains(owned) {
                self.remove_variable(owned)?;
            }
        }
        Ok(())
    }

    /// Lock a variable to a value.
    pub fn constant(&mut self, variable: VarId, value: f64) -> Result<ConstraintId, SolverError> {
        self.insert_constraint(None, Constraint::Constant { variable, value })
    }

    /// Lock a handle to a position.
    pub fn pin(&mut self, handle: HandleId, position: Point) -> Result<ConstraintId, SolverError> {
        self.insert_constraint(None, Constraint::Pin { handle, position })
    }

    /// Start or continue dragging a handle.
    pub fn finger(&mut self, handle: HandleId, position: Point) -> Result<ConstraintId, SolverError> {
        self.insert_constraint(None, Constraint::Finger { handle, position })
    }

    /// `y = m * x + b`.
    pub fn linear_relationship(
        &mut self,
        y: VarId,
        m: f64,
        x: VarId,
        b: f64,
    ) -> Result<ConstraintId, SolverError> {
        self.insert_constraint(None, Constraint::LinearRelationship { y, m, x, b })
    }

    /// Merge `child` into `parent`, so they are the same point from now on.
    pub fn absorb(&mut self, parent: HandleId, child: HandleId) -> Result<ConstraintId, SolverError> {
        self.insert_constraint(None, Constraint::Absorb { parent, child })
    }

    fn measure(&self, a: HandleId, b: HandleId) -> Result<(V, V), SolverError> {
        let pa = self.position(a)?;
        let pb = self.position(b)?;
        Ok((V::new(pa.x, pa.y), V::new(pb.x, pb.y)))
    }

    fn owned_variable(&mut self, value: f64, quantity: Quantity) -> (ConstraintId, VarId) {
        let constraint = ConstraintId(self.ids.next_id());
        let var = self.create_variable_representing(
            value,
            Some(Represents::Constraint(constraint, quantity)),
        );
        (constraint, var)
    }

    /// Own the distance and angle from `a` to `b`, starting at their current values.
    /// Asking again for the same pair returns the existing constraint.
    pub fn polar_vector(&mut self, a: HandleId, b: HandleId) -> Result<ConstraintId, SolverError> {
        self.handles.get(a)?;
        self.handles.get(b)?;
        if let Some(existing) = self.memo.get(&ConstraintKey::PolarVector { a, b }) {
            return Ok(*existing);
        }
        let (pa, pb) = self.measure(a, b)?;
        let (id, distance) = self.owned_variable(pa.euclidean_distance(pb), Quantity::Distance);
        let angle = self.create_variable_representing(
            compute_angle(pa, pb, 0.0),
            Some(Represents::Constraint(id, Quantity::Angle)),
        );
        self.insert_constraint(
            Some(id),
            Constraint::PolarVector {
                a,
                b,
                distance,
                angle,
            },
        )
    }

    /// Own the distance between two handles, starting at its current value.
    pub fn distance(&mut self, a: HandleId, b: HandleId) -> Result<ConstraintId, SolverError> {
        let (pa, pb) = self.measure(a, b)?;
        let (id, distance) = self.owned_variable(pa.euclidean_distance(pb), Quantity::Distance);
        self.insert_constraint(Some(id), Constraint::Distance { a, b, distance })
    }

    /// Own the angle from `a` to `b`, starting at its current value.
    pub fn angle(&mut self, a: HandleId, b: HandleId) -> Result<ConstraintId, SolverError> {
        let (pa, pb) = self.measure(a, b)?;
        let (id, angle) = self.owned_variable(compute_angle(pa, pb, 0.0), Quantity::Angle);
        self.insert_constraint(Some(id), Constraint::Angle { a, b, angle })
    }

    /// Own `result = m * x + b`, starting at its current value.
    pub fn linear_formula(&mut self, m: VarId, x: VarId, b: VarId) -> Result<ConstraintId, SolverError> {
        let value = self.value(m)? * self.value(x)? + self.value(b)?;
        let (id, result) = self.owned_variable(value, Quantity::Result);
        self.insert_constraint(Some(id), Constraint::LinearFormula { m, x, b, result })
    }

    // Unification and locking

    /// Make `this = offset.m * that + offset.b` hold from now on.
    ///
    /// Values follow immediately. If either side was locked, the whole merged
    /// group ends up locked, at the locked side's value.
    pub fn make_equal_to(
        &mut self,
        this: VarId,
        that: VarId,
        offset: Offset,
    ) -> Result<ConstraintId, SolverError> {
        let this_locked = self.is_locked(this)?;
        let that_locked = self.is_locked(that)?;
        let that_value = self.value(that)?;
        let id = self.linear_relationship(this, offset.m, that, offset.b)?;
        if that_locked && !this_locked {
            self.variables.set_value(that, that_value)?;
        }
        if this_locked || that_locked {
            self.lock(this, None, false)?;
        }
        Ok(id)
    }

    /// Split `this` and `that` apart, and remove the relationships that
    /// directly joined them. Whichever of the two was absorbed leaves the
    /// group; if both were, `that` does.
    pub fn break_off(&mut self, this: VarId, that: VarId) -> Result<(), SolverError> {
        self.variables.get(this)?;
        self.variables.get(that)?;
        let canonical = self.variables.canonical(this);
        if canonical == self.variables.canonical(that) {
            let leaving = if canonical == that { this } else { that };
            self.variables.detach(leaving)?;
        }
        let this_handle = self.handles.owner_of(this);
        let that_handle = self.handles.owner_of(that);
        let joining: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| match c {
                Constraint::LinearRelationship { y, x, .. } => {
                    (*y == this && *x == that) || (*y == that && *x == this)
                }
                Constraint::Absorb { parent, child } => {
                    let pair = (Some(*parent), Some(*child));
                    pair == (this_handle, that_handle) || pair == (that_handle, this_handle)
                }
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        for id in joining {
            self.remove_constraint(id)?;
        }
        self.invalidate();
        Ok(())
    }

    /// Is this variable locked by its own constant?
    pub fn is_locked(&self, var: VarId) -> Result<bool, SolverError> {
        self.variables.get(var)?;
        Ok(self.memo.contains_key(&ConstraintKey::Constant(var)))
    }

    /// Lock a variable, optionally setting it first.
    ///
    /// The canonical instance gets a constant, and so does every variable
    /// absorbed into it unless `scrub` is set.
    pub fn lock(&mut self, var: VarId, value: Option<f64>, scrub: bool) -> Result<(), SolverError> {
        if let Some(value) = value {
            self.variables.set_value(var, value)?;
        }
        let canonical = self.canonical(var)?;
        let mut targets = vec![canonical];
        if !scrub {
            targets.extend(self.variables.absorbed_members(canonical));
        }
        for target in targets {
            let value = self.variables.value(target)?;
            self.constant(target, value)?;
        }
        Ok(())
    }

    /// Remove every constant on the variable's unification group.
    pub fn unlock(&mut self, var: VarId) -> Result<(), SolverError> {
        let canonical = self.canonical(var)?;
        let mut group = vec![var, canonical];
        group.extend(self.variables.absorbed_members(canonical));
        for member in group {
            if let Some(id) = self.memo.get(&ConstraintKey::Constant(member)).copied() {
                self.remove_constraint(id)?;
            }
        }
        Ok(())
    }

    /// Lock if unlocked, unlock if locked. Returns whether it's now locked.
    pub fn toggle_lock(&mut self, var: VarId) -> Result<bool, SolverError> {
        if self.is_locked(var)? {
            self.unlock(var)?;
            Ok(false)
        } else {
            self.lock(var, None, false)?;
            Ok(true)
        }
    }

    // Solving

    /// The current clustering, rebuilding it first if anything changed.
    pub fn clusters(&mut self) -> Result<&[Cluster], SolverError> {
        if self.clusters.is_none() {
            let built = cluster::build(&self.constraints, &mut self.variables, &mut self.handles)?;
            self.clusters = Some(built);
        }
        Ok(self.clusters.as_deref().unwrap_or_default())
    }

    /// Solve with the default minimizer.
    pub fn solve(&mut self) -> Result<SolveReport, SolverError> {
        let mut minimizer = Bfgs::new(self.config);
        self.solve_with(&mut minimizer)
    }

    /// Solve every cluster with the given minimizer.
    pub fn solve_with(&mut self, minimizer: &mut dyn Minimizer) -> Result<SolveReport, SolverError> {
        self.clusters()?;
        let Self {
            variables,
            handles,
            constraints,
            clusters,
            options,
            finger_of_god,
            ..
        } = self;
        let clusters = clusters.as_deref().unwrap_or_default();
        solver::solve_clusters(
            clusters,
            Frame {
                variables,
                constraints,
                handles,
                finger_of_god: *finger_of_god,
                options: *options,
            },
            minimizer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dragged_arm() -> (Sketch, HandleId, HandleId, ConstraintId) {
        let mut sketch = Sketch::new();
        let a = sketch.add_handle(Point::new(0.0, 0.0));
        let b = sketch.add_handle(Point::new(5.0, 0.0));
        sketch.pin(a, Point::new(0.0, 0.0)).unwrap();
        let polar = sketch.polar_vector(a, b).unwrap();
        sketch.finger(b, Point::new(5.0, 0.0)).unwrap();
        sketch.solve().unwrap();
        (sketch, a, b, polar)
    }

    #[test]
    fn moving_a_finger_keeps_the_clustering() {
        let (mut sketch, _, b, _) = dragged_arm();
        assert!(sketch.clusters.is_some());
        for to in [Point::new(0.0, 5.0), Point::new(-3.0, 1.0)] {
            sketch.finger(b, to).unwrap();
            assert!(sketch.clusters.is_some());
            sketch.solve().unwrap();
            let p = sketch.position(b).unwrap();
            assert!(libm::hypot(p.x - to.x, p.y - to.y) < 1e-3, "{p} should be at {to}");
        }
    }

    #[test]
    fn scrubbing_a_lock_keeps_the_clustering() {
        let (mut sketch, a, _, polar) = dragged_arm();
        let Constraint::PolarVector { distance, .. } = *sketch.constraint(polar).unwrap() else {
            panic!("expected a polar vector");
        };
        // The first lock adds a constant, which changes the clustering.
        sketch.lock(distance, Some(3.0), true).unwrap();
        assert!(sketch.clusters.is_none());
        sketch.solve().unwrap();
        sketch.lock(distance, Some(4.0), true).unwrap();
        assert!(sketch.clusters.is_some());
        sketch.pin(a, Point::new(1.0, 0.0)).unwrap();
        assert!(sketch.clusters.is_some());
        sketch.solve().unwrap();
        assert!((sketch.value(distance).unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rescaling_a_relationship_rebuilds() {
        let mut sketch = Sketch::new();
        let x = sketch.create_variable(1.0);
        let y = sketch.create_variable(2.0);
        sketch.linear_relationship(y, 2.0, x, 0.0).unwrap();
        sketch.clusters().unwrap();
        // Re-issuing it unchanged is a no-op.
        sketch.linear_relationship(y, 2.0, x, 0.0).unwrap();
        assert!(sketch.clusters.is_some());

        sketch.linear_relationship(y, 3.0, x, 0.0).unwrap();
        assert!(sketch.clusters.is_none());
        sketch.clusters().unwrap();
        sketch.set_value(x, 2.0).unwrap();
        assert!((sketch.value(y).unwrap() - 6.0).abs() < 1e-9);
    }
}
