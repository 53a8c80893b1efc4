use indexmap::{IndexMap, IndexSet};

use crate::{
    SolveOptions,
    cluster::{self, Cluster},
    constraints::Constraint,
    error::SolverError,
    extensions,
    handle::Handles,
    id::{ConstraintId, VarId},
    knowns::{self, Knowns},
    minimizer::{Minimizer, StopReason},
    variable::Variables,
};

/// What happened during one call to [`Sketch::solve`](crate::Sketch::solve).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// Clusters in the sketch.
    pub clusters: usize,
    /// Clusters whose values were updated.
    pub solved: usize,
    /// Clusters with nothing left for the minimizer after knowns propagation.
    /// Included in `solved`.
    pub fully_determined: usize,
    /// Clusters left unchanged because the minimizer hit its iteration limit.
    pub abandoned: usize,
    /// Clusters where the minimizer failed.
    pub failed: usize,
    /// Minimizer iterations, summed over every cluster.
    pub iterations: usize,
}

/// Everything a cluster solve reads or writes, borrowed out of the sketch.
pub(crate) struct Frame<'a> {
    pub variables: &'a mut Variables,
    pub constraints: &'a IndexMap<ConstraintId, Constraint>,
    pub handles: &'a Handles,
    pub finger_of_god: bool,
    pub options: SolveOptions,
}

/// The prepared problem for one cluster.
struct Prepared<'a> {
    cluster: &'a Cluster,
    knowns: Knowns,
    free: IndexSet<VarId>,
    parameters: Vec<VarId>,
}

impl Prepared<'_> {
    /// Sum of squared residuals at the current variable values.
    /// Also writes every free variable.
    fn total_error(&self, vars: &mut Variables, finger_of_god: bool) -> Result<f64, SolverError> {
        let mut total = 0.0;
        for ll in self.cluster.low_level() {
            let e = ll.error(vars, &self.knowns, &self.free, finger_of_god)?;
            total += e * e;
        }
        Ok(total)
    }

    /// Total error with the parameters set to `values`.
    fn evaluate(
        &self,
        vars: &mut Variables,
        values: &[f64],
        finger_of_god: bool,
    ) -> Result<f64, SolverError> {
        self.write(vars, values)?;
        self.total_error(vars, finger_of_god)
    }

    fn write(&self, vars: &mut Variables, values: &[f64]) -> Result<(), SolverError> {
        for (id, value) in self.parameters.iter().zip(values) {
            vars.set_value(*id, *value)?;
        }
        Ok(())
    }
}

/// Solve every cluster, in order. A failing cluster doesn't stop the others;
/// the first failure is returned once they have all been attempted.
pub(crate) fn solve_clusters(
    clusters: &[Cluster],
    frame: Frame<'_>,
    minimizer: &mut dyn Minimizer,
) -> Result<SolveReport, SolverError> {
    let Frame {
        variables: vars,
        constraints,
        handles,
        finger_of_god,
        options,
    } = frame;
    let mut report = SolveReport {
        clusters: clusters.len(),
        ..Default::default()
    };
    let mut first_failure = None;

    for (index, cluster) in clusters.iter().enumerate() {
        if cluster.constraints().is_empty() {
            continue;
        }
        let preset = if options.stabilize_gizmos {
            extensions::gizmo_knowns(cluster, constraints, handles, vars)?
        } else {
            Knowns::default()
        };
        let knowns = knowns::propagate(cluster, constraints, handles, vars, finger_of_god, preset)?;
        let free = cluster::free_variables(cluster, vars, &knowns);
        let parameters = cluster::parameters(cluster, vars, &knowns, &free);
        tracing::trace!(
            cluster = index,
            knowns = knowns.len(),
            free = free.len(),
            parameters = parameters.len(),
            residuals = ?cluster.low_level().iter().map(|ll| ll.kind()).collect::<Vec<_>>(),
            "solving cluster"
        );
        let prepared = Prepared {
            cluster,
            knowns,
            free,
            parameters,
        };

        if prepared.parameters.is_empty() {
            // Nothing to search for, but free variables still need updating.
            prepared.total_error(vars, finger_of_god)?;
            report.solved += 1;
            report.fully_determined += 1;
            continue;
        }

        let initial = read_values(vars, &prepared.parameters)?;
        let free_before = read_values(vars, prepared.free.iter())?;
        let mut evaluation_error = None;
        let mut f = |x: &[f64]| match prepared.evaluate(vars, x, finger_of_god) {
            Ok(total) => total,
            Err(e) => {
                evaluation_error.get_or_insert(e);
                f64::NAN
            }
        };
        let outcome = minimizer.minimize(&mut f, &initial);
        if let Some(e) = evaluation_error {
            return Err(e);
        }

        match outcome {
            Ok(min) if min.stop == StopReason::Converged => {
                prepared.write(vars, &min.solution)?;
                prepared.total_error(vars, finger_of_god)?;
                report.solved += 1;
                report.iterations += min.iterations;
            }
            Ok(min) => {
                // Keep last frame's values rather than a half-converged answer.
                restore(vars, &prepared, &initial, &free_before)?;
                report.abandoned += 1;
                report.iterations += min.iterations;
            }
            Err(source) => {
                restore(vars, &prepared, &initial, &free_before)?;
                tracing::error!(cluster = index, error = %source, "minimizer failed");
                report.failed += 1;
                first_failure.get_or_insert(SolverError::Minimizer {
                    cluster: index,
                    source,
                });
            }
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

fn read_values<'a>(
    vars: &Variables,
    ids: impl IntoIterator<Item = &'a VarId>,
) -> Result<Vec<f64>, SolverError> {
    ids.into_iter().map(|id| vars.value(*id)).collect()
}

fn restore(
    vars: &mut Variables,
    prepared: &Prepared<'_>,
    initial: &[f64],
    free_before: &[f64],
) -> Result<(), SolverError> {
    prepared.write(vars, initial)?;
    for (id, value) in prepared.free.iter().zip(free_before) {
        vars.set_value(*id, *value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MinimizerError, Minimum, Point, Sketch, tests::assert_nearly_eq};

    /// Records calls, then gives up or fails as instructed.
    struct Scripted {
        calls: usize,
        answer: Result<StopReason, MinimizerError>,
    }

    impl Minimizer for Scripted {
        fn minimize(
            &mut self,
            f: &mut dyn FnMut(&[f64]) -> f64,
            initial: &[f64],
        ) -> Result<Minimum, MinimizerError> {
            self.calls += 1;
            // Wander somewhere else first, like a real minimizer would.
            let elsewhere: Vec<f64> = initial.iter().map(|x| x + 100.0).collect();
            f(&elsewhere);
            let stop = self.answer.clone()?;
            Ok(Minimum {
                solution: elsewhere,
                stop,
                iterations: 7,
            })
        }
    }

    fn stretched() -> (Sketch, crate::HandleId, crate::HandleId, VarId) {
        let mut sketch = Sketch::new();
        let a = sketch.add_handle(Point::new(0.0, 0.0));
        let b = sketch.add_handle(Point::new(3.0, 4.0));
        let d = sketch.distance(a, b).unwrap();
        let Constraint::Distance { distance, .. } = *sketch.constraint(d).unwrap() else {
            panic!("expected a distance");
        };
        sketch.lock(distance, Some(10.0), false).unwrap();
        (sketch, a, b, distance)
    }

    #[test]
    fn iteration_limit_keeps_stale_values() {
        let (mut sketch, _a, b, _) = stretched();
        let mut minimizer = Scripted {
            calls: 0,
            answer: Ok(StopReason::IterationLimit),
        };
        let report = sketch.solve_with(&mut minimizer).unwrap();
        assert_eq!(minimizer.calls, 1);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.solved, 0);
        assert_eq!(sketch.position(b).unwrap(), Point::new(3.0, 4.0));
    }

    #[test]
    fn failure_is_reported_and_values_restored() {
        let (mut sketch, _a, b, _) = stretched();
        // A second, independent cluster still gets solved.
        let c = sketch.add_handle(Point::new(50.0, 50.0));
        let e = sketch.add_handle(Point::new(53.0, 54.0));
        let ce = sketch.distance(c, e).unwrap();
        let mut minimizer = Scripted {
            calls: 0,
            answer: Err(MinimizerError::NonFiniteGradient),
        };
        let err = sketch.solve_with(&mut minimizer).unwrap_err();
        assert!(matches!(
            err,
            SolverError::Minimizer {
                cluster: 0,
                source: MinimizerError::NonFiniteGradient
            }
        ));
        assert_eq!(sketch.position(b).unwrap(), Point::new(3.0, 4.0));
        // Both clusters were attempted; the first failure is the one returned.
        assert_eq!(minimizer.calls, 2);
        let Constraint::Distance { distance, .. } = *sketch.constraint(ce).unwrap() else {
            panic!("expected a distance");
        };
        assert_nearly_eq(sketch.value(distance).unwrap(), 5.0);
    }

    #[test]
    fn locked_distance_is_satisfied() {
        let (mut sketch, a, b, distance) = stretched();
        let report = sketch.solve().unwrap();
        assert_eq!(report.solved, 1);
        let (pa, pb) = (sketch.position(a).unwrap(), sketch.position(b).unwrap());
        let actual = libm::hypot(pb.x - pa.x, pb.y - pa.y);
        assert!((actual - 10.0).abs() < 1e-3, "distance is {actual}");
        assert_nearly_eq(sketch.value(distance).unwrap(), 10.0);
    }
}
