use serde::{Deserialize, Serialize};

use crate::{
    constraints::Constraint,
    error::SolverError,
    handle::Component,
    id::{ConstraintId, HandleId, VarId},
    sketch::Sketch,
    variable::Represents,
};

/// A sketch's persistent state.
///
/// Unification is derived from the constraints and rebuilt on load, so it
/// isn't stored. Neither are fingers, which only live as long as a touch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedSketch {
    variables: Vec<SerializedVariable>,
    handles: Vec<SerializedHandle>,
    constraints: Vec<SerializedConstraint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SerializedVariable {
    id: VarId,
    value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SerializedHandle {
    id: HandleId,
    x: VarId,
    y: VarId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SerializedConstraint {
    id: ConstraintId,
    #[serde(flatten)]
    constraint: Constraint,
}

impl Sketch {
    /// Snapshot everything worth saving.
    pub fn serialize(&self) -> SerializedSketch {
        SerializedSketch {
            variables: self
                .variables()
                .map(|v| SerializedVariable {
                    id: v.id(),
                    value: v.value(),
                })
                .collect(),
            handles: self
                .handles()
                .map(|h| SerializedHandle {
                    id: h.id(),
                    x: h.x(),
                    y: h.y(),
                })
                .collect(),
            constraints: self
                .constraints()
                .filter(|(_, c)| !matches!(c, Constraint::Finger { .. }))
                .map(|(id, c)| SerializedConstraint {
                    id,
                    constraint: c.clone(),
                })
                .collect(),
        }
    }

    /// Restore a snapshot: variables first, then handles, then constraints in
    /// their stored order. Any reference to an ID that wasn't restored first
    /// is an error.
    pub fn deserialize(stored: SerializedSketch) -> Result<Self, SolverError> {
        let mut sketch = Self::new();
        for v in stored.variables {
            if sketch.variables.contains(v.id) {
                return Err(SolverError::DuplicateId(v.id.0));
            }
            sketch.variables.insert(v.id, v.value, None);
            sketch.ids.observe(v.id.0);
        }
        for h in stored.handles {
            if sketch.handles.contains(h.id) {
                return Err(SolverError::DuplicateId(h.id.0));
            }
            for (var, component) in [(h.x, Component::X), (h.y, Component::Y)] {
                let value = sketch.variables.value(var)?;
                sketch
                    .variables
                    .insert(var, value, Some(Represents::Handle(h.id, component)));
            }
            sketch.handles.insert(h.id, h.x, h.y);
            sketch.ids.observe(h.id.0);
        }
        for c in stored.constraints {
            if sketch.constraints.contains_key(&c.id) {
                return Err(SolverError::DuplicateId(c.id.0));
            }
            for (var, quantity) in c.constraint.owned_quantities() {
                let value = sketch.variables.value(var)?;
                sketch.variables.insert(
                    var,
                    value,
                    Some(Represents::Constraint(c.id, quantity)),
                );
            }
            sketch.insert_constraint(Some(c.id), c.constraint)?;
            sketch.ids.observe(c.id.0);
        }
        Ok(sketch)
    }

    /// Save as JSON.
    pub fn to_json(&self) -> Result<String, SolverError> {
        Ok(serde_json::to_string_pretty(&self.serialize())?)
    }

    /// Load from JSON.
    pub fn from_json(json: &str) -> Result<Self, SolverError> {
        Self::deserialize(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Offset, Point, tests::assert_nearly_eq};

    fn sample() -> (Sketch, HandleId, HandleId) {
        let mut sketch = Sketch::new();
        let a = sketch.add_handle(Point::new(0.0, 0.0));
        let b = sketch.add_handle(Point::new(10.0, 0.0));
        let polar = sketch.polar_vector(a, b).unwrap();
        let Constraint::PolarVector { distance, .. } = *sketch.constraint(polar).unwrap() else {
            panic!("expected a polar vector");
        };
        sketch.lock(distance, Some(20.0), false).unwrap();
        let w = sketch.create_variable(1.0);
        let v = sketch.create_variable(2.0);
        sketch.make_equal_to(w, v, Offset::new(2.0, 3.0)).unwrap();
        sketch.pin(a, Point::new(0.0, 0.0)).unwrap();
        sketch.finger(b, Point::new(5.0, 5.0)).unwrap();
        (sketch, a, b)
    }

    #[test]
    fn round_trip_keeps_values_and_kinds() {
        let (mut sketch, a, b) = sample();
        sketch.solve().unwrap();
        let json = sketch.to_json().unwrap();
        let mut restored = Sketch::from_json(&json).unwrap();

        let kinds = |s: &Sketch| {
            s.constraints()
                .map(|(_, c)| c.constraint_kind())
                .collect::<Vec<_>>()
        };
        // Everything except the finger survives.
        assert_eq!(
            kinds(&restored),
            vec!["PolarVector", "Constant", "LinearRelationship", "Pin"]
        );
        for (original, copy) in sketch.variables().zip(restored.variables()) {
            assert_eq!(original.id(), copy.id());
            assert_nearly_eq(original.value(), copy.value());
            assert_eq!(original.represents(), copy.represents());
        }
        let owned = restored
            .variables()
            .filter(|v| matches!(v.represents(), Some(Represents::Constraint(..))))
            .count();
        assert_eq!(owned, 2);
        let (before, after) = (sketch.position(a).unwrap(), restored.position(a).unwrap());
        assert_nearly_eq(before.x, after.x);
        assert_nearly_eq(before.y, after.y);
        assert_eq!(restored.handle(b).unwrap().x(), sketch.handle(b).unwrap().x());

        // Fresh IDs never collide with restored ones.
        let fresh = restored.create_variable(0.0);
        assert!(sketch.variable(fresh).is_err());
        restored.solve().unwrap();
    }

    #[test]
    fn unknown_ids_are_errors() {
        let json = r#"{
            "variables": [{"id": 0, "value": 1.0}],
            "handles": [],
            "constraints": [{"id": 5, "type": "Constant", "variable": 3, "value": 1.0}]
        }"#;
        assert!(matches!(
            Sketch::from_json(json),
            Err(SolverError::VariableNotFound(VarId(3)))
        ));

        let json = r#"{
            "variables": [{"id": 0, "value": 1.0}],
            "handles": [{"id": 1, "x": 0, "y": 2}],
            "constraints": []
        }"#;
        assert!(matches!(
            Sketch::from_json(json),
            Err(SolverError::VariableNotFound(VarId(2)))
        ));

        let json = r#"{
            "variables": [{"id": 0, "value": 1.0}, {"id": 0, "value": 2.0}],
            "handles": [],
            "constraints": []
        }"#;
        assert!(matches!(
            Sketch::from_json(json),
            Err(SolverError::DuplicateId(0))
        ));

        assert!(matches!(
            Sketch::from_json("not json"),
            Err(SolverError::Persistence(_))
        ));
    }
}
