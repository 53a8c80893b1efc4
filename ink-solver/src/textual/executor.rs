use indexmap::IndexMap;

use super::{Instruction, Label, Problem, Property, VarRef};
use crate::{
    Offset,
    constraints::Constraint,
    error::{SolverError, TextualError},
    id::{ConstraintId, HandleId, VarId},
    sketch::Sketch,
};

/// What each label in a textual sketch turned into.
#[derive(Debug, Default, Clone)]
pub struct Labels {
    handles: IndexMap<Label, HandleId>,
    variables: IndexMap<String, VarId>,
}

impl Labels {
    /// The handle declared with this label.
    pub fn handle(&self, label: &str) -> Option<HandleId> {
        self.handles.get(&Label::from(label)).copied()
    }

    /// The variable this reference names, e.g. `a.x`, `ab.angle` or `w`.
    pub fn variable(&self, name: &str) -> Option<VarId> {
        self.variables.get(name).copied()
    }

    /// Every handle, in declaration order.
    pub fn handles(&self) -> impl Iterator<Item = (&Label, HandleId)> {
        self.handles.iter().map(|(l, id)| (l, *id))
    }

    /// Every nameable variable, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, VarId)> {
        self.variables.iter().map(|(name, id)| (name.as_str(), *id))
    }

    fn resolve_handle(&self, label: &Label) -> Result<HandleId, TextualError> {
        self.handles
            .get(label)
            .copied()
            .ok_or_else(|| TextualError::UndefinedLabel {
                label: label.to_string(),
            })
    }

    fn resolve(&self, var: &VarRef) -> Result<VarId, TextualError> {
        let name = var.to_string();
        self.variables
            .get(&name)
            .copied()
            .ok_or(TextualError::UndefinedLabel { label: name })
    }

    /// Handles, variables and constraint outputs share one namespace.
    fn claim(&self, label: &Label) -> Result<(), TextualError> {
        let taken = self.handles.contains_key(label)
            || self.variables.keys().any(|name| {
                name == label.as_str()
                    || name
                        .split_once('.')
                        .is_some_and(|(owner, _)| owner == label.as_str())
            });
        if taken {
            return Err(TextualError::DuplicateLabel {
                label: label.to_string(),
            });
        }
        Ok(())
    }

    fn name(&mut self, var: VarRef, id: VarId) {
        self.variables.insert(var.to_string(), id);
    }
}

fn property(label: &Label, property: Property) -> VarRef {
    VarRef {
        label: label.clone(),
        property: Some(property),
    }
}

fn plain(label: &Label) -> VarRef {
    VarRef {
        label: label.clone(),
        property: None,
    }
}

/// The variable a single-output constraint owns.
fn owned_by(sketch: &Sketch, id: ConstraintId) -> Result<VarId, SolverError> {
    Ok(match *sketch.constraint(id)? {
        Constraint::Distance { distance, .. } => distance,
        Constraint::Angle { angle, .. } => angle,
        Constraint::LinearFormula { result, .. } => result,
        _ => return Err(SolverError::ConstraintNotFound(id)),
    })
}

impl Problem {
    /// Build a sketch by running every instruction in order.
    pub fn to_sketch(&self) -> Result<(Sketch, Labels), TextualError> {
        let mut sketch = Sketch::new();
        let mut labels = Labels::default();
        for instruction in &self.instructions {
            execute(instruction, &mut sketch, &mut labels)?;
        }
        Ok((sketch, labels))
    }
}

fn execute(
    instruction: &Instruction,
    sketch: &mut Sketch,
    labels: &mut Labels,
) -> Result<(), TextualError> {
    match instruction {
        Instruction::DeclareHandle(h) => {
            labels.claim(&h.label)?;
            let id = sketch.add_handle(h.position);
            let handle = sketch.handle(id)?;
            let (x, y) = (handle.x(), handle.y());
            labels.handles.insert(h.label.clone(), id);
            labels.name(property(&h.label, Property::X), x);
            labels.name(property(&h.label, Property::Y), y);
        }
        Instruction::DeclareVariable(v) => {
            labels.claim(&v.label)?;
            let id = sketch.create_labelled_variable(v.value, v.label.as_str());
            labels.name(plain(&v.label), id);
        }
        Instruction::Pin(p) => {
            let handle = labels.resolve_handle(&p.handle)?;
            let position = match p.position {
                Some(position) => position,
                None => sketch.position(handle)?,
            };
            sketch.pin(handle, position)?;
        }
        Instruction::Finger(f) => {
            let handle = labels.resolve_handle(&f.handle)?;
            sketch.finger(handle, f.position)?;
        }
        Instruction::Absorb(a) => {
            let parent = labels.resolve_handle(&a.parent)?;
            let child = labels.resolve_handle(&a.child)?;
            sketch.absorb(parent, child)?;
        }
        Instruction::PolarVector(p) => {
            labels.claim(&p.label)?;
            let a = labels.resolve_handle(&p.a)?;
            let b = labels.resolve_handle(&p.b)?;
            let id = sketch.polar_vector(a, b)?;
            let Constraint::PolarVector {
                distance, angle, ..
            } = *sketch.constraint(id)?
            else {
                return Err(SolverError::ConstraintNotFound(id).into());
            };
            labels.name(property(&p.label, Property::Distance), distance);
            labels.name(property(&p.label, Property::Angle), angle);
        }
        Instruction::Distance(d) => {
            labels.claim(&d.label)?;
            let a = labels.resolve_handle(&d.a)?;
            let b = labels.resolve_handle(&d.b)?;
            let id = sketch.distance(a, b)?;
            labels.name(plain(&d.label), owned_by(sketch, id)?);
        }
        Instruction::Angle(t) => {
            labels.claim(&t.label)?;
            let a = labels.resolve_handle(&t.a)?;
            let b = labels.resolve_handle(&t.b)?;
            let id = sketch.angle(a, b)?;
            labels.name(plain(&t.label), owned_by(sketch, id)?);
        }
        Instruction::Linear(l) => {
            let y = labels.resolve(&l.y)?;
            let x = labels.resolve(&l.x)?;
            sketch.make_equal_to(y, x, Offset::new(l.m, l.b))?;
        }
        Instruction::Formula(f) => {
            labels.claim(&f.label)?;
            let m = labels.resolve(&f.m)?;
            let x = labels.resolve(&f.x)?;
            let b = labels.resolve(&f.b)?;
            let id = sketch.linear_formula(m, x, b)?;
            labels.name(plain(&f.label), owned_by(sketch, id)?);
        }
        Instruction::Lock(l) => {
            let var = labels.resolve(&l.variable)?;
            sketch.lock(var, l.value, false)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_nearly_eq;

    fn build(text: &str) -> Result<(Sketch, Labels), TextualError> {
        Problem::parse(text)?.to_sketch()
    }

    #[test]
    fn locked_polar_vector() {
        let (mut sketch, labels) = build(
            "\
            handle a (0, 0)
            handle b (10, 0)
            polar ab = a b
            lock ab.distance 20
            pin a
            ",
        )
        .unwrap();
        sketch.solve().unwrap();
        let a = sketch.position(labels.handle("a").unwrap()).unwrap();
        let b = sketch.position(labels.handle("b").unwrap()).unwrap();
        assert_nearly_eq(a.x, 0.0);
        assert_nearly_eq(a.y, 0.0);
        assert!((libm::hypot(b.x - a.x, b.y - a.y) - 20.0).abs() < 1e-3);
        let distance = labels.variable("ab.distance").unwrap();
        assert_nearly_eq(sketch.value(distance).unwrap(), 20.0);
    }

    #[test]
    fn linear_and_formula() {
        let (mut sketch, labels) = build(
            "\
            var v 1
            var w 5
            var u 4
            linear w = 2 * v + 3
            formula r = w * v + u
            lock v
            ",
        )
        .unwrap();
        sketch.solve().unwrap();
        let value = |name: &str| sketch.value(labels.variable(name).unwrap()).unwrap();
        assert_nearly_eq(value("v"), 1.0);
        assert_nearly_eq(value("w"), 5.0);
        assert_nearly_eq(value("r"), 9.0);
    }

    #[test]
    fn undefined_labels() {
        let err = build("handle a (0, 0)\npolar ab = a b").unwrap_err();
        assert!(matches!(err, TextualError::UndefinedLabel { label } if label == "b"));
        let err = build("var w 1\nlock w.x").unwrap_err();
        assert!(matches!(err, TextualError::UndefinedLabel { label } if label == "w.x"));
    }

    #[test]
    fn duplicate_labels() {
        let err = build("handle a (0, 0)\nhandle a (1, 1)").unwrap_err();
        assert!(matches!(err, TextualError::DuplicateLabel { label } if label == "a"));
        let err = build("handle a (0, 0)\nhandle b (1, 1)\npolar a = a b").unwrap_err();
        assert!(matches!(err, TextualError::DuplicateLabel { label } if label == "a"));
        let err =
            build("handle a (0, 0)\nhandle b (1, 1)\npolar ab = a b\nvar ab 3").unwrap_err();
        assert!(matches!(err, TextualError::DuplicateLabel { label } if label == "ab"));
    }
}
