use proptest::prelude::*;

use crate::{Constraint, Offset, Point, Sketch, tests::assert_nearly_eq};

fn scale() -> impl Strategy<Value = f64> {
    prop_oneof![-10.0..-0.5f64, 0.5..10.0f64]
}

proptest! {
    #[test]
    fn chained_offsets_compose(
        m1 in scale(),
        b1 in -100.0..100.0f64,
        m2 in scale(),
        b2 in -100.0..100.0f64,
        value in -100.0..100.0f64,
    ) {
        let mut sketch = Sketch::new();
        let a = sketch.create_variable(0.0);
        let b = sketch.create_variable(0.0);
        let c = sketch.create_variable(0.0);
        sketch.make_equal_to(a, b, Offset::new(m1, b1)).unwrap();
        sketch.make_equal_to(b, c, Offset::new(m2, b2)).unwrap();
        prop_assert_eq!(sketch.canonical(a).unwrap(), sketch.canonical(c).unwrap());

        // Writing any member is visible through every other member.
        sketch.set_value(c, value).unwrap();
        let expected_b = m2 * value + b2;
        let expected_a = m1 * expected_b + b1;
        prop_assert!((sketch.value(b).unwrap() - expected_b).abs() < 1e-6);
        prop_assert!((sketch.value(a).unwrap() - expected_a).abs() < 1e-6 * expected_a.abs().max(1.0));

        sketch.set_value(a, expected_a).unwrap();
        prop_assert!((sketch.value(c).unwrap() - value).abs() < 1e-6 * value.abs().max(1.0));
    }

    #[test]
    fn identity_unification_is_transitive(values in prop::collection::vec(-50.0..50.0f64, 2..8)) {
        let mut sketch = Sketch::new();
        let ids: Vec<_> = values.iter().map(|v| sketch.create_variable(*v)).collect();
        for pair in ids.windows(2) {
            sketch.make_equal_to(pair[0], pair[1], Offset::IDENTITY).unwrap();
        }
        let first = ids[0];
        let last = ids[ids.len() - 1];
        prop_assert!(sketch.equals(first, last).unwrap());
        sketch.set_value(last, 12.5).unwrap();
        for id in &ids {
            assert_nearly_eq(sketch.value(*id).unwrap(), 12.5);
        }
    }

    #[test]
    fn locked_distance_is_reached(
        bx in -50.0..50.0f64,
        by in -50.0..50.0f64,
        target in 1.0..40.0f64,
    ) {
        prop_assume!(libm::hypot(bx, by) > 1.0);
        let mut sketch = Sketch::new();
        let a = sketch.add_handle(Point::new(0.0, 0.0));
        let b = sketch.add_handle(Point::new(bx, by));
        sketch.pin(a, Point::new(0.0, 0.0)).unwrap();
        let id = sketch.polar_vector(a, b).unwrap();
        let Constraint::PolarVector { distance, .. } = *sketch.constraint(id).unwrap() else {
            panic!("expected a polar vector");
        };
        sketch.lock(distance, Some(target), false).unwrap();
        let report = sketch.solve().unwrap();
        prop_assert_eq!(report.solved, 1);
        let pb = sketch.position(b).unwrap();
        prop_assert!((libm::hypot(pb.x, pb.y) - target).abs() < 1e-3);
    }
}
