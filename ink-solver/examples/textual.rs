//! Parse the text format, which describes a sketch,
//! then solve it.
use ink_solver::textual::Problem;
use std::str::FromStr;

const EPSILON: f64 = 1e-3;

fn main() {
    let file = "\
# A bar of length 20, hanging from the origin.
handle p (0, 0)
handle q (10, 0)
pin p
polar pq = p q
lock pq.distance 20
lock pq.angle 0
";
    let problem = Problem::from_str(file).unwrap();
    let (mut sketch, labels) = problem.to_sketch().unwrap();
    let report = sketch.solve().unwrap();

    // Check the outcome.
    assert_eq!(report.failed, 0);
    let q = sketch.position(labels.handle("q").unwrap()).unwrap();
    let dist = libm::hypot(q.x - 20.0, q.y);
    assert!(dist < EPSILON, "q was {q}, dist was {dist}");
    println!("q = {q}");
}
