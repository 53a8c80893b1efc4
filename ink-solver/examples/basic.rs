//! A basic example for how to use the constraint solver.
use ink_solver::{Constraint, Point, Sketch};

fn main() {
    // Two handles the user has drawn.
    let mut sketch = Sketch::new();
    let p = sketch.add_handle(Point::new(0.0, 0.0));
    let q = sketch.add_handle(Point::new(3.0, 4.0));

    // Keep P where it is, and keep Q exactly 10 units away from it.
    sketch.pin(p, Point::new(0.0, 0.0)).unwrap();
    let polar = sketch.polar_vector(p, q).unwrap();
    let Constraint::PolarVector { distance, .. } = *sketch.constraint(polar).unwrap() else {
        unreachable!("polar_vector always creates a polar vector");
    };
    sketch.lock(distance, Some(10.0), false).unwrap();

    // The user drags Q somewhere else. Solve a few frames.
    sketch.finger(q, Point::new(-20.0, 0.0)).unwrap();
    for frame in 0..3 {
        match sketch.solve() {
            Ok(report) => println!(
                "frame {frame}: {} clusters, {} iterations",
                report.clusters, report.iterations
            ),
            Err(e) => {
                eprintln!("could not solve this sketch: {e}");
                return;
            }
        }
    }
    println!("P = {}", sketch.position(p).unwrap());
    println!("Q = {}", sketch.position(q).unwrap());
}
