/// Asserts two floats agree to within an absolute tolerance.
#[macro_export]
macro_rules! assert_close {
    ($left:expr, $right:expr, $tol:expr) => {
        let (l, r): (f64, f64) = ($left, $right);
        assert!(
            (l - r).abs() <= $tol,
            "{} = {} is not within {} of {}",
            stringify!($left),
            l,
            $tol,
            r
        );
    };
}

/// Asserts that total energy matches a reference within a relative tolerance.
#[macro_export]
macro_rules! assert_energy_conserved {
    ($sim:expr, $reference:expr) => {
        let e = $sim.total_energy();
        let reference: f64 = $reference;
        assert!(
            (e - reference).abs() <= 1e-9 * reference.abs().max(1.0),
            "energy drifted from {} to {} after {} events",
            reference,
            e,
            $sim.event_count()
        );
    };
}
