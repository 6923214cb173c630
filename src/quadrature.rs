//! Adaptive Simpson quadrature for the integral deflection strategy

fn simpson(f: &impl Fn(f64) -> f64, a: f64, fa: f64, b: f64, fb: f64) -> (f64, f64, f64) {
    let m = 0.5 * (a + b);
    let fm = f(m);
    ((b - a) / 6.0 * (fa + 4.0 * fm + fb), m, fm)
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    f: &impl Fn(f64) -> f64,
    a: f64,
    fa: f64,
    b: f64,
    fb: f64,
    whole: f64,
    m: f64,
    fm: f64,
    tol: f64,
    depth: u32,
) -> f64 {
    let (left, lm, flm) = simpson(f, a, fa, m, fm);
    let (right, rm, frm) = simpson(f, m, fm, b, fb);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= 15.0 * tol {
        left + right + delta / 15.0
    } else {
        recurse(f, a, fa, m, fm, left, lm, flm, 0.5 * tol, depth - 1)
            + recurse(f, m, fm, b, fb, right, rm, frm, 0.5 * tol, depth - 1)
    }
}

/// Integrate `f` over `[a, b]` to the requested absolute tolerance
pub fn adaptive_simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, tol: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    let (fa, fb) = (f(a), f(b));
    let (whole, m, fm) = simpson(&f, a, fa, b, fb);
    recurse(&f, a, fa, b, fb, whole, m, fm, tol, 48)
}
