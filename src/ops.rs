// src/ops.rs

/// Most negative finite `f32`, the max-find starting point.
pub const MAX_SENTINEL: f32 = f32::MIN;

/// Fill `dst` with `value`.
pub fn duplicate(dst: &mut [f32], value: f32) {
    dst.fill(value);
}

/// Copy `src[0]` across `dst`.
pub fn broadcast(dst: &mut [f32], src: &[f32]) {
    if let Some(&v) = src.first() {
        duplicate(dst, v);
    }
}

#[inline]
fn zip_apply(dst: &mut [f32], a: &[f32], b: &[f32], f: impl Fn(f32, f32) -> f32) {
    debug_assert_eq!(dst.len(), a.len());
    debug_assert_eq!(dst.len(), b.len());
    let n = dst.len().min(a.len()).min(b.len());
    let mut i = 0;
    // Unrolled by four
    while i + 4 <= n {
        dst[i] = f(a[i], b[i]);
        dst[i + 1] = f(a[i + 1], b[i + 1]);
        dst[i + 2] = f(a[i + 2], b[i + 2]);
        dst[i + 3] = f(a[i + 3], b[i + 3]);
        i += 4;
    }
    while i < n {
        dst[i] = f(a[i], b[i]);
        i += 1;
    }
}

pub fn sub(dst: &mut [f32], a: &[f32], b: &[f32]) {
    zip_apply(dst, a, b, |x, y| x - y);
}

pub fn mul(dst: &mut [f32], a: &[f32], b: &[f32]) {
    zip_apply(dst, a, b, |x, y| x * y);
}

pub fn div(dst: &mut [f32], a: &[f32], b: &[f32]) {
    zip_apply(dst, a, b, |x, y| x / y);
}

/// `acc += x`, in place.
pub fn accumulate(acc: &mut [f32], x: &[f32]) {
    debug_assert_eq!(acc.len(), x.len());
    for (a, &v) in acc.iter_mut().zip(x) {
        *a += v;
    }
}

/// `x = exp(x)`, in place.
pub fn exp_in_place(x: &mut [f32]) {
    for v in x.iter_mut() {
        *v = v.exp();
    }
}

/// Sequential sum in element order.
pub fn reduce_sum(x: &[f32]) -> f32 {
    sum_into(0.0, x)
}

/// Continue a running sum over `x`, element by element.
pub fn sum_into(acc: f32, x: &[f32]) -> f32 {
    let mut sum = acc;
    for &v in x {
        sum += v;
    }
    sum
}

/// Fold `x` into a running maximum.
///
/// Only a strictly greater element replaces the accumulator, so ties keep
/// the earlier value and NaN never wins.
pub fn reduce_max(acc: f32, x: &[f32]) -> f32 {
    let mut m = acc;
    for &v in x {
        if v > m {
            m = v;
        }
    }
    m
}
