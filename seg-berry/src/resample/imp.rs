//! 插值内核的实现细节.
//!
//! 所有坐标映射均采用居中规则: 输出下标 `i` 对应源坐标
//! `(i + 0.5) * (src / dst) - 0.5`. 落在源范围外的 tap 一律取常量填充值.

use itertools::iproduct;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use num::Float;

use super::InterpOrder;
use crate::{Idx2d, Idx3d};

/// f64 -> T. 对 f32/f64 该转换不会失败, 可直接 unwrap.
#[inline]
fn t<T: Float>(x: f64) -> T {
    T::from(x).unwrap()
}

/// 输出下标 `i` 对应的源坐标.
#[inline]
fn src_coord(i: usize, scale: f64) -> f64 {
    (i as f64 + 0.5) * scale - 0.5
}

/// Catmull-Rom 三次卷积核作用于相邻四点的权重. `t` 取小数部分, 在 `[0, 1)` 内.
fn cubic_weights(frac: f64) -> [f64; 4] {
    let t2 = frac * frac;
    let t3 = t2 * frac;
    [
        0.5 * (-t3 + 2.0 * t2 - frac),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + frac),
        0.5 * (t3 - t2),
    ]
}

/// 单个输出下标在一个轴上的插值 taps: 起始源下标与至多四个权重.
struct AxisTaps<T> {
    start: isize,
    weights: [T; 4],
    len: usize,
}

impl<T: Float> AxisTaps<T> {
    fn new(order: InterpOrder, pos: f64) -> Self {
        match order {
            InterpOrder::Nearest => Self {
                start: pos.round() as isize,
                weights: [T::one(), T::zero(), T::zero(), T::zero()],
                len: 1,
            },
            InterpOrder::Linear => {
                let base = pos.floor();
                let frac = pos - base;
                Self {
                    start: base as isize,
                    weights: [t(1.0 - frac), t(frac), T::zero(), T::zero()],
                    len: 2,
                }
            }
            InterpOrder::Cubic => {
                let base = pos.floor();
                let w = cubic_weights(pos - base);
                Self {
                    start: base as isize - 1,
                    weights: [t(w[0]), t(w[1]), t(w[2]), t(w[3])],
                    len: 4,
                }
            }
        }
    }

    /// 迭代 `(源下标, 权重)` 对. 源下标可能越界, 由取值方处理.
    fn iter(&self) -> impl Iterator<Item = (isize, T)> + '_ {
        self.weights[..self.len]
            .iter()
            .enumerate()
            .map(move |(k, &w)| (self.start + k as isize, w))
    }
}

/// 为一个轴的全部输出下标预计算 taps.
fn tap_table<T: Float>(order: InterpOrder, src_len: usize, dst_len: usize) -> Vec<AxisTaps<T>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|i| AxisTaps::new(order, src_coord(i, scale)))
        .collect()
}

/// 三维取值. 越界返回 `cval`.
#[inline]
fn at3<T: Float>(src: &ArrayView3<T>, z: isize, h: isize, w: isize, cval: T) -> T {
    let (sz, sh, sw) = src.dim();
    if z < 0 || h < 0 || w < 0 {
        return cval;
    }
    let (z, h, w) = (z as usize, h as usize, w as usize);
    if z >= sz || h >= sh || w >= sw {
        cval
    } else {
        src[(z, h, w)]
    }
}

/// 二维取值. 越界返回 `cval`.
#[inline]
fn at2<T: Float>(src: &ArrayView2<T>, h: isize, w: isize, cval: T) -> T {
    let (sh, sw) = src.dim();
    if h < 0 || w < 0 {
        return cval;
    }
    let (h, w) = (h as usize, w as usize);
    if h >= sh || w >= sw {
        cval
    } else {
        src[(h, w)]
    }
}

/// 三个轴联合插值.
pub(crate) fn resample_joint<T: Float>(
    src: ArrayView3<'_, T>,
    target: Idx3d,
    order: InterpOrder,
    cval: T,
) -> Array3<T> {
    let (sz, sh, sw) = src.dim();
    let (tz, th, tw) = target;
    let taps_z = tap_table::<T>(order, sz, tz);
    let taps_h = tap_table::<T>(order, sh, th);
    let taps_w = tap_table::<T>(order, sw, tw);

    let mut out = Array3::from_elem(target, cval);
    for ((zi, z_taps), (hi, h_taps), (wi, w_taps)) in iproduct!(
        taps_z.iter().enumerate(),
        taps_h.iter().enumerate(),
        taps_w.iter().enumerate()
    ) {
        let mut acc = T::zero();
        for (z, wz) in z_taps.iter() {
            for (h, wh) in h_taps.iter() {
                let wzh = wz * wh;
                for (w, ww) in w_taps.iter() {
                    acc = acc + wzh * ww * at3(&src, z, h, w, cval);
                }
            }
        }
        out[(zi, hi, wi)] = acc;
    }
    out
}

/// 单张二维切片的面内插值.
pub(crate) fn resample_plane<T: Float>(
    src: ArrayView2<'_, T>,
    target: Idx2d,
    order: InterpOrder,
    cval: T,
) -> Array2<T> {
    if src.dim() == target {
        return src.to_owned();
    }
    let (sh, sw) = src.dim();
    let (th, tw) = target;
    let taps_h = tap_table::<T>(order, sh, th);
    let taps_w = tap_table::<T>(order, sw, tw);

    let mut out = Array2::from_elem(target, cval);
    for ((hi, h_taps), (wi, w_taps)) in
        iproduct!(taps_h.iter().enumerate(), taps_w.iter().enumerate())
    {
        let mut acc = T::zero();
        for (h, wh) in h_taps.iter() {
            for (w, ww) in w_taps.iter() {
                acc = acc + wh * ww * at2(&src, h, w, cval);
            }
        }
        out[(hi, wi)] = acc;
    }
    out
}

/// 低分辨率轴单独处理的插值: 先沿该轴逐切片做面内二维插值,
/// 再在该轴上以最近邻方式选层, 避免跨稀疏切片混合.
pub(crate) fn resample_separate<T: Float>(
    src: ArrayView3<'_, T>,
    target: Idx3d,
    axis: usize,
    order: InterpOrder,
    cval: T,
) -> Array3<T> {
    assert!(axis < 3, "低分辨率轴下标必须小于 3, 但得到 `{axis}`");
    let d = src.dim();
    let sdim = [d.0, d.1, d.2];
    let tdim = [target.0, target.1, target.2];
    let plane_target = plane_of(tdim, axis);

    let resized: Vec<Array2<T>> = (0..sdim[axis])
        .map(|s| resample_plane(src.index_axis(Axis(axis), s), plane_target, order, cval))
        .collect();

    let mut out = Array3::from_elem(target, cval);
    let scale = sdim[axis] as f64 / tdim[axis] as f64;
    for j in 0..tdim[axis] {
        // 越界坐标收拢到边缘切片.
        let s = src_coord(j, scale)
            .round()
            .clamp(0.0, (sdim[axis] - 1) as f64) as usize;
        out.index_axis_mut(Axis(axis), j).assign(&resized[s]);
    }
    out
}

/// 三维形状去掉 `axis` 轴后剩余两轴的形状.
fn plane_of(dims: [usize; 3], axis: usize) -> Idx2d {
    match axis {
        0 => (dims[1], dims[2]),
        1 => (dims[0], dims[2]),
        2 => (dims[0], dims[1]),
        _ => unreachable!(),
    }
}
