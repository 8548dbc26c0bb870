//! 概率体重采样.
//!
//! 将裁剪/降采样表示下的逐类概率体插值回目标空间形状. 当体素间距
//! 各向异性明显时, 低分辨率轴与面内两轴分开处理, 以免插值跨过稀疏
//! 切片产生混合伪影.

mod imp;

use ndarray::{Array4, ArrayView4, Axis};

use crate::consts::ANISOTROPY_THRESHOLD;
use crate::Idx3d;

/// 插值阶. 语义与常见样条插值阶一致.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterpOrder {
    /// 0 阶, 最近邻.
    Nearest,

    /// 1 阶, 线性.
    Linear,

    /// 3 阶, 三次.
    Cubic,
}

impl InterpOrder {
    /// 从整数插值阶构建. 仅支持 0, 1, 3, 其余返回 `None`.
    pub fn from_order(order: u8) -> Option<Self> {
        match order {
            0 => Some(Self::Nearest),
            1 => Some(Self::Linear),
            3 => Some(Self::Cubic),
            _ => None,
        }
    }
}

/// 重采样执行方案.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResamplePlan {
    /// 三个轴联合插值.
    Joint,

    /// 给定下标的低分辨率轴单独处理: 面内二维插值 + 该轴最近邻选层.
    SeparateAxis(usize),
}

impl ResamplePlan {
    /// 判定一个间距向量是否各向异性.
    ///
    /// 最大分量与最小分量之比严格大于 [`ANISOTROPY_THRESHOLD`] 时判定成立.
    pub fn is_anisotropic(spacing: [f64; 3]) -> bool {
        let max = spacing.iter().copied().fold(f64::MIN, f64::max);
        let min = spacing.iter().copied().fold(f64::MAX, f64::min);
        max / min > ANISOTROPY_THRESHOLD
    }

    /// 低分辨率轴: 间距最大的轴. 并列时取下标最小者.
    pub fn lowres_axis(spacing: [f64; 3]) -> usize {
        let mut axis = 0;
        for (i, &s) in spacing.iter().enumerate().skip(1) {
            if s > spacing[axis] {
                axis = i;
            }
        }
        axis
    }

    /// 由原始采集间距和重采样后间距共同决定执行方案.
    ///
    /// 两个间距向量各检查一次, 任一各向异性即启用单轴处理;
    /// 两者同时命中时采用原始采集间距给出的轴.
    pub fn decide(original_spacing: [f64; 3], spacing_after_resampling: [f64; 3]) -> Self {
        if Self::is_anisotropic(original_spacing) {
            Self::SeparateAxis(Self::lowres_axis(original_spacing))
        } else if Self::is_anisotropic(spacing_after_resampling) {
            Self::SeparateAxis(Self::lowres_axis(spacing_after_resampling))
        } else {
            Self::Joint
        }
    }
}

/// 将 `(C, z, h, w)` 概率体逐通道重采样到目标空间形状.
///
/// 空间形状已与目标一致时原样返回, 不做任何插值 (这是最常见情形,
/// 必须先于一切插值检查). 落在源范围外的插值 tap 取 `cval`.
///
/// # 注意
///
/// 返回值的空间形状保证与 `target` 完全一致.
pub fn resample_probs(
    probs: ArrayView4<'_, f32>,
    target: Idx3d,
    plan: ResamplePlan,
    order: InterpOrder,
    cval: f32,
) -> Array4<f32> {
    let (channels, sz, sh, sw) = probs.dim();
    if (sz, sh, sw) == target {
        return probs.to_owned();
    }

    let mut out = Array4::from_elem((channels, target.0, target.1, target.2), cval);
    for (ci, channel) in probs.outer_iter().enumerate() {
        let resampled = match plan {
            ResamplePlan::Joint => imp::resample_joint(channel, target, order, cval),
            ResamplePlan::SeparateAxis(axis) => {
                imp::resample_separate(channel, target, axis, order, cval)
            }
        };
        out.index_axis_mut(Axis(0), ci).assign(&resampled);
    }

    debug_assert_eq!(out.dim(), (channels, target.0, target.1, target.2));
    out
}
