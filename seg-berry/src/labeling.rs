//! 概率体到离散标签体的塌缩.

use ndarray::{Array3, ArrayView4, Axis};
use ordered_float::OrderedFloat;

use crate::consts::{BACKGROUND, MAX_CLASSES, REGION_PROB_THRESHOLD};

/// 标签塌缩策略. 在构造导出流程时显式选定.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelPolicy {
    /// 互斥模式: 每个体素的类别取概率最大的通道下标.
    /// 并列时取下标更小的通道.
    Exclusive,

    /// region 模式: 第 i 个通道对应列表第 i 项给出的类别.
    /// 按列表顺序逐通道处理, 概率严格大于门限的体素被赋予该通道的类别,
    /// 并覆盖此前的赋值. 因此列表靠后的类别在重叠处胜出.
    Regions(Vec<u8>),
}

impl LabelPolicy {
    /// 检查策略是否与 `channels` 个概率通道匹配.
    pub fn matches_channels(&self, channels: usize) -> bool {
        match self {
            Self::Exclusive => channels >= 1 && channels <= MAX_CLASSES,
            Self::Regions(order) => order.len() == channels,
        }
    }
}

/// 将 `(C, z, h, w)` 概率体按策略塌缩为 `(z, h, w)` 的 u8 标签体.
///
/// # 注意
///
/// 策略必须与通道数匹配 (见 [`LabelPolicy::matches_channels`]), 否则 panic.
/// 导出流程在运行前统一做该校验并以 `Err` 报告.
pub fn collapse_to_label(probs: ArrayView4<'_, f32>, policy: &LabelPolicy) -> Array3<u8> {
    assert!(
        policy.matches_channels(probs.len_of(Axis(0))),
        "塌缩策略与概率通道数不匹配"
    );
    match policy {
        LabelPolicy::Exclusive => collapse_exclusive(probs),
        LabelPolicy::Regions(order) => collapse_regions(probs, order),
    }
}

fn collapse_exclusive(probs: ArrayView4<'_, f32>) -> Array3<u8> {
    let (channels, z, h, w) = probs.dim();
    Array3::from_shape_fn((z, h, w), |(zi, hi, wi)| {
        let mut best = 0usize;
        let mut best_p = probs[(0, zi, hi, wi)];
        for ci in 1..channels {
            let p = probs[(ci, zi, hi, wi)];
            // 严格大于: 并列时保留下标更小的通道.
            if OrderedFloat(p) > OrderedFloat(best_p) {
                best = ci;
                best_p = p;
            }
        }
        best as u8
    })
}

fn collapse_regions(probs: ArrayView4<'_, f32>, order: &[u8]) -> Array3<u8> {
    let (_, z, h, w) = probs.dim();
    let mut out = Array3::from_elem((z, h, w), BACKGROUND);
    for (ci, &class) in order.iter().enumerate() {
        let channel = probs.index_axis(Axis(0), ci);
        for (label, &p) in out.iter_mut().zip(channel.iter()) {
            if p > REGION_PROB_THRESHOLD {
                *label = class;
            }
        }
    }
    out
}
