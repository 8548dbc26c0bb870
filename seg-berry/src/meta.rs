//! 单个病例的空间元信息.

use nifti::NiftiHeader;
use serde::{Deserialize, Serialize};

use crate::Idx3d;

/// 裁剪包围盒. 每个轴一个 `[start, end)` 半开整数区间, 描述裁剪后的体积
/// 在原始 (未裁剪) 体积中的位置. 轴顺序与体数据一致, 为 `(z, h, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBbox {
    /// 三个轴上的 `[start, end)` 区间.
    pub bounds: [[usize; 2]; 3],
}

impl CropBbox {
    /// 由三个 `[start, end)` 区间直接创建.
    ///
    /// 每个区间必须满足 `start <= end`, 否则 panic.
    pub fn new(bounds: [[usize; 2]; 3]) -> Self {
        assert!(
            bounds.iter().all(|[start, end]| start <= end),
            "包围盒区间必须满足 start <= end"
        );
        Self { bounds }
    }

    /// 给定标签体形状与目标体形状, 重算各轴的实际粘贴区间.
    ///
    /// 上界按 `min(start + 标签体形状, 目标体形状)` 重算, 而不是直接使用
    /// 记录值: 上游重采样的舍入会导致记录的上界与标签体实际形状脱节,
    /// 甚至越过目标体边界.
    pub fn clipped_to(&self, label_shape: Idx3d, original_size: Idx3d) -> [[usize; 2]; 3] {
        let shape = [label_shape.0, label_shape.1, label_shape.2];
        let size = [original_size.0, original_size.1, original_size.2];
        let mut out = self.bounds;
        for c in 0..3 {
            out[c][1] = (out[c][0] + shape[c]).min(size[c]);
        }
        out
    }
}

/// 单个病例的空间元信息. 由预处理和推理协作方生成, 导出流程只读不写.
///
/// 轴顺序约定: 体数据相关字段 (间距, 形状, 包围盒) 均按 `(z, h, w)`
/// 顺序存储; `itk_*` 字段描述采集坐标系, 按 itk 惯用的 `(x, y, z)` 顺序.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialMetadata {
    /// 原始采集时的体素间距 (毫米).
    pub original_spacing: [f64; 3],

    /// 为模型输入重采样后的体素间距 (毫米).
    pub spacing_after_resampling: [f64; 3],

    /// 裁剪后的体积形状. 概率体经重采样后必须与之完全一致.
    pub size_after_cropping: Idx3d,

    /// 裁剪前原始数据的形状.
    pub original_size_of_raw_data: Idx3d,

    /// 裁剪包围盒. 预处理未裁剪时为 `None`.
    pub crop_bbox: Option<CropBbox>,

    /// 采集坐标系体素间距.
    pub itk_spacing: [f64; 3],

    /// 采集坐标系原点.
    pub itk_origin: [f64; 3],

    /// 采集坐标系方向余弦矩阵, 行优先 3x3.
    pub itk_direction: [f64; 9],
}

impl SpatialMetadata {
    /// 由 `itk_*` 字段构建写出用的 nifti header.
    ///
    /// itk 使用 LPS 坐标系, nifti 使用 RAS, 因此仿射矩阵前两行取反.
    /// 方向与原点写入 sform (`sform_code = 1`), 不设置 qform.
    pub fn nifti_header(&self) -> NiftiHeader {
        let [sx, sy, sz] = self.itk_spacing;
        let d = &self.itk_direction;
        let o = &self.itk_origin;

        let mut header = NiftiHeader::default();
        header.pixdim = [1.0, sx as f32, sy as f32, sz as f32, 0.0, 0.0, 0.0, 0.0];
        header.srow_x = [
            (-d[0] * sx) as f32,
            (-d[1] * sy) as f32,
            (-d[2] * sz) as f32,
            (-o[0]) as f32,
        ];
        header.srow_y = [
            (-d[3] * sx) as f32,
            (-d[4] * sy) as f32,
            (-d[5] * sz) as f32,
            (-o[1]) as f32,
        ];
        header.srow_z = [
            (d[6] * sx) as f32,
            (d[7] * sy) as f32,
            (d[8] * sz) as f32,
            o[2] as f32,
        ];
        header.sform_code = 1;
        header.qform_code = 0;
        header
    }
}

/// 构建一份单位间距, 单位方向的测试用元信息.
#[cfg(test)]
pub(crate) fn identity_meta(
    size_after_cropping: Idx3d,
    original_size: Idx3d,
    crop_bbox: Option<CropBbox>,
) -> SpatialMetadata {
    SpatialMetadata {
        original_spacing: [1.0, 1.0, 1.0],
        spacing_after_resampling: [1.0, 1.0, 1.0],
        size_after_cropping,
        original_size_of_raw_data: original_size,
        crop_bbox,
        itk_spacing: [1.0, 1.0, 1.0],
        itk_origin: [0.0, 0.0, 0.0],
        itk_direction: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    }
}
