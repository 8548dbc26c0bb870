//! 概率体与标签体基础数据结构.

use std::fs::File;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, ArrayViewMut3, Axis};
use ndarray_npy::ReadNpyExt;
use nifti::writer::WriterOptions;

use crate::export::ExportError;
use crate::meta::SpatialMetadata;
use crate::{Idx3d, Idx4d};

/// 模型输出的逐类概率体. 形状按 `(C, z, h, w)` 组织, 概率以 `f32` 保存.
///
/// 每个通道是一个类别 (或 region) 的逐体素概率, region 模式下各通道
/// 概率之和不必为 1.
#[derive(Debug, Clone)]
pub struct ProbVolume {
    data: Array4<f32>,
}

impl ProbVolume {
    /// 由 `(C, z, h, w)` 数组直接创建.
    ///
    /// 通道数和三个空间维度都必须非零, 否则 panic.
    pub fn new(data: Array4<f32>) -> Self {
        let (c, z, h, w) = data.dim();
        assert!(
            c >= 1 && z >= 1 && h >= 1 && w >= 1,
            "概率体的通道数与空间维度必须非零, 但形状为 {:?}",
            data.dim()
        );
        Self { data }
    }

    /// 由二维 `(C, h, w)` 概率体创建.
    ///
    /// 二维数据在内部一律以 `(C, 1, h, w)` 伪三维形式组织,
    /// 与三维数据共用同一条处理路径.
    pub fn from_2d(data: Array3<f32>) -> Self {
        Self::new(data.insert_axis(Axis(1)))
    }

    /// 通道数.
    #[inline]
    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 空间形状 `(z, h, w)`.
    #[inline]
    pub fn spatial_shape(&self) -> Idx3d {
        let (_, z, h, w) = self.data.dim();
        (z, h, w)
    }

    /// 第 `ci` 个通道的视图. `ci` 越界时 panic.
    #[inline]
    pub fn channel(&self, ci: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), ci)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// 直接获得内部数据的所有权.
    #[inline]
    pub fn into_inner(self) -> Array4<f32> {
        self.data
    }
}

impl Index<Idx4d> for ProbVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx4d) -> &Self::Output {
        &self.data[index]
    }
}

/// 概率体来源.
///
/// 推理协作方既可能在内存中直接交付概率体, 也可能先转储到硬盘再交付
/// 文件路径 (多进程推理的常见做法).
#[derive(Debug)]
pub enum ProbSource {
    /// 内存中的概率体.
    InMemory(ProbVolume),

    /// 硬盘上 `(C, z, h, w)` 形状的 f32 npy 转储文件.
    NpyFile(PathBuf),
}

impl ProbSource {
    /// 消费来源, 取得概率体.
    ///
    /// 文件形式的来源在读入内存后 **立即被删除**: 转储文件的所有权随调用
    /// 转移到导出流程, 由其负责清理. 因此删除之后的任何阶段失败,
    /// 都无法再从原转储文件重试.
    pub fn acquire(self) -> Result<ProbVolume, ExportError> {
        match self {
            Self::InMemory(v) => Ok(v),
            Self::NpyFile(path) => {
                if !path.is_file() {
                    return Err(ExportError::MissingProbFile(path));
                }
                let file = File::open(&path).map_err(ExportError::Io)?;
                let data = Array4::<f32>::read_npy(file).map_err(ExportError::ReadNpy)?;
                std::fs::remove_file(&path).map_err(ExportError::Io)?;
                Ok(ProbVolume::new(data))
            }
        }
    }
}

/// 还原后的离散标签体. 形状按 `(z, h, w)` 组织, 类别以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    data: Array3<u8>,
}

impl LabelVolume {
    /// 由 `(z, h, w)` 数组直接创建.
    #[inline]
    pub fn new(data: Array3<u8>) -> Self {
        Self { data }
    }

    /// 形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        self.data.view_mut()
    }

    /// 直接获得内部数据的所有权.
    #[inline]
    pub fn into_inner(self) -> Array3<u8> {
        self.data
    }

    /// 值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 按采集坐标系元信息将标签体写为 nifti 文件.
    ///
    /// 文件格式由扩展名决定 (`.nii` 或 `.nii.gz`). 数据以 u8 编码,
    /// 间距/原点/方向取自 `meta` 的 `itk_*` 字段.
    pub fn save_nifti<P: AsRef<Path>>(&self, path: P, meta: &SpatialMetadata) -> nifti::Result<()> {
        let header = meta.nifti_header();

        // (z, H, W) -> (W, H, z). nifti 数据布局惯例, 与读取方向互逆.
        let data = self.data.view().permuted_axes([2, 1, 0]);
        let data = data.as_standard_layout();

        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for LabelVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}
