//! 导出流程运行时错误.

use std::path::PathBuf;

use ndarray_npy::ReadNpyError;
use nifti::NiftiError;

use crate::cache::CacheError;
use crate::Idx3d;

/// 导出流程错误.
#[derive(Debug)]
pub enum ExportError {
    /// 以路径交付的概率转储文件不存在. 在一切处理开始之前报告.
    MissingProbFile(PathBuf),

    /// 读取 npy 概率转储失败.
    ReadNpy(ReadNpyError),

    /// 重采样后的空间形状与 `size_after_cropping` 不一致,
    /// 说明上游元信息与重采样流程不自洽. 不做截断或填补.
    ShapeMismatch {
        /// 实际得到的空间形状.
        got: Idx3d,

        /// 元信息要求的空间形状.
        expected: Idx3d,
    },

    /// region 类别顺序长度与概率通道数不一致.
    RegionOrderMismatch {
        /// 概率体的通道数.
        channels: usize,

        /// region 类别顺序的长度.
        classes: usize,
    },

    /// 互斥模式下通道数超过 u8 标签能表示的类别上限.
    TooManyChannels(usize),

    /// nifti 写出错误.
    Nifti(NiftiError),

    /// 概率缓存写出错误.
    Cache(CacheError),

    /// 其他底层 I/O 错误.
    Io(std::io::Error),
}

/// 导出流程结果.
pub type ExportResult<T> = Result<T, ExportError>;
