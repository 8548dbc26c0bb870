#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 将分割模型输出的逐类概率体 (softmax) 还原为原始采集空间的
//! 离散标签体, 并以 nifti 文件持久化.
//!
//! 模型推理通常在裁剪 + 重采样后的低分辨率表示上进行, 其输出与原始
//! 采集空间在形状, 间距, 位置上都对不上. 该 crate 负责这条逆向链路:
//! 概率体 -> 重采样回裁剪后形状 -> (可选) 概率缓存 -> 标签塌缩 ->
//! 放回裁剪包围盒 -> (可选) 后处理 -> 携带采集几何信息写出.
//!
//! 该 crate 目前仅提供 `safe` 接口. 单次导出内部没有任何并发,
//! 跨病例的并行由调用方负责 (不同病例的输出路径互不相同).
//!
//! # 注意
//!
//! 1. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what
//!    Rust promises.
//! 2. 以文件路径交付的概率转储在读入后立即被删除, 见
//!    [`ProbSource::acquire`].
//!
//! # 开发计划
//!
//! ### 重采样决策与单轴插值 ✅
//!
//! 体素间距各向异性明显时 (最大/最小之比超过 3), 低分辨率轴以最近邻
//! 单独处理, 面内两轴二维插值; 否则三个轴联合插值.
//!
//! 实现位于 `seg-berry/src/resample`.
//!
//! ### 概率体重采样 ✅
//!
//! 0/1/3 阶插值内核, 居中坐标映射, 越界常量填充, 形状一致时的
//! 无插值快速路径.
//!
//! 实现位于 `seg-berry/src/resample/imp.rs`.
//!
//! ### 标签塌缩 ✅
//!
//! 互斥模式 (逐体素 argmax) 与 region 模式 (顺序阈值覆盖, 后者胜出)
//! 二选一, 以显式策略类型表达.
//!
//! 实现位于 `seg-berry/src/labeling.rs`.
//!
//! ### 裁剪包围盒还原 ✅
//!
//! 把标签体粘贴回裁剪前的原始范围, 包围盒上界按标签实际形状与原始
//! 边界重算.
//!
//! 实现位于 `seg-berry/src/compose.rs`.
//!
//! ### 后处理挂钩与双路写出 ✅
//!
//! 类型化的后处理策略接口; 同时给定策略与次级路径时, 额外写出
//! 后处理前的标签体.
//!
//! 实现位于 `seg-berry/src/export`.
//!
//! ### 半精度概率缓存 ✅
//!
//! 重采样后, 塌缩前的逐类概率以 f16 压缩存档 + 元信息 sidecar,
//! 供 ensemble 与重新后处理使用.
//!
//! 实现位于 `seg-berry/src/cache.rs`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private API 提供文档.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 四维索引. 概率体 `(通道, z, h, w)` 寻址会用到.
pub type Idx4d = (usize, usize, usize, usize);

/// 概率体与标签体基础数据结构.
mod data;

pub use data::{LabelVolume, ProbSource, ProbVolume};

pub mod consts;

mod meta;

pub use meta::{CropBbox, SpatialMetadata};

pub mod resample;

mod labeling;

pub use labeling::{collapse_to_label, LabelPolicy};

mod compose;

pub use compose::restore_original_extent;

pub mod cache;

pub mod export;

pub mod prelude;
