//! 导出流程: 把一个病例的概率体还原为原始采集空间的标签 nifti.
//!
//! 流程依次为: 取得概率体 -> 重采样回裁剪后形状 -> (可选) 概率缓存 ->
//! 标签塌缩 -> 放回裁剪前原始范围 -> (可选) 后处理 -> 写出.

mod error;

pub use error::{ExportError, ExportResult};

use std::path::{Path, PathBuf};

use crate::cache;
use crate::compose::restore_original_extent;
use crate::data::{LabelVolume, ProbSource, ProbVolume};
use crate::labeling::{collapse_to_label, LabelPolicy};
use crate::meta::SpatialMetadata;
use crate::resample::{resample_probs, InterpOrder, ResamplePlan};

/// 后处理策略. 在写出前对还原后的标签体实施一次变换.
///
/// 策略所需的全部参数由实现类型自行携带 (作为字段), 导出流程不对其做
/// 任何解释. 策略收到的是标签体的一份拷贝, 返回形状兼容的新标签体.
pub trait PostProcess {
    /// 对标签体实施变换.
    fn apply(&self, label: LabelVolume) -> LabelVolume;
}

impl<F> PostProcess for F
where
    F: Fn(LabelVolume) -> LabelVolume,
{
    #[inline]
    fn apply(&self, label: LabelVolume) -> LabelVolume {
        self(label)
    }
}

/// 导出选项. 每个字段都有明确语义与默认值, 在流程启动时统一校验一次.
pub struct ExportOptions<'a> {
    /// 重采样插值阶. 默认为线性.
    pub order: InterpOrder,

    /// 重采样越界填充值. 默认为 0.
    pub cval: f32,

    /// 标签塌缩策略. 默认为互斥模式.
    pub policy: LabelPolicy,

    /// 后处理策略. `None` 代表不做后处理.
    pub postprocess: Option<&'a dyn PostProcess>,

    /// 重采样概率缓存的存档路径. `None` 代表不缓存.
    pub prob_cache: Option<PathBuf>,

    /// 后处理前标签体的次级输出路径.
    ///
    /// 仅当同时给定了后处理策略时才会写出; 没有后处理时,
    /// 次级输出与主输出没有任何差别, 不会重复写文件.
    pub raw_label_out: Option<PathBuf>,
}

impl Default for ExportOptions<'_> {
    fn default() -> Self {
        Self {
            order: InterpOrder::Linear,
            cval: 0.0,
            policy: LabelPolicy::Exclusive,
            postprocess: None,
            prob_cache: None,
            raw_label_out: None,
        }
    }
}

impl ExportOptions<'_> {
    /// 校验选项与概率体通道数是否匹配.
    fn validate(&self, channels: usize) -> ExportResult<()> {
        match &self.policy {
            LabelPolicy::Exclusive => {
                if !self.policy.matches_channels(channels) {
                    return Err(ExportError::TooManyChannels(channels));
                }
            }
            LabelPolicy::Regions(order) => {
                if order.len() != channels {
                    return Err(ExportError::RegionOrderMismatch {
                        channels,
                        classes: order.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// 将一个病例的概率体还原为原始采集空间的标签体并写为 nifti 文件.
///
/// # 参数
///
/// 1. `probs`: 概率体来源. 文件形式的来源在读入后即被删除, 见
///    [`ProbSource::acquire`].
/// 2. `out`: 主输出路径. 始终写出 (后处理过的, 或未做后处理的) 标签体.
/// 3. `meta`: 病例空间元信息, 只读.
/// 4. `opts`: 导出选项.
///
/// # 注意
///
/// 同一流程内没有任何并发; 不同病例的输出路径互不相同,
/// 调用方可以放心地对多个病例并行调用.
pub fn store_label_from_probs<P: AsRef<Path>>(
    probs: ProbSource,
    out: P,
    meta: &SpatialMetadata,
    opts: &ExportOptions<'_>,
) -> ExportResult<()> {
    StoreImp {
        probs: probs.acquire()?,
        out: out.as_ref(),
        meta,
        opts,
    }
    .run()
}

/// `store_label_from_probs` 的实现细节.
struct StoreImp<'a> {
    probs: ProbVolume,
    out: &'a Path,
    meta: &'a SpatialMetadata,
    opts: &'a ExportOptions<'a>,
}

impl StoreImp<'_> {
    fn run(self) -> ExportResult<()> {
        let Self {
            probs,
            out,
            meta,
            opts,
        } = self;
        opts.validate(probs.channels())?;

        // 先重采样, 再放入裁剪包围盒, 最后写出.
        let target = meta.size_after_cropping;
        let resampled = if probs.spatial_shape() == target {
            // 快速路径: 形状已一致, 不触碰任何插值.
            probs
        } else {
            let plan = ResamplePlan::decide(meta.original_spacing, meta.spacing_after_resampling);
            log::debug!("重采样方案: {plan:?}, 目标形状: {target:?}");
            ProbVolume::new(resample_probs(
                probs.data(),
                target,
                plan,
                opts.order,
                opts.cval,
            ))
        };
        if resampled.spatial_shape() != target {
            return Err(ExportError::ShapeMismatch {
                got: resampled.spatial_shape(),
                expected: target,
            });
        }

        // 概率缓存必须先于标签塌缩, 缓存里保留的是逐类概率.
        if let Some(archive) = &opts.prob_cache {
            cache::store_probs(archive, &resampled, meta).map_err(ExportError::Cache)?;
        }

        let collapsed = collapse_to_label(resampled.data(), &opts.policy);
        let restored = LabelVolume::new(restore_original_extent(
            collapsed,
            meta.original_size_of_raw_data,
            meta.crop_bbox.as_ref(),
        ));

        match opts.postprocess {
            Some(hook) => {
                // 后处理收到的是拷贝, 原标签体保留用于次级输出.
                let processed = hook.apply(restored.clone());
                processed.save_nifti(out, meta).map_err(ExportError::Nifti)?;
                if let Some(raw_out) = &opts.raw_label_out {
                    restored
                        .save_nifti(raw_out, meta)
                        .map_err(ExportError::Nifti)?;
                }
            }
            None => restored.save_nifti(out, meta).map_err(ExportError::Nifti)?,
        }

        log::info!("标签体已写出: {}", out.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{store_label_from_probs, ExportError, ExportOptions, PostProcess};
    use crate::cache;
    use crate::consts::{is_foreground, BACKGROUND};
    use crate::data::{LabelVolume, ProbSource, ProbVolume};
    use crate::labeling::LabelPolicy;
    use crate::meta::{identity_meta, CropBbox};
    use ndarray::{Array3, Array4};
    use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
    use std::path::{Path, PathBuf};

    fn init_logger() {
        let _ = simple_logger::SimpleLogger::new().init();
    }

    fn tmp(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    /// 按写出的逆方向读回标签体: [W, H, z] -> [z, H, W].
    fn read_label(path: &Path) -> Array3<u8> {
        let obj = ReaderOptions::new().read_file(path).unwrap();
        let data = obj
            .into_volume()
            .into_ndarray::<u8>()
            .unwrap()
            .permuted_axes([2, 1, 0].as_slice());
        let shape = (data.shape()[0], data.shape()[1], data.shape()[2]);
        Array3::from_shape_vec(shape, data.iter().copied().collect()).unwrap()
    }

    /// 两通道概率体: 右半部分通道 1 概率更大.
    fn two_class_probs(shape: (usize, usize, usize)) -> Array4<f32> {
        Array4::from_shape_fn((2, shape.0, shape.1, shape.2), |(c, _, _, w)| {
            let fg = (w >= shape.2 / 2) as u8 as f32;
            if c == 1 {
                0.2 + 0.6 * fg
            } else {
                0.8 - 0.6 * fg
            }
        })
    }

    /// 形状一致且无裁剪时, 输出等于概率体的逐体素 argmax, 不经过插值.
    #[test]
    fn test_identity_case_matches_argmax() {
        init_logger();
        let out = tmp("seg_berry_test_identity.nii");
        let probs = two_class_probs((2, 4, 4));
        let meta = identity_meta((2, 4, 4), (2, 4, 4), None);

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(probs.clone())),
            &out,
            &meta,
            &ExportOptions::default(),
        )
        .unwrap();

        let label = read_label(&out);
        for ((z, h, w), &v) in label.indexed_iter() {
            let expect = (probs[(1, z, h, w)] > probs[(0, z, h, w)]) as u8;
            assert_eq!(v, expect);
        }
        std::fs::remove_file(&out).ok();
    }

    /// 带裁剪包围盒的病例: 标签体尺寸为原始尺寸, 包围盒外全为背景.
    #[test]
    fn test_bbox_case_restores_original_extent() {
        let out = tmp("seg_berry_test_bbox.nii");
        let probs = Array4::from_shape_fn((2, 2, 2, 2), |(c, ..)| if c == 1 { 0.9 } else { 0.1 });
        let meta = identity_meta(
            (2, 2, 2),
            (4, 4, 4),
            Some(CropBbox::new([[1, 3], [2, 4], [0, 2]])),
        );

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(probs)),
            &out,
            &meta,
            &ExportOptions::default(),
        )
        .unwrap();

        let label = read_label(&out);
        assert_eq!(label.dim(), (4, 4, 4));
        for ((z, h, w), &v) in label.indexed_iter() {
            let inside = (1..3).contains(&z) && (2..4).contains(&h) && w < 2;
            assert_eq!(v, if inside { 1 } else { BACKGROUND });
        }
        std::fs::remove_file(&out).ok();
    }

    /// 后处理 + 次级输出: 写出两个文件, 且在被后处理修改处不同.
    #[test]
    fn test_dual_output_with_hook() {
        let out = tmp("seg_berry_test_dual_post.nii");
        let raw_out = tmp("seg_berry_test_dual_raw.nii");
        let probs = two_class_probs((2, 4, 4));
        let meta = identity_meta((2, 4, 4), (2, 4, 4), None);

        // 把全部前景改写为类别 7 的简单后处理.
        let hook = |label: LabelVolume| {
            let mut data = label.into_inner();
            data.iter_mut().filter(|v| **v != 0).for_each(|v| *v = 7);
            LabelVolume::new(data)
        };
        let opts = ExportOptions {
            postprocess: Some(&hook),
            raw_label_out: Some(raw_out.clone()),
            ..Default::default()
        };

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(probs)),
            &out,
            &meta,
            &opts,
        )
        .unwrap();

        let processed = read_label(&out);
        let raw = read_label(&raw_out);
        assert!(processed.iter().any(|&v| v == 7));
        assert!(raw.iter().all(|&v| v <= 1));
        // 两个文件在被后处理修改过的前景处不同, 前景体素总数一致.
        assert_eq!(
            processed.iter().filter(|&&v| is_foreground(v)).count(),
            raw.iter().filter(|&&v| is_foreground(v)).count()
        );
        assert!(processed
            .iter()
            .zip(raw.iter())
            .all(|(&p, &r)| (p == r) == !is_foreground(r)));

        std::fs::remove_file(&out).ok();
        std::fs::remove_file(&raw_out).ok();
    }

    /// 给了次级输出路径但没有后处理: 只写主输出.
    #[test]
    fn test_secondary_path_without_hook_writes_once() {
        let out = tmp("seg_berry_test_single_out.nii");
        let raw_out = tmp("seg_berry_test_single_raw.nii");
        let meta = identity_meta((2, 4, 4), (2, 4, 4), None);
        let opts = ExportOptions {
            raw_label_out: Some(raw_out.clone()),
            ..Default::default()
        };

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(two_class_probs((2, 4, 4)))),
            &out,
            &meta,
            &opts,
        )
        .unwrap();

        assert!(out.is_file());
        assert!(!raw_out.exists());
        std::fs::remove_file(&out).ok();
    }

    /// region 顺序与通道数不符时, 在触碰任何文件之前报错.
    #[test]
    fn test_region_order_mismatch() {
        let out = tmp("seg_berry_test_mismatch.nii");
        let meta = identity_meta((2, 4, 4), (2, 4, 4), None);
        let opts = ExportOptions {
            policy: LabelPolicy::Regions(vec![1, 2, 3]),
            ..Default::default()
        };

        let err = store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(two_class_probs((2, 4, 4)))),
            &out,
            &meta,
            &opts,
        )
        .unwrap_err();

        match err {
            ExportError::RegionOrderMismatch { channels, classes } => {
                assert_eq!((channels, classes), (2, 3));
            }
            other => panic!("期望 RegionOrderMismatch, 但得到 {other:?}"),
        }
        assert!(!out.exists());
    }

    /// region 模式全流程: 重叠处列表靠后的类别胜出.
    #[test]
    fn test_region_mode_pipeline() {
        let out = tmp("seg_berry_test_region.nii.gz");
        let mut probs = Array4::from_elem((2, 2, 2, 2), 0.0f32);
        // 通道 0 (类别 1) 覆盖整个体积, 通道 1 (类别 2) 只覆盖 z = 1.
        probs.slice_mut(ndarray::s![0, .., .., ..]).fill(0.9);
        probs.slice_mut(ndarray::s![1, 1, .., ..]).fill(0.8);
        let meta = identity_meta((2, 2, 2), (2, 2, 2), None);
        let opts = ExportOptions {
            policy: LabelPolicy::Regions(vec![1, 2]),
            ..Default::default()
        };

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(probs)),
            &out,
            &meta,
            &opts,
        )
        .unwrap();

        let label = read_label(&out);
        for ((z, _, _), &v) in label.indexed_iter() {
            assert_eq!(v, if z == 1 { 2 } else { 1 });
        }
        std::fs::remove_file(&out).ok();
    }

    /// 概率缓存: 先于塌缩写出, 可读回并与重采样结果一致 (f16 精度内).
    #[test]
    fn test_prob_cache_written_before_collapse() {
        let out = tmp("seg_berry_test_cached.nii");
        let archive = tmp("seg_berry_test_cached.prob.gz");
        // 概率体是 (2, 2, 2) 的降采样表示, 导出时放大回 (2, 4, 4).
        let small = two_class_probs((2, 2, 2));
        let meta = identity_meta((2, 4, 4), (2, 4, 4), None);
        let opts = ExportOptions {
            prob_cache: Some(archive.clone()),
            ..Default::default()
        };

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(small)),
            &out,
            &meta,
            &opts,
        )
        .unwrap();

        let (cached, cached_meta) = cache::load_probs(&archive).unwrap();
        // 缓存的是重采样后的概率, 不是离散标签.
        assert_eq!(cached.channels(), 2);
        assert_eq!(cached.spatial_shape(), (2, 4, 4));
        assert_eq!(cached_meta.size_after_cropping, (2, 4, 4));
        assert!(cached.data().iter().any(|&p| p > 0.0 && p < 1.0));

        std::fs::remove_file(&out).ok();
        std::fs::remove_file(&archive).ok();
        std::fs::remove_file(cache::sidecar_path(&archive)).ok();
    }

    /// 不同病例的导出可以并行进行, 互不干扰.
    #[test]
    fn test_concurrent_cases() {
        let workers = num_cpus::get().clamp(2, 4);
        let pool = threadpool::ThreadPool::new(workers);
        let (tx, rx) = std::sync::mpsc::channel();

        for case in 0..8u32 {
            let tx = tx.clone();
            pool.execute(move || {
                let out = tmp(&format!("seg_berry_test_case_{case}.nii"));
                let meta = identity_meta((2, 4, 4), (2, 4, 4), None);
                let result = store_label_from_probs(
                    ProbSource::InMemory(ProbVolume::new(two_class_probs((2, 4, 4)))),
                    &out,
                    &meta,
                    &ExportOptions::default(),
                );
                std::fs::remove_file(&out).ok();
                tx.send(result.is_ok()).unwrap();
            });
        }
        drop(tx);

        let oks: Vec<bool> = rx.iter().collect();
        assert_eq!(oks.len(), 8);
        assert!(oks.into_iter().all(|ok| ok));
    }

    /// 自定义后处理策略类型: 参数作为字段携带.
    #[test]
    fn test_postprocess_strategy_struct() {
        /// 把给定类别整体抹为背景的策略.
        struct DropClass {
            class: u8,
        }

        impl PostProcess for DropClass {
            fn apply(&self, label: LabelVolume) -> LabelVolume {
                let mut data = label.into_inner();
                data.iter_mut().filter(|v| **v == self.class).for_each(|v| *v = 0);
                LabelVolume::new(data)
            }
        }

        let out = tmp("seg_berry_test_strategy.nii");
        let meta = identity_meta((2, 4, 4), (2, 4, 4), None);
        let strategy = DropClass { class: 1 };
        let opts = ExportOptions {
            postprocess: Some(&strategy),
            ..Default::default()
        };

        store_label_from_probs(
            ProbSource::InMemory(ProbVolume::new(two_class_probs((2, 4, 4)))),
            &out,
            &meta,
            &opts,
        )
        .unwrap();

        let label = read_label(&out);
        assert!(label.iter().all(|&v| v == 0));
        std::fs::remove_file(&out).ok();
    }
}
