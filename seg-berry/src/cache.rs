//! 重采样概率的半精度缓存.
//!
//! 在概率体塌缩为离散标签 **之前**, 可以把重采样后的逐类概率以 f16
//! 压缩存档. 后续的模型 ensemble 或重新后处理可以直接读取存档,
//! 不必重新运行推理. 空间元信息以同名 sidecar 文件保存在存档旁边.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use half::f16;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::data::ProbVolume;
use crate::meta::SpatialMetadata;
use crate::Idx3d;

/// 缓存读写错误.
#[derive(Debug)]
pub enum CacheError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// bincode 编解码错误.
    Codec(bincode::Error),

    /// 存档记录的形状与数据长度不一致.
    CorruptShape,
}

/// 存档的内部编码: 形状与 f16 位模式.
#[derive(Serialize, Deserialize)]
struct Payload {
    channels: usize,
    spatial: Idx3d,
    /// 概率按行优先序展开后的 f16 位模式.
    bits: Vec<u16>,
}

/// 由存档路径导出 sidecar 元信息文件路径 (扩展名替换为 `.meta`).
pub fn sidecar_path(archive: &Path) -> PathBuf {
    archive.with_extension("meta")
}

/// 将概率体以 f16 写入 gzip 压缩存档, 并写出元信息 sidecar.
///
/// # 注意
///
/// 必须在标签塌缩之前调用, 以保证缓存保留逐类概率而非离散标签.
pub fn store_probs(
    archive: &Path,
    probs: &ProbVolume,
    meta: &SpatialMetadata,
) -> Result<(), CacheError> {
    let payload = Payload {
        channels: probs.channels(),
        spatial: probs.spatial_shape(),
        bits: probs
            .data()
            .iter()
            .map(|&p| f16::from_f32(p).to_bits())
            .collect(),
    };

    let file = File::create(archive).map_err(CacheError::Io)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    bincode::serialize_into(&mut encoder, &payload).map_err(CacheError::Codec)?;
    encoder.finish().map_err(CacheError::Io)?;

    let sidecar = File::create(sidecar_path(archive)).map_err(CacheError::Io)?;
    bincode::serialize_into(BufWriter::new(sidecar), meta).map_err(CacheError::Codec)
}

/// 读取存档与 sidecar, 还原为 f32 概率体与元信息.
pub fn load_probs(archive: &Path) -> Result<(ProbVolume, SpatialMetadata), CacheError> {
    let file = File::open(archive).map_err(CacheError::Io)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let payload: Payload = bincode::deserialize_from(decoder).map_err(CacheError::Codec)?;

    let (z, h, w) = payload.spatial;
    if payload.bits.len() != payload.channels * z * h * w {
        return Err(CacheError::CorruptShape);
    }
    let data: Vec<f32> = payload
        .bits
        .into_iter()
        .map(|b| f16::from_bits(b).to_f32())
        .collect();
    // 长度已校验, 该操作不会生成 `Err`, 可直接 unwrap.
    let data = Array4::from_shape_vec((payload.channels, z, h, w), data).unwrap();

    let sidecar = File::open(sidecar_path(archive)).map_err(CacheError::Io)?;
    let meta = bincode::deserialize_from(BufReader::new(sidecar)).map_err(CacheError::Codec)?;

    Ok((ProbVolume::new(data), meta))
}
