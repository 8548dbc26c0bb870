//! 将标签体放回裁剪前的原始体积范围.

use ndarray::{s, Array3};

use crate::consts::BACKGROUND;
use crate::meta::CropBbox;
use crate::Idx3d;

/// 依据裁剪包围盒将标签体放回裁剪前的原始范围.
///
/// `bbox` 为 `None` 时, 标签体本身已覆盖完整原始范围, 原样返回.
/// 否则分配一个 `original_size` 大小的全背景体, 把标签体粘贴到包围盒
/// 所在位置. 包围盒各轴的上界按 `min(start + 标签形状, 原始形状)` 重算,
/// 粘贴不到的区域保持背景.
pub fn restore_original_extent(
    label: Array3<u8>,
    original_size: Idx3d,
    bbox: Option<&CropBbox>,
) -> Array3<u8> {
    let Some(bbox) = bbox else {
        return label;
    };

    let mut out = Array3::from_elem(original_size, BACKGROUND);
    let b = bbox.clipped_to(label.dim(), original_size);
    let extent = [b[0][1] - b[0][0], b[1][1] - b[1][0], b[2][1] - b[2][0]];

    // 重算后的区间不会超过标签体形状, 但可能更小 (包围盒越过原始边界),
    // 因此粘贴源同样按区间长度截取.
    let src = label.slice(s![..extent[0], ..extent[1], ..extent[2]]);
    out.slice_mut(s![b[0][0]..b[0][1], b[1][0]..b[1][1], b[2][0]..b[2][1]])
        .assign(&src);
    out
}

#[cfg(test)]
mod tests {
    use super::restore_original_extent;
    use crate::consts::BACKGROUND;
    use crate::meta::CropBbox;
    use ndarray::Array3;

    #[test]
    fn test_no_bbox_passthrough() {
        let label = Array3::from_elem((2, 3, 4), 1u8);
        let out = restore_original_extent(label.clone(), (2, 3, 4), None);
        assert_eq!(out, label);
    }

    /// 上界记录为 20 的包围盒越过 10^3 的原始范围: 粘贴被收拢,
    /// 不越界也不回绕.
    #[test]
    fn test_overflowing_bbox_is_clipped() {
        let label = Array3::from_elem((5, 5, 5), 1u8);
        let bbox = CropBbox::new([[5, 20], [0, 5], [0, 5]]);
        let out = restore_original_extent(label, (10, 10, 10), Some(&bbox));

        assert_eq!(out.dim(), (10, 10, 10));
        for ((z, h, w), &v) in out.indexed_iter() {
            let inside = (5..10).contains(&z) && h < 5 && w < 5;
            if inside {
                assert_eq!(v, 1);
            } else {
                assert_eq!(v, BACKGROUND);
            }
        }
    }

    /// 包围盒整体落在内部时按原位粘贴, 其余区域保持背景.
    #[test]
    fn test_interior_bbox() {
        let mut label = Array3::from_elem((2, 2, 2), 0u8);
        label[(0, 0, 0)] = 2;
        label[(1, 1, 1)] = 1;
        let bbox = CropBbox::new([[1, 3], [2, 4], [3, 5]]);
        let out = restore_original_extent(label, (6, 6, 6), Some(&bbox));

        assert_eq!(out[(1, 2, 3)], 2);
        assert_eq!(out[(2, 3, 4)], 1);
        assert_eq!(out.iter().filter(|&&v| v != BACKGROUND).count(), 2);
    }

    /// 标签体比记录区间长时, 有效区间由标签形状重算得到.
    #[test]
    fn test_label_longer_than_recorded_range() {
        let label = Array3::from_elem((4, 2, 2), 1u8);
        // 记录的 z 区间只有 3 层, 但标签体有 4 层.
        let bbox = CropBbox::new([[0, 3], [0, 2], [0, 2]]);
        let out = restore_original_extent(label, (6, 2, 2), Some(&bbox));
        assert_eq!(out.iter().filter(|&&v| v == 1).count(), 4 * 2 * 2);
    }
}
