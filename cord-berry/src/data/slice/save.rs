//! 图像的持久化存储.

use crate::consts::{gray::*, BACKGROUND_ID};
use crate::{LandmarkId, LandmarkVolume};
use image::ImageResult;
use ndarray::{Array2, Axis};
use std::path::Path;

/// 最大强度投影的方向.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionAxis {
    /// 沿 y 方向投影, 得到 `(z, x)` 冠状面图像.
    Coronal,

    /// 沿 x 方向投影, 得到 `(z, y)` 矢状面图像.
    Sagittal,
}

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 地标体数据中只有少量非零 id, 按原样保存几乎看不见;
/// 保存时会投影到二维并映射到肉眼较易能区分的灰度.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将投影图片保存到 `path` 路径.
    fn save_projection<P: AsRef<Path>>(&self, path: P, axis: ProjectionAxis) -> ImageResult<()>;
}

/// 使地标 id 更有利于单通道可视化. 背景为黑色, 地标按 id 在暗灰色到白色之间渐变.
#[inline]
pub(crate) fn pretty(id: LandmarkId, max_id: LandmarkId) -> u8 {
    if id == BACKGROUND_ID || max_id == BACKGROUND_ID {
        return BLACK;
    }
    let span = (WHITE - DARK_GRAY) as f64;
    DARK_GRAY + (span * id as f64 / max_id as f64).round() as u8
}

impl ImgWriteVis for LandmarkVolume {
    fn save_projection<P: AsRef<Path>>(&self, path: P, axis: ProjectionAxis) -> ImageResult<()> {
        // 数据按 (z, y, x) 存储.
        let axis_index = match axis {
            ProjectionAxis::Coronal => Axis(1),
            ProjectionAxis::Sagittal => Axis(2),
        };
        let mip: Array2<LandmarkId> = self
            .data()
            .map_axis(axis_index, |lane| lane.iter().copied().max().unwrap_or(BACKGROUND_ID));
        let max_id = mip.iter().copied().max().unwrap_or(BACKGROUND_ID);

        let (nz, width) = mip.dim();
        let mut buf = image::GrayImage::new(width as u32, nz as u32);
        for ((z, w), &id) in mip.indexed_iter() {
            // 头侧 (z 较大) 在图像上方.
            let row = (nz - 1 - z) as u32;
            buf.put_pixel(w as u32, row, image::Luma([pretty(id, max_id)]));
        }
        buf.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::pretty;
    use crate::consts::gray::*;

    #[test]
    fn test_pretty_range() {
        assert_eq!(pretty(0, 10), BLACK);
        assert_eq!(pretty(3, 0), BLACK);
        assert_eq!(pretty(10, 10), WHITE);
        let mid = pretty(5, 10);
        assert!(mid > DARK_GRAY && mid < WHITE);
    }
}
