//! 将地标十字写入填充后的整数体数据.

use super::{CrossPoint, LandmarkSeries};
use crate::{CordResult, LandmarkId, LandmarkVolume, NiftiHeaderAttr};
use log::warn;
use nalgebra::Point3;
use nifti::NiftiHeader;

/// 每个地标点写成边长为 3 的立方块.
const STAMP_RADIUS: i64 = 1;

/// 栅格化结果统计.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterReport {
    /// 实际写入的体素个数.
    pub written: usize,

    /// 整个立方块都落在填充网格之外而被丢弃的点.
    pub dropped: Vec<(LandmarkId, CrossPoint, Point3<f64>)>,

    /// 写入后又被其他点完全覆盖, 最终没有留下任何体素的 id.
    pub overwritten: Vec<LandmarkId>,
}

impl RasterReport {
    /// 是否每个 id 都在体数据中留下了体素.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty() && self.overwritten.is_empty()
    }

    /// 丢失的 id 总数.
    #[inline]
    pub fn lost(&self) -> usize {
        self.dropped.len() + self.overwritten.len()
    }
}

impl LandmarkSeries {
    /// 以未填充体数据的 header `reference` 为参考, 创建填充 `padding` 个体素的地标体数据,
    /// 并将每个点四舍五入后写成 3x3x3 立方块, 体素值为该点的 id.
    ///
    /// 立方块超出网格的部分被裁剪; 相邻立方块重叠时, id 较大者覆盖较小者.
    /// 完全落在网格外或被完全覆盖的 id 记录在报告中.
    ///
    /// 填充后的网格超出 nifti 尺寸上限时返回 [`crate::CordError::Config`].
    pub fn rasterize(
        &self,
        reference: &NiftiHeader,
        padding: usize,
    ) -> CordResult<(LandmarkVolume, RasterReport)> {
        let mut volume = LandmarkVolume::blank(reference, padding)?;
        let mut report = RasterReport::default();
        let pad = padding as i64;

        let mut stamped = vec![];
        for (id, which, p) in self.enumerate_points() {
            let (x, y, z) = (p.x.round() as i64, p.y.round() as i64, p.z.round() as i64);
            let written = volume.stamp((z + pad, y + pad, x + pad), STAMP_RADIUS, id);
            if written == 0 {
                warn!("Landmark {id} ({which:?}) at {p:?} falls outside the padded grid");
                report.dropped.push((id, which, p));
            } else {
                stamped.push(id);
            }
            report.written += written;
        }

        let present = volume.ids();
        for id in stamped {
            if present.binary_search(&id).is_err() {
                warn!("Landmark {id} is completely covered by later landmarks");
                report.overwritten.push(id);
            }
        }
        Ok((volume, report))
    }
}

/// 检查两个地标体数据能否作为配准对应关系: 形状相同, 且出现的 id 集合完全一致.
pub fn is_paired(curved: &LandmarkVolume, straight: &LandmarkVolume) -> bool {
    curved.shape() == straight.shape() && curved.ids() == straight.ids()
}
