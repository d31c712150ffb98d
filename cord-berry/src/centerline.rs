//! 逐层中心线提取.
//!
//! 对每一层水平切片求出一个中心点 `(x_z, y_z)`:
//!
//! 1. 概率图 (存在严格位于 (0, 1) 的体素): 取该层最大值体素;
//! 2. 二值中心线或分割: 取该层所有前景体素的质心.
//!
//! 二者的选择对整个体数据统一进行, 不会逐层切换.

use crate::data::{AxialSlice, CenterlineVolume, NiftiHeaderAttr};
use crate::{CordError, CordResult};
use log::{debug, info};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 每层切片归约为单个中心点的方式.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reduction {
    /// 取最大值体素.
    Argmax,

    /// 取前景体素质心.
    Centroid,
}

impl Reduction {
    /// 根据体数据内容选择归约方式.
    #[inline]
    pub fn detect(volume: &CenterlineVolume) -> Self {
        if volume.is_probabilistic() {
            Reduction::Argmax
        } else {
            Reduction::Centroid
        }
    }

    /// 对单层切片归约. 没有前景体素时返回 `None`.
    pub fn reduce(self, slice: &AxialSlice) -> Option<(f64, f64)> {
        if !slice.has_foreground() {
            return None;
        }
        match self {
            Reduction::Argmax => slice.argmax().map(|(x, y)| (x as f64, y as f64)),
            Reduction::Centroid => slice.centroid(),
        }
    }
}

/// 逐层中心点序列. 第 `i` 个点位于 `z = i` 处.
#[derive(Debug, Clone)]
pub struct Centerline {
    x: Vec<f64>,
    y: Vec<f64>,
    reduction: Option<Reduction>,
}

impl Centerline {
    /// 从体数据中提取中心线.
    ///
    /// # 错误
    ///
    /// 1. 体数据不含前景, 返回 [`CordError::EmptyCenterline`];
    /// 2. 首层、末层、或中间任意一层没有前景, 返回 [`CordError::Coverage`].
    ///    首末两层优先检查.
    pub fn extract(volume: &CenterlineVolume) -> CordResult<Self> {
        let reduction = Self::precheck(volume)?;
        let mut x = Vec::with_capacity(volume.len_z());
        let mut y = Vec::with_capacity(volume.len_z());
        for (z, slice) in volume.slice_iter().enumerate() {
            let (cx, cy) = reduction.reduce(&slice).ok_or(CordError::Coverage {
                slice: z,
                nz: volume.len_z(),
            })?;
            x.push(cx);
            y.push(cy);
        }
        Ok(Self::finish(x, y, reduction))
    }

    /// 直接由逐层中心点创建. `x[i]`, `y[i]` 位于 `z = i` 处.
    ///
    /// 如果 `x` 和 `y` 长度不一致, 则程序 panic.
    pub fn from_points(x: Vec<f64>, y: Vec<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
        Self {
            x,
            y,
            reduction: None,
        }
    }

    /// 点的个数, 即 `nz`.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// 各点 x 坐标.
    #[inline]
    pub fn x(&self) -> &[f64] {
        self.x.as_slice()
    }

    /// 各点 y 坐标.
    #[inline]
    pub fn y(&self) -> &[f64] {
        self.y.as_slice()
    }

    /// 各点 z 坐标, 即 `0, 1, ..., nz - 1`.
    pub fn z(&self) -> Vec<f64> {
        (0..self.len()).map(|z| z as f64).collect()
    }

    /// 提取时使用的归约方式. 手动创建的中心线返回 `None`.
    #[inline]
    pub fn reduction(&self) -> Option<Reduction> {
        self.reduction
    }

    /// 以 `(x, y, z)` 形式迭代所有点.
    pub fn points(&self) -> impl ExactSizeIterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(self.y.iter())
            .enumerate()
            .map(|(z, (&x, &y))| (x, y, z as f64))
    }

    /// 检查空数据与覆盖情况, 并选出归约方式.
    fn precheck(volume: &CenterlineVolume) -> CordResult<Reduction> {
        if !volume.has_foreground() {
            return Err(CordError::EmptyCenterline);
        }
        let nz = volume.len_z();
        let order = [0, nz - 1].into_iter().chain(1..nz.saturating_sub(1));
        for z in order {
            if !volume.slice_at(z).has_foreground() {
                return Err(CordError::Coverage { slice: z, nz });
            }
        }
        let reduction = Reduction::detect(volume);
        debug!("Centerline reduction: {reduction:?}, {nz} slices");
        Ok(reduction)
    }

    fn finish(x: Vec<f64>, y: Vec<f64>, reduction: Reduction) -> Self {
        info!("Extracted centerline with {} points", x.len());
        Self {
            x,
            y,
            reduction: Some(reduction),
        }
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl Centerline {
    /// 借助 `rayon`, 并行地提取中心线. 结果与 [`Centerline::extract`] 完全一致.
    pub fn par_extract(volume: &CenterlineVolume) -> CordResult<Self> {
        let reduction = Self::precheck(volume)?;
        let nz = volume.len_z();
        let points: Vec<Option<(f64, f64)>> = (0..nz)
            .into_par_iter()
            .map(|z| reduction.reduce(&volume.slice_at(z)))
            .collect();

        let mut x = Vec::with_capacity(nz);
        let mut y = Vec::with_capacity(nz);
        for (z, p) in points.into_iter().enumerate() {
            let (cx, cy) = p.ok_or(CordError::Coverage { slice: z, nz })?;
            x.push(cx);
            y.push(cy);
        }
        Ok(Self::finish(x, y, reduction))
    }
}

#[cfg(test)]
mod tests {
    use super::{Centerline, Reduction};
    use crate::{CenterlineVolume, CordError};
    use ndarray::Array3;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    /// `(x, y, z)` 组织的 10x10x5 体数据.
    fn blank() -> Array3<f32> {
        Array3::zeros((10, 10, 5))
    }

    #[test]
    fn test_empty_volume() {
        let v = CenterlineVolume::from_xyz(blank());
        assert!(matches!(
            Centerline::extract(&v),
            Err(CordError::EmptyCenterline)
        ));
    }

    #[test]
    fn test_first_slice_uncovered() {
        let mut data = blank();
        for z in 1..5 {
            data[(4, 4, z)] = 1.0;
        }
        let v = CenterlineVolume::from_xyz(data);
        assert!(matches!(
            Centerline::extract(&v),
            Err(CordError::Coverage { slice: 0, nz: 5 })
        ));
    }

    #[test]
    fn test_boundary_checked_before_interior() {
        let mut data = blank();
        // 第 2 层和第 4 层 (末层) 都缺失, 应报告末层.
        for z in [0, 1, 3] {
            data[(4, 4, z)] = 1.0;
        }
        let v = CenterlineVolume::from_xyz(data);
        assert!(matches!(
            Centerline::extract(&v),
            Err(CordError::Coverage { slice: 4, nz: 5 })
        ));
    }

    #[test]
    fn test_interior_gap() {
        let mut data = blank();
        for z in [0, 1, 3, 4] {
            data[(4, 4, z)] = 1.0;
        }
        let v = CenterlineVolume::from_xyz(data);
        assert!(matches!(
            Centerline::extract(&v),
            Err(CordError::Coverage { slice: 2, nz: 5 })
        ));
    }

    #[test]
    fn test_binary_centroid() {
        let mut data = blank();
        for z in 0..5 {
            data[(2, 6, z)] = 1.0;
            data[(4, 6, z)] = 1.0;
            data[(3, 3, z)] = 1.0;
        }
        let v = CenterlineVolume::from_xyz(data);
        let c = Centerline::extract(&v).unwrap();
        assert_eq!(c.reduction(), Some(Reduction::Centroid));
        assert_eq!(c.len(), 5);
        for (x, y, z) in c.points() {
            assert!(f64_eq(x, 3.0));
            assert!(f64_eq(y, 5.0));
            assert!(z >= 0.0 && z < 5.0);
        }
    }

    #[test]
    fn test_probabilistic_argmax() {
        let mut data = blank();
        for z in 0..5 {
            data[(1, 1, z)] = 0.2;
            data[(7, z, z)] = 0.9;
        }
        let v = CenterlineVolume::from_xyz(data);
        let c = Centerline::extract(&v).unwrap();
        assert_eq!(c.reduction(), Some(Reduction::Argmax));
        for z in 0..5 {
            assert!(f64_eq(c.x()[z], 7.0));
            assert!(f64_eq(c.y()[z], z as f64));
        }
    }

    /// 只要存在一个模糊体素, 所有切片都按最大值点归约.
    #[test]
    fn test_reduction_is_global() {
        let mut data = blank();
        for z in 0..5 {
            data[(2, 2, z)] = 1.0;
            data[(6, 2, z)] = 1.0;
        }
        data[(8, 8, 4)] = 0.5;
        let v = CenterlineVolume::from_xyz(data);
        let c = Centerline::extract(&v).unwrap();
        assert_eq!(c.reduction(), Some(Reduction::Argmax));
        // 两个最大值体素, x 较小者优先.
        assert!(f64_eq(c.x()[0], 2.0));
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_extract_matches() {
        let mut data = blank();
        for z in 0..5 {
            data[(z, 9 - z, z)] = 1.0;
            data[(z + 1, 9 - z, z)] = 1.0;
        }
        let v = CenterlineVolume::from_xyz(data);
        let a = Centerline::extract(&v).unwrap();
        let b = Centerline::par_extract(&v).unwrap();
        assert_eq!(a.x(), b.x());
        assert_eq!(a.y(), b.y());
    }
}
