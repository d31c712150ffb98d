use crate::Idx2d;
use itertools::iproduct;
use ndarray::ArrayView2;
use ordered_float::NotNan;
use std::cmp::Reverse;
use std::ops::Index;

/// 不可变、借用的二维水平切片.
///
/// 底层按 `(y, x)` 索引; 对外返回的坐标统一为 `(x, y)`.
#[derive(Debug, Clone)]
pub struct AxialSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CenterlineVolume`].
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for AxialSlice<'_> {
    type Output = f32;

    /// 以 `(y, x)` 索引.
    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> AxialSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 获得 **底层** 数据的一份不可变 shallow copy.
    #[inline]
    pub fn array_view(&self) -> ArrayView2<f32> {
        self.data.view()
    }

    /// 切片形状 `(ny, nx)`.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 是否存在前景体素 (值严格大于 0).
    #[inline]
    pub fn has_foreground(&self) -> bool {
        self.data.iter().any(|&v| v > 0.0)
    }

    /// 是否存在严格位于 (0, 1) 之间的体素值, 即概率图体素.
    #[inline]
    pub fn has_fuzzy(&self) -> bool {
        self.data.iter().any(|&v| v > 0.0 && v < 1.0)
    }

    /// 获取最大值体素的 `(x, y)` 坐标. `NaN` 体素被忽略.
    ///
    /// 多个体素同为最大值时, 返回 x 优先序中的第一个.
    /// 如果切片为空或全为 `NaN`, 则返回 `None`.
    pub fn argmax(&self) -> Option<Idx2d> {
        let (ny, nx) = self.shape();
        iproduct!(0..nx, 0..ny)
            .filter_map(|(x, y)| NotNan::new(self.data[(y, x)]).ok().map(|v| ((x, y), v)))
            .min_by_key(|&(_, v)| Reverse(v))
            .map(|(pos, _)| pos)
    }

    /// 计算所有前景体素 (值 `> 0`) 的质心 `(x, y)`.
    ///
    /// 如果不存在前景体素, 则返回 `None`.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let mut count = 0u64;
        let (mut sx, mut sy) = (0.0, 0.0);
        for ((y, x), _) in self.data.indexed_iter().filter(|&(_, &v)| v > 0.0) {
            count += 1;
            sx += x as f64;
            sy += y as f64;
        }
        (count != 0).then(|| (sx / count as f64, sy / count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::AxialSlice;
    use ndarray::Array2;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_empty_slice() {
        let data = Array2::<f32>::zeros((4, 5));
        let s = AxialSlice::new(data.view());
        assert!(!s.has_foreground());
        assert!(!s.has_fuzzy());
        assert_eq!(s.centroid(), None);
        // 全零切片依然有最大值.
        assert_eq!(s.argmax(), Some((0, 0)));
    }

    #[test]
    fn test_centroid() {
        // (y, x)
        let mut data = Array2::<f32>::zeros((4, 5));
        data[(1, 1)] = 1.0;
        data[(1, 3)] = 1.0;
        data[(3, 2)] = 2.0;
        let s = AxialSlice::new(data.view());
        assert!(s.has_foreground());
        assert!(!s.has_fuzzy());
        let (cx, cy) = s.centroid().unwrap();
        assert!(f64_eq(cx, 2.0));
        assert!(f64_eq(cy, 5.0 / 3.0));
    }

    #[test]
    fn test_argmax_ties_are_x_major() {
        let mut data = Array2::<f32>::zeros((4, 5));
        // (y=3, x=1) 与 (y=0, x=2) 同为最大值, x 较小者优先.
        data[(3, 1)] = 0.8;
        data[(0, 2)] = 0.8;
        data[(2, 4)] = 0.3;
        let s = AxialSlice::new(data.view());
        assert!(s.has_fuzzy());
        assert_eq!(s.argmax(), Some((1, 3)));
    }

    #[test]
    fn test_argmax_skips_nan() {
        let mut data = Array2::<f32>::zeros((2, 2));
        data[(0, 0)] = f32::NAN;
        data[(1, 1)] = 0.5;
        let s = AxialSlice::new(data.view());
        assert_eq!(s.argmax(), Some((1, 1)));
    }
}
