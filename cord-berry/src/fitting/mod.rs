//! 曲线拟合.
//!
//! 给定一系列逐层中心线点 `(x_z, y_z)`, 该模块以 z 为参数拟合出三维曲线
//! `(X(z), Y(z), z)`, 并在原 `nz` 个 z 值处给出拟合坐标与一阶导数.

use crate::centerline::Centerline;
use crate::CordResult;
use itertools::izip;
use nalgebra::{Point3, Vector3};

mod cubic_spline;
mod polynomial;

pub use cubic_spline::SplineFitter;
pub use polynomial::PolynomialFitter;

/// 曲线类型.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CurveType {
    /// 多项式.
    Polynomial {
        /// 多项式的次数.
        degree: u32,
    },

    /// 三次 B 样条逼近曲线.
    Spline,
}

impl CurveType {
    /// 获取对应的拟合策略. `dense_samples` 为拟合曲线内部稠密采样的最少点数.
    pub fn fitter(self, dense_samples: u32) -> Box<dyn CurveFitter> {
        match self {
            CurveType::Polynomial { degree } => Box::new(PolynomialFitter::new(degree, dense_samples)),
            CurveType::Spline => Box::new(SplineFitter::new(dense_samples)),
        }
    }
}

/// 曲线拟合策略.
///
/// 新的拟合方法只需实现该 trait, 地标构建部分无需改动.
pub trait CurveFitter {
    /// 策略名称, 用于日志.
    fn name(&self) -> &'static str;

    /// 拟合 `centerline`, 并在每个原始 z 值处求值与求导.
    fn fit(&self, centerline: &Centerline) -> CordResult<FittedCurve>;
}

/// 拟合得到的三维曲线, 已重新采样到原来的 `nz` 个离散 z 值上.
///
/// 索引模式为 `(x, y, z)`.
#[derive(Debug, Clone)]
pub struct FittedCurve {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    dx: Vec<f64>,
    dy: Vec<f64>,
    dz: Vec<f64>,

    /// 稠密采样的曲线点, 仅用于计算曲线长度等统计量.
    dense: Vec<Point3<f64>>,
}

impl FittedCurve {
    /// 由逐层拟合点 `points` 与对应的一阶导数 `tangents` 直接构建.
    ///
    /// `dense` 为稠密采样的曲线点; 为空时以 `points` 代替.
    /// 如果 `points` 与 `tangents` 长度不一致, 则程序 panic.
    pub fn from_samples(
        points: &[Point3<f64>],
        tangents: &[Vector3<f64>],
        dense: Vec<Point3<f64>>,
    ) -> Self {
        assert_eq!(points.len(), tangents.len(), "拟合点和导数必须一一对应");
        let dense = if dense.is_empty() {
            points.to_vec()
        } else {
            dense
        };
        Self {
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            z: points.iter().map(|p| p.z).collect(),
            dx: tangents.iter().map(|t| t.x).collect(),
            dy: tangents.iter().map(|t| t.y).collect(),
            dz: tangents.iter().map(|t| t.z).collect(),
            dense,
        }
    }

    /// 采样点个数, 即 `nz`.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// 是否不含任何采样点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// 拟合点 x 坐标.
    #[inline]
    pub fn x(&self) -> &[f64] {
        self.x.as_slice()
    }

    /// 拟合点 y 坐标.
    #[inline]
    pub fn y(&self) -> &[f64] {
        self.y.as_slice()
    }

    /// 拟合点 z 坐标.
    #[inline]
    pub fn z(&self) -> &[f64] {
        self.z.as_slice()
    }

    /// 第 `i` 个拟合点. 越界时 panic.
    #[inline]
    pub fn point(&self, i: usize) -> Point3<f64> {
        Point3::new(self.x[i], self.y[i], self.z[i])
    }

    /// 第 `i` 个拟合点处的一阶导数 `(X', Y', Z')`. 越界时 panic.
    #[inline]
    pub fn tangent(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.dx[i], self.dy[i], self.dz[i])
    }

    /// 稠密采样的曲线点.
    #[inline]
    pub fn dense(&self) -> &[Point3<f64>] {
        self.dense.as_slice()
    }

    /// 根据稠密采样计算曲线长度 (单位: 体素).
    pub fn arc_length(&self) -> f64 {
        self.dense
            .windows(2)
            .map(|w| nalgebra::distance(&w[0], &w[1]))
            .sum()
    }

    /// 拟合点相对原中心线点的最大水平偏差.
    pub fn max_residual(&self, centerline: &Centerline) -> f64 {
        izip!(&self.x, &self.y, centerline.x(), centerline.y())
            .map(|(fx, fy, cx, cy)| ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::{CurveType, FittedCurve};
    use crate::centerline::Centerline;
    use nalgebra::{Point3, Vector3};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// 沿 z 的直线用两种方法拟合都应原样返回.
    #[test]
    fn test_straight_line_round_trip() {
        let nz = 30;
        let c = Centerline::from_points(vec![4.5; nz], vec![7.25; nz]);
        for ty in [CurveType::Spline, CurveType::Polynomial { degree: 10 }] {
            let curve = ty.fitter(1000).fit(&c).unwrap();
            assert_eq!(curve.len(), nz);
            for i in 0..nz {
                let p = curve.point(i);
                assert!(f64_eq(p.x, 4.5), "{ty:?}: x[{i}] = {}", p.x);
                assert!(f64_eq(p.y, 7.25), "{ty:?}: y[{i}] = {}", p.y);
                assert!(f64_eq(p.z, i as f64));
                let t = curve.tangent(i);
                assert!(f64_eq(t.x, 0.0) && f64_eq(t.y, 0.0) && f64_eq(t.z, 1.0));
            }
            assert!(f64_eq(curve.arc_length(), (nz - 1) as f64));
            assert!(curve.max_residual(&c) < 1e-6);
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x: Vec<f64> = (0..40).map(|z| 10.0 + (z as f64 * 0.3).sin()).collect();
        let y: Vec<f64> = (0..40).map(|z| 12.0 + 0.01 * (z * z) as f64).collect();
        let c = Centerline::from_points(x, y);
        for ty in [CurveType::Spline, CurveType::Polynomial { degree: 6 }] {
            let a = ty.fitter(1000).fit(&c).unwrap();
            let b = ty.fitter(1000).fit(&c).unwrap();
            assert_eq!(a.x(), b.x());
            assert_eq!(a.y(), b.y());
        }
    }

    #[test]
    fn test_from_samples_without_dense() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 4.0, 0.0)];
        let tan = [Vector3::z(), Vector3::z()];
        let curve = FittedCurve::from_samples(&pts, &tan, vec![]);
        assert_eq!(curve.dense().len(), 2);
        assert!(f64_eq(curve.arc_length(), 5.0));
    }
}
