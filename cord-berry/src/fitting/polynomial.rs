//! 多项式曲线.

// ref: https://blog.csdn.net/u012494154/article/details/112519550

use super::{CurveFitter, FittedCurve};
use crate::centerline::Centerline;
use crate::{CordError, CordResult};
use itertools::izip;
use nalgebra::{DMatrix, DVector, Point3, Vector3};
use ndarray::Array;

/// 奇异值截断阈值.
const SVD_EPS: f64 = 1e-12;

/// 升幂排列的多项式系数.
struct Polynomial(Vec<f64>);

impl Polynomial {
    pub fn eval(&self, x: f64) -> f64 {
        self.0.iter().rev().fold(0.0, |acc, &cur| acc * x + cur)
    }

    /// 导函数.
    pub fn derive(&self) -> Polynomial {
        Polynomial(
            self.0
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, &c)| k as f64 * c)
                .collect(),
        )
    }
}

/// 一维最小二乘多项式拟合.
///
/// 自变量先归一化到 `[-1, 1]` 再构造 Vandermonde 矩阵, 避免高次时数值溢出.
pub(crate) struct PolyImp {
    /// 区间中点.
    mid: f64,

    /// 区间半径.
    half: f64,
    poly: Polynomial,
    deriv: Polynomial,
}

impl PolyImp {
    /// `degree` 是多项式次数.
    ///
    /// 数据点个数必须多于 `degree`, 否则返回 [`CordError::TooFewPoints`].
    pub fn new(x: &[f64], y: &[f64], degree: u32) -> CordResult<Self> {
        assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
        if degree == 0 {
            return Err(CordError::Config("拟合曲线的次数不能为 0".into()));
        }
        if x.len() <= degree as usize {
            return Err(CordError::TooFewPoints(x.len() as u32, degree + 1));
        }

        let (min, max) = Self::min_max(x);
        let mid = (min + max) / 2.0;
        let half = (max - min) / 2.0;
        if half <= 0.0 {
            return Err(CordError::SingularFit("polynomial abscissae are identical"));
        }

        let t: Vec<f64> = x.iter().map(|&v| (v - mid) / half).collect();
        let v_mat = Self::vandermonde(&t, degree);
        let theta = v_mat
            .svd(true, true)
            .solve(&DVector::from_column_slice(y), SVD_EPS)
            .map_err(CordError::SingularFit)?;
        debug_assert_eq!(theta.len(), (degree + 1) as usize);

        let poly = Polynomial(theta.iter().copied().collect());
        let deriv = poly.derive();
        Ok(Self {
            mid,
            half,
            poly,
            deriv,
        })
    }

    /// 在 `x` 处求值.
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.poly.eval((x - self.mid) / self.half)
    }

    /// 在 `x` 处求一阶导数.
    #[inline]
    pub fn deriv(&self, x: f64) -> f64 {
        self.deriv.eval((x - self.mid) / self.half) / self.half
    }

    /// 在拟合区间内等距取 `points` 个自变量并求值.
    pub fn make_curve(&self, points: u32) -> (Vec<f64>, Vec<f64>) {
        assert!(points >= 3, "至少需要获得三个自变量 x.");
        let xs = Array::linspace(self.mid - self.half, self.mid + self.half, points as usize);
        let ys = xs.iter().map(|&x| self.eval(x)).collect();
        (xs.to_vec(), ys)
    }

    fn vandermonde(t: &[f64], degree: u32) -> DMatrix<f64> {
        // shape: (m, n); m = t.len(), n = degree + 1
        DMatrix::from_fn(t.len(), degree as usize + 1, |m, n| t[m].powi(n as i32))
    }

    fn min_max(arr: &[f64]) -> (f64, f64) {
        arr.iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

/// 多项式拟合策略. `X(z)` 与 `Y(z)` 各自是 z 的 `degree` 次多项式.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialFitter {
    degree: u32,
    dense_samples: u32,
}

impl PolynomialFitter {
    /// `degree` 是多项式次数, `dense_samples` 为内部稠密采样点数.
    #[inline]
    pub fn new(degree: u32, dense_samples: u32) -> Self {
        Self {
            degree,
            dense_samples,
        }
    }

    #[inline]
    pub fn degree(&self) -> u32 {
        self.degree
    }
}

impl CurveFitter for PolynomialFitter {
    fn name(&self) -> &'static str {
        "polynomial"
    }

    fn fit(&self, centerline: &Centerline) -> CordResult<FittedCurve> {
        let z = centerline.z();
        let px = PolyImp::new(&z, centerline.x(), self.degree)?;
        let py = PolyImp::new(&z, centerline.y(), self.degree)?;

        let points: Vec<Point3<f64>> = z
            .iter()
            .map(|&t| Point3::new(px.eval(t), py.eval(t), t))
            .collect();
        let tangents: Vec<Vector3<f64>> = z
            .iter()
            .map(|&t| Vector3::new(px.deriv(t), py.deriv(t), 1.0))
            .collect();

        let samples = self.dense_samples.max(z.len() as u32).max(3);
        let (dz, dx) = px.make_curve(samples);
        let (_, dy) = py.make_curve(samples);
        let dense = izip!(dx, dy, dz)
            .map(|(x, y, z)| Point3::new(x, y, z))
            .collect();

        Ok(FittedCurve::from_samples(&points, &tangents, dense))
    }
}

#[cfg(test)]
mod tests {
    use super::{PolyImp, Polynomial, PolynomialFitter};
    use crate::centerline::Centerline;
    use crate::fitting::CurveFitter;
    use crate::CordError;
    use approx::assert_relative_eq;

    #[test]
    fn test_horner() {
        // 1 + 2x + 3x^2
        let p = Polynomial(vec![1.0, 2.0, 3.0]);
        assert_relative_eq!(p.eval(2.0), 17.0);
        assert_relative_eq!(p.derive().eval(2.0), 14.0);
    }

    #[test]
    fn test_recover_quadratic() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v * v - 3.0 * v + 2.0).collect();
        let p = PolyImp::new(&x, &y, 2).unwrap();
        for &v in &x {
            assert_relative_eq!(p.eval(v), 0.5 * v * v - 3.0 * v + 2.0, epsilon = 1e-8);
            assert_relative_eq!(p.deriv(v), v - 3.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_high_degree_is_stable() {
        let x: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 40.0 + 5.0 * (v / 30.0).sin()).collect();
        let p = PolyImp::new(&x, &y, 10).unwrap();
        for &v in &x {
            assert!((p.eval(v) - 40.0 - 5.0 * (v / 30.0).sin()).abs() < 1e-3);
        }
    }

    #[test]
    fn test_make_curve_spans_domain() {
        let x = [2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 1.0, 1.0, 1.0];
        let p = PolyImp::new(&x, &y, 1).unwrap();
        let (xs, ys) = p.make_curve(7);
        assert_eq!(xs.len(), 7);
        assert_relative_eq!(xs[0], 2.0);
        assert_relative_eq!(xs[6], 5.0);
        assert!(ys.iter().all(|&v| (v - 1.0).abs() < 1e-10));
    }

    #[test]
    fn test_too_few_points() {
        let c = Centerline::from_points(vec![0.0; 5], vec![0.0; 5]);
        let err = PolynomialFitter::new(10, 100).fit(&c).unwrap_err();
        assert!(matches!(err, CordError::TooFewPoints(5, 11)));
    }

    #[test]
    fn test_zero_degree_rejected() {
        let c = Centerline::from_points(vec![0.0; 5], vec![0.0; 5]);
        let err = PolynomialFitter::new(0, 100).fit(&c).unwrap_err();
        assert!(matches!(err, CordError::Config(_)));
    }
}
