//! 三次 B 样条逼近曲线.
//!
//! 逐层中心线点来自体素坐标, 往往呈阶梯状. 插值样条会穿过每一个台阶, 导数随台阶抖动;
//! 这里改用节点数较少的 B 样条做最小二乘逼近, 曲线及其导数都跟随整体走向.

use super::{CurveFitter, FittedCurve};
use crate::centerline::Centerline;
use crate::consts::defaults;
use crate::{CordError, CordResult};
use itertools::izip;
use nalgebra::{DMatrix, DVector, Point3, Vector3};
use ndarray::Array;

/// 样条次数.
const SPLINE_DEGREE: usize = 3;

/// SVD 求解时的奇异值阈值.
const SVD_EPS: f64 = 1e-12;

/// 两端钳制 (clamped)、内节点均匀分布的一维 B 样条最小二乘逼近.
///
/// 节点向量为 `degree + 1` 个 `lo`, `intervals - 1` 个均匀内节点, `degree + 1` 个 `hi`.
pub(crate) struct BSplineImp {
    degree: usize,
    intervals: usize,
    knots: Vec<f64>,

    /// 控制系数, 长度为 `intervals + degree`.
    coe: DVector<f64>,
}

impl BSplineImp {
    /// `x` 是严格递增的数组, `y` 是对应函数值. 内节点间距约为 `knot_spacing`.
    ///
    /// 数据点很少时自动降低节点数与次数; 控制系数个数等于数据点个数时退化为插值.
    pub fn new(x: &[f64], y: &[f64], knot_spacing: f64) -> CordResult<Self> {
        assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
        let n = x.len();
        if n < 3 {
            return Err(CordError::TooFewPoints(n as u32, 3));
        }
        assert!(x.windows(2).all(|v| v[0] < v[1]), "x 值必须严格递增");
        assert!(knot_spacing > 0.0, "节点间距必须为正");

        let degree = SPLINE_DEGREE.min(n - 1);
        let (lo, hi) = (x[0], x[n - 1]);
        let intervals = (((hi - lo) / knot_spacing).round() as usize).clamp(1, n - degree);

        let mut imp = Self {
            degree,
            intervals,
            knots: clamped_knots(lo, hi, degree, intervals),
            coe: DVector::zeros(intervals + degree),
        };

        let mut a = DMatrix::<f64>::zeros(n, imp.coe.len());
        for (row, &t) in x.iter().enumerate() {
            let k = imp.span(t);
            for (j, v) in imp.basis(k, degree, t).into_iter().enumerate() {
                a[(row, k - degree + j)] = v;
            }
        }
        imp.coe = a
            .svd(true, true)
            .solve(&DVector::from_column_slice(y), SVD_EPS)
            .map_err(CordError::SingularFit)?;
        Ok(imp)
    }

    /// 在 `t` 处求值. 区间外按首尾两段外推.
    pub fn eval(&self, t: f64) -> f64 {
        let k = self.span(t);
        self.basis(k, self.degree, t)
            .iter()
            .enumerate()
            .map(|(j, v)| v * self.coe[k - self.degree + j])
            .sum()
    }

    /// 在 `t` 处求一阶导数.
    pub fn deriv(&self, t: f64) -> f64 {
        let p = self.degree;
        let k = self.span(t);
        let u = &self.knots;
        let lower = self.basis(k, p - 1, t);

        (0..=p)
            .map(|j| {
                let i = k - p + j;
                let mut v = 0.0;
                if j >= 1 {
                    v += lower[j - 1] / (u[i + p] - u[i]);
                }
                if j < p {
                    v -= lower[j] / (u[i + p + 1] - u[i + 1]);
                }
                p as f64 * v * self.coe[i]
            })
            .sum()
    }

    /// 在定义域上均匀取 `samples` 个点, 返回稠密采样 `(x, y)`.
    pub fn make_spline(&self, samples: usize) -> (Vec<f64>, Vec<f64>) {
        assert!(samples >= 2, "至少需要首尾两个采样点");
        let (lo, hi) = self.domain();
        let xs = Array::linspace(lo, hi, samples).to_vec();
        let ys = xs.iter().map(|&t| self.eval(t)).collect();
        (xs, ys)
    }

    #[inline]
    fn domain(&self) -> (f64, f64) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    /// `t` 所在节点区间 `[u_k, u_{k+1})` 的下标 `k`, 落在 `[degree, len(coe) - 1]` 内.
    fn span(&self, t: f64) -> usize {
        let (lo, hi) = self.domain();
        let last = self.coe.len() - 1;
        if !(t > lo) {
            return self.degree;
        }
        if t >= hi {
            return last;
        }
        let k = self.degree + ((t - lo) / (hi - lo) * self.intervals as f64).floor() as usize;
        k.min(last)
    }

    /// 第 `k` 个节点区间上 `d` 次的非零基函数 `N_{k-d..=k, d}(t)` (Cox-de Boor).
    fn basis(&self, k: usize, d: usize, t: f64) -> Vec<f64> {
        let u = &self.knots;
        let mut n = vec![0.0; d + 1];
        let mut left = vec![0.0; d + 1];
        let mut right = vec![0.0; d + 1];
        n[0] = 1.0;
        for j in 1..=d {
            left[j] = t - u[k + 1 - j];
            right[j] = u[k + j] - t;
            let mut saved = 0.0;
            for r in 0..j {
                let tmp = n[r] / (right[r + 1] + left[j - r]);
                n[r] = saved + right[r + 1] * tmp;
                saved = left[j - r] * tmp;
            }
            n[j] = saved;
        }
        n
    }
}

fn clamped_knots(lo: f64, hi: f64, degree: usize, intervals: usize) -> Vec<f64> {
    let step = (hi - lo) / intervals as f64;
    let mut u = vec![lo; degree + 1];
    u.extend((1..intervals).map(|j| lo + step * j as f64));
    u.extend(std::iter::repeat(hi).take(degree + 1));
    u
}

/// 三次 B 样条拟合策略. `X(z)` 与 `Y(z)` 分别逼近, `Z'(z) = 1`.
#[derive(Debug, Clone, Copy)]
pub struct SplineFitter {
    dense_samples: u32,
    knot_spacing: f64,
}

impl SplineFitter {
    /// `dense_samples` 为内部稠密采样的最少点数. 节点间距取默认值.
    #[inline]
    pub fn new(dense_samples: u32) -> Self {
        Self {
            dense_samples,
            knot_spacing: defaults::SPLINE_KNOT_SPACING,
        }
    }

    /// 替换内节点间距 (单位: 层). 间距越小越贴近原始点, 越大越平滑.
    ///
    /// 如果 `spacing` 不是正数, 则程序 panic.
    #[inline]
    pub fn with_knot_spacing(mut self, spacing: f64) -> Self {
        assert!(spacing > 0.0, "节点间距必须为正");
        self.knot_spacing = spacing;
        self
    }
}

impl Default for SplineFitter {
    fn default() -> Self {
        Self::new(defaults::SPLINE_SAMPLES)
    }
}

impl CurveFitter for SplineFitter {
    fn name(&self) -> &'static str {
        "cubic b-spline"
    }

    fn fit(&self, centerline: &Centerline) -> CordResult<FittedCurve> {
        let z = centerline.z();
        let sx = BSplineImp::new(&z, centerline.x(), self.knot_spacing)?;
        let sy = BSplineImp::new(&z, centerline.y(), self.knot_spacing)?;

        let points: Vec<Point3<f64>> = z
            .iter()
            .map(|&t| Point3::new(sx.eval(t), sy.eval(t), t))
            .collect();
        let tangents: Vec<Vector3<f64>> = z
            .iter()
            .map(|&t| Vector3::new(sx.deriv(t), sy.deriv(t), 1.0))
            .collect();

        let samples = (self.dense_samples as usize).max(z.len());
        let (dz, dx) = sx.make_spline(samples);
        let (_, dy) = sy.make_spline(samples);
        let dense = izip!(dx, dy, dz)
            .map(|(x, y, z)| Point3::new(x, y, z))
            .collect();

        Ok(FittedCurve::from_samples(&points, &tangents, dense))
    }
}
