//! 成对的弯曲/拉直地标.
//!
//! 沿拟合曲线按固定间隔采样, 在每个采样点处构建一个 5 点十字:
//! 中心点以及位于曲线局部法平面内的 4 个偏移点. 另在一条人工构造的竖直中心线上
//! 构建一一对应的拉直十字. 两者的点 id 按同一顺序分配, 这就是外部配准所需的对应关系.

use crate::consts::CROSS_POINTS;
use crate::fitting::FittedCurve;
use crate::{CordError, CordResult, LandmarkId};
use log::{debug, warn};
use nalgebra::{Point3, Vector3};
use ndarray::Array3;
use ndarray_npy::NpzWriter;
use std::fs::File;
use std::path::Path;

mod perpendicular;
mod raster;

pub use perpendicular::{axis_aligned, perpendicular_offsets, Degenerate, DegeneratePolicy};
pub use raster::{is_paired, RasterReport};

/// 十字中各点的标记, 同时也是点在十字内的枚举顺序.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CrossPoint {
    Center = 0,
    PlusX = 1,
    MinusX = 2,
    PlusY = 3,
    MinusY = 4,
}

impl CrossPoint {
    /// 按枚举顺序排列的全部标记.
    pub const ALL: [CrossPoint; CROSS_POINTS] = [
        CrossPoint::Center,
        CrossPoint::PlusX,
        CrossPoint::MinusX,
        CrossPoint::PlusY,
        CrossPoint::MinusY,
    ];

    /// 在十字内的序号.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// 十字的构建方式.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossKind {
    /// 位于曲线局部法平面内.
    Normal,

    /// 切向量退化, 回退为同一 z 平面上的轴对齐十字.
    AxisAligned,
}

/// 5 点地标十字. 坐标按 `(x, y, z)` 组织, 以体素为单位, 不含填充.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkCross {
    points: [Point3<f64>; CROSS_POINTS],
    kind: CrossKind,
}

impl LandmarkCross {
    /// 直接创建.
    #[inline]
    pub fn new(points: [Point3<f64>; CROSS_POINTS], kind: CrossKind) -> Self {
        Self { points, kind }
    }

    /// 按 `policy` 在 `center` 处构建与 `tangent` 正交的十字.
    /// `index` 只用于报错.
    pub fn orthogonal(
        center: &Point3<f64>,
        tangent: &Vector3<f64>,
        gapxy: f64,
        policy: DegeneratePolicy,
        index: usize,
    ) -> CordResult<Self> {
        match (perpendicular_offsets(center, tangent, gapxy), policy) {
            (Ok(points), _) => Ok(Self::new(points, CrossKind::Normal)),
            (Err(Degenerate), DegeneratePolicy::AxisAligned) => {
                warn!("Degenerate tangent {tangent:?} at sample {index}, using axis-aligned cross");
                Ok(Self::new(axis_aligned(center, gapxy), CrossKind::AxisAligned))
            }
            (Err(Degenerate), DegeneratePolicy::Reject) => {
                Err(CordError::DegenerateTangent { index })
            }
        }
    }

    /// 获取标记为 `which` 的点.
    #[inline]
    pub fn get(&self, which: CrossPoint) -> Point3<f64> {
        self.points[which.index()]
    }

    /// 中心点.
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.get(CrossPoint::Center)
    }

    /// 按枚举顺序排列的全部点.
    #[inline]
    pub fn points(&self) -> &[Point3<f64>; CROSS_POINTS] {
        &self.points
    }

    #[inline]
    pub fn kind(&self) -> CrossKind {
        self.kind
    }

    /// 四个偏移点到中心点的距离, 顺序同 [`CrossPoint::ALL`] 去掉中心点.
    pub fn arm_lengths(&self) -> [f64; CROSS_POINTS - 1] {
        let c = self.center();
        let mut ans = [0.0; CROSS_POINTS - 1];
        for (d, p) in ans.iter_mut().zip(self.points[1..].iter()) {
            *d = nalgebra::distance(&c, p);
        }
        ans
    }
}

/// 按采样顺序排列的十字序列.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSeries {
    crosses: Vec<LandmarkCross>,
}

impl LandmarkSeries {
    #[inline]
    pub fn new(crosses: Vec<LandmarkCross>) -> Self {
        Self { crosses }
    }

    /// 十字个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.crosses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.crosses.is_empty()
    }

    /// 获取第 `i` 个十字.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&LandmarkCross> {
        self.crosses.get(i)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, LandmarkCross> {
        self.crosses.iter()
    }

    /// 第 `cross` 个十字中标记为 `which` 的点的 id, 从 1 开始.
    #[inline]
    pub fn id_of(cross: usize, which: CrossPoint) -> LandmarkId {
        (1 + CROSS_POINTS * cross + which.index()) as LandmarkId
    }

    /// 按 id 升序迭代 `(id, 标记, 坐标)`.
    pub fn enumerate_points(&self) -> impl Iterator<Item = (LandmarkId, CrossPoint, Point3<f64>)> + '_ {
        self.crosses.iter().enumerate().flat_map(|(i, cross)| {
            CrossPoint::ALL
                .into_iter()
                .map(move |which| (Self::id_of(i, which), which, cross.get(which)))
        })
    }

    /// 各十字中心点的 z 坐标.
    pub fn center_z(&self) -> Vec<f64> {
        self.crosses.iter().map(|c| c.center().z).collect()
    }

    /// 形状为 `(n, 5, 3)` 的坐标数组.
    pub fn to_array(&self) -> Array3<f64> {
        Array3::from_shape_fn((self.len(), CROSS_POINTS, 3), |(i, k, d)| {
            self.crosses[i].points[k][d]
        })
    }
}

impl<'a> IntoIterator for &'a LandmarkSeries {
    type Item = &'a LandmarkCross;
    type IntoIter = std::slice::Iter<'a, LandmarkCross>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 一一对应的弯曲/拉直十字序列.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkPair {
    /// 拟合曲线上的十字.
    pub curved: LandmarkSeries,

    /// 人工竖直中心线上的十字.
    pub straight: LandmarkSeries,
}

impl LandmarkPair {
    /// 以 `.npz` 格式保存两个序列, 数组名分别为 `curved.npy` 和 `straight.npy`,
    /// 形状均为 `(n, 5, 3)`, 坐标按 `(x, y, z)` 排列.
    pub fn save_npz<P: AsRef<Path>>(&self, path: P) -> CordResult<()> {
        let mut npz = NpzWriter::new(File::create(path)?);
        npz.add_array("curved.npy", &self.curved.to_array())?;
        npz.add_array("straight.npy", &self.straight.to_array())?;
        npz.finish()?;
        Ok(())
    }
}

/// 地标构建参数.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkSpec {
    /// 十字臂长 (单位: 体素).
    pub gapxy: f64,

    /// 沿 z 方向的采样间隔数. 实际采样 `gapz + 1` 个位置.
    pub gapz: u32,

    /// 地标体数据每个轴两端的填充体素数.
    pub padding: usize,

    /// 切向量退化时的处理策略.
    pub policy: DegeneratePolicy,
}

impl LandmarkSpec {
    /// 检查参数并创建, 退化策略为默认值.
    pub fn new(gapxy: f64, gapz: u32, padding: usize) -> CordResult<Self> {
        if !(gapxy > 0.0) || !gapxy.is_finite() {
            return Err(CordError::Config(format!("gapxy must be positive, got {gapxy}")));
        }
        if gapz == 0 {
            return Err(CordError::Config("gapz must be positive".into()));
        }
        let ids = CROSS_POINTS as u64 * (gapz as u64 + 1);
        if ids > LandmarkId::MAX as u64 {
            return Err(CordError::Config(format!(
                "gapz = {gapz} needs {ids} landmark ids, more than {}",
                LandmarkId::MAX
            )));
        }
        Ok(Self {
            gapxy,
            gapz,
            padding,
            policy: DegeneratePolicy::default(),
        })
    }

    /// 替换退化策略.
    #[inline]
    pub fn with_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 计算 `gapz + 1` 个严格递增的采样 z 索引.
    ///
    /// 间隔为 `nz / gapz` (整除), 最后一个索引固定为 `nz - 1`.
    /// 要求 `nz > gapz`, 此时 `(gapz - 1) * (nz / gapz) < nz - 1`, 索引互不重复;
    /// 否则返回 [`CordError::Config`].
    pub fn sample_indices(&self, nz: usize) -> CordResult<Vec<usize>> {
        let gapz = self.gapz as usize;
        if nz <= gapz {
            return Err(CordError::Config(format!(
                "gapz = {gapz} needs more than {gapz} slices, the volume has {nz}"
            )));
        }
        let step = nz / gapz;
        let mut ans: Vec<usize> = (0..gapz).map(|i| i * step).collect();
        ans.push(nz - 1);
        debug_assert!(ans.windows(2).all(|w| w[0] < w[1]));
        Ok(ans)
    }

    /// 在拟合曲线 `curve` 上构建成对的十字.
    ///
    /// `(nx, ny)` 是原始体数据的水平尺寸; 拉直中心线位于 `(nx / 2, ny / 2)` (整除).
    pub fn build(&self, curve: &FittedCurve, (nx, ny): (usize, usize)) -> CordResult<LandmarkPair> {
        if curve.is_empty() {
            return Err(CordError::EmptyCenterline);
        }
        let indices = self.sample_indices(curve.len())?;

        let mut curved = Vec::with_capacity(indices.len());
        for (i, &iz) in indices.iter().enumerate() {
            let cross = LandmarkCross::orthogonal(
                &curve.point(iz),
                &curve.tangent(iz),
                self.gapxy,
                self.policy,
                i,
            )?;
            debug!("Curved cross {i} at z = {iz}: {:?}", cross.points());
            curved.push(cross);
        }

        let z = straight_z(curved.iter().map(LandmarkCross::center));
        let (x0, y0) = ((nx / 2) as f64, (ny / 2) as f64);
        let straight = z
            .into_iter()
            .map(|z| {
                let c = Point3::new(x0, y0, z);
                LandmarkCross::new(axis_aligned(&c, self.gapxy), CrossKind::Normal)
            })
            .collect();

        Ok(LandmarkPair {
            curved: LandmarkSeries::new(curved),
            straight: LandmarkSeries::new(straight),
        })
    }
}

/// 拉直中心线上的 z 坐标: 相邻弯曲中心点距离四舍五入后累加, 首项为 0.
pub fn straight_z<I: IntoIterator<Item = Point3<f64>>>(centers: I) -> Vec<f64> {
    let mut ans = vec![];
    let mut prev: Option<Point3<f64>> = None;
    let mut acc = 0.0;
    for c in centers {
        if let Some(p) = prev {
            acc += nalgebra::distance(&p, &c).round();
        }
        ans.push(acc);
        prev = Some(c);
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::centerline::Centerline;
    use crate::fitting::CurveType;
    use approx::assert_relative_eq;

    fn helix() -> Centerline {
        let z: Vec<f64> = (0..50).map(|z| z as f64).collect();
        Centerline::from_points(
            z.iter().map(|z| 5.0 + 3.0 * (z / 5.0).sin()).collect(),
            z.iter().map(|z| 5.0 + 3.0 * (z / 5.0).cos()).collect(),
        )
    }

    #[test]
    fn test_sample_indices() {
        let spec = LandmarkSpec::new(2.0, 10, 5).unwrap();
        assert_eq!(
            spec.sample_indices(50).unwrap(),
            vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 49]
        );
        // 15 / 4 = 3, 最后一个间隔变长.
        let spec = LandmarkSpec::new(2.0, 4, 5).unwrap();
        assert_eq!(spec.sample_indices(15).unwrap(), vec![0, 3, 6, 9, 14]);
        assert_eq!(spec.sample_indices(21).unwrap(), vec![0, 5, 10, 15, 20]);
    }

    #[test]
    fn test_sample_indices_never_repeat() {
        // 10 / 4 = 2, 而非 2.5 -> 3 (那样会得到 0, 3, 6, 9, 9).
        let spec = LandmarkSpec::new(1.0, 4, 0).unwrap();
        assert_eq!(spec.sample_indices(10).unwrap(), vec![0, 2, 4, 6, 9]);
        // 恰好 gapz + 1 层.
        assert_eq!(spec.sample_indices(5).unwrap(), vec![0, 1, 2, 3, 4]);
        for nz in 5..200 {
            let v = spec.sample_indices(nz).unwrap();
            assert_eq!(v.len(), 5);
            assert!(v.windows(2).all(|w| w[0] < w[1]), "nz = {nz}: {v:?}");
            assert_eq!(v[4], nz - 1);
        }
        // 层数不足.
        assert!(matches!(spec.sample_indices(4), Err(CordError::Config(_))));
        assert!(matches!(spec.sample_indices(0), Err(CordError::Config(_))));
    }

    #[test]
    fn test_spec_rejects_bad_values() {
        assert!(matches!(LandmarkSpec::new(0.0, 10, 5), Err(CordError::Config(_))));
        assert!(matches!(LandmarkSpec::new(f64::NAN, 10, 5), Err(CordError::Config(_))));
        assert!(matches!(LandmarkSpec::new(2.0, 0, 5), Err(CordError::Config(_))));
        // 5 * 13107 = 65535 恰好可以.
        assert!(LandmarkSpec::new(2.0, 13106, 5).is_ok());
        assert!(matches!(LandmarkSpec::new(2.0, 13107, 5), Err(CordError::Config(_))));
    }

    #[test]
    fn test_straight_z() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 4.0, 0.0),
            Point3::new(3.0, 4.0, 2.4),
            Point3::new(3.0, 4.0, 2.4),
        ];
        assert_eq!(straight_z(pts), vec![0.0, 5.0, 7.0, 7.0]);
        assert!(straight_z(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_id_order() {
        assert_eq!(LandmarkSeries::id_of(0, CrossPoint::Center), 1);
        assert_eq!(LandmarkSeries::id_of(0, CrossPoint::MinusY), 5);
        assert_eq!(LandmarkSeries::id_of(2, CrossPoint::PlusX), 12);
    }

    /// 螺旋中心线的端到端场景.
    #[test]
    fn test_helix_scenario() {
        let centerline = helix();
        let curve = CurveType::Spline.fitter(1000).fit(&centerline).unwrap();
        let spec = LandmarkSpec::new(2.0, 10, 5).unwrap();
        let pair = spec.build(&curve, (10, 10)).unwrap();

        assert_eq!(pair.curved.len(), 11);
        assert_eq!(pair.straight.len(), 11);

        for cross in pair.curved.iter().chain(pair.straight.iter()) {
            assert_eq!(cross.kind(), CrossKind::Normal);
            for d in cross.arm_lengths() {
                assert_relative_eq!(d, 2.0, epsilon = 1e-9);
            }
        }

        // 法平面约束.
        let indices = spec.sample_indices(curve.len()).unwrap();
        for (cross, &iz) in pair.curved.iter().zip(indices.iter()) {
            let t = curve.tangent(iz);
            for p in &cross.points()[1..] {
                assert_relative_eq!((p - cross.center()).dot(&t), 0.0, epsilon = 1e-9);
            }
        }

        // 拉直 z 单调不减, 跨度约等于采样中心之间的折线长度.
        let z = pair.straight.center_z();
        assert_eq!(z[0], 0.0);
        assert!(z.windows(2).all(|w| w[0] <= w[1]));
        let chord: f64 = pair
            .curved
            .iter()
            .zip(pair.curved.iter().skip(1))
            .map(|(a, b)| nalgebra::distance(&a.center(), &b.center()))
            .sum();
        let span = z[z.len() - 1];
        assert!((span - chord).abs() <= 0.5 * (z.len() - 1) as f64);
        assert!(span <= curve.arc_length() + 0.5 * (z.len() - 1) as f64);

        // 拉直十字位于体数据中心.
        for cross in pair.straight.iter() {
            assert_eq!(cross.center().x, 5.0);
            assert_eq!(cross.center().y, 5.0);
        }
    }

    #[test]
    fn test_degenerate_fallback_and_reject() {
        let pts: Vec<Point3<f64>> = (0..5).map(|z| Point3::new(4.0, 4.0, z as f64)).collect();
        let mut tangents = vec![Vector3::z(); 5];
        // 第 2 层切向量水平.
        tangents[2] = Vector3::new(1.0, 0.0, 0.0);
        let curve = FittedCurve::from_samples(&pts, &tangents, vec![]);

        // 5 / 4 = 1.25 -> 1, 采样 0, 1, 2, 3, 4.
        let spec = LandmarkSpec::new(1.5, 4, 2).unwrap();
        let pair = spec.build(&curve, (8, 8)).unwrap();
        let cross = pair.curved.get(2).unwrap();
        assert_eq!(cross.kind(), CrossKind::AxisAligned);
        assert_eq!(cross.get(CrossPoint::PlusX), Point3::new(5.5, 4.0, 2.0));
        assert_eq!(cross.get(CrossPoint::MinusY), Point3::new(4.0, 2.5, 2.0));
        assert_eq!(pair.curved.get(1).unwrap().kind(), CrossKind::Normal);

        let spec = spec.with_policy(DegeneratePolicy::Reject);
        assert!(matches!(
            spec.build(&curve, (8, 8)),
            Err(CordError::DegenerateTangent { index: 2 })
        ));
    }

    #[test]
    fn test_to_array_and_npz() {
        let c = Centerline::from_points(vec![3.0; 12], vec![4.0; 12]);
        let curve = CurveType::Polynomial { degree: 3 }.fitter(100).fit(&c).unwrap();
        let pair = LandmarkSpec::new(2.0, 3, 2).unwrap().build(&curve, (7, 9)).unwrap();

        let arr = pair.curved.to_array();
        assert_eq!(arr.dim(), (4, 5, 3));
        assert_relative_eq!(arr[(0, 1, 0)], 5.0, epsilon = 1e-9);
        assert_relative_eq!(arr[(3, 0, 2)], 11.0, epsilon = 1e-9);

        let path = std::env::temp_dir().join("cord_berry_landmarks_test.npz");
        pair.save_npz(&path).unwrap();
        let mut reader = ndarray_npy::NpzReader::new(File::open(&path).unwrap()).unwrap();
        let names = reader.names().unwrap();
        let name = names.iter().find(|n| n.starts_with("straight")).unwrap().clone();
        let back: Array3<f64> = reader
            .by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix3>(&name)
            .unwrap();
        assert_eq!(back, pair.straight.to_array());
        std::fs::remove_file(&path).ok();
    }
}
