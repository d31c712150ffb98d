//! 法平面内的十字偏移.

use crate::consts::DEGENERATE_EPS;
use nalgebra::{Point3, Vector3};

/// 切向量 z 分量为 0 (或结果不是有限数) 时, 法平面方程无法以 z 为因变量求解.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Degenerate;

/// 遇到退化切向量时的处理策略.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DegeneratePolicy {
    /// 退化为同一 z 平面上沿 x, y 轴 `±gapxy` 的十字.
    #[default]
    AxisAligned,

    /// 直接报错 [`CordError::DegenerateTangent`](crate::CordError::DegenerateTangent).
    Reject,
}

/// 在点 `center` 处, 求与切向量 `tangent` 正交的平面内的四个偏移点.
///
/// 返回值按 `[CENTER, PLUS_X, MINUS_X, PLUS_Y, MINUS_Y]` 排列.
///
/// `±X` 两点与 `center` 的 y 坐标相同, `±Y` 两点与 `center` 的 x 坐标相同;
/// 二者的 z 坐标由法平面方程 `a(x' - x) + b(y' - y) + c(z' - z) = 0` 决定,
/// 且与 `center` 的欧几里得距离恰为 `gapxy`.
/// 二次方程的两根中, 较小者记为 `MINUS`, 较大者记为 `PLUS`.
/// 这只是排列约定, 不代表解剖学上的左右.
pub fn perpendicular_offsets(
    center: &Point3<f64>,
    tangent: &Vector3<f64>,
    gapxy: f64,
) -> Result<[Point3<f64>; 5], Degenerate> {
    let (a, b, c) = (tangent.x, tangent.y, tangent.z);
    if !(c.abs() > DEGENERATE_EPS) || !a.is_finite() || !b.is_finite() || !c.is_finite() {
        return Err(Degenerate);
    }

    // 沿 x 方向: |x' - x| = gapxy * |c| / sqrt(a^2 + c^2).
    let dx = gapxy * c.abs() / a.hypot(c);
    let dy = gapxy * c.abs() / b.hypot(c);
    let on_x = |x1: f64| Point3::new(x1, center.y, center.z - a / c * (x1 - center.x));
    let on_y = |y1: f64| Point3::new(center.x, y1, center.z - b / c * (y1 - center.y));

    let ans = [
        *center,
        on_x(center.x + dx),
        on_x(center.x - dx),
        on_y(center.y + dy),
        on_y(center.y - dy),
    ];
    if ans.iter().all(|p| p.iter().all(|v| v.is_finite())) {
        Ok(ans)
    } else {
        Err(Degenerate)
    }
}

/// 同一 z 平面上沿坐标轴 `±gapxy` 的十字. 排列顺序同 [`perpendicular_offsets`].
pub fn axis_aligned(center: &Point3<f64>, gapxy: f64) -> [Point3<f64>; 5] {
    let (x, y, z) = (center.x, center.y, center.z);
    [
        *center,
        Point3::new(x + gapxy, y, z),
        Point3::new(x - gapxy, y, z),
        Point3::new(x, y + gapxy, z),
        Point3::new(x, y - gapxy, z),
    ]
}
