//! 拉直流程的配置.

use crate::consts::{defaults, CROSS_POINTS};
use crate::fitting::CurveType;
use crate::landmark::{DegeneratePolicy, LandmarkSpec};
use crate::{CordError, CordResult, LandmarkId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 曲线拟合方法.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FittingMethod {
    /// 三次 B 样条逼近.
    #[default]
    #[cfg_attr(feature = "serde", serde(alias = "splines"))]
    Spline,

    /// 最小二乘多项式, 次数由 [`StraightenConfig::deg_poly`] 指定.
    Polynomial,
}

/// 一次拉直运行的全部参数.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct StraightenConfig {
    /// 十字臂长 (单位: 体素).
    pub gapxy: u32,

    /// 沿 z 方向的采样间隔数.
    pub gapz: u32,

    /// 地标体数据每个轴两端的填充体素数.
    pub padding: usize,

    /// 曲线拟合方法.
    pub fitting_method: FittingMethod,

    /// 多项式次数, 仅在多项式拟合时有效.
    pub deg_poly: u32,

    /// 样条曲线内部稠密采样的最少点数.
    pub spline_samples: u32,

    /// 切向量退化时的处理策略.
    pub degenerate_policy: DegeneratePolicy,

    /// 为 `false` 时, 两个 `ComposeMultiTransform` 步骤的非零退出码只记录警告.
    pub strict_external_tool_checks: bool,

    /// 最终形变插值方式, 原样传递给外部工具. `None` 表示使用工具默认值.
    pub warp_interpolation: Option<String>,
}

impl Default for StraightenConfig {
    fn default() -> Self {
        Self {
            gapxy: defaults::GAPXY,
            gapz: defaults::GAPZ,
            padding: defaults::PADDING,
            fitting_method: FittingMethod::default(),
            deg_poly: defaults::DEG_POLY,
            spline_samples: defaults::SPLINE_SAMPLES,
            degenerate_policy: DegeneratePolicy::default(),
            strict_external_tool_checks: true,
            warp_interpolation: None,
        }
    }
}

impl StraightenConfig {
    /// 检查参数是否合法.
    pub fn validate(&self) -> CordResult<()> {
        let bad = |msg: String| Err(CordError::Config(msg));
        if self.gapxy == 0 {
            return bad("gapxy must be positive".into());
        }
        if self.gapz == 0 {
            return bad("gapz must be positive".into());
        }
        if self.fitting_method == FittingMethod::Polynomial && self.deg_poly == 0 {
            return bad("deg_poly must be positive".into());
        }
        if self.spline_samples < 10 {
            return bad(format!(
                "spline_samples must be at least 10, got {}",
                self.spline_samples
            ));
        }
        let ids = CROSS_POINTS as u64 * (self.gapz as u64 + 1);
        if ids > LandmarkId::MAX as u64 {
            return bad(format!("gapz = {} needs {ids} landmark ids", self.gapz));
        }
        // 两侧填充之和不能超过 nifti 单轴尺寸上限.
        if self.padding > u16::MAX as usize / 2 {
            return bad(format!(
                "padding = {} exceeds {}",
                self.padding,
                u16::MAX / 2
            ));
        }
        if matches!(&self.warp_interpolation, Some(s) if s.trim().is_empty()) {
            return bad("warp_interpolation must not be blank".into());
        }
        Ok(())
    }

    /// 对应的曲线类型.
    pub fn curve_type(&self) -> CurveType {
        match self.fitting_method {
            FittingMethod::Spline => CurveType::Spline,
            FittingMethod::Polynomial => CurveType::Polynomial {
                degree: self.deg_poly,
            },
        }
    }

    /// 对应的地标构建参数.
    pub fn landmark_spec(&self) -> CordResult<LandmarkSpec> {
        LandmarkSpec::new(self.gapxy as f64, self.gapz, self.padding)
            .map(|spec| spec.with_policy(self.degenerate_policy))
    }
}
