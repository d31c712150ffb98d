//! 通用常量.

/// 默认参数. 与原始拉直脚本的默认值保持一致.
pub mod defaults {
    /// 地标十字臂长 (单位: 体素).
    pub const GAPXY: u32 = 20;

    /// 沿 z 方向的地标采样个数.
    pub const GAPZ: u32 = 15;

    /// 每个轴两端的填充体素数. 曲率较大时弯曲地标可能落在原视野之外.
    pub const PADDING: usize = 30;

    /// 多项式拟合的默认次数.
    pub const DEG_POLY: u32 = 10;

    /// 样条曲线内部稠密采样的最少点数. 视野很短时过稀的采样会导致数值不稳定.
    pub const SPLINE_SAMPLES: u32 = 1000;

    /// B 样条内节点间距 (单位: 层). 远大于体素台阶, 使拟合曲线不随台阶抖动.
    pub const SPLINE_KNOT_SPACING: f64 = 10.0;
}

/// 单通道颜色.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道暗灰色.
    pub const DARK_GRAY: u8 = 0b_0100_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;
}

/// 地标体数据中背景体素的值.
pub const BACKGROUND_ID: crate::LandmarkId = 0;

/// 一个地标十字包含的点数.
pub const CROSS_POINTS: usize = 5;

/// 判断切向量 z 分量为 0 的阈值.
pub const DEGENERATE_EPS: f64 = 1e-12;

/// 运动校正中, 平移分量超过该值 (单位: 毫米) 的变换矩阵被视为荒谬的.
pub const ABSURD_TRANSLATION: f64 = 10.0;
