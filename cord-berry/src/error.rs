//! 运行时错误.

use crate::register::ToolError;
use thiserror::Error;

/// 提取、拟合、地标构建以及外部工具调用过程中的运行时错误.
///
/// 除 [`CordError::DegenerateTangent`] 可以由调用方通过
/// [`DegeneratePolicy`](crate::landmark::DegeneratePolicy) 选择回退外,
/// 其余错误都会中止整个拉直流程, 且不会写出任何部分结果.
#[derive(Debug, Error)]
pub enum CordError {
    /// 中心线/分割没有覆盖第 `slice` 层水平切片.
    #[error("centerline does not cover axial slice {slice} (volume has {nz} slices); crop the input so that every slice holds foreground")]
    Coverage {
        /// 缺失前景的切片索引.
        slice: usize,

        /// 水平切片总数.
        nz: usize,
    },

    /// 整个体数据中没有任何前景体素.
    #[error("centerline volume contains no foreground voxel")]
    EmptyCenterline,

    /// 第 `index` 个采样点处切向量的 z 分量为 0, 法平面方程无定义.
    #[error("tangent at landmark sample {index} has a zero z-component")]
    DegenerateTangent {
        /// 采样序号 (不是 z 索引).
        index: usize,
    },

    /// 拟合点数不足.
    ///
    /// 第一个参数代表目前已有的点, 第二个参数代表实际拟合需要的最少点数.
    #[error("too few centerline points to fit: got {0}, need at least {1}")]
    TooFewPoints(u32, u32),

    /// 线性方程组无法求解.
    #[error("fitting system could not be solved: {0}")]
    SingularFit(&'static str),

    /// 非法配置.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 不支持的体数据维度 (NIfTI `dim` 字段).
    #[error("unsupported volume dimensions {0:?}; a single 3D volume is required")]
    UnsupportedShape([u16; 8]),

    /// 运动校正中, 第 `z` 层切片在所有时间点上的变换都不可用.
    #[error("no valid transform left for slice {z}")]
    NoValidTransform {
        /// 切片索引.
        z: usize,
    },

    /// FSL 变换矩阵文本格式错误.
    #[error("malformed FSL matrix: {0}")]
    MalformedMatrix(String),

    /// NIfTI 读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::error::NiftiError),

    /// npz 写入错误.
    #[error(transparent)]
    Npz(#[from] ndarray_npy::WriteNpzError),

    /// 图像保存错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 外部配准工具错误.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
