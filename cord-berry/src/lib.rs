#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 从脊髓中心线 (或分割) 体数据出发, 拟合三维曲线,
//! 并构建成对的弯曲/拉直地标, 供外部基于地标的配准工具估计形变场.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 配准、形变场求解与插值本身由外部工具 (ANTs) 完成, 本 crate 只负责
//!   地标几何和调用顺序.
//! 2. 所有实体在一次拉直流程中只构建一次, 构建后不可变.
//!
//! # 开发计划
//!
//! ### 中心线提取 ✅
//!
//! 概率图取每层最大值点, 二值分割取每层质心. 覆盖检查失败立即中止.
//!
//! 实现位于 `cord-berry/src/centerline.rs`.
//!
//! ### 三次 B 样条逼近 & 最小二乘多项式拟合的纯 Rust 实现 ✅
//!
//! 两者都提供逐层的坐标和一阶导数.
//!
//! 实现位于 `cord-berry/src/fitting`.
//!
//! ### 弯曲/拉直地标十字 ✅
//!
//! 1. 如何保证十字位于曲线法平面内? ✅
//! 2. 切向量 z 分量为 0 时怎么办? ✅
//! 3. 拉直中心线上的 z 坐标如何保持真实间距? ✅
//!
//! 上述问题的答案:
//!
//! 1. 固定一个坐标, 在法平面方程约束下解二次方程, 两根按从小到大对应 `-` 和 `+`.
//! 2. 由调用方显式选择回退策略 (轴对齐十字或直接报错), 不依赖浮点异常.
//! 3. 相邻采样中心的欧几里得距离四舍五入后累加.
//!
//! 实现位于 `cord-berry/src/landmark`.
//!
//! ### 外部配准调用序列 ✅
//!
//! 可配置地忽略 `ComposeMultiTransform` 的非零退出码.
//!
//! 实现位于 `cord-berry/src/register.rs`.
//!
//! ### 运动校正失败变换的回退 ✅
//!
//! 实现位于 `cord-berry/src/moco.rs`.

/// 二维索引 `(y, x)`, 对应水平切片上的 `(行, 列)`.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, y, x)`. 以后均按照该模式访问体数据.
pub type Idx3d = (usize, usize, usize);

/// 地标体数据中的体素值类型. 非零值 `k` 标识第 `k` 个地标点.
pub type LandmarkId = u16;

mod error;

pub use error::CordError;

/// 运行时结果.
pub type CordResult<T> = Result<T, CordError>;

/// 3D nii 文件基础数据结构.
mod data;

pub use data::{
    AxialSlice, CenterlineVolume, ImgWriteVis, LandmarkVolume, NiftiHeaderAttr, ProjectionAxis,
};

pub mod centerline;
pub mod config;
pub mod consts;
pub mod fitting;
pub mod landmark;
pub mod moco;
pub mod prelude;
pub mod register;
pub mod straighten;
