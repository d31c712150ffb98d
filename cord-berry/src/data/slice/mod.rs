//! 水平 (轴向) 切片对象的操作.

mod core;
mod save;

pub use core::AxialSlice;

pub use save::{ImgWriteVis, ProjectionAxis};
