use std::ops::Index;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, ArrayView, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::BACKGROUND_ID;
use crate::{CordError, CordResult, Idx2d, Idx3d, LandmarkId};

pub mod slice;

pub use slice::{AxialSlice, ImgWriteVis, ProjectionAxis};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (x, y, z) 转换成 (z, y, x). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [x, y, z]. 体素个数数组.
    let [_, x, y, z, ..] = h.dim;
    (z as usize, y as usize, x as usize)
}

/// 只接受单个 3D 体数据 (允许第四维长度为 1).
fn check_dim(h: &NiftiHeader) -> CordResult<()> {
    let rank = h.dim[0] as usize;
    let mut extra = h.dim.iter().skip(4).take(rank.saturating_sub(3));
    if !(3..=7).contains(&rank) || extra.any(|&d| d > 1) {
        return Err(CordError::UnsupportedShape(h.dim));
    }
    Ok(())
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小 `(nz, ny, nx)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据水平切片形状大小 `(ny, nx)`.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, y, x) = self.shape();
        (y, x)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, y, x) = self.shape();
        z * y * x
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, y0, x0): &Idx3d) -> bool {
        let (z, y, x) = self.shape();
        *z0 < z && *y0 < y && *x0 < x
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 按 `[z, y, x]` 排列.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [z as f64, y as f64, x as f64]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, y, x] = self.pix_dim();
        z == y && z == x
    }
}

/// nii 格式 3D 中心线/分割/概率图. 体素值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct CenterlineVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for CenterlineVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for CenterlineVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl CenterlineVolume {
    /// 打开 nii 文件格式的 3D 中心线. `path` 为 nii 文件的本地路径.
    ///
    /// 调用方应保证体数据已重定向为 RPI 方向 (第三维即头足方向).
    pub fn open<P: AsRef<Path>>(path: P) -> CordResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        check_dim(&header)?;

        // [x, y, z] -> [z, y, x].
        let (nz, ny, nx) = get_shape_from_header(&header);
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .into_shape((nx, ny, nz))
            .map_err(|_| CordError::UnsupportedShape(header.dim))?
            .permuted_axes([2, 1, 0]);

        let data = data.as_standard_layout().into_owned();
        debug_assert!(data.is_standard_layout());

        Ok(Self { header, data })
    }

    /// 根据按 nifti 惯用标准 \[x, y, z\] 组织的裸数据直接创建体数据.
    ///
    /// 体素分辨率为 1 毫米, 方向为单位阵.
    pub fn from_xyz(data: Array3<f32>) -> Self {
        let (nx, ny, nz) = data.dim();
        let data = data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();

        let mut header = Box::<NiftiHeader>::default();
        header.dim = [3, nx as u16, ny as u16, nz as u16, 1, 1, 1, 1];
        header.pixdim = [1.0; 8];
        header.sform_code = 1;
        header.srow_x = [1.0, 0.0, 0.0, 0.0];
        header.srow_y = [0.0, 1.0, 0.0, 0.0];
        header.srow_z = [0.0, 0.0, 1.0, 0.0];
        header.intent_name[..4].copy_from_slice(b"fake");

        Self { header, data }
    }

    /// 判断该结构是否是由 `from_xyz` 手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获取 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> AxialSlice<'_> {
        AxialSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = AxialSlice> {
        self.data.axis_iter(Axis(0)).map(AxialSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 是否存在前景体素.
    #[inline]
    pub fn has_foreground(&self) -> bool {
        self.data.iter().any(|&v| v > 0.0)
    }

    /// 是否是概率图 (存在严格位于 (0, 1) 之间的体素值).
    #[inline]
    pub fn is_probabilistic(&self) -> bool {
        self.data.iter().any(|&v| v > 0.0 && v < 1.0)
    }
}

/// 四周填充后的整数地标体数据. 体素值 `k > 0` 表示第 `k` 个地标点.
#[derive(Debug, Clone)]
pub struct LandmarkVolume {
    header: BoxedHeader,
    data: Array3<LandmarkId>,
    padding: usize,
}

impl NiftiHeaderAttr for LandmarkVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for LandmarkVolume {
    type Output = LandmarkId;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LandmarkVolume {
    /// 以 `reference` 为原始 (未填充) 体数据的 header, 创建每个轴两端各填充
    /// `padding` 个体素的全背景地标体数据.
    ///
    /// 填充后任一轴超过 `u16::MAX` 个体素时返回 [`CordError::Config`].
    pub fn blank(reference: &NiftiHeader, padding: usize) -> CordResult<Self> {
        let shape = Self::padded_shape(reference, padding)?;
        let header = Box::new(padded_header(reference, padding)?);
        debug_assert_eq!(get_shape_from_header(&header), shape);

        Ok(Self {
            header,
            data: Array3::from_elem(shape, BACKGROUND_ID),
            padding,
        })
    }

    /// 以 `reference` 为参考, 计算填充后的形状 `(z, y, x)`.
    ///
    /// 填充后任一轴超过 `u16::MAX` 个体素 (nifti header 的上限) 时返回 [`CordError::Config`].
    pub fn padded_shape(reference: &NiftiHeader, padding: usize) -> CordResult<Idx3d> {
        let [x, y, z] = padded_dims(reference, padding)?;
        Ok((z as usize, y as usize, x as usize))
    }

    /// 每个轴两端的填充体素数.
    #[inline]
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, LandmarkId, Ix3> {
        self.data.view()
    }

    /// 在以 `(z, y, x)` 为中心、边长为 `2 * radius + 1` 的立方块内填写 `id`.
    /// 坐标为 **填充后** 网格的有符号坐标, 超出范围的部分被裁剪.
    ///
    /// 返回实际写入的体素个数.
    pub(crate) fn stamp(&mut self, (z, y, x): (i64, i64, i64), radius: i64, id: LandmarkId) -> usize {
        let (nz, ny, nx) = self.data.dim();
        let clip = |c: i64, n: usize| (c - radius).max(0)..(c + radius + 1).min(n as i64);

        let mut written = 0;
        for zz in clip(z, nz) {
            for yy in clip(y, ny) {
                for xx in clip(x, nx) {
                    self.data[(zz as usize, yy as usize, xx as usize)] = id;
                    written += 1;
                }
            }
        }
        written
    }

    /// 获取值为 `id` 的体素个数.
    #[inline]
    pub fn count(&self, id: LandmarkId) -> usize {
        self.data.iter().filter(|v| **v == id).count()
    }

    /// 升序收集所有出现过的非背景 id.
    pub fn ids(&self) -> Vec<LandmarkId> {
        let mut present = vec![false; LandmarkId::MAX as usize + 1];
        for &v in self.data.iter() {
            present[v as usize] = true;
        }
        present
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(id, p)| p.then_some(id as LandmarkId))
            .collect()
    }

    /// 计算值为 `id` 的所有体素在 **未填充** 坐标系中的质心 `(x, y, z)`.
    pub fn centroid_of(&self, id: LandmarkId) -> Option<(f64, f64, f64)> {
        let pad = self.padding as f64;
        let mut count = 0u64;
        let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
        for ((z, y, x), _) in self.data.indexed_iter().filter(|&(_, &v)| v == id) {
            count += 1;
            sx += x as f64;
            sy += y as f64;
            sz += z as f64;
        }
        (count != 0).then(|| {
            let n = count as f64;
            (sx / n - pad, sy / n - pad, sz / n - pad)
        })
    }

    /// 以 header 作为参考, 将地标保存到 `path` (后缀为 `.nii.gz` 时自动压缩).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CordResult<()> {
        // (z, y, x) -> (x, y, z), 写入时按 nifti 的 Fortran 序排列.
        let xyz = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&xyz)?;
        Ok(())
    }
}

/// 计算每个轴两端各填充 `padding` 个体素后的 header.
///
/// 体素个数随之增加; 原点 (qform 和 sform) 沿三个体素轴各回退 `padding` 个体素,
/// 使原视野内的体素保持世界坐标不变.
pub(crate) fn padded_header(reference: &NiftiHeader, padding: usize) -> CordResult<NiftiHeader> {
    let dims = padded_dims(reference, padding)?;
    let mut header = reference.clone();
    let pad = padding as f32;
    header.dim[1..=3].copy_from_slice(&dims);
    header.dim[0] = 3;
    for d in header.dim[4..].iter_mut() {
        *d = 1;
    }
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    // sform: 每行的前三个分量即体素轴在世界坐标中的方向.
    for row in [&mut header.srow_x, &mut header.srow_y, &mut header.srow_z] {
        row[3] -= pad * (row[0] + row[1] + row[2]);
    }

    let shift = qform_matrix(reference) * Vector3::from_element(pad as f64);
    header.quatern_x -= shift.x as f32;
    header.quatern_y -= shift.y as f32;
    header.quatern_z -= shift.z as f32;
    Ok(header)
}

/// 填充后的 nifti 维度 `[x, y, z]`, 溢出 `u16` 时报错.
fn padded_dims(reference: &NiftiHeader, padding: usize) -> CordResult<[u16; 3]> {
    let mut dims = [0u16; 3];
    for (d, &n) in dims.iter_mut().zip(reference.dim[1..=3].iter()) {
        *d = padding
            .checked_mul(2)
            .and_then(|p| p.checked_add(n as usize))
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| {
                CordError::Config(format!(
                    "padding = {padding} makes an axis of {n} voxels exceed {} voxels",
                    u16::MAX
                ))
            })?;
    }
    Ok(dims)
}

/// 由四元数和体素分辨率构造 qform 的 3x3 部分 (旋转 · 缩放).
fn qform_matrix(h: &NiftiHeader) -> Matrix3<f64> {
    let (b, c, d) = (
        h.quatern_b as f64,
        h.quatern_c as f64,
        h.quatern_d as f64,
    );
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    #[rustfmt::skip]
    let rot = Matrix3::new(
        a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d),         2.0 * (b * d + a * c),
        2.0 * (b * c + a * d),         a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b),
        2.0 * (b * d - a * c),         2.0 * (c * d + a * b),         a * a + d * d - b * b - c * c,
    );
    let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let scale = Vector3::new(
        h.pixdim[1] as f64,
        h.pixdim[2] as f64,
        qfac * h.pixdim[3] as f64,
    );
    rot * Matrix3::from_diagonal(&scale)
}
