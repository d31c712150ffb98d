//! 拉直流程: 提取 -> 拟合 -> 地标 -> 栅格化.
//!
//! 整个流程单线程同步执行; 任何一步失败都会直接返回错误, 不会写出任何部分结果.

use crate::centerline::Centerline;
use crate::config::StraightenConfig;
use crate::consts::CROSS_POINTS;
use crate::data::{CenterlineVolume, ImgWriteVis, LandmarkVolume, NiftiHeaderAttr, ProjectionAxis};
use crate::fitting::FittedCurve;
use crate::landmark::{is_paired, LandmarkPair, LandmarkSpec, RasterReport};
use crate::CordResult;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// 输出文件名.
pub mod files {
    /// 弯曲地标体数据.
    pub const CURVED: &str = "landmarks_curved.nii.gz";

    /// 拉直地标体数据.
    pub const STRAIGHT: &str = "landmarks_straight.nii.gz";

    /// 两组地标坐标.
    pub const NPZ: &str = "landmarks.npz";

    /// 弯曲地标的冠状面投影.
    pub const QC_PNG: &str = "landmarks_curved_coronal.png";
}

/// 一次拉直运行.
#[derive(Debug, Clone)]
pub struct Straightener {
    config: StraightenConfig,
    spec: LandmarkSpec,
}

/// 拉直流程的全部产物.
#[derive(Debug, Clone)]
pub struct StraightenOutput {
    /// 逐层中心线.
    pub centerline: Centerline,
    /// 拟合曲线.
    pub curve: FittedCurve,
    /// 弯曲/拉直两组十字.
    pub landmarks: LandmarkPair,
    pub curved_volume: LandmarkVolume,
    pub straight_volume: LandmarkVolume,
    /// 栅格化报告, 记录落在网格外的点.
    pub curved_report: RasterReport,
    pub straight_report: RasterReport,
}

impl Straightener {
    /// 检查配置并创建.
    pub fn new(config: StraightenConfig) -> CordResult<Self> {
        config.validate()?;
        let spec = config.landmark_spec()?;
        Ok(Self { config, spec })
    }

    #[inline]
    pub fn config(&self) -> &StraightenConfig {
        &self.config
    }

    /// 对中心线体数据执行完整的拉直地标构建.
    pub fn run(&self, volume: &CenterlineVolume) -> CordResult<StraightenOutput> {
        let (nz, ny, nx) = volume.shape();
        info!("Input volume: nx = {nx}, ny = {ny}, nz = {nz}");
        if !volume.is_isotropic() {
            warn!("Voxels are not isotropic: {:?} (z, y, x)", volume.pix_dim());
        }
        LandmarkVolume::padded_shape(volume.header(), self.spec.padding)?;

        info!("Extracting centerline...");
        let centerline = Centerline::extract(volume)?;
        self.spec.sample_indices(nz)?;

        let fitter = self.config.curve_type().fitter(self.config.spline_samples);
        info!("Fitting centerline with {}...", fitter.name());
        let curve = fitter.fit(&centerline)?;
        info!(
            "Curve length: {:.2} voxels, max residual: {:.3} voxels",
            curve.arc_length(),
            curve.max_residual(&centerline)
        );

        info!("Building landmarks...");
        let landmarks = self.spec.build(&curve, (nx, ny))?;
        debug_assert_eq!(landmarks.curved.len(), landmarks.straight.len());
        info!("{} crosses per series", landmarks.curved.len());

        info!("Rasterizing landmarks with padding {}...", self.spec.padding);
        let (curved_volume, curved_report) =
            landmarks.curved.rasterize(volume.header(), self.spec.padding)?;
        let (straight_volume, straight_report) =
            landmarks.straight.rasterize(volume.header(), self.spec.padding)?;
        for (name, report) in [("curved", &curved_report), ("straight", &straight_report)] {
            if !report.is_complete() {
                warn!(
                    "{name} landmarks: {} outside the padded grid, {} overwritten",
                    report.dropped.len(),
                    report.overwritten.len()
                );
            }
        }
        if !is_paired(&curved_volume, &straight_volume) {
            warn!(
                "Curved and straight landmark volumes carry different ids ({} expected)",
                CROSS_POINTS * landmarks.curved.len()
            );
        }

        Ok(StraightenOutput {
            centerline,
            curve,
            landmarks,
            curved_volume,
            straight_volume,
            curved_report,
            straight_report,
        })
    }
}

impl StraightenOutput {
    /// 将地标体数据、坐标和质控图片写入目录 `dir`. 目录不存在时自动创建.
    ///
    /// 返回两个地标体数据的路径 `(curved, straight)`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> CordResult<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let curved = dir.join(files::CURVED);
        let straight = dir.join(files::STRAIGHT);
        self.curved_volume.save(&curved)?;
        self.straight_volume.save(&straight)?;
        self.landmarks.save_npz(dir.join(files::NPZ))?;
        self.curved_volume
            .save_projection(dir.join(files::QC_PNG), ProjectionAxis::Coronal)?;
        info!("Landmarks written to {}", dir.display());
        Ok((curved, straight))
    }

    /// 所有栅格化过程中丢失的 id 数 (落在网格外或被完全覆盖).
    pub fn dropped(&self) -> usize {
        self.curved_report.lost() + self.straight_report.lost()
    }
}
