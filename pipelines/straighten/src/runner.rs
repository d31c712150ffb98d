//! 程序运行函数.

use crate::loader::{self, RunConfig};
use crate::result::{RunResult, Stage};
use anyhow::Context;
use cord_berry::prelude::*;
use cord_berry::register::RegistrationFiles;
use std::time::Instant;

/// 实际运行.
pub fn run() -> anyhow::Result<RunResult> {
    let config = loader::load_config()?;
    let centerline = loader::centerline_path()?;
    let out_dir = loader::output_dir();
    run_with(&config, &centerline, &out_dir)
}

/// 以给定配置和路径运行.
pub fn run_with(
    config: &RunConfig,
    centerline: &std::path::Path,
    out_dir: &std::path::Path,
) -> anyhow::Result<RunResult> {
    let mut result = RunResult::new(centerline.to_path_buf(), out_dir.to_path_buf());

    let t = Instant::now();
    let volume = CenterlineVolume::open(centerline)
        .with_context(|| format!("failed to open {}", centerline.display()))?;
    result.record(Stage::Load, t.elapsed());

    let t = Instant::now();
    let straightener = Straightener::new(config.straighten.clone())?;
    let output = straightener.run(&volume)?;
    result.record(Stage::Landmarks, t.elapsed());

    let t = Instant::now();
    output.save(out_dir)?;
    result.record(Stage::Save, t.elapsed());
    result.summarize(&output);

    if config.pipeline.run_registration {
        let anat = loader::anat_path().context("$SCT_ANAT is required for registration")?;
        let anat = std::fs::canonicalize(&anat)
            .with_context(|| format!("anatomical image {} not found", anat.display()))?;
        // 外部工具在输出目录中执行, 因此文件名相对于该目录.
        let files = RegistrationFiles::in_dir("", anat);
        let plan = RegistrationPlan::landmark_warp(
            &files,
            config.straighten.strict_external_tool_checks,
            config.straighten.warp_interpolation.as_deref(),
        );

        let t = Instant::now();
        let report = plan.execute(&mut SystemRunner, out_dir)?;
        result.record(Stage::Registration, t.elapsed());
        result.ignored_steps = report.ignored.iter().map(|(label, _)| *label).collect();
    }

    Ok(result)
}
