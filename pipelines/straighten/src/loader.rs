//! 输入路径与配置的加载.

use anyhow::{bail, Context};
use cord_berry::config::StraightenConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 完整的运行配置.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// 地标构建参数.
    pub straighten: StraightenConfig,

    /// 流程控制.
    pub pipeline: PipelineConfig,
}

/// 流程控制参数.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// 是否在构建地标后调用外部配准工具. 需要设置 `$SCT_ANAT`.
    pub run_registration: bool,
}

impl RunConfig {
    /// 从 TOML 文本解析并检查.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.straighten.validate()?;
        Ok(config)
    }
}

/// 获取中心线体数据路径.
///
/// 必须设置环境变量 `$SCT_CENTERLINE`.
pub fn centerline_path() -> anyhow::Result<PathBuf> {
    let p = env::var("SCT_CENTERLINE").context("$SCT_CENTERLINE is not set")?;
    let p = PathBuf::from(p);
    if !p.is_file() {
        bail!("centerline file {} does not exist", p.display());
    }
    Ok(p)
}

/// 获取待拉直的解剖图像路径 `$SCT_ANAT`. 未设置时返回 `None`.
pub fn anat_path() -> Option<PathBuf> {
    env::var("SCT_ANAT").ok().map(PathBuf::from)
}

/// 获取输出目录.
///
/// 1. 若环境变量 `$SCT_OUTPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回当前目录下的 `straighten`.
pub fn output_dir() -> PathBuf {
    match env::var("SCT_OUTPUT_DIR") {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => PathBuf::from("straighten"),
    }
}

/// 获取配置文件路径.
///
/// 1. 若环境变量 `$SCT_STRAIGHTEN_CONFIG` 非空, 则返回其值;
/// 2. 否则, 若 `~/.config/cord-berry/straighten.toml` 存在, 返回该路径;
/// 3. 否则返回 `None`, 使用默认配置.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("SCT_STRAIGHTEN_CONFIG") {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    dirs::config_dir()
        .map(|d| d.join("cord-berry").join("straighten.toml"))
        .filter(|p| p.is_file())
}

/// 读取配置文件 `path`.
pub fn load_config_from<P: AsRef<Path>>(path: P) -> anyhow::Result<RunConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    RunConfig::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// 按 [`config_path`] 的规则加载配置.
pub fn load_config() -> anyhow::Result<RunConfig> {
    match config_path() {
        Some(p) => {
            log::info!("Loading config from {}", p.display());
            load_config_from(p)
        }
        None => {
            log::info!("No config file found, using defaults");
            Ok(RunConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RunConfig;
    use cord_berry::config::FittingMethod;
    use cord_berry::landmark::DegeneratePolicy;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(RunConfig::from_toml("").unwrap(), RunConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let text = r#"
            [straighten]
            gapxy = 10
            gapz = 8
            padding = 12
            fitting_method = "polynomial"
            deg_poly = 6
            degenerate_policy = "reject"
            strict_external_tool_checks = false
            warp_interpolation = "--use-BSpline"

            [pipeline]
            run_registration = true
        "#;
        let c = RunConfig::from_toml(text).unwrap();
        assert_eq!(c.straighten.gapxy, 10);
        assert_eq!(c.straighten.gapz, 8);
        assert_eq!(c.straighten.padding, 12);
        assert_eq!(c.straighten.fitting_method, FittingMethod::Polynomial);
        assert_eq!(c.straighten.deg_poly, 6);
        assert_eq!(c.straighten.spline_samples, 1000);
        assert_eq!(c.straighten.degenerate_policy, DegeneratePolicy::Reject);
        assert!(!c.straighten.strict_external_tool_checks);
        assert_eq!(c.straighten.warp_interpolation.as_deref(), Some("--use-BSpline"));
        assert!(c.pipeline.run_registration);
    }

    #[test]
    fn test_splines_alias() {
        let c = RunConfig::from_toml("[straighten]\nfitting_method = \"splines\"\n").unwrap();
        assert_eq!(c.straighten.fitting_method, FittingMethod::Spline);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(RunConfig::from_toml("[straighten]\ngapz = 0\n").is_err());
        assert!(RunConfig::from_toml("[straighten]\nunknown = 1\n").is_err());
        assert!(RunConfig::from_toml("[straighten]\nfitting_method = \"nurbs\"\n").is_err());
    }
}
