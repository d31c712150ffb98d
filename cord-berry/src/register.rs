//! 外部配准工具 (ANTs) 的调用序列.
//!
//! 本 crate 只负责地标几何; 刚体变换估计、B 样条形变场求解以及最终插值
//! 都交给外部程序完成. 该模块描述调用顺序与退出码处理策略, 并通过
//! [`ToolRunner`] 将真正的进程调用隔离开, 便于测试.

use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// 外部工具调用错误.
#[derive(Debug, Error)]
pub enum ToolError {
    /// 进程无法启动 (例如程序不在 `PATH` 中).
    #[error("failed to launch `{program}`")]
    Spawn {
        /// 程序名.
        program: String,

        /// 底层 I/O 错误.
        #[source]
        source: std::io::Error,
    },

    /// 严格检查的步骤返回了非零退出码.
    #[error("step `{label}` failed: `{program}` exited with status {status:?}: {stderr}")]
    Failed {
        /// 步骤名.
        label: &'static str,

        /// 程序名.
        program: String,

        /// 退出码. 被信号终止时为 `None`.
        status: Option<i32>,

        /// 标准错误输出.
        stderr: String,
    },
}

/// 退出码处理策略.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    /// 非零退出码中止整个流程.
    Strict,

    /// 非零退出码只记录警告.
    Lenient,
}

/// 一次外部程序调用.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// 步骤名, 用于日志与报错.
    pub label: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub policy: StatusPolicy,
}

impl ToolCommand {
    /// 创建一个严格检查退出码的调用.
    pub fn new(label: &'static str, program: &str) -> Self {
        Self {
            label,
            program: program.to_string(),
            args: vec![],
            policy: StatusPolicy::Strict,
        }
    }

    /// 追加一个参数.
    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// 追加一个路径参数.
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        let s = path.as_ref().to_string_lossy().into_owned();
        self.arg(s)
    }

    /// 追加多个参数.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// 设置退出码处理策略.
    pub fn policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// 外部程序的运行结果.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// 退出码. 被信号终止时为 `None`.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// 退出码是否为 0.
    #[inline]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// 执行外部程序的方式.
pub trait ToolRunner {
    /// 在工作目录 `cwd` 中同步执行 `cmd`, 直到进程退出.
    ///
    /// 只有进程无法启动时才返回错误; 退出码由调用方根据 [`StatusPolicy`] 判断.
    fn run(&mut self, cmd: &ToolCommand, cwd: &Path) -> Result<ToolOutput, ToolError>;
}

/// 通过 [`std::process::Command`] 真正启动子进程.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&mut self, cmd: &ToolCommand, cwd: &Path) -> Result<ToolOutput, ToolError> {
        let out = Command::new(&cmd.program)
            .args(&cmd.args)
            .current_dir(cwd)
            .output()
            .map_err(|source| ToolError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;
        Ok(ToolOutput {
            status: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// 配准所需的输入文件以及输出文件名.
///
/// 相对路径都相对于执行时的工作目录.
#[derive(Debug, Clone)]
pub struct RegistrationFiles {
    /// 弯曲地标体数据.
    pub curved_landmarks: PathBuf,

    /// 拉直地标体数据.
    pub straight_landmarks: PathBuf,

    /// 待拉直的解剖图像.
    pub anat: PathBuf,

    /// 弯曲 -> 拉直 形变场.
    pub warp_curve2straight: PathBuf,

    /// 拉直 -> 弯曲 形变场.
    pub warp_straight2curve: PathBuf,

    /// 拉直后的解剖图像.
    pub anat_straight: PathBuf,
}

impl RegistrationFiles {
    /// 以 `dir` 中默认文件名组织.
    pub fn in_dir<P: AsRef<Path>>(dir: P, anat: PathBuf) -> Self {
        let dir = dir.as_ref();
        Self {
            curved_landmarks: dir.join("landmarks_curved.nii.gz"),
            straight_landmarks: dir.join("landmarks_straight.nii.gz"),
            anat,
            warp_curve2straight: dir.join("warp_curve2straight.nii.gz"),
            warp_straight2curve: dir.join("warp_straight2curve.nii.gz"),
            anat_straight: dir.join("anat_straight.nii.gz"),
        }
    }
}

/// 中间文件名. 均位于工作目录中.
mod tmp {
    pub const RIGID: &str = "tmp.curve2straight_rigid.txt";
    pub const CURVED_RIGID: &str = "tmp.landmarks_curved_rigid.nii.gz";
    pub const BSPLINE_C2S: &str = "tmp.warp_curve2straight.nii.gz";
    pub const BSPLINE_S2C: &str = "tmp.warp_straight2curve.nii.gz";
}

/// B 样条形变场参数: 网格 `5x5x5`, 样条阶数 3, 层数 2, 不使用网格膨胀.
const BSPLINE_ARGS: [&str; 4] = ["5x5x5", "3", "2", "0"];

/// 按顺序执行的外部调用序列.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPlan {
    steps: Vec<ToolCommand>,
}

/// 执行结果中被忽略的失败.
#[derive(Debug, Clone, Default)]
pub struct PlanReport {
    /// 以宽松策略执行且退出码非零的步骤, 以及其输出.
    pub ignored: Vec<(&'static str, ToolOutput)>,
}

impl RegistrationPlan {
    /// 由地标估计形变场并作用于解剖图像的完整序列:
    ///
    /// 1. 由成对地标估计刚体变换;
    /// 2. 以最近邻插值将刚体变换作用于弯曲地标;
    /// 3. 估计 弯曲 -> 拉直 B 样条形变场;
    /// 4. 合成刚体变换与形变场 (curve2straight);
    /// 5. 估计 拉直 -> 弯曲 B 样条形变场;
    /// 6. 合成逆刚体变换与形变场 (straight2curve);
    /// 7. 将 curve2straight 形变作用于解剖图像.
    ///
    /// `strict` 为 `false` 时, 4 和 6 两步以宽松策略执行; 其他步骤总是严格检查.
    /// `interpolation` 按空白拆分后原样传给最后一步.
    pub fn landmark_warp(files: &RegistrationFiles, strict: bool, interpolation: Option<&str>) -> Self {
        let compose_policy = if strict {
            StatusPolicy::Strict
        } else {
            StatusPolicy::Lenient
        };
        let interp: Vec<&str> = interpolation
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default();

        let steps = vec![
            ToolCommand::new("rigid landmark transform", "ANTSUseLandmarkImagesToGetAffineTransform")
                .path_arg(&files.straight_landmarks)
                .path_arg(&files.curved_landmarks)
                .arg("rigid")
                .arg(tmp::RIGID),
            ToolCommand::new("apply rigid transform", "WarpImageMultiTransform")
                .arg("3")
                .path_arg(&files.curved_landmarks)
                .arg(tmp::CURVED_RIGID)
                .arg("-R")
                .path_arg(&files.straight_landmarks)
                .arg(tmp::RIGID)
                .arg("--use-NN"),
            ToolCommand::new("b-spline curve to straight", "ANTSUseLandmarkImagesToGetBSplineDisplacementField")
                .path_arg(&files.straight_landmarks)
                .arg(tmp::CURVED_RIGID)
                .arg(tmp::BSPLINE_C2S)
                .args(BSPLINE_ARGS),
            ToolCommand::new("compose curve2straight", "ComposeMultiTransform")
                .arg("3")
                .path_arg(&files.warp_curve2straight)
                .arg("-R")
                .path_arg(&files.straight_landmarks)
                .arg(tmp::BSPLINE_C2S)
                .arg(tmp::RIGID)
                .policy(compose_policy),
            ToolCommand::new("b-spline straight to curve", "ANTSUseLandmarkImagesToGetBSplineDisplacementField")
                .arg(tmp::CURVED_RIGID)
                .path_arg(&files.straight_landmarks)
                .arg(tmp::BSPLINE_S2C)
                .args(BSPLINE_ARGS),
            ToolCommand::new("compose straight2curve", "ComposeMultiTransform")
                .arg("3")
                .path_arg(&files.warp_straight2curve)
                .arg("-R")
                .path_arg(&files.straight_landmarks)
                .arg("-i")
                .arg(tmp::RIGID)
                .arg(tmp::BSPLINE_S2C)
                .policy(compose_policy),
            ToolCommand::new("warp anatomical image", "WarpImageMultiTransform")
                .arg("3")
                .path_arg(&files.anat)
                .path_arg(&files.anat_straight)
                .arg("-R")
                .path_arg(&files.straight_landmarks)
                .args(interp)
                .path_arg(&files.warp_curve2straight),
        ];
        Self { steps }
    }

    /// 全部步骤.
    #[inline]
    pub fn steps(&self) -> &[ToolCommand] {
        &self.steps
    }

    /// 在 `cwd` 中依次执行所有步骤, 不重试.
    ///
    /// 严格步骤失败时立即返回 [`ToolError::Failed`], 后续步骤不再执行.
    pub fn execute<R: ToolRunner + ?Sized>(&self, runner: &mut R, cwd: &Path) -> Result<PlanReport, ToolError> {
        let mut report = PlanReport::default();
        for (i, step) in self.steps.iter().enumerate() {
            info!("[{}/{}] {}: {step}", i + 1, self.steps.len(), step.label);
            let out = runner.run(step, cwd)?;
            if out.success() {
                continue;
            }
            match step.policy {
                StatusPolicy::Strict => {
                    return Err(ToolError::Failed {
                        label: step.label,
                        program: step.program.clone(),
                        status: out.status,
                        stderr: out.stderr,
                    })
                }
                StatusPolicy::Lenient => {
                    warn!(
                        "Ignoring exit status {:?} of `{}` ({})",
                        out.status, step.program, step.label
                    );
                    report.ignored.push((step.label, out));
                }
            }
        }
        Ok(report)
    }
}
