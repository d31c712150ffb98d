//! 运行结果.

use cord_berry::straighten::StraightenOutput;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

const SEP: &str = "--------------------------------------------------------";

/// 流程阶段.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Landmarks,
    Save,
    Registration,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Load => "load centerline",
            Stage::Landmarks => "extract, fit & build landmarks",
            Stage::Save => "write landmarks",
            Stage::Registration => "external registration",
        }
    }
}

/// 一次拉直运行的统计结果.
#[derive(Debug, Clone)]
pub struct RunResult {
    input: PathBuf,
    out_dir: PathBuf,
    timings: Vec<(Stage, Duration)>,

    /// 填充后地标网格的形状 `(z, y, x)`.
    pub grid_shape: Option<(usize, usize, usize)>,

    /// 每个序列中的十字个数.
    pub crosses: usize,
    pub curve_length: Option<f64>,
    pub straight_span: Option<f64>,
    pub axis_aligned: usize,
    pub dropped: usize,

    /// 被宽松策略忽略了失败的外部步骤.
    pub ignored_steps: Vec<&'static str>,
}

impl RunResult {
    pub fn new(input: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            input,
            out_dir,
            timings: vec![],
            grid_shape: None,
            crosses: 0,
            curve_length: None,
            straight_span: None,
            axis_aligned: 0,
            dropped: 0,
            ignored_steps: vec![],
        }
    }

    /// 记录阶段耗时.
    pub fn record(&mut self, stage: Stage, d: Duration) {
        self.timings.push((stage, d));
    }

    /// 从拉直产物中收集统计量.
    pub fn summarize(&mut self, out: &StraightenOutput) {
        use cord_berry::landmark::CrossKind;
        use cord_berry::NiftiHeaderAttr;

        self.grid_shape = Some(out.curved_volume.shape());
        self.crosses = out.landmarks.curved.len();
        self.curve_length = Some(out.curve.arc_length());
        self.straight_span = out.landmarks.straight.center_z().last().copied();
        self.axis_aligned = out
            .landmarks
            .curved
            .iter()
            .filter(|c| c.kind() == CrossKind::AxisAligned)
            .count();
        self.dropped = out.dropped();
    }

    /// 将结果写进 `w` 中.
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        #[inline]
        fn f64_to_display(f: Option<f64>) -> String {
            match f {
                Some(f) => format!("{f:.3}"),
                None => "/".to_string(),
            }
        }

        writeln!(w, "Input `{}`:", self.input.display())?;
        writeln!(w, "{S4}Output directory: {}", self.out_dir.display())?;
        if let Some((z, y, x)) = self.grid_shape {
            writeln!(w, "{S4}Padded landmark grid (z, y, x): ({z}, {y}, {x})")?;
        }
        writeln!(w, "{S4}Crosses per series: {}", self.crosses)?;
        writeln!(w, "{S4}Axis-aligned fallbacks: {}", self.axis_aligned)?;
        writeln!(w, "{S4}Dropped landmark points: {}", self.dropped)?;
        writeln!(w, "{S4}Curve length: {} voxels", f64_to_display(self.curve_length))?;
        writeln!(w, "{S4}Straight span: {} voxels", f64_to_display(self.straight_span))?;
        for (stage, d) in &self.timings {
            writeln!(w, "{S4}Stage `{}`: {} us", stage.name(), d.as_micros())?;
        }
        if !self.ignored_steps.is_empty() {
            writeln!(w, "{S4}Ignored failures: {}", self.ignored_steps.join(", "))?;
        }
        Ok(())
    }

    /// 输出运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{SEP}")?;
        self.describe_into(&mut out)?;
        writeln!(out, "{SEP}")
    }
}
