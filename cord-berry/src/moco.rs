//! 逐层运动校正中失败变换的回退.
//!
//! 4D 数据按 `(t, z)` 逐层配准到参考体数据, 每个 `(t, z)` 得到一个 FSL 格式的
//! 4x4 仿射矩阵. 平移分量过大的矩阵被视为配准失败, 以同一层中时间上最近的
//! 成功矩阵替换.

use crate::consts::ABSURD_TRANSLATION;
use crate::{CordError, CordResult};
use log::{info, warn};
use nalgebra::Matrix4;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

/// 解析 FSL 文本格式 (4 行, 每行 4 个以空白分隔的数) 的仿射矩阵.
pub fn parse_fsl_matrix(text: &str) -> CordResult<Matrix4<f64>> {
    let rows: Vec<Vec<f64>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            l.split_whitespace()
                .map(|v| {
                    v.parse::<f64>()
                        .map_err(|e| CordError::MalformedMatrix(format!("`{v}`: {e}")))
                })
                .collect::<CordResult<Vec<f64>>>()
        })
        .collect::<CordResult<_>>()?;

    if rows.len() != 4 || rows.iter().any(|r| r.len() != 4) {
        let shape: Vec<usize> = rows.iter().map(Vec::len).collect();
        return Err(CordError::MalformedMatrix(format!(
            "expected 4 rows of 4 values, got rows of lengths {shape:?}"
        )));
    }
    Ok(Matrix4::from_fn(|r, c| rows[r][c]))
}

/// 读取 FSL 矩阵文件.
pub fn read_fsl_matrix<P: AsRef<Path>>(path: P) -> CordResult<Matrix4<f64>> {
    parse_fsl_matrix(&fs::read_to_string(path)?)
}

/// 变换矩阵是否荒谬: 平移分量或 `m[3, 3]` 的绝对值超过 10.
#[inline]
pub fn is_absurd(m: &Matrix4<f64>) -> bool {
    (0..4).any(|r| !(m[(r, 3)].abs() <= ABSURD_TRANSLATION))
}

/// `(nt, nz)` 的失败标记.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureGrid {
    failed: Array2<bool>,
}

/// 一次替换: 用 `(source_t, z)` 的矩阵替换失败的 `(t, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
    pub t: usize,
    pub z: usize,
    pub source_t: usize,
}

impl FailureGrid {
    /// 全部成功的 `(nt, nz)` 网格.
    pub fn new(nt: usize, nz: usize) -> Self {
        Self {
            failed: Array2::from_elem((nt, nz), false),
        }
    }

    /// 逐个检查矩阵. `matrices[(t, z)]` 为第 `t` 个时间点第 `z` 层的变换.
    pub fn from_matrices(matrices: &Array2<Matrix4<f64>>) -> Self {
        Self {
            failed: matrices.map(is_absurd),
        }
    }

    /// `(nt, nz)`.
    #[inline]
    pub fn dim(&self) -> (usize, usize) {
        self.failed.dim()
    }

    /// 标记 `(t, z)` 失败.
    #[inline]
    pub fn mark(&mut self, t: usize, z: usize) {
        self.failed[(t, z)] = true;
    }

    #[inline]
    pub fn is_failed(&self, t: usize, z: usize) -> bool {
        self.failed[(t, z)]
    }

    /// 失败个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.failed.iter().filter(|&&f| f).count()
    }

    /// 为每个失败的 `(t, z)` 选出同一层中时间上最近的成功矩阵, 距离相同时取较小的 `t`.
    ///
    /// 结果按 `(t, z)` 的行优先顺序排列. 某层存在失败但没有任何成功矩阵时,
    /// 返回 [`CordError::NoValidTransform`].
    pub fn plan_replacements(&self) -> CordResult<Vec<Replacement>> {
        let mut ans = vec![];
        for ((t, z), _) in self.failed.indexed_iter().filter(|&(_, &f)| f) {
            let source_t = self
                .failed
                .column(z)
                .indexed_iter()
                .filter(|&(_, &f)| !f)
                .map(|(g, _)| g)
                .min_by_key(|&g| g.abs_diff(t))
                .ok_or(CordError::NoValidTransform { z })?;
            ans.push(Replacement { t, z, source_t });
        }
        Ok(ans)
    }
}

/// 在文件系统中执行替换: 失败的矩阵文件改名为 `<name>_failed`, 再复制替换来源.
///
/// `paths[(t, z)]` 为对应矩阵文件路径.
pub fn apply_replacements(paths: &Array2<PathBuf>, plan: &[Replacement]) -> CordResult<()> {
    for r in plan {
        let target = &paths[(r.t, r.z)];
        let mut failed = target.clone().into_os_string();
        failed.push("_failed");
        info!(
            "Replace failed matrix T{} Z{} with T{}",
            r.t, r.z, r.source_t
        );
        fs::rename(target, &failed)?;
        fs::copy(&paths[(r.source_t, r.z)], target)?;
    }
    if !plan.is_empty() {
        warn!("{} transform(s) replaced by their nearest valid neighbour", plan.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &str = "1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n";

    #[test]
    fn test_parse() {
        let m = parse_fsl_matrix("1  0 0 2.5\n0 1 0 -3\n0 0 1 0\n0 0 0 1\n\n").unwrap();
        assert_eq!(m[(0, 3)], 2.5);
        assert_eq!(m[(1, 3)], -3.0);
        assert_eq!(m[(3, 3)], 1.0);
        assert!(!is_absurd(&m));
        assert_eq!(parse_fsl_matrix(IDENTITY).unwrap(), Matrix4::identity());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_fsl_matrix("1 0 0\n0 1 0\n0 0 1\n"),
            Err(CordError::MalformedMatrix(_))
        ));
        assert!(matches!(
            parse_fsl_matrix("1 0 0 x\n0 1 0 0\n0 0 1 0\n0 0 0 1\n"),
            Err(CordError::MalformedMatrix(_))
        ));
    }

    #[test]
    fn test_absurd() {
        let mut m = Matrix4::identity();
        m[(2, 3)] = -10.5;
        assert!(is_absurd(&m));
        let mut m = Matrix4::identity();
        m[(3, 3)] = 11.0;
        assert!(is_absurd(&m));
        let mut m = Matrix4::identity();
        m[(0, 3)] = 10.0;
        assert!(!is_absurd(&m));
        m[(1, 3)] = f64::NAN;
        assert!(is_absurd(&m));
    }

    #[test]
    fn test_nearest_good_neighbour() {
        // nt = 6, nz = 2
        let mut grid = FailureGrid::new(6, 2);
        grid.mark(0, 0);
        grid.mark(2, 0);
        grid.mark(3, 0);
        grid.mark(4, 1);
        assert_eq!(grid.count(), 4);

        let plan = grid.plan_replacements().unwrap();
        assert_eq!(
            plan,
            vec![
                Replacement { t: 0, z: 0, source_t: 1 },
                Replacement { t: 2, z: 0, source_t: 1 },
                Replacement { t: 3, z: 0, source_t: 4 },
                // t = 3 与 t = 5 距离相同, 取较小者.
                Replacement { t: 4, z: 1, source_t: 3 },
            ]
        );
    }

    #[test]
    fn test_no_valid_transform() {
        let mut grid = FailureGrid::new(2, 3);
        grid.mark(0, 1);
        grid.mark(1, 1);
        assert!(matches!(
            grid.plan_replacements(),
            Err(CordError::NoValidTransform { z: 1 })
        ));
    }

    #[test]
    fn test_from_matrices() {
        let mut bad = Matrix4::identity();
        bad[(0, 3)] = 42.0;
        let ms = Array2::from_shape_fn((2, 2), |(t, z)| {
            if (t, z) == (1, 0) {
                bad
            } else {
                Matrix4::identity()
            }
        });
        let grid = FailureGrid::from_matrices(&ms);
        assert_eq!(grid.dim(), (2, 2));
        assert!(grid.is_failed(1, 0));
        assert_eq!(grid.count(), 1);
    }

    #[test]
    fn test_apply_replacements() {
        let dir = std::env::temp_dir().join("cord_berry_moco_test");
        fs::create_dir_all(&dir).unwrap();
        let paths = Array2::from_shape_fn((2, 1), |(t, z)| dir.join(format!("mat_T{t}_Z{z}.txt")));
        fs::write(&paths[(0, 0)], IDENTITY).unwrap();
        fs::write(&paths[(1, 0)], "1 0 0 99\n0 1 0 0\n0 0 1 0\n0 0 0 1\n").unwrap();

        let mut grid = FailureGrid::new(2, 1);
        for t in 0..2 {
            if is_absurd(&read_fsl_matrix(&paths[(t, 0)]).unwrap()) {
                grid.mark(t, 0);
            }
        }
        let plan = grid.plan_replacements().unwrap();
        apply_replacements(&paths, &plan).unwrap();

        assert_eq!(read_fsl_matrix(&paths[(1, 0)]).unwrap(), Matrix4::identity());
        assert!(dir.join("mat_T1_Z0.txt_failed").exists());
        fs::remove_dir_all(&dir).ok();
    }
}
