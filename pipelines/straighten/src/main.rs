//! 脊髓中心线拉直地标构建.
//!
//! 输入由环境变量给出:
//!
//! - `$SCT_CENTERLINE`: 中心线或分割 (RPI 方向), 必需;
//! - `$SCT_ANAT`: 待拉直的解剖图像, 仅在配置启用外部配准时需要;
//! - `$SCT_OUTPUT_DIR`: 输出目录, 默认为 `./straighten`;
//! - `$SCT_STRAIGHTEN_CONFIG`: TOML 配置文件, 默认为 `~/.config/cord-berry/straighten.toml`.
//!
//! 日志级别由 `$RUST_LOG` 控制, 默认为 `info`.

mod loader;
mod result;
mod runner;

use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let result = runner::run()?;
    result.analyze()?;
    Ok(())
}
