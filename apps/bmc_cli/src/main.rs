// apps/bmc_cli/src/main.rs

//! BioMC 命令行界面
//!
//! 搅拌生物反应器蒙特卡洛模拟的命令行工具。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 7: Application**：只接触 `SimulationParameters`
//! 与 `run_local` 装配入口，生物模型在此处一次性落定为具体类型。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// BioMC 生物反应器蒙特卡洛模拟命令行工具
#[derive(Parser)]
#[command(name = "bmc_cli")]
#[command(author = "BioMC Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "BioMC stirred bioreactor Monte-Carlo simulator", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行模拟
    Run(commands::run::RunArgs),
    /// 显示流图信息
    Info(commands::info::InfoArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 执行命令
    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
