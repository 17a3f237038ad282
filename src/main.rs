//! HiFi Resample - 高保真离线采样率转换工具
//!
//! 设计目标：
//! - 输出长度精确：尾部静音冲洗补偿滤波延迟，帧数恒等于 floor(输入帧数 × 速率比)
//! - 定点输出无削波：峰值超限时自动双遍缩放
//! - 质量可选：0-10 档位映射到重采样器配置

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use hifi_resample::convert::{convert, ConvertConfig};

/// HiFi Resample - Offline sample rate converter
#[derive(Parser)]
#[command(name = "hifi-resample")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input audio file (FLAC, WAV, AIFF, MP3)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Target sample rate in Hz
    #[arg(value_name = "RATE", value_parser = clap::value_parser!(u32).range(1..))]
    rate: u32,

    /// Resampling quality: 0-10, where 0 is worst, 10 is best
    #[arg(value_name = "QUALITY", value_parser = clap::value_parser!(u8).range(0..=10))]
    quality: u8,

    /// Output encoding: pass `float` for 32-bit float output
    /// (disables the clip-safe rescale pass)
    #[arg(value_name = "ENCODING")]
    encoding: Option<EncodingArg>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EncodingArg {
    /// 32-bit float WAV output
    Float,
}

fn main() -> anyhow::Result<()> {
    // 用法错误统一退出码 1（clap 默认 2）
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    // 初始化日志
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let float_output = matches!(cli.encoding, Some(EncodingArg::Float));
    let config = ConvertConfig {
        target_rate: cli.rate,
        quality: cli.quality,
        float_output,
    };

    println!("HiFi Resample - Offline Sample Rate Converter");
    println!("Input:   {}", cli.input.display());
    println!(
        "Output:  {} @ {} Hz ({})",
        cli.output.display(),
        cli.rate,
        if float_output { "32-bit float" } else { "16-bit PCM" }
    );
    println!("Quality: {} (0 worst - 10 best)\n", cli.quality);

    let stats = convert(&cli.input, &cli.output, &config)?;

    print!("{}", stats);

    Ok(())
}
