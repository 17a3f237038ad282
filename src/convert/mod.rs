//! 转换流水线
//!
//! 整合输入、重采样、输出各模块的同步泵循环
//! 核心设计：
//! - 滑动进料缓冲补满固定块（CHUNK_FRAMES），整数/浮点输出走同一条路径
//! - 丢弃重采样器启动延迟，首样本与信号真实起点对齐
//! - 尾部静音冲洗滤波器群延迟，输出帧数精确等于 floor(输入帧数 × 速率比)
//! - 防削波双遍模式：定点输出且峰值超满刻度时，按 1/峰值 重跑整个流水线

use std::path::Path;

use thiserror::Error;

use crate::audio::{
    format, AudioInput, InputError, OutputError, OutputSpec, SampleEncoding, WavOutput,
};
use crate::resample::{ResampleError, StreamResampler};

/// 转换错误
#[derive(Debug, Error)]
pub enum ConvertError {
    /// 输入打开失败
    #[error("Failed to open input: {0}")]
    OpenInput(#[source] InputError),
    /// 输出打开失败
    #[error("Failed to open output: {0}")]
    OpenOutput(#[source] OutputError),
    /// 重采样器错误
    #[error("Resampler error: {0}")]
    Resample(#[from] ResampleError),
    /// 流中途解码失败
    #[error("Decode failed mid-stream: {0}")]
    Read(#[source] InputError),
    /// 流中途写出失败
    #[error("Write failed mid-stream: {0}")]
    Write(#[source] OutputError),
}

/// 转换配置
#[derive(Clone, Copy, Debug)]
pub struct ConvertConfig {
    /// 目标采样率（Hz）
    pub target_rate: u32,
    /// 质量档位 0-10
    pub quality: u8,
    /// 输出 32-bit float（默认 16-bit PCM；浮点输出禁用防削波第二遍）
    pub float_output: bool,
}

/// 单次运行统计
///
/// 按值返回，不经过任何进程级状态；双遍模式的第二遍参数完全由
/// 第一遍的返回值推导
#[derive(Debug, Clone, Copy)]
pub struct RunStatistics {
    /// 实际解码的输入帧数
    pub input_frames: u64,
    /// 期望输出帧数 floor(输入帧数 × 速率比)
    pub expected_frames: u64,
    /// 实际写出帧数
    pub frames_written: u64,
    /// 全程观测到的绝对值峰值（增益前）
    pub peak_amplitude: f32,
    /// 本次运行施加的增益
    pub scale_factor: f32,
}

impl std::fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Conversion Report")?;
        writeln!(f, "=================")?;
        writeln!(f, "Input frames:   {}", self.input_frames)?;
        writeln!(f, "Frames written: {}", self.frames_written)?;
        writeln!(f, "Peak amplitude: {:.4}", self.peak_amplitude)?;
        if self.scale_factor != 1.0 {
            writeln!(f, "Scale factor:   {:.4}", self.scale_factor)?;
        }
        Ok(())
    }
}

/// 期望输出帧数：floor(输入帧数 × 目标速率 / 输入速率)
fn expected_output_frames(input_frames: u64, input_rate: u32, target_rate: u32) -> u64 {
    (input_frames as u128 * target_rate as u128 / input_rate as u128) as u64
}

/// 产出块的写出级：延迟丢弃 → 峰值扫描 → 增益 → 截断 → 写出
struct OutputStage {
    channels: usize,
    scale_factor: f32,
    /// 尚未丢弃的启动延迟帧数
    delay_frames: u64,
    /// 输出帧数上限（输入耗尽后可知）
    limit: Option<u64>,
    peak: f32,
    frames_written: u64,
}

impl OutputStage {
    fn emit(&mut self, block: &mut [f32], output: &mut WavOutput) -> Result<(), ConvertError> {
        let channels = self.channels;
        let mut frames = block.len() / channels;
        let mut start = 0usize;

        // 丢弃启动延迟
        if self.delay_frames > 0 {
            let skip = (self.delay_frames as usize).min(frames);
            self.delay_frames -= skip as u64;
            start = skip * channels;
            frames -= skip;
        }

        // 输入耗尽后截断到期望输出帧数（滤波尾音不得超出）
        if let Some(limit) = self.limit {
            let deficit = limit.saturating_sub(self.frames_written) as usize;
            frames = frames.min(deficit);
        }
        if frames == 0 {
            return Ok(());
        }

        let samples = &mut block[start..start + frames * channels];
        // 先测峰值再施加增益：双遍模式第一遍依赖未缩放的峰值
        self.peak = self.peak.max(format::peak_amplitude(samples));
        format::apply_gain(samples, self.scale_factor);

        output.write_frames(samples).map_err(ConvertError::Write)?;
        self.frames_written += frames as u64;
        Ok(())
    }

    fn done(&self) -> bool {
        match self.limit {
            Some(limit) => self.frames_written >= limit,
            None => false,
        }
    }
}

/// 执行一次完整转换
///
/// 定点输出时自动进行防削波检测：第一遍测得峰值超满刻度就按
/// 1/峰值 增益重跑整个流水线覆盖输出文件。浮点输出单遍完成。
pub fn convert(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConvertConfig,
) -> Result<RunStatistics, ConvertError> {
    let input = input.as_ref();
    let output = output.as_ref();

    let first = run_pass(input, output, config, 1.0)?;

    if !config.float_output && first.peak_amplitude > 1.0 {
        let factor = 1.0 / first.peak_amplitude;
        println!(
            "Peak amplitude {:.4} exceeds full scale, rescaling with factor {:.4}",
            first.peak_amplitude, factor
        );
        log::info!("Starting corrective pass, scale factor {:.6}", factor);
        return run_pass(input, output, config, factor);
    }

    Ok(first)
}

/// 单遍流水线：读取 → 重采样 → 写出
fn run_pass(
    input_path: &Path,
    output_path: &Path,
    config: &ConvertConfig,
    scale_factor: f32,
) -> Result<RunStatistics, ConvertError> {
    let mut input = AudioInput::open(input_path).map_err(ConvertError::OpenInput)?;
    let info = input.info().clone();
    let channels = info.channels;

    let encoding = if config.float_output {
        SampleEncoding::Float
    } else {
        SampleEncoding::Int { bits: 16 }
    };
    let spec = OutputSpec {
        sample_rate: config.target_rate,
        channels: channels as u16,
        encoding,
    };
    let mut output = WavOutput::create(output_path, &spec).map_err(ConvertError::OpenOutput)?;

    let mut resampler =
        StreamResampler::new(channels, info.sample_rate, config.target_rate, config.quality)?;
    let chunk_samples = resampler.input_frames_needed() * channels;

    log::info!(
        "Pass start: {} Hz -> {} Hz, {} ch, quality {}, scale {:.4}, delay {} frames",
        info.sample_rate,
        config.target_rate,
        channels,
        config.quality,
        scale_factor,
        resampler.output_delay()
    );

    let mut stage = OutputStage {
        channels,
        scale_factor,
        delay_frames: resampler.output_delay() as u64,
        limit: None,
        peak: 0.0,
        frames_written: 0,
    };

    let mut inbuf: Vec<f32> = Vec::with_capacity(chunk_samples);
    let mut outbuf: Vec<f32> = vec![0.0; resampler.output_frames_max() * channels];

    let mut input_frames: u64 = 0;
    let mut eof = false;

    // 主泵循环
    loop {
        // 进料：补满一个完整块（上一块的残留样本留在队首，只读缺口部分）
        while !eof && inbuf.len() < chunk_samples {
            let missing = (chunk_samples - inbuf.len()) / channels;
            let got = input
                .read_frames(&mut inbuf, missing)
                .map_err(ConvertError::Read)?;
            if got == 0 {
                eof = true;
            } else {
                input_frames += got as u64;
            }
        }

        // 输入耗尽：期望输出帧数就此确定
        if eof && stage.limit.is_none() {
            stage.limit = Some(expected_output_frames(
                input_frames,
                info.sample_rate,
                config.target_rate,
            ));
        }

        if inbuf.is_empty() {
            break;
        }

        // EOF 残帧补零凑满整块（零帧不计入输入帧数）
        if inbuf.len() < chunk_samples {
            inbuf.resize(chunk_samples, 0.0);
        }

        let produced = resampler.process(&inbuf, &mut outbuf)?;
        inbuf.clear();
        stage.emit(&mut outbuf[..produced * channels], &mut output)?;
    }

    // 尾部静音冲洗：持续喂零块直到滤波器群延迟完全吐出，补齐期望长度
    if !stage.done() {
        log::debug!(
            "Flushing filter tail: {} of {} frames written",
            stage.frames_written,
            stage.limit.unwrap_or(0)
        );
    }
    let silence = vec![0.0f32; chunk_samples];
    while !stage.done() {
        let produced = resampler.process(&silence, &mut outbuf)?;
        stage.emit(&mut outbuf[..produced * channels], &mut output)?;
    }

    output.finalize().map_err(ConvertError::Write)?;

    let stats = RunStatistics {
        input_frames,
        expected_frames: stage.limit.unwrap_or(0),
        frames_written: stage.frames_written,
        peak_amplitude: stage.peak,
        scale_factor,
    };

    log::info!(
        "Pass complete: {} frames in, {} frames out, peak {:.4}",
        stats.input_frames,
        stats.frames_written,
        stats.peak_amplitude
    );

    Ok(stats)
}
