//! 重采样模块
//!
//! rubato 外部库封装。滤波与速率换算完全由 rubato 实现，这里只做：
//! - 0-10 质量档位到 rubato 配置的映射
//! - 交错 <-> 平面缓冲的转换（rubato 要求非交错输入）
//! - 输出延迟查询（流水线据此丢弃启动延迟，对齐首样本）

use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use thiserror::Error;

/// 最高质量档位
pub const MAX_QUALITY: u8 = 10;

/// 每次 process 调用消耗的输入帧数
pub const CHUNK_FRAMES: usize = 1024;

/// 重采样错误
#[derive(Debug, Error)]
pub enum ResampleError {
    /// 质量档位越界
    #[error("Quality must be in 0-10, got {0}")]
    InvalidQuality(u8),
    /// 声道数非法
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),
    /// 采样率非法
    #[error("Invalid sample rate: input {input} Hz, output {output} Hz")]
    InvalidRate { input: u32, output: u32 },
    /// rubato 构造失败
    #[error("Failed to create resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    /// rubato 处理失败
    #[error("Failed to process samples: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// rubato 重采样器包装（trait 不是 object-safe，用枚举分发）
enum ResamplerKind {
    /// 多项式插值（低档位）
    Poly(FastFixedIn<f32>),
    /// 窗函数 sinc（中高档位）
    Sinc(SincFixedIn<f32>),
}

impl ResamplerKind {
    fn process_into_buffer(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
    ) -> Result<(usize, usize), rubato::ResampleError> {
        match self {
            Self::Poly(r) => r.process_into_buffer(input, output, None),
            Self::Sinc(r) => r.process_into_buffer(input, output, None),
        }
    }

    fn input_frames_next(&self) -> usize {
        match self {
            Self::Poly(r) => r.input_frames_next(),
            Self::Sinc(r) => r.input_frames_next(),
        }
    }

    fn output_frames_next(&self) -> usize {
        match self {
            Self::Poly(r) => r.output_frames_next(),
            Self::Sinc(r) => r.output_frames_next(),
        }
    }

    fn output_frames_max(&self) -> usize {
        match self {
            Self::Poly(r) => r.output_frames_max(),
            Self::Sinc(r) => r.output_frames_max(),
        }
    }

    fn output_delay(&self) -> usize {
        match self {
            Self::Poly(r) => r.output_delay(),
            Self::Sinc(r) => r.output_delay(),
        }
    }
}

/// 质量档位 → sinc 插值参数
///
/// 档位语义：0 最差最快，10 最好最慢。0-1 走多项式插值不经过这里。
fn sinc_params(quality: u8) -> SincInterpolationParameters {
    match quality {
        0..=4 => SincInterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        },
        5..=7 => SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
        _ => SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
    }
}

/// 流式重采样器
///
/// 固定输入块：每次 process 恰好消耗 input_frames_needed() 帧，
/// 产出帧数由 rubato 内部相位决定（每次调用可能不同）
pub struct StreamResampler {
    inner: ResamplerKind,
    channels: usize,
    ratio: f64,
    /// 平面输入缓冲
    planar_in: Vec<Vec<f32>>,
    /// 平面输出缓冲
    planar_out: Vec<Vec<f32>>,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("channels", &self.channels)
            .field("ratio", &self.ratio)
            .finish_non_exhaustive()
    }
}

impl StreamResampler {
    /// 创建重采样器
    pub fn new(
        channels: usize,
        input_rate: u32,
        output_rate: u32,
        quality: u8,
    ) -> Result<Self, ResampleError> {
        if quality > MAX_QUALITY {
            return Err(ResampleError::InvalidQuality(quality));
        }
        if channels == 0 || channels > 16 {
            return Err(ResampleError::InvalidChannelCount(channels));
        }
        if input_rate == 0 || output_rate == 0 {
            return Err(ResampleError::InvalidRate {
                input: input_rate,
                output: output_rate,
            });
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let inner = match quality {
            0..=1 => ResamplerKind::Poly(FastFixedIn::new(
                ratio,
                1.0,
                PolynomialDegree::Cubic,
                CHUNK_FRAMES,
                channels,
            )?),
            _ => ResamplerKind::Sinc(SincFixedIn::new(
                ratio,
                1.0,
                sinc_params(quality),
                CHUNK_FRAMES,
                channels,
            )?),
        };

        let max_out = inner.output_frames_max();
        Ok(Self {
            inner,
            channels,
            ratio,
            planar_in: (0..channels).map(|_| vec![0.0; CHUNK_FRAMES]).collect(),
            planar_out: (0..channels).map(|_| vec![0.0; max_out]).collect(),
        })
    }

    /// 下一次 process 需要的输入帧数
    pub fn input_frames_needed(&self) -> usize {
        self.inner.input_frames_next()
    }

    /// 单次 process 可能产出的最大帧数
    pub fn output_frames_max(&self) -> usize {
        self.inner.output_frames_max()
    }

    /// 输出端启动延迟（帧）
    ///
    /// 首样本对齐需要丢弃的产出帧数
    pub fn output_delay(&self) -> usize {
        self.inner.output_delay()
    }

    /// 输出/输入速率比
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// 处理一个完整输入块
    ///
    /// input: 恰好 input_frames_needed() * channels 个交错样本
    /// output: 至少 output_frames_max() * channels 容量，产出写入前部（交错）
    /// 返回产出帧数
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<usize, ResampleError> {
        let frames = self.inner.input_frames_next();
        debug_assert_eq!(input.len(), frames * self.channels);

        // 解交错
        for ch in 0..self.channels {
            for frame in 0..frames {
                self.planar_in[ch][frame] = input[frame * self.channels + ch];
            }
        }

        let out_frames = self.inner.output_frames_next();
        let produced = {
            let input_refs: Vec<&[f32]> =
                self.planar_in.iter().map(|v| &v[..frames]).collect();
            let mut output_refs: Vec<&mut [f32]> = self
                .planar_out
                .iter_mut()
                .map(|v| &mut v[..out_frames])
                .collect();
            self.inner.process_into_buffer(&input_refs, &mut output_refs)?.1
        };

        // 交错回写
        for ch in 0..self.channels {
            for frame in 0..produced {
                output[frame * self.channels + ch] = self.planar_out[ch][frame];
            }
        }

        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_out_of_range_rejected() {
        let err = StreamResampler::new(2, 44100, 48000, 11).unwrap_err();
        assert!(matches!(err, ResampleError::InvalidQuality(11)));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let err = StreamResampler::new(0, 44100, 48000, 5).unwrap_err();
        assert!(matches!(err, ResampleError::InvalidChannelCount(0)));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let err = StreamResampler::new(2, 44100, 0, 5).unwrap_err();
        assert!(matches!(err, ResampleError::InvalidRate { .. }));
    }

    #[test]
    fn test_all_quality_levels_construct() {
        for quality in 0..=MAX_QUALITY {
            StreamResampler::new(2, 44100, 48000, quality).unwrap();
        }
    }

    #[test]
    fn test_downsample_chunk_output_count() {
        let mut rs = StreamResampler::new(1, 48000, 16000, 5).unwrap();
        let chunk = rs.input_frames_needed();
        let input = vec![0.25f32; chunk];
        let mut output = vec![0.0f32; rs.output_frames_max()];

        let produced = rs.process(&input, &mut output).unwrap();
        // 固定输入块下，单次产出应接近 chunk * ratio
        let expected = (chunk as f64 * rs.ratio()) as usize;
        assert!(
            produced.abs_diff(expected) <= 2,
            "produced {} vs expected ~{}",
            produced,
            expected
        );
    }

    #[test]
    fn test_sinc_reports_delay() {
        let rs = StreamResampler::new(2, 44100, 16000, 8).unwrap();
        // sinc 滤波必然有群延迟，流水线依赖该值做首样本对齐
        assert!(rs.output_delay() > 0);
    }

    #[test]
    fn test_stereo_interleave_roundtrip() {
        // 左右声道喂不同的常数，产出仍应保持声道分离
        let mut rs = StreamResampler::new(2, 44100, 44100, 5).unwrap();
        let chunk = rs.input_frames_needed();
        let mut input = vec![0.0f32; chunk * 2];
        for frame in 0..chunk {
            input[frame * 2] = 0.5;
            input[frame * 2 + 1] = -0.25;
        }
        let mut output = vec![0.0f32; rs.output_frames_max() * 2];

        // 连续喂几块让滤波器进入稳态
        let mut produced = 0;
        for _ in 0..4 {
            produced = rs.process(&input, &mut output).unwrap();
        }
        assert!(produced > 0);

        // 稳态区中段采样校验
        let mid = produced / 2;
        assert!((output[mid * 2] - 0.5).abs() < 1e-2);
        assert!((output[mid * 2 + 1] + 0.25).abs() < 1e-2);
    }
}
