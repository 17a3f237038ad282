//! 音频文件输入
//!
//! 使用 symphonia 库解码音频文件
//! 支持：FLAC, WAV, AIFF, MP3
//!
//! 与播放路径不同，转换流水线统一在 f32 域工作：
//! 解码结果经 SampleBuffer 转为交错 f32（[-1.0, 1.0] 归一化），
//! 残留样本跨 read_frames 调用保留，调用方可按任意帧数取数。

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat;
use thiserror::Error;

use super::format::SampleEncoding;

/// 输入错误
#[derive(Debug, Error)]
pub enum InputError {
    /// 文件打开失败
    #[error("Failed to open file: {0}")]
    FileOpen(#[from] std::io::Error),
    /// 格式不支持
    #[error("Unsupported audio format")]
    UnsupportedFormat,
    /// 没有找到音频轨道
    #[error("No audio track found")]
    NoAudioTrack,
    /// 解码器创建失败
    #[error("Failed to create decoder: {0}")]
    DecoderCreation(String),
    /// 解码失败
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

/// 音频流信息
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// 采样率
    pub sample_rate: u32,
    /// 声道数
    pub channels: usize,
    /// 样本编码
    pub encoding: SampleEncoding,
    /// 容器声明的总帧数（如果已知；实际帧数以解码为准）
    pub total_frames: Option<u64>,
    /// 总时长（秒）
    pub duration_secs: Option<f64>,
    /// 格式名称
    pub format: String,
    /// 编解码器名称
    pub codec: String,
}

/// 音频文件输入流
pub struct AudioInput {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    /// f32 转换缓冲（容量由首个解码包决定，之后复用）
    sample_buf: Option<SampleBuffer<f32>>,
    /// 解码残留样本（交错 f32），跨 read_frames 调用保留
    pending: Vec<f32>,
    pending_pos: usize,
    eof: bool,
}

impl std::fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioInput")
            .field("track_id", &self.track_id)
            .field("info", &self.info)
            .field("pending_pos", &self.pending_pos)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl AudioInput {
    /// 打开音频文件
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InputError> {
        let path = path.as_ref();

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // 提示文件扩展名
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        // 探测格式
        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|_| InputError::UnsupportedFormat)?;

        let reader = probed.format;
        // 直接使用文件扩展名作为格式名称
        let format_name = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_uppercase())
            .unwrap_or_else(|| "Unknown".to_string());

        // 查找第一个音频轨道
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(InputError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.ok_or(InputError::NoAudioTrack)?;
        let channels = codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(2);
        let total_frames = codec_params.n_frames;
        let duration_secs = total_frames.map(|f| f as f64 / sample_rate as f64);
        let encoding = match codec_params.sample_format {
            Some(SampleFormat::F32) | Some(SampleFormat::F64) => SampleEncoding::Float,
            _ => SampleEncoding::Int {
                bits: codec_params.bits_per_sample.unwrap_or(16),
            },
        };

        let codec_name = symphonia::default::get_codecs()
            .get_codec(codec_params.codec)
            .map(|c| c.short_name.to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let info = StreamInfo {
            sample_rate,
            channels,
            encoding,
            total_frames,
            duration_secs,
            format: format_name,
            codec: codec_name.clone(),
        };

        // 创建解码器
        let decoder_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &decoder_opts)
            .map_err(|e| InputError::DecoderCreation(e.to_string()))?;

        log::info!(
            "Opened {}: {} Hz, {} ch, {} ({})",
            path.display(),
            sample_rate,
            channels,
            encoding,
            codec_name
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            info,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            eof: false,
        })
    }

    /// 获取流信息
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// 读取至多 max_frames 帧追加到 dst（交错 f32）
    ///
    /// 返回实际追加的帧数，0 表示流结束
    pub fn read_frames(
        &mut self,
        dst: &mut Vec<f32>,
        max_frames: usize,
    ) -> Result<usize, InputError> {
        let channels = self.info.channels;
        let want = max_frames * channels;
        let mut taken = 0usize;

        while taken < want {
            if self.pending_pos >= self.pending.len() && !self.decode_next()? {
                break;
            }
            let available = self.pending.len() - self.pending_pos;
            let n = available.min(want - taken);
            dst.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            taken += n;
        }

        Ok(taken / channels)
    }

    /// 解码下一个包到 pending 缓冲
    ///
    /// 返回 false 表示流结束
    fn decode_next(&mut self) -> Result<bool, InputError> {
        loop {
            if self.eof {
                return Ok(false);
            }

            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(false);
                }
                Err(e) => return Err(InputError::DecodeFailed(e.to_string())),
            };

            // 跳过非目标轨道
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue, // 跳过损坏的帧
                Err(e) => return Err(InputError::DecodeFailed(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            // 首包决定转换缓冲容量（capacity 是解码器单包最大帧数，之后不变）
            if self.sample_buf.is_none() {
                let spec = *decoded.spec();
                let duration = decoded.capacity() as u64;
                self.sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
            }

            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                self.pending.clear();
                self.pending.extend_from_slice(buf.samples());
                self.pending_pos = 0;
            }

            return Ok(true);
        }
    }
}
