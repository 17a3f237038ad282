//! WAV 文件输出
//!
//! 使用 hound 写标准无压缩 WAV 容器
//! 输入统一为交错 f32，按输出编码转换：
//! - 16-bit PCM：clamp 后缩放到 i16（定点模式）
//! - 32-bit float：原样写出（浮点模式）

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use super::format::{f32_to_i16, SampleEncoding};

/// 输出错误
#[derive(Debug, Error)]
pub enum OutputError {
    /// 输出文件创建失败
    #[error("Failed to create output file: {0}")]
    Create(hound::Error),
    /// 样本写入失败
    #[error("Failed to write samples: {0}")]
    Write(hound::Error),
    /// 头部补写失败
    #[error("Failed to finalize output file: {0}")]
    Finalize(hound::Error),
    /// 不支持的输出编码
    #[error("Unsupported output encoding: {0}")]
    UnsupportedEncoding(SampleEncoding),
}

/// 输出流描述
#[derive(Debug, Clone, Copy)]
pub struct OutputSpec {
    /// 采样率
    pub sample_rate: u32,
    /// 声道数
    pub channels: u16,
    /// 样本编码（仅支持 16-bit PCM 与 32-bit float）
    pub encoding: SampleEncoding,
}

/// WAV 输出流
pub struct WavOutput {
    writer: WavWriter<BufWriter<File>>,
    encoding: SampleEncoding,
}

impl std::fmt::Debug for WavOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavOutput")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl WavOutput {
    /// 创建输出文件（已存在时覆盖）
    pub fn create<P: AsRef<Path>>(path: P, spec: &OutputSpec) -> Result<Self, OutputError> {
        let wav_spec = match spec.encoding {
            SampleEncoding::Int { bits: 16 } => WavSpec {
                channels: spec.channels,
                sample_rate: spec.sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            SampleEncoding::Float => WavSpec {
                channels: spec.channels,
                sample_rate: spec.sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
            other => return Err(OutputError::UnsupportedEncoding(other)),
        };

        let writer = WavWriter::create(path, wav_spec).map_err(OutputError::Create)?;

        Ok(Self {
            writer,
            encoding: spec.encoding,
        })
    }

    /// 写入交错 f32 样本块
    pub fn write_frames(&mut self, samples: &[f32]) -> Result<(), OutputError> {
        match self.encoding {
            SampleEncoding::Int { .. } => {
                for &s in samples {
                    self.writer
                        .write_sample(f32_to_i16(s))
                        .map_err(OutputError::Write)?;
                }
            }
            SampleEncoding::Float => {
                for &s in samples {
                    self.writer.write_sample(s).map_err(OutputError::Write)?;
                }
            }
        }
        Ok(())
    }

    /// 补写 WAV 头部并关闭文件
    ///
    /// 必须显式调用；直接 drop 会丢失头部长度字段的修正
    pub fn finalize(self) -> Result<(), OutputError> {
        self.writer.finalize().map_err(OutputError::Finalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(encoding: SampleEncoding) -> OutputSpec {
        OutputSpec {
            sample_rate: 16000,
            channels: 2,
            encoding,
        }
    }

    #[test]
    fn test_int16_write_and_readback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");

        let mut out = WavOutput::create(&path, &spec(SampleEncoding::Int { bits: 16 })).unwrap();
        out.write_frames(&[0.5, -0.5, 1.5, -1.5]).unwrap();
        out.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read_spec = reader.spec();
        assert_eq!(read_spec.channels, 2);
        assert_eq!(read_spec.sample_rate, 16000);
        assert_eq!(read_spec.bits_per_sample, 16);
        assert_eq!(read_spec.sample_format, hound::SampleFormat::Int);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        // 超出满刻度的样本写出前被 clamp
        assert_eq!(samples, vec![16383, -16383, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_float_write_and_readback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");

        let mut out = WavOutput::create(&path, &spec(SampleEncoding::Float)).unwrap();
        // 浮点模式不 clamp，超满刻度样本原样保留
        out.write_frames(&[0.25, -0.25, 1.5, -1.5]).unwrap();
        out.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read_spec = reader.spec();
        assert_eq!(read_spec.bits_per_sample, 32);
        assert_eq!(read_spec.sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.25, -0.25, 1.5, -1.5]);
    }

    #[test]
    fn test_unsupported_encoding_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        let err = WavOutput::create(&path, &spec(SampleEncoding::Int { bits: 24 })).unwrap_err();
        assert!(matches!(err, OutputError::UnsupportedEncoding(_)));
    }
}
