//! 音频 I/O 模块
//!
//! 包含：
//! - Input: symphonia 解码输入（FLAC/WAV/AIFF/MP3 → 交错 f32）
//! - Output: hound WAV 输出（16-bit PCM / 32-bit float）
//! - Format: 样本编码与 f32 域变换

pub mod format;
pub mod input;
pub mod output;

pub use format::SampleEncoding;
pub use input::{AudioInput, InputError, StreamInfo};
pub use output::{OutputError, OutputSpec, WavOutput};
