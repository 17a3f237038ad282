//! 音频样本编码与变换
//!
//! 流水线内部统一使用交错 f32 表示（[-1.0, 1.0] 归一化），
//! 写出阶段再按目标编码转换。增益与峰值扫描都在 f32 域完成。

/// 样本编码
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 定点整数 PCM
    Int { bits: u32 },
    /// 浮点 PCM
    Float,
}

impl std::fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int { bits } => write!(f, "{}-bit PCM", bits),
            Self::Float => write!(f, "32-bit float"),
        }
    }
}

/// 扫描块内绝对值峰值
///
/// 空块返回 0.0；满刻度对应 1.0，超过 1.0 表示定点写出会削波
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// 对块内样本施加增益
///
/// factor == 1.0 时不触碰样本（双遍模式第一遍必须保持位精确）
pub fn apply_gain(samples: &mut [f32], factor: f32) {
    if factor == 1.0 {
        return;
    }
    for s in samples.iter_mut() {
        *s *= factor;
    }
}

/// f32 → i16：先 clamp 到 [-1.0, 1.0] 再按类型最大值缩放
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_amplitude_empty() {
        assert_eq!(peak_amplitude(&[]), 0.0);
    }

    #[test]
    fn test_peak_amplitude_negative() {
        // 峰值取绝对值，负向峰值也要捕获
        let samples = [0.1, -0.9, 0.5];
        assert_eq!(peak_amplitude(&samples), 0.9);
    }

    #[test]
    fn test_apply_gain_unity_is_noop() {
        let original = [0.1f32, -0.7, 1.5];
        let mut samples = original;
        apply_gain(&mut samples, 1.0);
        // 位精确比较：1.0 增益不得改变任何位
        assert_eq!(samples.map(f32::to_bits), original.map(f32::to_bits));
    }

    #[test]
    fn test_apply_gain_scales() {
        let mut samples = [1.5f32, -1.5];
        apply_gain(&mut samples, 1.0 / 1.5);
        assert!((samples[0] - 1.0).abs() < 1e-6);
        assert!((samples[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(1.5), i16::MAX);
        assert_eq!(f32_to_i16(-1.5), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_f32_to_i16_half_scale() {
        let v = f32_to_i16(0.5);
        assert!((v - i16::MAX / 2).abs() <= 1);
    }

    #[test]
    fn test_encoding_display() {
        assert_eq!(SampleEncoding::Int { bits: 16 }.to_string(), "16-bit PCM");
        assert_eq!(SampleEncoding::Float.to_string(), "32-bit float");
    }
}
