//! 音频采样格式与格式协商
//!
//! 格式表示：编码（有符号/无符号/浮点）+ 位宽 + 字节序的标签组合。
//! 8-bit 格式没有字节序，构造时统一归一化为 Little。
//!
//! 协商：沿固定回退序列找到硬件接受的第一个格式。
//! 序列是确定且有限的，走完仍无匹配即协商失败。

/// 字节序
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// 本机字节序
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// 相反的字节序
    pub fn swapped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }
}

/// 样本编码
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    Signed,
    Unsigned,
    Float,
}

/// 采样格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub encoding: Encoding,
    pub bits: u16,
    pub order: ByteOrder,
}

impl SampleFormat {
    pub const S8: SampleFormat = SampleFormat::new(Encoding::Signed, 8, ByteOrder::Little);
    pub const U8: SampleFormat = SampleFormat::new(Encoding::Unsigned, 8, ByteOrder::Little);
    pub const S16_LE: SampleFormat = SampleFormat::new(Encoding::Signed, 16, ByteOrder::Little);
    pub const S16_BE: SampleFormat = SampleFormat::new(Encoding::Signed, 16, ByteOrder::Big);
    pub const S32_LE: SampleFormat = SampleFormat::new(Encoding::Signed, 32, ByteOrder::Little);
    pub const S32_BE: SampleFormat = SampleFormat::new(Encoding::Signed, 32, ByteOrder::Big);
    pub const F32_LE: SampleFormat = SampleFormat::new(Encoding::Float, 32, ByteOrder::Little);
    pub const F32_BE: SampleFormat = SampleFormat::new(Encoding::Float, 32, ByteOrder::Big);

    /// 创建采样格式
    ///
    /// 8-bit 及以下的位宽没有字节序，归一化为 Little，
    /// 保证同一格式只有一种表示（协商按相等性比较）。
    pub const fn new(encoding: Encoding, bits: u16, order: ByteOrder) -> Self {
        let order = if bits <= 8 { ByteOrder::Little } else { order };
        Self {
            encoding,
            bits,
            order,
        }
    }

    /// 每样本的字节数
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        self.bits as usize / 8
    }

    /// 该格式的静音字节值
    ///
    /// 无符号 8-bit 的零点在 0x80，其余格式的全零字节即静音。
    pub fn silence_value(self) -> u8 {
        if self.encoding == Encoding::Unsigned && self.bits == 8 {
            0x80
        } else {
            0
        }
    }

    /// 相同编码和位宽、相反字节序的格式
    ///
    /// 8-bit 格式返回自身。
    pub fn swapped(self) -> Self {
        if self.bits <= 8 {
            self
        } else {
            Self {
                order: self.order.swapped(),
                ..self
            }
        }
    }
}

/// 格式回退序列
///
/// 协商候选的全集，顺序固定。兼容性测试依赖这个精确顺序。
pub const FALLBACK_TABLE: [SampleFormat; 8] = [
    SampleFormat::S8,
    SampleFormat::U8,
    SampleFormat::S16_LE,
    SampleFormat::S16_BE,
    SampleFormat::S32_LE,
    SampleFormat::S32_BE,
    SampleFormat::F32_LE,
    SampleFormat::F32_BE,
];

/// 协商硬件可接受的采样格式
///
/// 候选顺序：
/// 1. 请求的格式本身（在回退序列内时）
/// 2. 其字节序对调的格式
/// 3. 回退序列中剩余的格式，按序列顺序
///
/// 序列外的请求（如 24-bit packed）直接从回退序列头部开始。
/// 返回的格式一定是回退序列的成员；走完序列无匹配返回 None。
pub fn negotiate(
    requested: SampleFormat,
    mut supports: impl FnMut(SampleFormat) -> bool,
) -> Option<SampleFormat> {
    let mut candidates: Vec<SampleFormat> = Vec::with_capacity(FALLBACK_TABLE.len() + 2);

    if FALLBACK_TABLE.contains(&requested) {
        candidates.push(requested);
        let sibling = requested.swapped();
        if sibling != requested {
            candidates.push(sibling);
        }
    }
    for format in FALLBACK_TABLE {
        if !candidates.contains(&format) {
            candidates.push(format);
        }
    }

    for candidate in candidates {
        if supports(candidate) {
            if candidate != requested {
                log::info!(
                    "Sample format fallback: {:?} → {:?}",
                    requested,
                    candidate
                );
            }
            return Some(candidate);
        }
    }

    log::warn!("No supported sample format for request {:?}", requested);
    None
}

/// 音频流规格
///
/// 应用提出请求时填写；打开设备后 `format`、`samples` 和 `silence`
/// 反映硬件实际授予的值。
#[derive(Clone, Copy, Debug)]
pub struct AudioSpec {
    /// 采样格式
    pub format: SampleFormat,
    /// 声道数
    pub channels: u16,
    /// 帧率 (Hz)
    pub freq: u32,
    /// 缓冲区帧数
    pub samples: u32,
    /// 静音字节值（由格式决定）
    pub silence: u8,
}

impl AudioSpec {
    /// 创建规格，静音值由格式推导
    pub fn new(format: SampleFormat, channels: u16, freq: u32, samples: u32) -> Self {
        Self {
            format,
            channels,
            freq,
            samples,
            silence: format.silence_value(),
        }
    }

    /// 单个缓冲区的字节数
    #[inline]
    pub fn buffer_bytes(&self) -> usize {
        self.samples as usize * self.channels as usize * self.format.bytes_per_sample()
    }

    /// 格式变化后重新推导派生字段
    pub(crate) fn recalculate(&mut self) {
        self.silence = self.format.silence_value();
    }
}
