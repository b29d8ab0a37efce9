//! 采样格式转换协作接口
//!
//! 转换子系统本身在别处实现；这里只定义设备打开和回调路径
//! 消费的契约，以及协商自身会产生的最小转换器（字节序交换）。

use crate::format::SampleFormat;

/// 转换错误
#[derive(Debug)]
pub enum ConvertError {
    /// 工厂不支持该格式对
    UnsupportedPair {
        from: SampleFormat,
        to: SampleFormat,
    },
    /// 转换执行失败
    Failed(&'static str),
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedPair { from, to } => {
                write!(f, "No converter for {:?} → {:?}", from, to)
            }
            Self::Failed(s) => write!(f, "Conversion failed: {}", s),
        }
    }
}

impl std::error::Error for ConvertError {}

/// 采样转换器
///
/// 回调路径的约束：`convert` 在硬件线程上执行，不得分配、不得阻塞。
pub trait SampleConverter: Send {
    /// 就地转换缓冲区前 `len` 字节，返回转换后的字节数
    ///
    /// 转换后的长度可能大于或小于 `len`；扩张的上界由
    /// `len_multiplier` 声明，缓冲区按该倍数预留。
    fn convert(&mut self, buf: &mut [u8], len: usize) -> Result<usize, ConvertError>;

    /// 输出长度相对输入长度的上界倍数
    fn len_multiplier(&self) -> usize {
        1
    }
}

/// 转换器工厂
///
/// 设备打开时按（请求格式，授予格式）构建一次转换器。
pub trait ConverterFactory: Send + Sync {
    fn build(
        &self,
        from: SampleFormat,
        to: SampleFormat,
    ) -> Result<Box<dyn SampleConverter>, ConvertError>;
}

/// 字节序交换转换器
///
/// 同编码同位宽、相反字节序之间的就地交换。长度不变。
pub struct ByteSwapConverter {
    width: usize,
}

impl ByteSwapConverter {
    /// `width` 是每样本的字节数，至少为 1
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }
}

impl SampleConverter for ByteSwapConverter {
    fn convert(&mut self, buf: &mut [u8], len: usize) -> Result<usize, ConvertError> {
        // 不完整的尾样本不参与交换也不计入输出
        let len = len.min(buf.len());
        let len = len - (len % self.width);
        for chunk in buf[..len].chunks_exact_mut(self.width) {
            chunk.reverse();
        }
        Ok(len)
    }
}

/// 默认工厂：只覆盖协商自身会引入的格式对
///
/// 回退序列把字节序对调的格式排在紧随请求之后，因此最常见的
/// 转换就是 16/32-bit 的字节序交换。其余格式对返回
/// `UnsupportedPair`，由调用方换用完整的转换子系统。
pub struct ByteSwapFactory;

impl ConverterFactory for ByteSwapFactory {
    fn build(
        &self,
        from: SampleFormat,
        to: SampleFormat,
    ) -> Result<Box<dyn SampleConverter>, ConvertError> {
        let same_body = from.encoding == to.encoding && from.bits == to.bits;
        if same_body && from.order != to.order && (from.bits == 16 || from.bits == 32) {
            Ok(Box::new(ByteSwapConverter::new(from.bytes_per_sample())))
        } else {
            Err(ConvertError::UnsupportedPair { from, to })
        }
    }
}

/// 转换状态
///
/// 打开设备时比较授予格式与请求格式后确定一次；
/// 之后只有硬件线程在回调里读写。
pub(crate) struct ConversionState {
    /// 是否需要转换
    pub needed: bool,
    /// 应用回调按请求格式填充的暂存缓冲区
    pub scratch: Vec<u8>,
    /// 转换前的字节数（请求格式下一个缓冲区的大小）
    pub raw_len: usize,
}

impl ConversionState {
    /// 授予格式与请求一致，无需转换
    pub fn disabled() -> Self {
        Self {
            needed: false,
            scratch: Vec::new(),
            raw_len: 0,
        }
    }

    /// 需要转换；暂存区按扩张上界预留
    pub fn new(raw_len: usize, len_multiplier: usize) -> Self {
        Self {
            needed: true,
            scratch: vec![0u8; raw_len * len_multiplier.max(1)],
            raw_len,
        }
    }
}
