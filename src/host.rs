//! 平台音频接口抽象
//!
//! 设备生命周期通过这组 trait 与具体平台解耦：
//! - `HostApi` 描述一个平台音频后端（能力、格式支持、流创建）
//! - `HostStream` 是已创建的平台流，start/stop 驱动回调
//!
//! 平台层拥有回调线程并决定回调时机（拉取模型），本层只提供
//! 回调闭包和停止时的收尾保证。

use crate::format::{ByteOrder, Encoding, SampleFormat};
use crate::registry::Subsystem;

/// 硬件格式标签
///
/// 位宽 + 符号性，字节序单独携带（平台原生描述符的拆分方式）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostFormatTag {
    I8,
    U8,
    I16,
    I32,
    F32,
}

impl HostFormatTag {
    /// 采样格式到硬件标签的映射
    ///
    /// 回退序列之外的格式（如 24-bit packed）没有对应标签。
    pub fn from_sample_format(format: SampleFormat) -> Option<Self> {
        match (format.encoding, format.bits) {
            (Encoding::Signed, 8) => Some(Self::I8),
            (Encoding::Unsigned, 8) => Some(Self::U8),
            (Encoding::Signed, 16) => Some(Self::I16),
            (Encoding::Signed, 32) => Some(Self::I32),
            (Encoding::Float, 32) => Some(Self::F32),
            _ => None,
        }
    }

    /// 每样本的字节数
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }
}

/// 硬件格式描述符
///
/// 打开设备时从协商结果构建，流存续期间由设备持有。
#[derive(Clone, Copy, Debug)]
pub struct HostFormat {
    pub tag: HostFormatTag,
    pub byte_order: ByteOrder,
    pub channels: u16,
    pub frame_rate: u32,
    pub buffer_frames: u32,
}

impl HostFormat {
    /// 单个硬件缓冲区的字节数
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames as usize * self.channels as usize * self.tag.bytes_per_sample()
    }
}

/// 后端能力描述符
///
/// 设备选择层据此决定是否需要自己起轮询线程、是否枚举设备。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCaps {
    /// 后端自带回调线程，上层不得再起轮询线程
    pub owns_callback_thread: bool,
    /// 平台不提供设备枚举，只有默认输出设备
    pub default_device_only: bool,
}

/// 流方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

/// 平台层错误
#[derive(Debug)]
pub enum HostError {
    SubsystemInit(String),
    StreamOpen(String),
    StreamStart(String),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubsystemInit(s) => write!(f, "Subsystem init failed: {}", s),
            Self::StreamOpen(s) => write!(f, "Failed to create stream: {}", s),
            Self::StreamStart(s) => write!(f, "Failed to start stream: {}", s),
        }
    }
}

impl std::error::Error for HostError {}

/// 硬件拉取回调
///
/// 平台层在自己的线程上、需要数据时调用；参数是本次要填充的
/// 完整硬件缓冲区。
pub type PullFn = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// 平台音频后端
pub trait HostApi: Send + Sync {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 能力描述符
    fn caps(&self) -> HostCaps;

    /// 进程级子系统计数（同一 host 上的所有设备共享）
    fn subsystem(&self) -> &Subsystem;

    /// 进程级子系统初始化钩子（首个设备打开时执行一次）
    fn subsystem_init(&self) -> Result<(), HostError> {
        Ok(())
    }

    /// 进程级子系统释放钩子（最后一个设备关闭时执行一次）
    fn subsystem_deinit(&self) {}

    /// 硬件是否接受该格式
    fn supports_format(&self, tag: HostFormatTag, order: ByteOrder) -> bool;

    /// 把请求的缓冲帧数收敛到硬件粒度
    fn clamp_buffer_frames(&self, frames: u32) -> u32 {
        frames.max(1).next_power_of_two()
    }

    /// 创建绑定拉取回调的平台流
    ///
    /// 创建可能产生平台内部线程。流创建后处于停止状态，
    /// 由调用方 `start`。
    fn open_stream(
        &self,
        desc: &HostFormat,
        direction: Direction,
        pull: PullFn,
    ) -> Result<Box<dyn HostStream>, HostError>;
}

/// 已创建的平台流
pub trait HostStream: Send {
    /// 开始回调投递
    fn start(&mut self) -> Result<(), HostError>;

    /// 停止回调投递
    ///
    /// 返回时必须保证：没有回调仍在执行，之后也不会再有回调
    /// 开始。实现里 drop 等价于 stop。
    fn stop(&mut self);
}

/// 线程信号屏蔽守卫
///
/// 平台流创建会产生内部线程，新线程会继承当前线程的信号掩码。
/// 创建期间屏蔽全部信号投递，离开作用域时无条件恢复原掩码，
/// 创建成功与否都一样。
#[cfg(unix)]
pub(crate) struct SignalMaskGuard {
    old: libc::sigset_t,
}

#[cfg(unix)]
impl SignalMaskGuard {
    pub fn block_all() -> Option<Self> {
        unsafe {
            let mut all: libc::sigset_t = std::mem::zeroed();
            libc::sigfillset(&mut all);
            let mut old: libc::sigset_t = std::mem::zeroed();
            if libc::pthread_sigmask(libc::SIG_BLOCK, &all, &mut old) != 0 {
                log::warn!("Failed to mask signals around stream creation");
                return None;
            }
            Some(Self { old })
        }
    }
}

#[cfg(unix)]
impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.old, std::ptr::null_mut());
        }
    }
}

#[cfg(not(unix))]
pub(crate) struct SignalMaskGuard;

#[cfg(not(unix))]
impl SignalMaskGuard {
    pub fn block_all() -> Option<Self> {
        Some(Self)
    }
}
