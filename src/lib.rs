//! 拉取式音频输出后端
//!
//! 从应用请求的采样格式协商出硬件可接受的格式，打开并持有平台
//! 音频流，在平台层的回调线程上通过混音锁同步地向硬件供数。
//!
//! 包含：
//! - Format: 采样格式、流规格与回退序列协商
//! - Convert: 采样转换协作接口
//! - Host: 平台音频接口抽象与能力描述符
//! - Device: 设备生命周期与流式回调
//! - Null: 无硬件参考后端
//! - Registry: 进程级子系统引用计数
//! - Stats: 回调统计

pub mod convert;
pub mod device;
pub mod format;
pub mod host;
pub mod null;
pub mod registry;
pub mod stats;

pub use convert::{
    ByteSwapConverter, ByteSwapFactory, ConvertError, ConverterFactory, SampleConverter,
};
pub use device::{AudioDevice, FillCallback, Mixer, MixerGuard, OpenError};
pub use format::{negotiate, AudioSpec, ByteOrder, Encoding, SampleFormat, FALLBACK_TABLE};
pub use host::{
    Direction, HostApi, HostCaps, HostError, HostFormat, HostFormatTag, HostStream, PullFn,
};
pub use null::NullHost;
pub use registry::Subsystem;
pub use stats::{CallbackStats, StatsSnapshot};
