//! 设备生命周期与流式回调
//!
//! 打开流程：子系统引用 → 格式协商 → 构建硬件描述符 → 确定转换
//! 状态 → 屏蔽信号创建平台流 → 启动。任何一步失败都对称回收
//! 已分配的资源。
//!
//! 回调路径运行在平台层的线程上，先整体静音、再按需经混音锁
//! 调用应用回调，内部失败一律降级为静音，绝不向硬件线程抛错。

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::convert::{ByteSwapFactory, ConversionState, ConverterFactory, SampleConverter};
use crate::format::{negotiate, AudioSpec};
use crate::host::{
    Direction, HostApi, HostCaps, HostFormat, HostFormatTag, HostStream, PullFn, SignalMaskGuard,
};
use crate::stats::{CallbackStats, StatsSnapshot};

/// 应用填充回调
///
/// 在混音锁保护下、于硬件线程上调用；参数是要填满的缓冲区，
/// 按请求的采样格式解释。上下文通过闭包捕获携带。
pub type FillCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// 设备打开错误
#[derive(Debug)]
pub enum OpenError {
    /// 回退序列走完仍无硬件可接受的格式
    UnsupportedFormat,
    /// 设备私有状态或平台流对象创建失败
    AllocationFailure(String),
    /// 平台流已创建但无法启动
    StreamStartFailed(String),
    /// 进程级音频子系统不可用
    SubsystemInitFailed(String),
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedFormat => write!(f, "Unsupported audio format"),
            Self::AllocationFailure(s) => write!(f, "Failed to allocate device state: {}", s),
            Self::StreamStartFailed(s) => write!(f, "Unable to start audio stream: {}", s),
            Self::SubsystemInitFailed(s) => write!(f, "Audio subsystem unavailable: {}", s),
        }
    }
}

impl std::error::Error for OpenError {}

/// 混音器状态
///
/// 持有应用填充回调。外层的 `Mutex` 就是混音锁：回调路径只在
/// 调用填充回调的区间持有它，应用线程通过 [`AudioDevice::lock`]
/// 持有它来修改自己的混音状态。
pub struct Mixer {
    fill: FillCallback,
}

impl Mixer {
    #[inline]
    fn fill(&mut self, buf: &mut [u8]) {
        (self.fill)(buf)
    }
}

/// 混音锁守卫
///
/// 持有期间填充回调不会被调用。
pub struct MixerGuard<'a> {
    _inner: MutexGuard<'a, Mixer>,
}

/// 回调与控制线程共享的标志位
struct SharedFlags {
    /// 设备是否启用；关闭开始后清除
    enabled: AtomicBool,
    /// 是否暂停；只影响回调行为，不触碰硬件状态
    paused: AtomicBool,
}

/// 锁定混音锁；中毒时照常进入，硬件线程不能因此卡死
fn lock_mixer(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 流式回调引擎
///
/// 整个结构归拉取闭包所有，随平台流一起创建和销毁；
/// 转换暂存区只被硬件线程触碰。
struct StreamEngine {
    flags: Arc<SharedFlags>,
    mixer: Arc<Mutex<Mixer>>,
    silence: u8,
    bytes_per_frame: usize,
    convert: ConversionState,
    converter: Option<Box<dyn SampleConverter>>,
    stats: Arc<CallbackStats>,
}

impl StreamEngine {
    /// 硬件拉取一个缓冲区
    ///
    /// 此路径禁止日志、分配和阻塞（混音锁除外）。
    fn pull(&mut self, out: &mut [u8]) {
        self.stats.record_callback();

        // 无条件先整体写静音值：设备禁用或暂停时硬件播放的是
        // 静音而不是缓冲区里的陈旧内容
        out.fill(self.silence);

        if !self.flags.enabled.load(Ordering::Acquire) {
            self.stats.record_silent();
            return;
        }
        if self.flags.paused.load(Ordering::Acquire) {
            // 暂停期间不调用应用回调
            self.stats.record_silent();
            return;
        }

        if self.convert.needed {
            let raw_len = self.convert.raw_len.min(self.convert.scratch.len());
            let scratch = &mut self.convert.scratch;

            // 混音锁只覆盖应用回调本身，转换在锁外进行
            let filled = {
                let mut mixer = lock_mixer(&self.mixer);
                panic::catch_unwind(AssertUnwindSafe(|| mixer.fill(&mut scratch[..raw_len])))
                    .is_ok()
            };
            if !filled {
                self.stats.record_degraded();
                self.stats.record_silent();
                return;
            }

            let converter = match self.converter.as_mut() {
                Some(c) => c,
                None => {
                    self.stats.record_degraded();
                    self.stats.record_silent();
                    return;
                }
            };
            match converter.convert(scratch, raw_len) {
                Ok(converted) => {
                    // 拷贝长度取转换后的值，不是转换前的 raw_len
                    let n = converted.min(out.len());
                    out[..n].copy_from_slice(&scratch[..n]);
                    self.stats
                        .add_frames_rendered((n / self.bytes_per_frame.max(1)) as u64);
                }
                Err(_) => {
                    // 输出缓冲区仍是静音
                    self.stats.record_degraded();
                    self.stats.record_silent();
                }
            }
        } else {
            let filled = {
                let mut mixer = lock_mixer(&self.mixer);
                panic::catch_unwind(AssertUnwindSafe(|| mixer.fill(out))).is_ok()
            };
            if !filled {
                // 回调可能写了一半，重新静音
                out.fill(self.silence);
                self.stats.record_degraded();
                self.stats.record_silent();
                return;
            }
            self.stats
                .add_frames_rendered((out.len() / self.bytes_per_frame.max(1)) as u64);
        }
    }
}

/// 打开期间的子系统引用守卫
///
/// 打开中途失败时释放引用；成功后解除武装，所有权转入设备。
struct SubsystemRef<'a> {
    host: &'a Arc<dyn HostApi>,
    armed: bool,
}

impl<'a> SubsystemRef<'a> {
    fn acquire(host: &'a Arc<dyn HostApi>) -> Result<Self, OpenError> {
        host.subsystem()
            .acquire(|| host.subsystem_init())
            .map_err(|e| OpenError::SubsystemInitFailed(e.to_string()))?;
        Ok(Self { host, armed: true })
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubsystemRef<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.host
                .subsystem()
                .release(|| self.host.subsystem_deinit());
        }
    }
}

/// 音频设备
///
/// 平台流句柄的唯一所有者。存在即表示流处于打开状态；
/// `close` 之后（以及 `close` 开始释放之后）不会再有回调发生。
pub struct AudioDevice {
    host: Arc<dyn HostApi>,
    spec: AudioSpec,
    desc: HostFormat,
    flags: Arc<SharedFlags>,
    mixer: Arc<Mutex<Mixer>>,
    stats: Arc<CallbackStats>,
    stream: Option<Box<dyn HostStream>>,
    subsystem_held: bool,
}

impl AudioDevice {
    /// 打开设备（默认转换器工厂：字节序交换）
    pub fn open(
        host: Arc<dyn HostApi>,
        spec: AudioSpec,
        fill: FillCallback,
        direction: Direction,
    ) -> Result<Self, OpenError> {
        Self::open_with_converter(host, spec, fill, direction, &ByteSwapFactory)
    }

    /// 打开设备，转换器由外部工厂提供
    pub fn open_with_converter(
        host: Arc<dyn HostApi>,
        mut spec: AudioSpec,
        fill: FillCallback,
        direction: Direction,
        factory: &dyn ConverterFactory,
    ) -> Result<Self, OpenError> {
        // 进程级子系统：首个设备触发初始化
        let subsystem = SubsystemRef::acquire(&host)?;

        // 沿回退序列协商硬件可接受的格式
        let requested = spec.format;
        let granted = negotiate(requested, |f| match HostFormatTag::from_sample_format(f) {
            Some(tag) => host.supports_format(tag, f.order),
            None => false,
        })
        .ok_or(OpenError::UnsupportedFormat)?;

        let tag = match HostFormatTag::from_sample_format(granted) {
            Some(tag) => tag,
            None => return Err(OpenError::UnsupportedFormat),
        };

        // 就地更新规格：应用读到的必须是实际生效的值
        spec.format = granted;
        spec.samples = host.clamp_buffer_frames(spec.samples);
        spec.recalculate();

        let desc = HostFormat {
            tag,
            byte_order: granted.order,
            channels: spec.channels,
            frame_rate: spec.freq,
            buffer_frames: spec.samples,
        };

        // 授予格式与请求不同时需要转换；暂存区按请求格式的
        // 缓冲大小分配
        let (convert, converter) = if granted != requested {
            let conv = factory
                .build(requested, granted)
                .map_err(|_| OpenError::UnsupportedFormat)?;
            let raw_len =
                spec.samples as usize * spec.channels as usize * requested.bytes_per_sample();
            (
                ConversionState::new(raw_len, conv.len_multiplier()),
                Some(conv),
            )
        } else {
            (ConversionState::disabled(), None)
        };

        let flags = Arc::new(SharedFlags {
            enabled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        });
        let mixer = Arc::new(Mutex::new(Mixer { fill }));
        let stats = Arc::new(CallbackStats::new());

        let mut engine = StreamEngine {
            flags: Arc::clone(&flags),
            mixer: Arc::clone(&mixer),
            silence: spec.silence,
            bytes_per_frame: spec.channels as usize * granted.bytes_per_sample(),
            convert,
            converter,
            stats: Arc::clone(&stats),
        };
        let pull: PullFn = Box::new(move |out: &mut [u8]| engine.pull(out));

        // 平台流创建会产生内部线程；创建期间屏蔽信号投递，
        // 守卫在作用域结束时恢复原掩码，创建失败也一样
        let created = {
            let _signals = SignalMaskGuard::block_all();
            host.open_stream(&desc, direction, pull)
        };
        let mut stream = created.map_err(|e| OpenError::AllocationFailure(e.to_string()))?;

        flags.enabled.store(true, Ordering::Release);
        if let Err(e) = stream.start() {
            flags.enabled.store(false, Ordering::Release);
            stream.stop();
            return Err(OpenError::StreamStartFailed(e.to_string()));
        }

        subsystem.disarm();
        log::info!(
            "Audio device opened on {}: {:?} {}ch {}Hz, {} frames/buffer{}",
            host.name(),
            granted,
            spec.channels,
            spec.freq,
            spec.samples,
            if granted != requested {
                " (converting)"
            } else {
                ""
            }
        );

        Ok(Self {
            host,
            spec,
            desc,
            flags,
            mixer,
            stats,
            stream: Some(stream),
            subsystem_held: true,
        })
    }

    /// 关闭设备
    ///
    /// 幂等：对部分打开或已关闭的设备调用是安全的。先停流
    /// （返回时不再有回调执行，之后也不会有新的回调开始），
    /// 再释放流对象和设备私有状态，最后归还子系统引用。
    pub fn close(&mut self) {
        self.flags.enabled.store(false, Ordering::Release);

        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            // 回调引擎归拉取闭包所有，随流对象一起释放
            drop(stream);
            log::info!("Audio device closed");
        }

        if self.subsystem_held {
            self.subsystem_held = false;
            self.host
                .subsystem()
                .release(|| self.host.subsystem_deinit());
        }
    }

    /// 暂停或恢复
    ///
    /// 只切换回调检查的标志位，不改变硬件流状态；暂停期间
    /// 硬件播放静音。
    pub fn pause(&self, paused: bool) {
        self.flags.paused.store(paused, Ordering::Release);
    }

    /// 是否处于暂停
    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::Acquire)
    }

    /// 流是否仍然打开
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// 实际生效的流规格
    ///
    /// 格式、缓冲帧数和静音值反映协商结果，其余字段与请求一致。
    pub fn spec(&self) -> &AudioSpec {
        &self.spec
    }

    /// 硬件格式描述符
    pub fn host_format(&self) -> &HostFormat {
        &self.desc
    }

    /// 所属后端的能力描述符
    pub fn caps(&self) -> HostCaps {
        self.host.caps()
    }

    /// 持有混音锁
    ///
    /// 应用修改填充回调共享的混音状态时持有；持有期间不会有
    /// 填充回调被调用。
    pub fn lock(&self) -> MixerGuard<'_> {
        MixerGuard {
            _inner: lock_mixer(&self.mixer),
        }
    }

    /// 回调统计快照
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.close();
    }
}
