//! 无硬件参考后端
//!
//! 接受回退序列的所有格式，每个流起一条独立线程，按缓冲区
//! 周期拉取数据后丢弃。没有声卡的环境（CI、服务器）用它走完
//! 完整的设备生命周期。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::format::ByteOrder;
use crate::host::{
    Direction, HostApi, HostCaps, HostError, HostFormat, HostFormatTag, HostStream, PullFn,
};
use crate::registry::Subsystem;

/// 无硬件后端
pub struct NullHost {
    subsystem: Subsystem,
}

impl NullHost {
    pub fn new() -> Self {
        Self {
            subsystem: Subsystem::new(),
        }
    }
}

impl Default for NullHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostApi for NullHost {
    fn name(&self) -> &'static str {
        "null"
    }

    fn caps(&self) -> HostCaps {
        HostCaps {
            owns_callback_thread: true,
            default_device_only: true,
        }
    }

    fn subsystem(&self) -> &Subsystem {
        &self.subsystem
    }

    fn supports_format(&self, _tag: HostFormatTag, _order: ByteOrder) -> bool {
        true
    }

    fn open_stream(
        &self,
        desc: &HostFormat,
        _direction: Direction,
        pull: PullFn,
    ) -> Result<Box<dyn HostStream>, HostError> {
        // 一个缓冲区对应的墙钟时间
        let period = Duration::from_nanos(
            desc.buffer_frames as u64 * 1_000_000_000 / desc.frame_rate.max(1) as u64,
        );

        Ok(Box::new(NullStream {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            pull: Some(pull),
            buffer_bytes: desc.buffer_bytes(),
            period,
        }))
    }
}

/// 无硬件流
///
/// start 后由 `null-audio` 线程驱动拉取；stop 设置标志并 join，
/// 返回时线程已退出，不会再有回调发生。
struct NullStream {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    pull: Option<PullFn>,
    buffer_bytes: usize,
    period: Duration,
}

impl HostStream for NullStream {
    fn start(&mut self) -> Result<(), HostError> {
        let mut pull = match self.pull.take() {
            Some(p) => p,
            None => return Err(HostError::StreamStart("stream already started".into())),
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let buffer_bytes = self.buffer_bytes;
        let period = self.period;

        let handle = thread::Builder::new()
            .name("null-audio".to_string())
            .spawn(move || {
                log::info!("Null audio thread started");
                let mut buffer = vec![0u8; buffer_bytes];
                while running.load(Ordering::Acquire) {
                    pull(&mut buffer);
                    thread::sleep(period);
                }
                log::info!("Null audio thread finished");
            })
            .map_err(|e| HostError::StreamStart(e.to_string()))?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        self.stop();
    }
}
