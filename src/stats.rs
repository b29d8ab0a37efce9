//! 回调统计
//!
//! 在硬件回调中收集，全部基于原子操作，无锁无分配。

use std::sync::atomic::{AtomicU64, Ordering};

/// 回调统计收集器
#[derive(Default)]
pub struct CallbackStats {
    callbacks: AtomicU64,
    silent_buffers: AtomicU64,
    degraded_buffers: AtomicU64,
    frames_rendered: AtomicU64,
}

impl CallbackStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次硬件回调调用一次
    #[inline]
    pub fn record_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一个以纯静音返回的缓冲区（禁用、暂停或降级）
    #[inline]
    pub fn record_silent(&self) {
        self.silent_buffers.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次内部失败降级（转换出错或应用回调异常）
    #[inline]
    pub fn record_degraded(&self) {
        self.degraded_buffers.fetch_add(1, Ordering::Relaxed);
    }

    /// 累计实际交付给硬件的帧数
    #[inline]
    pub fn add_frames_rendered(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    /// 当前计数快照
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            silent_buffers: self.silent_buffers.load(Ordering::Relaxed),
            degraded_buffers: self.degraded_buffers.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
        }
    }

    /// 清零
    pub fn reset(&self) {
        self.callbacks.store(0, Ordering::Relaxed);
        self.silent_buffers.store(0, Ordering::Relaxed);
        self.degraded_buffers.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
    }
}

/// 统计快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub callbacks: u64,
    pub silent_buffers: u64,
    pub degraded_buffers: u64,
    pub frames_rendered: u64,
}
