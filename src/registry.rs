//! 进程级音频子系统引用计数
//!
//! 平台音频子系统在进程内只初始化一次，多个设备共享同一次
//! 初始化。计数从 0 到 1 时执行 init 钩子，从 1 回到 0 时执行
//! deinit 钩子。

use std::sync::Mutex;

/// 进程级子系统句柄
///
/// 由 `HostApi` 实现持有一个实例，所有在该 host 上打开的设备
/// 共享这一个计数。
pub struct Subsystem {
    refs: Mutex<u32>,
}

impl Subsystem {
    pub const fn new() -> Self {
        Self {
            refs: Mutex::new(0),
        }
    }

    /// 获取一个引用；计数 0→1 时执行 `init`
    ///
    /// `init` 失败时计数保持为 0，错误原样返回。
    pub fn acquire<E>(&self, init: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
        let mut refs = self.refs.lock().unwrap_or_else(|p| p.into_inner());
        if *refs == 0 {
            init()?;
            log::debug!("Audio subsystem initialized");
        }
        *refs += 1;
        Ok(())
    }

    /// 释放一个引用；计数 1→0 时执行 `deinit`
    ///
    /// 未配对的释放被忽略，deinit 因此最多执行一次。
    pub fn release(&self, deinit: impl FnOnce()) {
        let mut refs = self.refs.lock().unwrap_or_else(|p| p.into_inner());
        if *refs == 0 {
            log::warn!("Audio subsystem release without matching acquire");
            return;
        }
        *refs -= 1;
        if *refs == 0 {
            deinit();
            log::debug!("Audio subsystem deinitialized");
        }
    }

    /// 当前引用计数
    pub fn ref_count(&self) -> u32 {
        *self.refs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for Subsystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_init_runs_once() {
        let subsys = Subsystem::new();
        let inits = AtomicU32::new(0);

        for _ in 0..3 {
            subsys
                .acquire(|| -> Result<(), ()> {
                    inits.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .unwrap();
        }

        assert_eq!(inits.load(Ordering::Relaxed), 1);
        assert_eq!(subsys.ref_count(), 3);
    }

    #[test]
    fn test_deinit_on_last_release() {
        let subsys = Subsystem::new();
        let deinits = AtomicU32::new(0);

        subsys.acquire(|| -> Result<(), ()> { Ok(()) }).unwrap();
        subsys.acquire(|| -> Result<(), ()> { Ok(()) }).unwrap();

        subsys.release(|| {
            deinits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(deinits.load(Ordering::Relaxed), 0);

        subsys.release(|| {
            deinits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(deinits.load(Ordering::Relaxed), 1);
        assert_eq!(subsys.ref_count(), 0);
    }

    #[test]
    fn test_failed_init_keeps_count_zero() {
        let subsys = Subsystem::new();

        let result = subsys.acquire(|| Err("no hardware"));
        assert_eq!(result, Err("no hardware"));
        assert_eq!(subsys.ref_count(), 0);

        // 失败后可以重试
        subsys.acquire(|| -> Result<(), &str> { Ok(()) }).unwrap();
        assert_eq!(subsys.ref_count(), 1);
    }

    #[test]
    fn test_unpaired_release_ignored() {
        let subsys = Subsystem::new();
        let deinits = AtomicU32::new(0);

        subsys.release(|| {
            deinits.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(deinits.load(Ordering::Relaxed), 0);
        assert_eq!(subsys.ref_count(), 0);
    }
}
