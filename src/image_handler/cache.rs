//! # 解码缓存模块
//!
//! ## 设计思路
//!
//! 以“解析后的路径 + 字节长度 + 内容哈希”为键缓存解码结果，
//! 同一文档中重复引用同一张图时只解码一次；文件内容变化后键随之变化，不会命中旧结果。
//!
//! ## 实现思路
//!
//! - 槽位表由 `Mutex<HashMap>` 保护，锁只在查找/写入槽位时持有，解码在锁外进行，
//!   因此不同键的解码可以完全并行。
//! - 槽位为 `Ready`（已完成）或 `Pending`（解码中）。首个请求者成为 owner 执行解码，
//!   其余并发请求者在 `InFlight` 的 `Condvar` 上等待同一结果。
//! - 只缓存成功结果：失败时移除槽位，已在等待的请求者收到同一错误，下一次引用会重新加载。
//! - owner 若在解码中 panic，`FlightGuard` 在析构时移除槽位并唤醒等待者，避免永久阻塞。
//! - 失效（`invalidate_path` / `clear`）遇到进行中的解码时只打标记：等待者照常拿到结果，
//!   但 owner 完成后不再写回 `Ready`。
//! - 锁中毒时取回内部数据继续使用：槽位表只做单步插入/删除，不存在写到一半的状态。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::{DecodedImage, ImageError};

type SharedResult = Result<Arc<DecodedImage>, ImageError>;

/// 缓存键：解析后的路径 + 内容指纹。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: PathBuf,
    byte_len: u64,
    content_hash: [u8; 32],
}

impl CacheKey {
    /// 由来源路径与原始字节计算键（blake3 内容哈希）。
    pub fn for_bytes(path: &Path, bytes: &[u8]) -> Self {
        Self {
            path: path.to_path_buf(),
            byte_len: bytes.len() as u64,
            content_hash: *blake3::hash(bytes).as_bytes(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }
}

/// 缓存统计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub failures: u64,
    pub entries: usize,
}

struct InFlight {
    result: Mutex<Option<SharedResult>>,
    cv: Condvar,
    /// 解码期间被失效；只在持有槽位表锁时读写。
    invalidated: AtomicBool,
}

impl InFlight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            cv: Condvar::new(),
            invalidated: AtomicBool::new(false),
        }
    }

    fn set(&self, result: SharedResult) {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(result);
        self.cv.notify_all();
    }

    fn wait(&self) -> SharedResult {
        let mut guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        while guard.is_none() {
            guard = self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }

        match guard.as_ref() {
            Some(result) => result.clone(),
            None => Err(ImageError::Internal("in-flight decode finished without result".to_string())),
        }
    }
}

enum Slot {
    Ready(Arc<DecodedImage>),
    Pending(Arc<InFlight>),
}

enum Lookup {
    Hit(Arc<DecodedImage>),
    Wait(Arc<InFlight>),
    Owner(Arc<InFlight>),
}

/// 解码结果缓存，生命周期与所属会话一致。
#[derive(Default)]
pub struct ImageCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

/// owner 完成前被析构（panic 展开）时，清理槽位并唤醒等待者。
struct FlightGuard<'a> {
    cache: &'a ImageCache,
    key: &'a CacheKey,
    flight: &'a InFlight,
    finished: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self, result: &SharedResult) {
        self.finished = true;
        self.cache.complete(self.key, self.flight, result);
        self.flight.set(result.clone());
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let result = Err(ImageError::Internal(format!(
            "decode of {} panicked",
            self.key.path.display()
        )));
        self.cache.complete(self.key, self.flight, &result);
        self.flight.set(result);
    }
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            log::warn!("⚠️ 解码缓存锁已中毒，继续使用内部数据");
            poisoned.into_inner()
        })
    }

    /// 查找缓存；未命中时执行 `load`，同一键的并发请求只会执行一次 `load`。
    pub fn get_or_load<F>(&self, key: &CacheKey, load: F) -> SharedResult
    where
        F: FnOnce() -> Result<DecodedImage, ImageError>,
    {
        let lookup = {
            let mut slots = self.lock_slots();
            match slots.get(key) {
                Some(Slot::Ready(image)) => Lookup::Hit(Arc::clone(image)),
                Some(Slot::Pending(flight)) => Lookup::Wait(Arc::clone(flight)),
                None => {
                    let flight = Arc::new(InFlight::new());
                    slots.insert(key.clone(), Slot::Pending(Arc::clone(&flight)));
                    Lookup::Owner(flight)
                }
            }
        };

        let flight = match lookup {
            Lookup::Hit(image) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("♻️ 命中解码缓存 - 路径: {}", key.path.display());
                return Ok(image);
            }
            Lookup::Wait(flight) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                log::debug!("⏳ 等待进行中的解码 - 路径: {}", key.path.display());
                return flight.wait();
            }
            Lookup::Owner(flight) => flight,
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            cache: self,
            key,
            flight: &flight,
            finished: false,
        };

        let result = load().map(Arc::new);
        guard.finish(&result);
        result
    }

    /// 写回 owner 的结果：成功转为 `Ready`，失败或已被失效时移除槽位。
    fn complete(&self, key: &CacheKey, flight: &InFlight, result: &SharedResult) {
        let mut slots = self.lock_slots();

        match result {
            Ok(_) if flight.invalidated.load(Ordering::Relaxed) => {
                slots.remove(key);
                log::debug!("🧹 解码期间已失效，结果不写回 - 路径: {}", key.path.display());
            }
            Ok(image) => {
                slots.insert(key.clone(), Slot::Ready(Arc::clone(image)));
            }
            Err(err) => {
                slots.remove(key);
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::debug!("🚫 解码失败不缓存 - 路径: {} 原因: {}", key.path.display(), err);
            }
        }
    }

    /// 移除某路径下所有已完成的条目（任意指纹），返回移除数量。
    ///
    /// 该路径上进行中的解码会被标记，完成后不写回缓存。
    pub fn invalidate_path(&self, path: &Path) -> usize {
        let mut slots = self.lock_slots();

        let before = slots.len();
        slots.retain(|key, slot| match slot {
            _ if key.path != path => true,
            Slot::Ready(_) => false,
            Slot::Pending(flight) => {
                flight.invalidated.store(true, Ordering::Relaxed);
                true
            }
        });
        before - slots.len()
    }

    /// 清空所有已完成条目；进行中的解码继续交付给等待者，但不再写回缓存。
    pub fn clear(&self) {
        let mut slots = self.lock_slots();
        slots.retain(|_, slot| match slot {
            Slot::Ready(_) => false,
            Slot::Pending(flight) => {
                flight.invalidated.store(true, Ordering::Relaxed);
                true
            }
        });
    }

    /// 已完成条目数量。
    pub fn len(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::{DecodeError, ImageFormat};
    use image::DynamicImage;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn tiny_image() -> DecodedImage {
        DecodedImage::raster(ImageFormat::Png, DynamicImage::new_rgba8(2, 2), None)
            .expect("valid test image")
    }

    fn key(name: &str, content: &[u8]) -> CacheKey {
        CacheKey::for_bytes(Path::new(name), content)
    }

    #[test]
    fn second_lookup_hits_without_loading() {
        let cache = ImageCache::new();
        let key = key("/doc/a.png", b"abc");

        cache.get_or_load(&key, || Ok(tiny_image())).expect("first load");
        let second = cache.get_or_load(&key, || panic!("loader must not run on a hit"));

        assert!(second.is_ok());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_content_misses() {
        let cache = ImageCache::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(tiny_image())
        };

        cache.get_or_load(&key("/doc/a.png", b"v1"), load).expect("v1");
        cache.get_or_load(&key("/doc/a.png", b"v2"), load).expect("v2");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = ImageCache::new();
        let key = key("/doc/locked.png", b"x");

        let first = cache.get_or_load(&key, || Err(ImageError::from(DecodeError::UnsupportedFormat)));
        assert!(first.is_err());
        assert!(cache.is_empty());

        let second = cache.get_or_load(&key, || Ok(tiny_image()));
        assert!(second.is_ok());
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn concurrent_requests_coalesce_into_one_load() {
        let cache = Arc::new(ImageCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let key = key("/doc/shared.png", b"shared");

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_load(&key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(tiny_image())
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread should not panic"))
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().expect("load should succeed");
        for result in &results {
            let image = result.as_ref().expect("load should succeed");
            assert!(Arc::ptr_eq(first, image));
        }
    }

    #[test]
    fn waiters_receive_owner_failure() {
        let cache = Arc::new(ImageCache::new());
        let key = key("/doc/bad.png", b"bad");
        let started = Arc::new(Barrier::new(2));

        let owner = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                cache.get_or_load(&key, || {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    Err(ImageError::from(DecodeError::UnsupportedFormat))
                })
            })
        };

        started.wait();
        let waiter = cache.get_or_load(&key, || panic!("waiter must not load"));
        let owner = owner.join().expect("owner thread should not panic");

        assert!(owner.is_err());
        assert!(matches!(waiter, Err(ImageError::InvalidFormat(DecodeError::UnsupportedFormat))));
        assert!(cache.is_empty());
    }

    #[test]
    fn panicking_loader_releases_slot() {
        let cache = ImageCache::new();
        let key = key("/doc/panic.png", b"p");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = cache.get_or_load(&key, || panic!("decoder bug"));
        }));
        assert!(outcome.is_err());

        let retry = cache.get_or_load(&key, || Ok(tiny_image()));
        assert!(retry.is_ok());
    }

    #[test]
    fn invalidate_path_drops_all_fingerprints() {
        let cache = ImageCache::new();
        cache.get_or_load(&key("/doc/a.png", b"1"), || Ok(tiny_image())).expect("a1");
        cache.get_or_load(&key("/doc/a.png", b"2"), || Ok(tiny_image())).expect("a2");
        cache.get_or_load(&key("/doc/b.png", b"1"), || Ok(tiny_image())).expect("b1");

        assert_eq!(cache.invalidate_path(Path::new("/doc/a.png")), 2);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    /// owner 解码期间执行 `invalidate`，返回 owner 的结果。
    fn load_with_invalidation_midway(
        cache: &Arc<ImageCache>,
        key: &CacheKey,
        invalidate: impl FnOnce(&ImageCache),
    ) -> SharedResult {
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let owner = {
            let cache = Arc::clone(cache);
            let key = key.clone();
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cache.get_or_load(&key, || {
                    started.wait();
                    release.wait();
                    Ok(tiny_image())
                })
            })
        };

        started.wait();
        invalidate(cache.as_ref());
        release.wait();
        owner.join().expect("owner thread should not panic")
    }

    #[test]
    fn invalidate_during_decode_is_not_written_back() {
        let cache = Arc::new(ImageCache::new());
        let key = key("/doc/live.png", b"v1");

        let owner = load_with_invalidation_midway(&cache, &key, |cache| {
            assert_eq!(cache.invalidate_path(Path::new("/doc/live.png")), 0);
        });
        assert!(owner.is_ok());
        assert!(cache.is_empty());

        let calls = AtomicUsize::new(0);
        cache
            .get_or_load(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(tiny_image())
            })
            .expect("reload after invalidation");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_during_decode_is_not_written_back() {
        let cache = Arc::new(ImageCache::new());
        let key = key("/doc/live.png", b"v1");

        let owner = load_with_invalidation_midway(&cache, &key, ImageCache::clear);
        assert!(owner.is_ok());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn other_paths_keep_in_flight_results() {
        let cache = Arc::new(ImageCache::new());
        let key = key("/doc/keep.png", b"k");

        let owner = load_with_invalidation_midway(&cache, &key, |cache| {
            cache.invalidate_path(Path::new("/doc/other.png"));
        });
        assert!(owner.is_ok());
        assert_eq!(cache.len(), 1);
    }

    /// 在另一个线程持锁 panic，使槽位表锁中毒。
    fn poison_slots(cache: &ImageCache) {
        let outcome: thread::Result<()> = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _slots = cache.slots.lock();
                    panic!("poison image cache lock");
                })
                .join()
        });
        assert!(outcome.is_err());
        assert!(cache.slots.is_poisoned());
    }

    #[test]
    fn failure_after_lock_poisoning_releases_slot() {
        let cache = ImageCache::new();
        let key = key("/doc/poison.png", b"p");

        let first = cache.get_or_load(&key, || {
            poison_slots(&cache);
            Err(ImageError::from(DecodeError::UnsupportedFormat))
        });
        assert!(matches!(first, Err(ImageError::InvalidFormat(DecodeError::UnsupportedFormat))));
        assert!(cache.is_empty());

        let retry = cache.get_or_load(&key, || Ok(tiny_image()));
        assert!(retry.is_ok());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn poisoned_cache_keeps_serving_hits() {
        let cache = ImageCache::new();
        let key = key("/doc/poison.png", b"q");

        cache.get_or_load(&key, || Ok(tiny_image())).expect("first load");
        poison_slots(&cache);

        let second = cache.get_or_load(&key, || panic!("loader must not run on a hit"));
        assert!(second.is_ok());
        assert_eq!(cache.stats().hits, 1);
    }
}
