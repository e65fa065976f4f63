//! Unit tests for mapping, fragment bookkeeping and page locking

use crate::fixtures::write_bytes;
use safetensors_mmap::diagnostics::Diagnostic;
use safetensors_mmap::memory::{
    align_down, align_range, align_up, is_aligned, page_size, Backend, FragmentSet, LockState,
    MapOptions, MemoryLock, MemoryMap, PageLocker,
};
use safetensors_mmap::prelude::*;
use std::io;
use std::sync::{Arc, Mutex};

fn map_bytes(bytes: &[u8]) -> (tempfile::NamedTempFile, MemoryMap) {
    let temp = write_bytes(bytes);
    let file = FileHandle::open(temp.path()).unwrap();
    let map = MemoryMap::map(&file, &MapOptions::default()).unwrap();
    (temp, map)
}

mod alignment_tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        let page = page_size();
        assert!(page >= 512);
        assert!(page.is_power_of_two());
    }

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_up(1, 4096), Some(4096));
        assert_eq!(align_up(4096, 4096), Some(4096));
        assert_eq!(align_up(usize::MAX, 4096), None);
        assert_eq!(align_down(4097, 4096), 4096);
        assert!(is_aligned(8192, 4096));
        assert!(!is_aligned(100, 4096));
    }

    #[test]
    fn test_align_range_keeps_whole_pages() {
        assert_eq!(align_range(1, 3 * 4096 - 1, 4096), 4096..8192);
        assert_eq!(align_range(0, 4096, 4096), 0..4096);
        assert!(align_range(10, 100, 4096).is_empty());
        assert!(align_range(9000, 10, 4096).is_empty());
    }
}

mod fragment_tests {
    use super::*;

    #[test]
    fn test_release_cases() {
        let mut set = FragmentSet::new(100);

        set.release(&(40..60));
        assert_eq!(set.as_slice(), &[0..40, 60..100]);

        set.release(&(30..50));
        assert_eq!(set.as_slice(), &[0..30, 60..100]);

        set.release(&(55..70));
        assert_eq!(set.as_slice(), &[0..30, 70..100]);

        set.release(&(0..30));
        assert_eq!(set.as_slice(), &[70..100]);

        set.release(&(0..10));
        assert_eq!(set.as_slice(), &[70..100]);
        assert_eq!(set.mapped_bytes(), 30);
    }

    #[test]
    fn test_contains_and_intersections() {
        let mut set = FragmentSet::new(100);
        set.release(&(20..40));

        assert!(set.contains(&(0..20)));
        assert!(set.contains(&(40..100)));
        assert!(!set.contains(&(10..30)));
        assert!(!set.contains(&(0..100)));
        assert_eq!(set.intersections(&(10..50)), vec![10..20, 40..50]);
        assert!(set.intersections(&(20..40)).is_empty());
    }
}

mod map_tests {
    use super::*;

    #[test]
    fn test_map_exposes_file_contents() {
        let contents: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let (_temp, map) = map_bytes(&contents);

        assert_eq!(map.len(), contents.len());
        assert_eq!(map.mapped_len(), contents.len());
        assert_eq!(map.as_slice().unwrap(), &contents[..]);
        assert_eq!(map.get(100..110).unwrap(), &contents[100..110]);
        assert!(map.get(9_990..10_001).is_none());
    }

    #[test]
    fn test_backend_matches_platform() {
        let (_temp, map) = map_bytes(&[0u8; 16]);
        if cfg!(feature = "heap-fallback") {
            assert_eq!(map.backend(), Backend::Heap);
        } else if cfg!(unix) {
            assert_eq!(map.backend(), Backend::Posix);
            assert!(map.backend().supports_release());
        } else if cfg!(windows) {
            assert_eq!(map.backend(), Backend::Windows);
        }
    }

    #[test]
    fn test_short_file_is_too_small() {
        let temp = write_bytes(&[1, 2, 3, 4, 5, 6, 7]);
        let file = FileHandle::open(temp.path()).unwrap();
        let result = MemoryMap::map(&file, &MapOptions::default());
        assert!(matches!(result, Err(SafeTensorsError::TooSmall { size: 7, required: 8 })));
    }

    #[test]
    fn test_map_without_prefetch() {
        let temp = write_bytes(&[9u8; 64]);
        let file = FileHandle::open(temp.path()).unwrap();
        let options = MapOptions { prefetch: 0, numa: true };
        assert_eq!(options.effective_prefetch(), 0);

        let map = MemoryMap::map(&file, &options).unwrap();
        assert_eq!(map.as_slice().unwrap(), &[9u8; 64][..]);
    }

    #[test]
    fn test_unmap_fragment_releases_whole_pages() {
        let page = page_size();
        let (_temp, mut map) = map_bytes(&vec![7u8; 4 * page + 100]);
        let len = map.len();

        map.unmap_fragment(page - 1, 3 * page + 1).unwrap();

        if map.backend().supports_release() {
            assert_eq!(map.fragments(), &[0..page, 3 * page..len]);
            assert_eq!(map.mapped_len(), len - 2 * page);
            assert!(map.get(page..page + 1).is_none());
            assert!(map.as_slice().is_none());
        } else {
            assert_eq!(map.fragments(), &[0..len]);
        }
        assert_eq!(map.get(0..page).unwrap(), &vec![7u8; page][..]);
        assert_eq!(map.get(3 * page..len).unwrap().len(), page + 100);
    }

    #[test]
    fn test_unmap_fragment_no_ops() {
        let page = page_size();
        let (_temp, mut map) = map_bytes(&vec![1u8; 2 * page]);

        map.unmap_fragment(10, page - 10).unwrap();
        map.unmap_fragment(page, page).unwrap();
        map.unmap_fragment(2 * page, 0).unwrap();
        assert_eq!(map.fragments(), &[0..2 * page]);
    }

    #[test]
    fn test_unmap_fragment_twice_is_harmless() {
        let page = page_size();
        let (_temp, mut map) = map_bytes(&vec![1u8; 3 * page]);

        map.unmap_fragment(0, page).unwrap();
        map.unmap_fragment(0, 2 * page).unwrap();
        if map.backend().supports_release() {
            assert_eq!(map.fragments(), &[2 * page..3 * page]);
        }
    }

    #[test]
    fn test_unmap_fragment_beyond_end() {
        let page = page_size();
        let (_temp, mut map) = map_bytes(&vec![1u8; page + 1]);

        let result = map.unmap_fragment(0, 4 * page);
        if map.backend().supports_release() {
            assert!(matches!(result, Err(SafeTensorsError::Range { first: 0, .. })));
            assert_eq!(map.mapped_len(), page + 1);
        } else {
            assert!(result.is_ok());
        }

        // The partial tail page may be released through its rounded-up end.
        map.unmap_fragment(page, 2 * page).unwrap();
        assert_eq!(map.get(0..page).unwrap().len(), page);
    }

    #[test]
    fn test_drop_reports_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let page = page_size();
        let temp = write_bytes(&vec![0u8; 3 * page]);
        let file = FileHandle::open(temp.path()).unwrap();

        let mut map = MemoryMap::map_with_sink(&file, &MapOptions::default(), sink.clone()).unwrap();
        map.unmap_fragment(page, 2 * page).unwrap();
        drop(map);

        assert!(sink
            .events()
            .iter()
            .all(|event| !matches!(event, Diagnostic::UnmapFailed { .. })));
    }
}

mod lock_tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Log {
        locks: Vec<(usize, usize)>,
        unlocks: Vec<usize>,
    }

    /// Locks until a byte budget is exhausted
    struct BudgetLocker {
        budget: usize,
        pinned: usize,
        log: Arc<Mutex<Log>>,
    }

    impl BudgetLocker {
        fn new(budget: usize) -> (Self, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            (Self { budget, pinned: 0, log: log.clone() }, log)
        }
    }

    impl PageLocker for BudgetLocker {
        fn granularity(&self) -> usize {
            4096
        }

        fn lock(&mut self, addr: *const u8, len: usize) -> io::Result<()> {
            self.log.lock().unwrap().locks.push((addr as usize, len));
            if self.pinned + len > self.budget {
                return Err(io::Error::new(io::ErrorKind::OutOfMemory, "over budget"));
            }
            self.pinned += len;
            Ok(())
        }

        fn unlock(&mut self, _addr: *const u8, len: usize) -> io::Result<()> {
            self.log.lock().unwrap().unlocks.push(len);
            self.pinned = 0;
            Ok(())
        }

        fn suggestion(&self, _error: &io::Error, _len: usize) -> Option<&'static str> {
            Some("raise the budget")
        }
    }

    const BASE: usize = 0x10_0000;

    #[test]
    fn test_grow_is_incremental_and_page_rounded() {
        let (locker, log) = BudgetLocker::new(usize::MAX);
        let sink = Arc::new(RecordingSink::new());
        let mut lock = MemoryLock::with_locker(BASE as *const u8, locker, sink.clone());
        assert_eq!(lock.state(), LockState::Untried);

        lock.grow_to(100);
        assert_eq!(lock.state(), LockState::Locked(4096));
        lock.grow_to(4096);
        lock.grow_to(10_000);
        assert_eq!(lock.locked_len(), 12_288);

        assert_eq!(log.lock().unwrap().locks, vec![(BASE, 4096), (BASE + 4096, 8192)]);
        drop(lock);
        assert_eq!(log.lock().unwrap().unlocks, vec![12_288]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_failure_is_sticky() {
        let (locker, log) = BudgetLocker::new(8192);
        let sink = Arc::new(RecordingSink::new());
        let mut lock = MemoryLock::with_locker(BASE as *const u8, locker, sink.clone());

        lock.grow_to(8192);
        lock.grow_to(20_000);
        assert!(lock.has_failed());
        assert_eq!(lock.locked_len(), 0);

        lock.grow_to(40_000);
        assert_eq!(log.lock().unwrap().locks.len(), 2);
        assert_eq!(log.lock().unwrap().unlocks, vec![8192]);

        match sink.events().as_slice() {
            [Diagnostic::LockFailed { len, previously_locked, suggestion, .. }] => {
                assert_eq!(*len, 20_480 - 8192);
                assert_eq!(*previously_locked, 8192);
                assert_eq!(*suggestion, Some("raise the budget"));
            }
            other => panic!("Expected one LockFailed, got {:?}", other),
        }

        drop(lock);
        assert_eq!(log.lock().unwrap().unlocks.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_os_locker_on_real_mapping() {
        let (_temp, map) = map_bytes(&[5u8; 64]);
        let sink = Arc::new(RecordingSink::new());
        let mut lock = MemoryLock::with_locker(
            map.as_ptr(),
            safetensors_mmap::memory::OsLocker,
            sink.clone(),
        );

        lock.grow_to(map.len());
        match lock.state() {
            LockState::Locked(len) => assert_eq!(len, page_size()),
            LockState::Failed => assert_eq!(sink.len(), 1),
            LockState::Untried => panic!("lock was never attempted"),
        }
        drop(lock);
    }
}
