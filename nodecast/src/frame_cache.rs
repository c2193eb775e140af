//! Window-coalescing frame decode cache for interactive video seek.
//!
//! A random-access decode of a compressed video file costs seconds; an
//! interactive seek needs an answer in about a human perceptual budget
//! (~100 ms). This cache decodes short windows around a requested frame
//! and serves concurrent requests for the same window from a single
//! decode.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, warn};

/// `width * height * channels` of the expected decoded frame, used to size
/// the zero-filled fallback frame on decode failure without needing a
/// successful decode to copy shape from.
#[derive(Debug, Clone, Copy)]
pub struct FrameShape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl FrameShape {
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.width * self.height * self.channels
    }
}

/// A pluggable decoder: given the first frame id of a window, return every
/// decoded frame in `[start, start + window_frames)` it managed to produce.
/// Implementations typically wrap a hardware-accelerated pipeline that
/// seeks by timestamp rather than index.
pub trait WindowDecoder: Send + Sync {
    fn decode_window(&self, start: u64, window_frames: u64) -> HashMap<u64, Arc<[u8]>>;
}

struct Entry {
    frames: HashMap<u64, Arc<[u8]>>,
}

/// LRU-evicted cache of decoded video windows.
pub struct FrameCache<D: WindowDecoder> {
    decoder: D,
    shape: FrameShape,
    window_frames: u64,
    budget_bytes: usize,
    state: Mutex<State>,
}

struct State {
    /// window start -> entry, ordered least-recently-used first.
    windows: indexmap_lru::LruMap,
}

mod indexmap_lru {
    use super::Entry;
    use hashbrown::HashMap;

    /// Minimal insertion-order-tracking LRU map: eviction just drops the
    /// least-recently-touched window once the byte budget is exceeded.
    pub struct LruMap {
        entries: HashMap<u64, Entry>,
        /// Most-recently-used window starts at the back.
        recency: Vec<u64>,
        bytes: usize,
    }

    impl LruMap {
        pub fn new() -> Self {
            Self {
                entries: HashMap::new(),
                recency: Vec::new(),
                bytes: 0,
            }
        }

        pub fn get(&mut self, start: u64) -> Option<&Entry> {
            if self.entries.contains_key(&start) {
                self.touch(start);
                self.entries.get(&start)
            } else {
                None
            }
        }

        pub fn insert(&mut self, start: u64, entry: Entry, budget_bytes: usize) {
            let added: usize = entry.frames.values().map(|f| f.len()).sum();
            self.entries.insert(start, entry);
            self.touch(start);
            self.bytes += added;
            self.evict_to_budget(budget_bytes);
        }

        fn touch(&mut self, start: u64) {
            self.recency.retain(|&s| s != start);
            self.recency.push(start);
        }

        fn evict_to_budget(&mut self, budget_bytes: usize) {
            while self.bytes > budget_bytes && self.recency.len() > 1 {
                let oldest = self.recency.remove(0);
                if let Some(entry) = self.entries.remove(&oldest) {
                    let freed: usize = entry.frames.values().map(|f| f.len()).sum();
                    self.bytes = self.bytes.saturating_sub(freed);
                }
            }
        }
    }
}

impl<D: WindowDecoder> FrameCache<D> {
    #[must_use]
    pub fn new(decoder: D, shape: FrameShape, window_frames: u64, budget_bytes: usize) -> Self {
        Self {
            decoder,
            shape,
            window_frames,
            budget_bytes,
            state: Mutex::new(State {
                windows: indexmap_lru::LruMap::new(),
            }),
        }
    }

    fn window_start(&self, frame_id: u64) -> u64 {
        (frame_id / self.window_frames) * self.window_frames
    }

    /// Return the decoded bytes for `frame_id`, decoding its window if
    /// necessary. At most one decode is ever in flight for a given window:
    /// concurrent callers block on the same cache-fill under `state`'s lock
    /// rather than each triggering their own decode.
    pub fn get(&self, frame_id: u64) -> Arc<[u8]> {
        let start = self.window_start(frame_id);

        // Held for the whole lookup-or-decode: a second caller for the same
        // window blocks here and observes the freshly-inserted entry
        // instead of triggering a second decode.
        let mut state = self.state.lock();
        if let Some(entry) = state.windows.get(start) {
            if let Some(bytes) = entry.frames.get(&frame_id) {
                return bytes.clone();
            }
        }

        let frames = self.decoder.decode_window(start, self.window_frames);
        let hit = frames.get(&frame_id).cloned();
        state
            .windows
            .insert(start, Entry { frames }, self.budget_bytes);

        hit.unwrap_or_else(|| {
            error!(frame_id, start, "decode failed or frame missing from window, returning zero-filled frame");
            zero_frame(self.shape)
        })
    }
}

fn zero_frame(shape: FrameShape) -> Arc<[u8]> {
    warn!(bytes = shape.byte_len(), "substituting zero-filled frame");
    vec![0u8; shape.byte_len()].into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl WindowDecoder for CountingDecoder {
        fn decode_window(&self, start: u64, window_frames: u64) -> HashMap<u64, Arc<[u8]>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (start..start + window_frames)
                .map(|id| (id, vec![id as u8].into()))
                .collect()
        }
    }

    #[test]
    fn coalesces_into_one_decode_per_window() {
        let cache = FrameCache::new(
            CountingDecoder { calls: AtomicUsize::new(0) },
            FrameShape { width: 1, height: 1, channels: 1 },
            30,
            1 << 20,
        );

        let f100 = cache.get(100);
        let f115 = cache.get(115);

        assert_eq!(&*f100, &[100u8][..]);
        assert_eq!(&*f115, &[115u8][..]);
        assert_eq!(cache.decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decode_failure_returns_zero_filled_frame_of_expected_shape() {
        struct EmptyDecoder;
        impl WindowDecoder for EmptyDecoder {
            fn decode_window(&self, _start: u64, _window_frames: u64) -> HashMap<u64, Arc<[u8]>> {
                HashMap::new()
            }
        }

        let shape = FrameShape { width: 4, height: 2, channels: 3 };
        let cache = FrameCache::new(EmptyDecoder, shape, 10, 1 << 20);
        let frame = cache.get(5);
        assert_eq!(frame.len(), shape.byte_len());
        assert!(frame.iter().all(|&b| b == 0));
    }
}
