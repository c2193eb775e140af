//! Timestamp-aligned snapshot ring buffer.
//!
//! Fuses K asynchronous, independently-paced channels into aligned
//! multi-channel snapshots. All channels share one ring index space so
//! position `p` in channel `i` is the same timestep as position `p` in
//! channel `j`; overwriting the oldest unread slot in any one channel
//! forces every other channel's read tip forward by one to preserve that
//! alignment.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::hash::Hash;

struct Channel<V> {
    slots: Vec<Option<V>>,
    read_tip: usize,
    write_tip: usize,
    is_full: bool,
    is_empty: bool,
}

impl<V> Channel<V> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| None).collect(),
            read_tip: 0,
            write_tip: 0,
            is_full: false,
            is_empty: true,
        }
    }

    fn len(&self, size: usize) -> usize {
        let diff = self.write_tip as isize - self.read_tip as isize;
        if diff == 0 && self.is_full {
            size
        } else if diff < 0 {
            size - diff.unsigned_abs()
        } else {
            diff as usize
        }
    }
}

struct Inner<K, V> {
    size: usize,
    order: Vec<K>,
    channels: HashMap<K, Channel<V>>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn all_empty(&self) -> bool {
        self.order.iter().all(|k| self.channels[k].is_empty)
    }

    /// Move the read tip of every channel by one position, per the
    /// alignment policy: a full channel just opens a slot; an empty
    /// channel drags its write tip along with it; otherwise only the read
    /// tip moves, possibly emptying the channel.
    fn move_read_tip(&mut self) {
        for k in &self.order {
            let ch = self.channels.get_mut(k).unwrap();
            if ch.is_full {
                ch.read_tip = (ch.read_tip + 1) % self.size;
                ch.is_full = false;
            } else if ch.is_empty {
                ch.read_tip = (ch.read_tip + 1) % self.size;
                ch.write_tip = (ch.write_tip + 1) % self.size;
            } else {
                ch.read_tip = (ch.read_tip + 1) % self.size;
                if ch.write_tip == ch.read_tip {
                    ch.is_empty = true;
                }
            }
        }
    }

    /// Advance `key`'s write tip by one, after the caller has already
    /// written data at its current position. If the advance would
    /// overwrite unread data, cascades a read-tip advance across every
    /// other channel too, to keep the ring's temporal alignment intact.
    fn move_write_tip(&mut self, key: &K) {
        let (write_tip, read_tip, is_empty) = {
            let ch = &self.channels[key];
            (ch.write_tip, ch.read_tip, ch.is_empty)
        };

        if write_tip == read_tip && !is_empty {
            {
                let ch = self.channels.get_mut(key).unwrap();
                ch.write_tip = (ch.write_tip + 1) % self.size;
                ch.read_tip = (ch.read_tip + 1) % self.size;
            }
            for k in &self.order {
                if k == key {
                    continue;
                }
                let ch = self.channels.get_mut(k).unwrap();
                if ch.is_full {
                    ch.read_tip = (ch.read_tip + 1) % self.size;
                    ch.is_full = false;
                } else if ch.is_empty {
                    ch.read_tip = (ch.read_tip + 1) % self.size;
                    ch.write_tip = (ch.write_tip + 1) % self.size;
                } else {
                    ch.read_tip = (ch.read_tip + 1) % self.size;
                    if ch.write_tip == ch.read_tip {
                        ch.is_empty = true;
                    }
                }
            }
        } else {
            let ch = self.channels.get_mut(key).unwrap();
            ch.write_tip = (ch.write_tip + 1) % self.size;
            if ch.write_tip == ch.read_tip {
                ch.is_full = true;
            } else {
                ch.is_empty = false;
            }
        }
    }

    /// First write to any channel, system-wide: pins the shared ring
    /// origin to `index` for every channel, then marks `key` as holding
    /// the one sample just written.
    fn set_start_position(&mut self, key: &K, index: usize) {
        for k in &self.order {
            let ch = self.channels.get_mut(k).unwrap();
            ch.read_tip = index;
            ch.write_tip = index;
            ch.is_empty = true;
        }
        let ch = self.channels.get_mut(key).unwrap();
        ch.write_tip = (index + 1) % self.size;
        ch.is_empty = false;
    }

    fn read_next(&self) -> HashMap<K, Option<V>>
    where
        V: Clone,
    {
        self.order
            .iter()
            .map(|k| {
                let ch = &self.channels[k];
                let value = if ch.is_empty {
                    None
                } else {
                    ch.slots[ch.read_tip].clone()
                };
                (k.clone(), value)
            })
            .collect()
    }
}

/// A fixed-size ring buffer that aligns samples from `K` independently
/// arriving channels into `K`-tuples.
pub struct SnapshotBuffer<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> SnapshotBuffer<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `size` is the ring depth; `keys` is the fixed set of channels this
    /// buffer aligns, enumerated once at construction.
    #[must_use]
    pub fn new(size: usize, keys: impl IntoIterator<Item = K>) -> Self {
        let order: Vec<K> = keys.into_iter().collect();
        let channels = order
            .iter()
            .cloned()
            .map(|k| (k, Channel::new(size)))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                size,
                order,
                channels,
            }),
        }
    }

    /// Write one sample for `key` at ring position `counter % size`.
    pub fn put(&self, key: &K, data: V, counter: u64) {
        let mut inner = self.inner.lock();
        let counter_tip = (counter as usize) % inner.size;

        if inner.all_empty() {
            {
                let ch = inner.channels.get_mut(key).unwrap();
                ch.slots[counter_tip] = Some(data);
            }
            inner.set_start_position(key, counter_tip);
        } else {
            while inner.channels[key].write_tip != counter_tip {
                let wt = inner.channels[key].write_tip;
                inner.channels.get_mut(key).unwrap().slots[wt] = None;
                inner.move_write_tip(key);
            }
            let wt = inner.channels[key].write_tip;
            inner.channels.get_mut(key).unwrap().slots[wt] = Some(data);
            inner.move_write_tip(key);
        }
    }

    /// Return the next aligned snapshot and advance every channel's read
    /// tip, or `None` if no snapshot can be produced yet.
    ///
    /// `still_running` is `false` once every producer has sent its `END`;
    /// in that mode the buffer drains remaining partial data instead of
    /// waiting for arrivals that will never come.
    pub fn take(&self, still_running: bool) -> Option<HashMap<K, Option<V>>>
    where
        V: Clone,
    {
        let mut inner = self.inner.lock();
        let is_gt_1 = |k: &K| inner.channels[k].len(inner.size) > 1;
        let is_eq_0 = |k: &K| inner.channels[k].len(inner.size) == 0;

        let any_gt_1 = inner.order.iter().any(is_gt_1);
        let all_gt_1 = inner.order.iter().all(is_gt_1);
        let any_eq_0 = inner.order.iter().any(is_eq_0);
        let all_eq_0 = inner.order.iter().all(is_eq_0);

        let should_read = if still_running {
            all_gt_1 || (any_gt_1 && any_eq_0)
        } else {
            !all_eq_0
        };

        if !should_read {
            return None;
        }

        let snapshot = inner.read_next();
        inner.move_read_tip();
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_c_ring_alignment() {
        let buf: SnapshotBuffer<&str, &str> = SnapshotBuffer::new(5, ["a", "b", "c"]);
        buf.put(&"a", "a4", 4);
        buf.put(&"a", "a5", 5);
        buf.put(&"b", "b6", 6);
        buf.put(&"b", "b7", 7);
        buf.put(&"b", "b8", 8);

        let s1 = buf.take(true).unwrap();
        assert_eq!(s1[&"a"], Some("a4"));
        assert_eq!(s1[&"b"], None);
        assert_eq!(s1[&"c"], None);

        let s2 = buf.take(true).unwrap();
        assert_eq!(s2[&"a"], Some("a5"));
        assert_eq!(s2[&"b"], None);
        assert_eq!(s2[&"c"], None);

        let s3 = buf.take(true).unwrap();
        assert_eq!(s3[&"a"], None);
        assert_eq!(s3[&"b"], Some("b6"));
        assert_eq!(s3[&"c"], None);
    }

    #[test]
    fn scenario_d_overwrite_drops_oldest_across_all_channels() {
        let buf: SnapshotBuffer<&str, &str> = SnapshotBuffer::new(3, ["a"]);
        buf.put(&"a", "a0", 0);
        buf.put(&"a", "a1", 1);
        buf.put(&"a", "a2", 2);
        buf.put(&"a", "a3", 3);

        let snapshot = buf.take(true).unwrap();
        assert_eq!(snapshot[&"a"], Some("a1"));
    }

    #[test]
    fn draining_after_production_stops_yields_remaining_then_none() {
        let buf: SnapshotBuffer<&str, &str> = SnapshotBuffer::new(4, ["a", "b"]);
        buf.put(&"a", "a0", 0);
        buf.put(&"b", "b0", 0);
        buf.put(&"b", "b1", 1);

        // Still running: a has exactly one buffered item, b has two, so
        // neither "all channels ahead" nor "some empty, some ahead" holds
        // yet -- the buffer correctly waits rather than guessing.
        assert!(buf.take(true).is_none());

        // Production stopped: drain what's there even with gaps.
        let snapshot = buf.take(false).unwrap();
        assert_eq!(snapshot[&"a"], Some("a0"));
        assert_eq!(snapshot[&"b"], Some("b0"));

        let snapshot = buf.take(false).unwrap();
        assert_eq!(snapshot[&"a"], None);
        assert_eq!(snapshot[&"b"], Some("b1"));

        assert!(buf.take(false).is_none());
    }
}
