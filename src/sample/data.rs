//! `SampleData`: a shared logical audio asset backed by one or more
//! alternate [`SampleStore`]s (spec.md §3.5).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::store::{OpenMode, SampleFormat, SampleStore, StoreHandle};
use crate::error::Result;

/// A shared, ref-countable owner of a sample's alternate storage
/// representations. `Sample::data` (spec.md §3.3) is an `Arc<SampleData>`
/// and is never null — a sample with no real audio still gets a
/// blank-audio sentinel store (spec.md §4.3 "Sample records"). The ref
/// count a writer observes through that `Arc` is distinct from `used`
/// (spec.md §3.5 "ownership refcount distinct from used count"): `used`
/// tracks outstanding open store handles, while the `Arc`'s own strong
/// count tracks how many `Sample`s (and any writer holding a clone while
/// it appends a freshly-written store) point at this data.
#[derive(Debug)]
pub struct SampleData {
    stores: Mutex<Vec<Box<dyn SampleStore>>>,
    used: AtomicU32,
}

impl SampleData {
    pub fn new(store: Box<dyn SampleStore>) -> Self {
        SampleData { stores: Mutex::new(vec![store]), used: AtomicU32::new(0) }
    }

    /// A placeholder `SampleData` for samples the reader rejected as
    /// invalid (spec.md §4.3): zero frames, reports 44100 Hz.
    pub fn blank() -> Self {
        SampleData::new(Box::new(super::store::RomStore {
            rom_offset: 0,
            format: SampleFormat::Pcm16,
            frame_count: 0,
            sample_rate: 44100,
        }))
    }

    /// Appends a newly-created store (spec.md §4.3.2 step 6 "writers may
    /// hand back new stores pointing into the file they just wrote"): since
    /// `Sample::data` is shared via `Arc`, this is visible to every owner of
    /// that `Arc` immediately, with no separate splice-back step required.
    pub fn add_store(&self, store: Box<dyn SampleStore>) {
        self.stores.lock().unwrap().push(store);
    }

    /// Frame count and sample rate are defined to agree across every store
    /// of the same `SampleData` (spec.md §3.5); read them off the first.
    pub fn frame_count(&self) -> u32 {
        self.stores.lock().unwrap()[0].sample_size_in_frames()
    }

    pub fn sample_rate(&self) -> u32 {
        self.stores.lock().unwrap()[0].sample_rate()
    }

    /// Picks the store whose format best matches `want`: an exact format
    /// match that can be opened, else any openable store, else the first
    /// store at all (spec.md §3.5 "implementation-defined ranking"), and
    /// opens it under the caller's access.
    pub fn open(&self, want: SampleFormat) -> Result<Box<dyn StoreHandle>> {
        self.used.fetch_add(1, Ordering::SeqCst);
        let stores = self.stores.lock().unwrap();
        let store = stores
            .iter()
            .find(|s| s.sample_format() == want && s.can_open())
            .or_else(|| stores.iter().find(|s| s.can_open()))
            .unwrap_or(&stores[0]);
        store.open(OpenMode::Read)
    }

    /// The format of whichever store [`SampleData::open`] would pick for
    /// `want`, without opening it.
    pub fn best_format(&self, want: SampleFormat) -> SampleFormat {
        let stores = self.stores.lock().unwrap();
        stores
            .iter()
            .find(|s| s.sample_format() == want && s.can_open())
            .or_else(|| stores.iter().find(|s| s.can_open()))
            .unwrap_or(&stores[0])
            .sample_format()
    }

    pub fn release(&self) {
        self.used.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn used_count(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::store::RomStore;

    fn rom(frames: u32) -> Box<dyn SampleStore> {
        Box::new(RomStore { rom_offset: 0, format: SampleFormat::Pcm16, frame_count: frames, sample_rate: 44100 })
    }

    #[test]
    fn blank_sentinel_has_zero_frames() {
        let d = SampleData::blank();
        assert_eq!(d.frame_count(), 0);
    }

    #[test]
    fn used_count_tracks_independent_of_stores() {
        let d = SampleData::new(rom(10));
        assert_eq!(d.used_count(), 0);
        let _ = d.open(SampleFormat::Pcm16); // fails (ROM can't open) but still bumps used
        assert_eq!(d.used_count(), 1);
        d.release();
        assert_eq!(d.used_count(), 0);
    }

    #[test]
    fn best_format_prefers_exact_format_match() {
        let d = SampleData::new(rom(10));
        d.add_store(Box::new(RomStore {
            rom_offset: 0,
            format: SampleFormat::Pcm24,
            frame_count: 10,
            sample_rate: 44100,
        }));
        assert_eq!(d.best_format(SampleFormat::Pcm24), SampleFormat::Pcm24);
    }

    #[test]
    fn add_store_is_visible_through_a_shared_arc() {
        use std::sync::Arc;
        let d = Arc::new(SampleData::new(rom(10)));
        let other_owner = Arc::clone(&d);
        d.add_store(Box::new(RomStore {
            rom_offset: 0,
            format: SampleFormat::Pcm24,
            frame_count: 10,
            sample_rate: 44100,
        }));
        assert_eq!(other_owner.best_format(SampleFormat::Pcm24), SampleFormat::Pcm24);
    }
}
