use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::errors::GosgraphError;

/// A fixed pool of indices `0..size` that can be checked out and returned
/// from any thread.
#[derive(Debug)]
pub struct IndexLibrary {
    size: usize,
    available: Mutex<BTreeSet<usize>>,
}

impl IndexLibrary {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            available: Mutex::new((0..size).collect()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Check out a free index, `None` once every index is checked out.
    pub fn get_index(&self) -> Option<usize> {
        let mut available = self.lock();
        let index = available.iter().next().copied()?;
        available.remove(&index);
        Some(index)
    }

    pub fn return_index(&self, index: usize) -> Result<(), GosgraphError> {
        if index >= self.size {
            return Err(GosgraphError::InvalidIndex {
                index,
                size: self.size,
            });
        }
        let mut available = self.lock();
        if !available.insert(index) {
            return Err(GosgraphError::IndexNotCheckedOut(index));
        }
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<usize>> {
        // the set is never left half-updated, so a poisoned lock is still usable
        self.available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use rand::Rng;

    use super::*;

    #[test]
    fn single_thread_checkout_and_return() {
        let lib = IndexLibrary::new(3);
        let mut expected: HashSet<usize> = [0, 1, 2].into_iter().collect();

        let i0 = lib.get_index().unwrap();
        assert!(expected.remove(&i0));
        let i1 = lib.get_index().unwrap();
        assert!(expected.remove(&i1));

        lib.return_index(i0).unwrap();
        expected.insert(i0);

        let i2 = lib.get_index().unwrap();
        assert!(expected.remove(&i2));
        let i3 = lib.get_index().unwrap();
        assert!(expected.remove(&i3));

        assert_eq!(lib.get_index(), None);

        assert!(matches!(
            lib.return_index(50),
            Err(GosgraphError::InvalidIndex { index: 50, size: 3 })
        ));

        lib.return_index(i1).unwrap();
        assert!(matches!(
            lib.return_index(i1),
            Err(GosgraphError::IndexNotCheckedOut(_))
        ));
    }

    #[test]
    fn empty_library() {
        let lib = IndexLibrary::new(0);
        assert_eq!(lib.get_index(), None);
        assert_eq!(lib.available(), 0);
    }

    #[test]
    fn threads_never_share_an_index() {
        const FREE: usize = usize::MAX;
        let lib = Arc::new(IndexLibrary::new(5));
        // owner thread of each checked out index
        let owners: Arc<[AtomicUsize; 5]> = Arc::new(Default::default());
        owners.iter().for_each(|o| o.store(FREE, Ordering::SeqCst));

        let workers = (0..2)
            .map(|id| {
                let lib = Arc::clone(&lib);
                let owners = Arc::clone(&owners);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut mine = BTreeSet::new();
                    let mut work = 0;
                    while work < 10 {
                        if rng.gen_bool(0.5) {
                            if let Some(i) = lib.get_index() {
                                assert_eq!(owners[i].swap(id, Ordering::SeqCst), FREE);
                                mine.insert(i);
                                work += 1;
                            }
                        } else if let Some(i) = mine.pop_first() {
                            assert_eq!(owners[i].swap(FREE, Ordering::SeqCst), id);
                            lib.return_index(i).unwrap();
                            work += 1;
                        }
                        thread::sleep(Duration::from_millis(rng.gen_range(1..=2)));
                    }
                    for i in mine {
                        assert_eq!(owners[i].swap(FREE, Ordering::SeqCst), id);
                        lib.return_index(i).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(lib.available(), 5);
        assert!(owners.iter().all(|o| o.load(Ordering::SeqCst) == FREE));
    }
}
