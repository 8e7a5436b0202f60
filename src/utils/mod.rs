// Copyright 2024 breakasm developers.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::ops::Deref;

use itertools::Itertools;

#[derive(Debug, Clone, CopyGetters)]
pub struct SimpleCounter<T>
where
    T: Eq + Hash,
{
    inner: HashMap<T, usize>,
    #[getset(get_copy = "pub")]
    total_count: usize,
}

impl<T> SimpleCounter<T>
where
    T: Eq + Hash,
{
    pub fn incr(&mut self, event: T) {
        self.total_count += 1;
        *self.inner.entry(event).or_insert(0) += 1;
    }

    /// Add all counts of another counter.
    pub fn merge(&mut self, other: SimpleCounter<T>) {
        self.total_count += other.total_count;
        for (event, count) in other.inner {
            *self.inner.entry(event).or_insert(0) += count;
        }
    }
}

impl<T> SimpleCounter<T>
where
    T: Eq + Hash + Display,
{
    /// Log one line per recorded event.
    pub fn log_counts(&self) {
        for (reason, count) in self
            .inner
            .iter()
            .sorted_by_key(|(reason, _)| reason.to_string())
        {
            info!("Skipped {} {}.", count, reason);
        }
    }
}

impl<T> Default for SimpleCounter<T>
where
    T: Eq + Hash,
{
    fn default() -> Self {
        SimpleCounter {
            inner: HashMap::new(),
            total_count: 0,
        }
    }
}

impl<T> Deref for SimpleCounter<T>
where
    T: Eq + Hash,
{
    type Target = HashMap<T, usize>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
