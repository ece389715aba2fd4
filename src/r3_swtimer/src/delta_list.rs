//! Delta list: a doubly linked list of armed timers ordered by deadline, where
//! each node stores its remaining time *relative to its predecessor*.
//!
//! The nodes live in an external pool (the timer arena) and are addressed by
//! integer indices, so the list itself only consists of a head index.
//!
//! The sum of the deltas from the head to a node is equal to the number of
//! ticks remaining until the node expires. Consequently, only the head has to
//! be examined on each tick. Nodes with equal deadlines are kept in the order
//! they were inserted.
use core::ops;

use crate::Ticks;

/// Links to neighbor nodes and the delta to the predecessor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
    /// The remaining time relative to `prev` (or to the current time if this
    /// is the head).
    pub(crate) delta: Ticks,
}

/// An element that can be linked to a [`DeltaList`].
pub(crate) trait DeltaNode {
    /// The link data. `Some(_)` iff the element is linked.
    fn delta_link(&self) -> &Option<Link>;
    fn delta_link_mut(&mut self) -> &mut Option<Link>;
}

/// The list header.
///
#[doc = svgbobdoc::transform!(
/// ```svgbob
///   head
///    |
///    v    .-------.     .-------.     .-------.     .-------.
///         | A: 3  |<--->| B: 0  |<--->| C: 4  |<--->| D: 10 |
///         '-------'     '-------'     '-------'     '-------'
///   deadline  3             3             7             17
/// ```
)]
#[derive(Debug, Default)]
pub(crate) struct DeltaList {
    head: Option<usize>,
}

#[cold]
fn inconsistent() -> ! {
    panic!("delta list is inconsistent")
}

#[inline]
fn link_of<Pool>(pool: &Pool, i: usize) -> &Link
where
    Pool: ops::Index<usize> + ?Sized,
    Pool::Output: DeltaNode,
{
    match pool[i].delta_link() {
        Some(link) => link,
        None => inconsistent(),
    }
}

#[inline]
fn link_of_mut<Pool>(pool: &mut Pool, i: usize) -> &mut Link
where
    Pool: ops::IndexMut<usize> + ?Sized,
    Pool::Output: DeltaNode,
{
    match pool[i].delta_link_mut() {
        Some(link) => link,
        None => inconsistent(),
    }
}

impl DeltaList {
    pub(crate) const fn new() -> Self {
        Self { head: None }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Link the element `index` so that it expires after `ticks` ticks.
    ///
    /// Panics if the element is already linked.
    pub(crate) fn insert<Pool>(&mut self, pool: &mut Pool, index: usize, ticks: Ticks)
    where
        Pool: ops::IndexMut<usize> + ?Sized,
        Pool::Output: DeltaNode,
    {
        assert!(
            pool[index].delta_link().is_none(),
            "element is already linked"
        );

        // Find the first node that expires strictly later than the new one
        let mut remaining = ticks;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(i) = cursor {
            let link = link_of(&*pool, i);
            if link.delta > remaining {
                break;
            }
            remaining -= link.delta;
            prev = cursor;
            cursor = link.next;
        }

        // Insert the new node before `cursor`. The total delay of every node
        // past the insertion point must stay the same.
        if let Some(next) = cursor {
            let next_link = link_of_mut(pool, next);
            next_link.delta -= remaining;
            next_link.prev = Some(index);
        }

        match prev {
            Some(prev) => link_of_mut(pool, prev).next = Some(index),
            None => self.head = Some(index),
        }

        *pool[index].delta_link_mut() = Some(Link {
            prev,
            next: cursor,
            delta: remaining,
        });
    }

    /// Unlink the element `index` before it expires. Its remaining delta is
    /// absorbed by the successor so that the successor's deadline doesn't
    /// move.
    ///
    /// Returns `false` (and does nothing) if the element is not linked.
    pub(crate) fn remove<Pool>(&mut self, pool: &mut Pool, index: usize) -> bool
    where
        Pool: ops::IndexMut<usize> + ?Sized,
        Pool::Output: DeltaNode,
    {
        let Some(link) = pool[index].delta_link_mut().take() else {
            return false;
        };

        if let Some(next) = link.next {
            let next_link = link_of_mut(pool, next);
            next_link.delta += link.delta;
            next_link.prev = link.prev;
        }

        match link.prev {
            Some(prev) => link_of_mut(pool, prev).next = link.next,
            None => {
                debug_assert_eq!(self.head, Some(index));
                self.head = link.next;
            }
        }

        true
    }

    /// Advance the head by one tick. Does nothing if the list is empty.
    #[inline]
    pub(crate) fn decrement_head<Pool>(&mut self, pool: &mut Pool)
    where
        Pool: ops::IndexMut<usize> + ?Sized,
        Pool::Output: DeltaNode,
    {
        if let Some(head) = self.head {
            let link = link_of_mut(pool, head);
            debug_assert_ne!(link.delta, 0, "expired node was left in the list");
            link.delta = link.delta.saturating_sub(1);
        }
    }

    /// Unlink and return the head if it has expired (i.e., its delta is zero).
    ///
    /// No delta propagation is needed because the residual delta of an
    /// expired node is zero by definition.
    pub(crate) fn pop_expired<Pool>(&mut self, pool: &mut Pool) -> Option<usize>
    where
        Pool: ops::IndexMut<usize> + ?Sized,
        Pool::Output: DeltaNode,
    {
        let head = self.head?;
        if link_of(&*pool, head).delta != 0 {
            return None;
        }

        let link = pool[head].delta_link_mut().take()?;
        debug_assert_eq!(link.prev, None);

        if let Some(next) = link.next {
            link_of_mut(pool, next).prev = None;
        }
        self.head = link.next;

        Some(head)
    }

    /// Get the number of ticks remaining until the element `index` expires.
    /// Returns `None` if the element is not linked.
    pub(crate) fn remaining<Pool>(&self, pool: &Pool, index: usize) -> Option<Ticks>
    where
        Pool: ops::Index<usize> + ?Sized,
        Pool::Output: DeltaNode,
    {
        let mut link = pool[index].delta_link().as_ref()?;
        let mut total = link.delta;
        while let Some(prev) = link.prev {
            link = link_of(pool, prev);
            total += link.delta;
        }
        Some(total)
    }

    /// Iterate over the linked elements, yielding `(index, delta)` pairs in
    /// list order.
    pub(crate) fn iter<'a, Pool>(&self, pool: &'a Pool) -> impl Iterator<Item = (usize, Ticks)> + 'a
    where
        Pool: ops::Index<usize> + ?Sized,
        Pool::Output: DeltaNode,
    {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let i = cursor?;
            let link = link_of(pool, i);
            cursor = link.next;
            Some((i, link.delta))
        })
    }
}
