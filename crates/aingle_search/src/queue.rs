//! Goal scheduling.
//!
//! The search keeps active goals in a priority queue. Which goal comes first
//! is decided by a [`GoalPriority`]; entries are not removed when a goal is
//! decided elsewhere, the search skips them when they are popped.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::rule::Percent;
use crate::tree::{Goal, GoalId};

/// Orders goals for expansion. Larger keys are expanded first.
pub trait GoalPriority {
    /// The comparable priority of a goal.
    type Key: Ord;

    /// Computes the priority of `goal` at the time it is enqueued.
    fn key(&self, goal: &Goal) -> Self::Key;
}

/// Expands the goal most likely to lead to a proof.
///
/// Ties are broken in favour of goals that were never expanded or expanded
/// least recently, then shallower goals, then older goals.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFirst;

impl GoalPriority for BestFirst {
    type Key = (Percent, Reverse<Option<u64>>, Reverse<usize>, Reverse<GoalId>);

    fn key(&self, goal: &Goal) -> Self::Key {
        (
            goal.success_probability,
            Reverse(goal.last_expanded),
            Reverse(goal.depth),
            Reverse(goal.id),
        )
    }
}

/// Expands the deepest, most recently created goal first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFirst;

impl GoalPriority for DepthFirst {
    type Key = (usize, GoalId);

    fn key(&self, goal: &Goal) -> Self::Key {
        (goal.depth, goal.id)
    }
}

/// Expands goals level by level, oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirst;

impl GoalPriority for BreadthFirst {
    type Key = (Reverse<usize>, Reverse<GoalId>);

    fn key(&self, goal: &Goal) -> Self::Key {
        (Reverse(goal.depth), Reverse(goal.id))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry<K> {
    key: K,
    sequence: Reverse<u64>,
    goal: GoalId,
}

/// A max-priority queue of goals. Entries with equal keys come out in
/// insertion order.
#[derive(Debug)]
pub struct GoalQueue<K: Ord> {
    heap: BinaryHeap<Entry<K>>,
    sequence: u64,
}

impl<K: Ord> GoalQueue<K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Enqueues `goal` with priority `key`.
    pub fn push(&mut self, key: K, goal: GoalId) {
        self.sequence += 1;
        self.heap.push(Entry {
            key,
            sequence: Reverse(self.sequence),
            goal,
        });
    }

    /// Pops the goal with the highest priority.
    pub fn pop(&mut self) -> Option<GoalId> {
        self.heap.pop().map(|e| e.goal)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<K: Ord> Default for GoalQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::MVarId;
    use crate::tree::{NewGoal, Tree};
    use std::collections::BTreeSet;

    /// A root with three children: probabilities 0.9, 0.3 and 0.9 (the last
    /// one one level deeper).
    fn sample_tree() -> (Tree<()>, Vec<GoalId>) {
        let mut t = Tree::new(MVarId(0), BTreeSet::new(), ());
        let goal = |m| NewGoal {
            mvar: MVarId(m),
            mvars: BTreeSet::new(),
            origin: None,
        };
        let a = t.add_rapp(t.root(), "a", Percent::new(0.9).unwrap(), (), None, vec![goal(1)]);
        let b = t.add_rapp(t.root(), "b", Percent::new(0.3).unwrap(), (), None, vec![goal(2)]);
        let g1 = t.rapp(a).goals[0];
        let g2 = t.rapp(b).goals[0];
        let c = t.add_rapp(g1, "c", Percent::ONE, (), None, vec![goal(3)]);
        let g3 = t.rapp(c).goals[0];
        (t, vec![g1, g2, g3])
    }

    fn drain<P: GoalPriority>(priority: P, tree: &Tree<()>, goals: &[GoalId]) -> Vec<GoalId> {
        let mut queue = GoalQueue::new();
        for g in goals {
            queue.push(priority.key(tree.goal(*g)), *g);
        }
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_best_first_prefers_probability_then_shallow() {
        let (t, goals) = sample_tree();
        let order = drain(BestFirst, &t, &goals);
        assert_eq!(order, vec![goals[0], goals[2], goals[1]]);
    }

    #[test]
    fn test_best_first_prefers_unexpanded() {
        let (mut t, goals) = sample_tree();
        t.set_last_expanded(goals[0], 5);
        let order = drain(BestFirst, &t, &goals);
        assert_eq!(order[0], goals[2]);
    }

    #[test]
    fn test_depth_and_breadth_first() {
        let (t, goals) = sample_tree();
        assert_eq!(drain(DepthFirst, &t, &goals)[0], goals[2]);
        assert_eq!(drain(BreadthFirst, &t, &goals), vec![goals[0], goals[1], goals[2]]);
    }

    #[test]
    fn test_equal_keys_are_fifo() {
        let mut queue = GoalQueue::new();
        queue.push(1, GoalId(5));
        queue.push(1, GoalId(2));
        queue.push(2, GoalId(9));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(GoalId(9)));
        assert_eq!(queue.pop(), Some(GoalId(5)));
        assert_eq!(queue.pop(), Some(GoalId(2)));
        assert!(queue.is_empty());
    }
}
