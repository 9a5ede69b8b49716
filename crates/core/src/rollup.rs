//! Status rollup shared by task, pipeline and run levels.
//!
//! One function, applied at every level: any failure wins, a non-empty set of
//! successes completes, everything else is still in progress. Because the
//! output lives in the same status type as the input, rolled-up values can be
//! fed back in (pipeline aggregates roll up into the run aggregate).

/// A status type that can be aggregated with [`rollup`].
pub trait RollupStatus: Copy {
    const FAILED: Self;
    const COMPLETED: Self;
    const IN_PROGRESS: Self;

    /// Terminal failure.
    fn is_failure(&self) -> bool;

    /// Terminal success.
    fn is_success(&self) -> bool;
}

/// Aggregate a set of child statuses into one.
///
/// An empty set is in progress: nothing has completed yet.
pub fn rollup<S, I>(statuses: I) -> S
where
    S: RollupStatus,
    I: IntoIterator<Item = S>,
{
    let mut any = false;
    let mut all_success = true;
    for status in statuses {
        if status.is_failure() {
            return S::FAILED;
        }
        any = true;
        all_success &= status.is_success();
    }
    if any && all_success {
        S::COMPLETED
    } else {
        S::IN_PROGRESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TaskStatus;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = TaskStatus> {
        prop::sample::select(TaskStatus::ALL.to_vec())
    }

    #[test]
    fn failure_dominates() {
        let statuses = [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::InProgress];
        assert_eq!(rollup(statuses), TaskStatus::Failed);
    }

    #[test]
    fn all_completed_completes() {
        assert_eq!(
            rollup([TaskStatus::Completed, TaskStatus::Completed]),
            TaskStatus::Completed
        );
    }

    #[test]
    fn waiting_states_count_as_in_progress() {
        for waiting in [
            TaskStatus::Unknown,
            TaskStatus::NotStarted,
            TaskStatus::Queued,
            TaskStatus::InProgress,
        ] {
            assert_eq!(rollup([TaskStatus::Completed, waiting]), TaskStatus::InProgress);
        }
    }

    #[test]
    fn empty_set_is_in_progress() {
        assert_eq!(rollup(Vec::<TaskStatus>::new()), TaskStatus::InProgress);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Totality: every non-empty multiset maps to one of the three buckets,
        /// with FAILED iff any member failed and COMPLETED iff all completed.
        #[test]
        fn rollup_is_total_and_exact(statuses in prop::collection::vec(any_status(), 1..32)) {
            let result = rollup(statuses.iter().copied());
            prop_assert!(matches!(
                result,
                TaskStatus::Failed | TaskStatus::InProgress | TaskStatus::Completed
            ));
            prop_assert_eq!(
                result == TaskStatus::Failed,
                statuses.iter().any(|s| *s == TaskStatus::Failed)
            );
            prop_assert_eq!(
                result == TaskStatus::Completed,
                statuses.iter().all(|s| *s == TaskStatus::Completed)
            );
        }

        /// Composition: rolling up non-empty groups and then rolling up the
        /// group results equals rolling up everything at once.
        #[test]
        fn rollup_composes_across_levels(
            groups in prop::collection::vec(prop::collection::vec(any_status(), 1..8), 1..8)
        ) {
            let per_group: Vec<TaskStatus> = groups.iter().map(|g| rollup(g.iter().copied())).collect();
            let two_level = rollup(per_group.iter().copied());
            let flat = rollup(groups.iter().flatten().copied());
            prop_assert_eq!(two_level, flat);
        }

        /// Re-aggregating an already rolled-up value is a no-op.
        #[test]
        fn rollup_is_idempotent(statuses in prop::collection::vec(any_status(), 1..16)) {
            let once = rollup(statuses.iter().copied());
            prop_assert_eq!(rollup([once]), once);
        }
    }
}
