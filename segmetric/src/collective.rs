//! Cross-worker reduction of confusion matrices.
//!
//! A [`Collective`] sums the local matrix of every participant of a phase and
//! hands the global sum back to all of them. The call is blocking and
//! all-or-nothing: each participant must enter every round exactly once. A
//! [`GroupMember`] that is dropped, for instance while its worker unwinds from
//! a panic, ends the group and releases everyone still waiting. A participant
//! that stays alive but never arrives leaves the others waiting; timeouts
//! belong to the orchestration that owns the workers.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{MetricError, MetricResult};
use crate::metrics::ConfusionMatrix;

/// An all-reduce over the confusion matrices of a worker group.
pub trait Collective {
    /// Number of participants in the group.
    fn world_size(&self) -> usize;

    /// Index of this participant, in `0..world_size`.
    fn rank(&self) -> usize;

    /// Replaces `matrix` with the sum of every participant's matrix.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::CollectiveMismatch`] on every participant when
    /// the contributions disagree on `num_classes`, and
    /// [`MetricError::CollectiveAbandoned`] once a participant has left the
    /// group. `matrix` is left unchanged in both cases.
    fn all_reduce(&mut self, matrix: &mut ConfusionMatrix) -> MetricResult<()>;
}

/// The collective of a run without workers: reduction is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn world_size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_reduce(&mut self, _matrix: &mut ConfusionMatrix) -> MetricResult<()> {
        Ok(())
    }
}

/// Factory for an in-process worker group, one member per worker thread.
#[derive(Debug)]
pub struct LocalGroup;

impl LocalGroup {
    /// Creates the members of a group of `world_size` participants.
    ///
    /// Member `i` has rank `i`. Each member is meant to be moved to the worker
    /// that owns it.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidConfiguration`] if `world_size` is zero.
    pub fn new(world_size: usize) -> MetricResult<Vec<GroupMember>> {
        if world_size == 0 {
            return Err(MetricError::InvalidConfiguration {
                reason: "world_size must be positive, got 0".to_string(),
            });
        }

        let shared = Arc::new(Shared {
            world_size,
            round: Mutex::new(Round {
                generation: 0,
                contributions: vec![None; world_size],
                arrived: 0,
                departed: None,
                outcome: Arc::new(Err(MetricError::InvalidConfiguration {
                    reason: "no all-reduce round has completed yet".to_string(),
                })),
            }),
            completed: Condvar::new(),
        });

        Ok((0..world_size)
            .map(|rank| GroupMember {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect())
    }
}

/// One participant of a [`LocalGroup`].
#[derive(Debug)]
pub struct GroupMember {
    rank: usize,
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    world_size: usize,
    round: Mutex<Round>,
    completed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Round> {
        self.round.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Round {
    /// Incremented each time a round completes.
    generation: u64,
    contributions: Vec<Option<ConfusionMatrix>>,
    arrived: usize,
    /// Rank of the first member that left the group.
    departed: Option<usize>,
    /// Result of the last completed round. Only overwritten once every
    /// participant has entered the next round, so late readers still see it.
    outcome: Arc<MetricResult<ConfusionMatrix>>,
}

impl Collective for GroupMember {
    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn all_reduce(&mut self, matrix: &mut ConfusionMatrix) -> MetricResult<()> {
        let mut round = self.shared.lock();
        if let Some(rank) = round.departed {
            return Err(MetricError::CollectiveAbandoned { rank });
        }
        let generation = round.generation;
        round.contributions[self.rank] = Some(matrix.clone());
        round.arrived += 1;

        if round.arrived == self.shared.world_size {
            let contributions: Vec<ConfusionMatrix> = round
                .contributions
                .iter_mut()
                .filter_map(Option::take)
                .collect();
            let outcome = ConfusionMatrix::sum_all(&contributions).and_then(|sum| {
                sum.ok_or_else(|| MetricError::InvalidConfiguration {
                    reason: "all-reduce round completed without contributions".to_string(),
                })
            });

            tracing::debug!(
                generation,
                world_size = self.shared.world_size,
                ok = outcome.is_ok(),
                "all-reduce round completed"
            );

            round.outcome = Arc::new(outcome);
            round.arrived = 0;
            round.generation += 1;
            self.shared.completed.notify_all();
        } else {
            while round.generation == generation && round.departed.is_none() {
                round = self
                    .shared
                    .completed
                    .wait(round)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if round.generation == generation {
                if let Some(rank) = round.departed {
                    return Err(MetricError::CollectiveAbandoned { rank });
                }
            }
        }

        let outcome = Arc::clone(&round.outcome);
        drop(round);

        match outcome.as_ref() {
            Ok(sum) => {
                matrix.clone_from(sum);
                Ok(())
            }
            Err(err) => Err(err.clone()),
        }
    }
}

impl Drop for GroupMember {
    fn drop(&mut self) {
        let mut round = self.shared.lock();
        if round.departed.is_none() {
            round.departed = Some(self.rank);
        }
        drop(round);
        self.shared.completed.notify_all();
    }
}
