//! Candidate ordering per routing strategy.
//!
//! Each strategy turns the filtered candidate list into a preference order.
//! The router walks that order and takes the first agent whose breaker
//! admits it, so a HALF_OPEN agent with its probe already taken falls
//! through to the next-best choice.

use rand::Rng;
use std::cmp::Ordering;
use switchyard_core::agent::AgentRecord;
use switchyard_core::health::HealthRecord;
use switchyard_core::routing::RoutingStrategy;

/// An agent that passed capability, liveness, capacity and breaker checks.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: AgentRecord,
    pub health: HealthRecord,
}

impl Candidate {
    pub fn load_ratio(&self) -> f64 {
        self.health.load_ratio()
    }

    pub fn health_score(&self) -> f64 {
        self.health.health_score
    }

    pub fn priority(&self) -> i32 {
        self.record.priority
    }
}

/// Inputs a strategy may need beyond the candidates themselves.
pub struct StrategyContext<'a, R: Rng> {
    pub min_health_score: f64,
    /// Round-robin position for the request's task type.
    pub cursor: usize,
    pub rng: &'a mut R,
}

/// Indexes into `candidates`, most preferred first. Candidates a strategy
/// refuses outright (HEALTH_AWARE below the score floor) are left out.
pub fn preference_order<R: Rng>(
    strategy: RoutingStrategy,
    candidates: &[Candidate],
    ctx: &mut StrategyContext<'_, R>,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();

    match strategy {
        RoutingStrategy::RoundRobin => {
            order.sort_by(|&a, &b| registration_order(&candidates[a], &candidates[b]));
            if !order.is_empty() {
                let start = ctx.cursor % order.len();
                order.rotate_left(start);
            }
        }
        RoutingStrategy::LeastLoaded => {
            order.sort_by(|&a, &b| {
                let (a, b) = (&candidates[a], &candidates[b]);
                cmp_f64(a.load_ratio(), b.load_ratio())
                    .then_with(|| b.priority().cmp(&a.priority()))
                    .then_with(|| a.record.agent_id.cmp(&b.record.agent_id))
            });
        }
        RoutingStrategy::WeightedRandom => {
            order = weighted_shuffle(candidates, ctx.rng);
        }
        RoutingStrategy::HealthAware => {
            order.retain(|&i| candidates[i].health_score() >= ctx.min_health_score);
            order.sort_by(|&a, &b| {
                let (a, b) = (&candidates[a], &candidates[b]);
                cmp_f64(b.health_score(), a.health_score())
                    .then_with(|| cmp_f64(a.load_ratio(), b.load_ratio()))
                    .then_with(|| b.priority().cmp(&a.priority()))
                    .then_with(|| a.record.agent_id.cmp(&b.record.agent_id))
            });
        }
        RoutingStrategy::PriorityBased => {
            order.sort_by(|&a, &b| {
                let (a, b) = (&candidates[a], &candidates[b]);
                b.priority()
                    .cmp(&a.priority())
                    .then_with(|| cmp_f64(b.health_score(), a.health_score()))
                    .then_with(|| a.record.agent_id.cmp(&b.record.agent_id))
            });
        }
    }

    order
}

fn registration_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.record
        .registered_at
        .cmp(&b.record.registered_at)
        .then_with(|| a.record.agent_id.cmp(&b.record.agent_id))
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Sample without replacement, each pick proportional to priority (at least
/// one).
fn weighted_shuffle<R: Rng>(candidates: &[Candidate], rng: &mut R) -> Vec<usize> {
    let mut pool: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.priority().max(1) as f64))
        .collect();
    let mut order = Vec::with_capacity(pool.len());

    while !pool.is_empty() {
        let total: f64 = pool.iter().map(|(_, w)| w).sum();
        let mut target = rng.gen_range(0.0..total);
        let mut picked = pool.len() - 1;
        for (pos, (_, weight)) in pool.iter().enumerate() {
            if target < *weight {
                picked = pos;
                break;
            }
            target -= weight;
        }
        order.push(pool.swap_remove(picked).0);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use switchyard_core::agent::AgentRegistration;
    use switchyard_core::ids::AgentId;

    fn candidate(id: &str, priority: i32, score: f64, load: u32, max: u32, age: i64) -> Candidate {
        let now = Utc::now();
        let reg = AgentRegistration::new(id, "code")
            .with_capabilities(["code"])
            .with_priority(priority)
            .with_max_concurrent_tasks(max);
        let record = AgentRecord::from_registration(reg, now - TimeDelta::seconds(age));
        let mut health = HealthRecord::new(AgentId::from(id), "code".into(), now);
        health.health_score = score;
        health.current_load = load;
        health.max_concurrent_tasks = max;
        Candidate { record, health }
    }

    fn order(strategy: RoutingStrategy, candidates: &[Candidate], cursor: usize) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = StrategyContext {
            min_health_score: 0.5,
            cursor,
            rng: &mut rng,
        };
        preference_order(strategy, candidates, &mut ctx)
            .into_iter()
            .map(|i| candidates[i].record.agent_id.to_string())
            .collect()
    }

    #[test]
    fn test_health_aware_breaks_ties_on_load_then_priority() {
        let candidates = vec![
            candidate("b", 5, 1.0, 0, 5, 0),
            candidate("a", 10, 1.0, 0, 2, 0),
            candidate("busy", 20, 1.0, 1, 2, 0),
            candidate("sick", 99, 0.3, 0, 2, 0),
        ];
        assert_eq!(
            order(RoutingStrategy::HealthAware, &candidates, 0),
            vec!["a", "b", "busy"]
        );
    }

    #[test]
    fn test_least_loaded() {
        let candidates = vec![
            candidate("half", 1, 1.0, 2, 4, 0),
            candidate("idle-low", 1, 1.0, 0, 4, 0),
            candidate("idle-high", 9, 1.0, 0, 1, 0),
        ];
        assert_eq!(
            order(RoutingStrategy::LeastLoaded, &candidates, 0),
            vec!["idle-high", "idle-low", "half"]
        );
    }

    #[test]
    fn test_priority_based_breaks_ties_on_score() {
        let candidates = vec![
            candidate("x", 5, 0.6, 0, 1, 0),
            candidate("y", 5, 0.9, 0, 1, 0),
            candidate("z", 1, 1.0, 0, 1, 0),
        ];
        assert_eq!(
            order(RoutingStrategy::PriorityBased, &candidates, 0),
            vec!["y", "x", "z"]
        );
    }

    #[test]
    fn test_round_robin_rotates_in_registration_order() {
        let candidates = vec![
            candidate("second", 0, 1.0, 0, 1, 10),
            candidate("first", 0, 1.0, 0, 1, 20),
            candidate("third", 0, 1.0, 0, 1, 0),
        ];
        assert_eq!(
            order(RoutingStrategy::RoundRobin, &candidates, 0),
            vec!["first", "second", "third"]
        );
        assert_eq!(
            order(RoutingStrategy::RoundRobin, &candidates, 4),
            vec!["second", "third", "first"]
        );
    }

    #[test]
    fn test_weighted_random_covers_everyone_and_favours_weight() {
        let candidates = vec![
            candidate("heavy", 99, 1.0, 0, 1, 0),
            candidate("light", 1, 1.0, 0, 1, 0),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        let mut heavy_first = 0;
        for _ in 0..200 {
            let mut ctx = StrategyContext {
                min_health_score: 0.5,
                cursor: 0,
                rng: &mut rng,
            };
            let order = preference_order(RoutingStrategy::WeightedRandom, &candidates, &mut ctx);
            assert_eq!(order.len(), 2);
            if order[0] == 0 {
                heavy_first += 1;
            }
        }
        assert!(heavy_first > 180, "heavy picked first {} times", heavy_first);
    }
}
