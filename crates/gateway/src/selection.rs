use rand::seq::SliceRandom;
use service_registry::ServiceInstance;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Decides the order in which a request visits discovered instances.
///
/// `order` returns indices into `instances`. The router walks them from the
/// front and wraps around when it has more attempts than instances, so every
/// index should appear once.
pub trait SelectionStrategy: Send + Sync {
    fn order(&self, service: &str, instances: &[ServiceInstance]) -> Vec<usize>;
}

/// Starts each request one instance further along than the previous request
/// for the same service.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: Mutex<HashMap<String, usize>>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn order(&self, service: &str, instances: &[ServiceInstance]) -> Vec<usize> {
        let len = instances.len();
        if len == 0 {
            return Vec::new();
        }

        let start = {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let counter = counters.entry(service.to_string()).or_insert(0);
            let start = *counter % len;
            *counter = counter.wrapping_add(1);
            start
        };

        (0..len).map(|offset| (start + offset) % len).collect()
    }
}

/// Uniformly random order without replacement.
#[derive(Debug, Default)]
pub struct RandomOrder;

impl SelectionStrategy for RandomOrder {
    fn order(&self, _service: &str, instances: &[ServiceInstance]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..instances.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        order
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SelectionKind {
    RoundRobin,
    Random,
}

impl SelectionKind {
    pub fn build(self) -> Arc<dyn SelectionStrategy> {
        match self {
            SelectionKind::RoundRobin => Arc::new(RoundRobin::new()),
            SelectionKind::Random => Arc::new(RandomOrder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(n: u16) -> Vec<ServiceInstance> {
        (0..n)
            .map(|i| ServiceInstance::new("movies", "10.0.0.1", 5000 + i))
            .collect()
    }

    fn is_permutation(order: &[usize], len: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == (0..len).collect::<Vec<_>>()
    }

    #[test]
    fn test_round_robin_rotates_start() {
        let strategy = RoundRobin::new();
        let pool = instances(3);

        assert_eq!(strategy.order("movies", &pool), vec![0, 1, 2]);
        assert_eq!(strategy.order("movies", &pool), vec![1, 2, 0]);
        assert_eq!(strategy.order("movies", &pool), vec![2, 0, 1]);
        assert_eq!(strategy.order("movies", &pool), vec![0, 1, 2]);
    }

    #[test]
    fn test_round_robin_counts_per_service() {
        let strategy = RoundRobin::new();
        let pool = instances(2);

        assert_eq!(strategy.order("movies", &pool), vec![0, 1]);
        assert_eq!(strategy.order("users", &pool), vec![0, 1]);
        assert_eq!(strategy.order("movies", &pool), vec![1, 0]);
    }

    #[test]
    fn test_round_robin_handles_shrinking_pool() {
        let strategy = RoundRobin::new();
        strategy.order("movies", &instances(5));
        strategy.order("movies", &instances(5));

        let order = strategy.order("movies", &instances(2));
        assert!(is_permutation(&order, 2));
        assert!(strategy.order("movies", &[]).is_empty());
    }

    #[test]
    fn test_random_order_visits_each_instance_once() {
        let strategy = RandomOrder;
        for _ in 0..20 {
            let order = strategy.order("movies", &instances(4));
            assert!(is_permutation(&order, 4));
        }
    }

    #[test]
    fn test_random_order_spreads_first_choice() {
        let strategy = RandomOrder;
        let pool = instances(3);
        let mut firsts = [0usize; 3];
        for _ in 0..300 {
            firsts[strategy.order("movies", &pool)[0]] += 1;
        }
        assert!(firsts.iter().all(|&count| count > 0));
    }
}
