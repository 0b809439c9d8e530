// State-change fan-out.
//
// Publishers hold subscribers weakly so a dropped subscriber never leaks,
// and delivery happens after the publisher's mutation lock is released.

use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use super::PoolSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStateMessage {
    pub address: Address,
    pub block: u64,
    pub state: PoolSnapshot,
    pub timestamp_utc: DateTime<Utc>,
}

impl PoolStateMessage {
    pub fn new(address: Address, state: PoolSnapshot) -> Self {
        Self {
            address,
            block: state.block(),
            state,
            timestamp_utc: Utc::now(),
        }
    }
}

pub trait Subscriber: Send + Sync {
    fn notify(&self, message: &PoolStateMessage);
}

/// Weak subscriber set shared by all pool types.
#[derive(Default)]
pub struct SubscriberSet {
    subscribers: Mutex<Vec<Weak<dyn Subscriber>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        let mut subscribers = self.subscribers.lock().expect("subscriber set poisoned");
        subscribers.push(Arc::downgrade(subscriber));
    }

    pub fn len(&self) -> usize {
        let subscribers = self.subscribers.lock().expect("subscriber set poisoned");
        subscribers.iter().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `message` to all live subscribers. Dead weak references are
    /// pruned; notification happens with the internal lock released so a
    /// subscriber may re-enter the publisher.
    pub fn publish(&self, message: &PoolStateMessage) {
        let live: Vec<Arc<dyn Subscriber>> = {
            let mut subscribers = self.subscribers.lock().expect("subscriber set poisoned");
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in live {
            subscriber.notify(message);
        }
    }
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::v2::UniswapV2PoolState;
    use num_bigint::BigInt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber {
        seen: AtomicUsize,
    }

    impl Subscriber for CountingSubscriber {
        fn notify(&self, _message: &PoolStateMessage) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn message() -> PoolStateMessage {
        PoolStateMessage::new(
            Address::zero(),
            PoolSnapshot::ConstantProduct(UniswapV2PoolState {
                block: 1,
                reserves_token0: BigInt::from(10u8),
                reserves_token1: BigInt::from(20u8),
            }),
        )
    }

    #[test]
    fn delivers_to_live_subscribers() {
        let set = SubscriberSet::new();
        let subscriber = Arc::new(CountingSubscriber {
            seen: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn Subscriber> = subscriber.clone();
        set.subscribe(&as_dyn);

        set.publish(&message());
        set.publish(&message());
        assert_eq!(subscriber.seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let set = SubscriberSet::new();
        {
            let subscriber: Arc<dyn Subscriber> = Arc::new(CountingSubscriber {
                seen: AtomicUsize::new(0),
            });
            set.subscribe(&subscriber);
            assert_eq!(set.len(), 1);
        }
        assert_eq!(set.len(), 0);
        set.publish(&message());
        let subscribers = set.subscribers.lock().unwrap();
        assert!(subscribers.is_empty());
    }
}
