//! Deferred single-value channel.
//!
//! [`DeferredScalar`] buffers at most one value from a producer until the
//! downstream consumer signals demand, and resolves the race between the two
//! with a single atomic state:
//!
//! ```text
//!                    request(n)                     complete(v)
//!   NO_REQUEST_NO_VALUE ──────► HAS_REQUEST_NO_VALUE ──────► on_next(v), on_complete()
//!          │
//!          │ complete(v)
//!          ▼                    request(n)
//!   NO_REQUEST_HAS_VALUE ─────► HAS_REQUEST_HAS_VALUE ─────► on_next(v), on_complete()
//!
//!   cancel() from any state ──► HAS_REQUEST_HAS_VALUE (latch, nothing emitted afterwards)
//! ```
//!
//! 延迟单值通道。
//!
//! [`DeferredScalar`] 最多缓存生产者的一个值，直到下游消费者发出需求信号，
//! 并通过单个原子状态解决两者之间的竞争。

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::FlowError;
use crate::flow::{FusionMode, Lifecycle, QueueSubscription, Subscriber, Subscription};
use crate::shim::atomic::{AtomicU8, Ordering};
use crate::shim::cell::UnsafeCell;

// Demand/value lattice
const NO_REQUEST_NO_VALUE: u8 = 0; // Initial
const NO_REQUEST_HAS_VALUE: u8 = 1; // Value published, waiting for demand
const HAS_REQUEST_NO_VALUE: u8 = 2; // Demand recorded, waiting for value
const HAS_REQUEST_HAS_VALUE: u8 = 3; // Emitted on demand, or cancelled

// Pull fast path
const FUSION_OFF: u8 = 0; // Not negotiated
const FUSION_NO_VALUE: u8 = 1; // Negotiated, nothing to poll yet
const FUSION_HAS_VALUE: u8 = 2; // Value ready to poll
const FUSION_CONSUMED: u8 = 3; // Value polled, pushed or cleared

// Producer-side guard
const PRODUCER_IDLE: u8 = 0;
const PRODUCER_BUSY: u8 = 1;
const PRODUCER_DONE: u8 = 2;

/// A channel that hands at most one value to a single downstream consumer
///
/// The producer calls [`complete`](DeferredScalar::complete) once; the consumer
/// drives the channel through [`Subscription::request`] and
/// [`Subscription::cancel`]. Whichever call arrives second emits `on_next`
/// followed by `on_complete`, on its own thread. Nothing blocks and nothing is
/// emitted twice.
///
/// [`is_cancelled`](Lifecycle::is_cancelled) and
/// [`is_terminated`](Lifecycle::is_terminated) read the same latch: emission on
/// demand and cancellation both end in `HAS_REQUEST_HAS_VALUE`, so the two
/// predicates always agree.
///
/// Under [`FusionMode::ASYNC`] the value is owned by exactly one reader: it is
/// published for [`poll`](QueueSubscription::poll) and then reclaimed for the
/// `on_next` push. A `poll` only observes it while racing the push from another
/// thread; a consumer polling from inside its own `on_next` finds nothing,
/// because the push already carried the value.
///
/// 向单个下游消费者最多交付一个值的通道
///
/// 生产者调用一次 [`complete`](DeferredScalar::complete)；消费者通过
/// [`Subscription::request`] 和 [`Subscription::cancel`] 驱动通道。
/// 后到达的一方在自己的线程上依次发射 `on_next` 和 `on_complete`。
/// 不会阻塞，也不会重复发射。
///
/// [`is_cancelled`](Lifecycle::is_cancelled) 与
/// [`is_terminated`](Lifecycle::is_terminated) 读取同一个锁存状态，两者总是一致。
///
/// 在 [`FusionMode::ASYNC`] 下值只属于一个读取方：它先发布给
/// [`poll`](QueueSubscription::poll)，再被回收用于 `on_next` 推送。
/// 只有从其他线程与推送竞争时 `poll` 才能取到值；在自身 `on_next` 中轮询的消费者取不到任何值。
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use lite_deferred::flow::{Subscriber, Subscription};
/// use lite_deferred::scalar::DeferredScalar;
///
/// #[derive(Default)]
/// struct Collect(Mutex<Vec<String>>);
///
/// impl Subscriber for Collect {
///     type Item = u32;
///     type Error = String;
///
///     fn on_subscribe(&self, _subscription: Arc<dyn Subscription>) {}
///     fn on_next(&self, item: u32) {
///         self.0.lock().unwrap().push(format!("next {item}"));
///     }
///     fn on_error(&self, error: String) {
///         self.0.lock().unwrap().push(format!("error {error}"));
///     }
///     fn on_complete(&self) {
///         self.0.lock().unwrap().push("complete".to_string());
///     }
/// }
///
/// let downstream = Arc::new(Collect::default());
/// let channel = DeferredScalar::shared(downstream.clone());
///
/// // The value arrives first and waits for demand
/// channel.complete(7);
/// assert!(downstream.0.lock().unwrap().is_empty());
///
/// channel.request(1).unwrap();
/// assert_eq!(*downstream.0.lock().unwrap(), ["next 7", "complete"]);
/// ```
pub struct DeferredScalar<S: Subscriber> {
    downstream: S,
    state: AtomicU8,
    fusion: AtomicU8,
    producer: AtomicU8,
    value: UnsafeCell<Option<S::Item>>,
}

// SAFETY: the value cell is only touched by the side the atomics grant exclusive
// access to:
// - the producer while it holds its turn and no value is published
// - the demand path after winning NO_REQUEST_HAS_VALUE -> HAS_REQUEST_HAS_VALUE
// - poll/clear/complete after winning FUSION_HAS_VALUE -> FUSION_CONSUMED
unsafe impl<S: Subscriber> Send for DeferredScalar<S> {}
unsafe impl<S: Subscriber> Sync for DeferredScalar<S> {}

impl<S: Subscriber> DeferredScalar<S> {
    /// Create a channel bound to `downstream`
    ///
    /// 创建绑定到 `downstream` 的通道
    pub fn new(downstream: S) -> Self {
        Self {
            downstream,
            state: AtomicU8::new(NO_REQUEST_NO_VALUE),
            fusion: AtomicU8::new(FUSION_OFF),
            producer: AtomicU8::new(PRODUCER_IDLE),
            value: UnsafeCell::new(None),
        }
    }

    /// Create a channel bound to `downstream`, ready to share between threads
    ///
    /// 创建绑定到 `downstream` 的通道，可在线程间共享
    #[inline]
    pub fn shared(downstream: S) -> Arc<Self> {
        Arc::new(Self::new(downstream))
    }

    /// The consumer this channel emits to
    ///
    /// 此通道发射信号的目标消费者
    #[inline]
    pub fn downstream(&self) -> &S {
        &self.downstream
    }

    /// Hand this channel to the downstream as its subscription
    ///
    /// 将此通道作为订阅交给下游
    pub fn subscribe_downstream(self: &Arc<Self>)
    where
        S: 'static,
    {
        let subscription: Arc<dyn Subscription> = self.clone();
        self.downstream.on_subscribe(subscription);
    }

    /// Emit `value` now if demand is pending, or keep it until demand arrives
    ///
    /// Meant to be called at most once. Later calls, calls after cancellation
    /// and calls racing another producer call are ignored.
    ///
    /// If a cancellation lands between `on_next` and the completion check,
    /// the value has already been delivered and only `on_complete` is
    /// suppressed.
    ///
    /// 如果需求已存在则立即发射 `value`，否则保留直到需求到达
    ///
    /// 应最多调用一次。后续调用、取消后的调用以及与其他生产者调用竞争的调用都会被忽略。
    ///
    /// 如果取消发生在 `on_next` 与完成检查之间，值已经被交付，只有 `on_complete` 被抑制。
    pub fn complete(&self, value: S::Item) {
        let Some(turn) = self.producer_turn() else {
            return;
        };
        self.resolve(value);
        turn.finish();
    }

    /// Like [`complete`](DeferredScalar::complete), for producers holding an
    /// optional result
    ///
    /// Returns [`FlowError::NullValue`] and leaves the channel untouched when
    /// `value` is `None`.
    ///
    /// 类似 [`complete`](DeferredScalar::complete)，适用于持有可选结果的生产者
    ///
    /// 当 `value` 为 `None` 时返回 [`FlowError::NullValue`]，通道保持不变。
    pub fn try_complete(&self, value: Option<S::Item>) -> Result<(), FlowError> {
        let value = value.ok_or(FlowError::NullValue)?;
        self.complete(value);
        Ok(())
    }

    /// Store `value` without emitting anything
    ///
    /// A later deposit overwrites an earlier one. Ignored once the producer
    /// side has resolved.
    ///
    /// 存储 `value` 而不发射任何信号
    ///
    /// 后一次存入会覆盖前一次。生产者侧完成后将被忽略。
    pub fn deposit_value(&self, value: S::Item) {
        let Some(_turn) = self.producer_turn() else {
            return;
        };
        // SAFETY: producer turn held and nothing is published yet
        unsafe { self.put_value(value) };
    }

    /// Complete with the deposited value, or signal empty completion if none
    ///
    /// 使用已存入的值完成；若没有存入值则发出空完成信号
    pub fn finish(&self) {
        let Some(turn) = self.producer_turn() else {
            return;
        };
        // SAFETY: producer turn held and nothing is published yet
        match unsafe { self.take_value() } {
            Some(value) => self.resolve(value),
            None => {
                trace!("finishing without a value");
                self.downstream.on_complete();
            }
        }
        turn.finish();
    }

    /// Forward `error` to the downstream immediately
    ///
    /// 立即将 `error` 转发给下游
    #[inline]
    pub fn signal_error(&self, error: S::Error) {
        self.downstream.on_error(error);
    }

    /// Forward completion to the downstream immediately, without a value
    ///
    /// 立即向下游转发完成信号（不带值）
    #[inline]
    pub fn signal_completion(&self) {
        self.downstream.on_complete();
    }

    fn resolve(&self, mut value: S::Item) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                NO_REQUEST_HAS_VALUE | HAS_REQUEST_HAS_VALUE => {
                    trace!("channel already resolved, dropping value");
                    return;
                }
                HAS_REQUEST_NO_VALUE => {
                    self.emit(value);
                    return;
                }
                _ => {
                    // SAFETY: producer turn held and nothing is published yet
                    unsafe { self.put_value(value) };
                    match self.state.compare_exchange(
                        NO_REQUEST_NO_VALUE,
                        NO_REQUEST_HAS_VALUE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            trace!("value buffered until demand");
                            return;
                        }
                        Err(actual) => {
                            // SAFETY: publication failed, the cell is still ours
                            let Some(taken) = (unsafe { self.take_value() }) else {
                                return;
                            };
                            value = taken;
                            state = actual;
                        }
                    }
                }
            }
        }
    }

    fn emit(&self, value: S::Item) {
        let pushed = if self.fusion.load(Ordering::Acquire) == FUSION_NO_VALUE {
            self.offer_fused(value)
        } else {
            Some(value)
        };
        if let Some(value) = pushed {
            trace!("emitting value on completion");
            self.downstream.on_next(value);
        }
        if self.state.load(Ordering::Acquire) != HAS_REQUEST_HAS_VALUE {
            self.downstream.on_complete();
        } else {
            trace!("completion suppressed by cancellation");
        }
    }

    /// Publish `value` for `poll`, then try to reclaim it for the push.
    /// Returns `None` when a concurrent `poll` or `clear` took it.
    fn offer_fused(&self, value: S::Item) -> Option<S::Item> {
        // SAFETY: fusion has no value yet, so poll and clear leave the cell alone
        unsafe { self.put_value(value) };
        if self
            .fusion
            .compare_exchange(
                FUSION_NO_VALUE,
                FUSION_HAS_VALUE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Cleared before the value arrived; the push still carries it
            // SAFETY: the value was never published
            return unsafe { self.take_value() };
        }
        match self.fusion.compare_exchange(
            FUSION_HAS_VALUE,
            FUSION_CONSUMED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // SAFETY: winning HAS_VALUE -> CONSUMED grants the cell
            Ok(_) => unsafe { self.take_value() },
            Err(_) => {
                trace!("value drained through poll");
                None
            }
        }
    }

    fn producer_turn(&self) -> Option<ProducerTurn<'_>> {
        match self.producer.compare_exchange(
            PRODUCER_IDLE,
            PRODUCER_BUSY,
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            Ok(_) => Some(ProducerTurn {
                producer: &self.producer,
                release_to: PRODUCER_IDLE,
            }),
            Err(PRODUCER_DONE) => {
                trace!("producer call after resolution ignored");
                None
            }
            Err(_) => {
                debug!("concurrent producer call ignored");
                None
            }
        }
    }

    /// # Safety
    ///
    /// Caller must have exclusive access to the cell.
    #[inline]
    unsafe fn put_value(&self, value: S::Item) {
        self.value.with_mut(|v| unsafe { *v = Some(value) });
    }

    /// # Safety
    ///
    /// Caller must have exclusive access to the cell.
    #[inline]
    unsafe fn take_value(&self) -> Option<S::Item> {
        self.value.with_mut(|v| unsafe { (*v).take() })
    }
}

/// Exclusive producer access, released on drop
///
/// Unwinding out of a downstream call retires the producer side: the
/// downstream may already have seen the value.
struct ProducerTurn<'a> {
    producer: &'a AtomicU8,
    release_to: u8,
}

impl ProducerTurn<'_> {
    #[inline]
    fn finish(mut self) {
        self.release_to = PRODUCER_DONE;
    }
}

impl Drop for ProducerTurn<'_> {
    fn drop(&mut self) {
        let release_to = if std::thread::panicking() {
            PRODUCER_DONE
        } else {
            self.release_to
        };
        self.producer.store(release_to, Ordering::Release);
    }
}

impl<S: Subscriber> Subscription for DeferredScalar<S> {
    fn request(&self, n: u64) -> Result<(), FlowError> {
        if n == 0 {
            debug!(requested = n, "rejected illegal demand");
            return Err(FlowError::IllegalDemand { requested: n });
        }
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                HAS_REQUEST_NO_VALUE | HAS_REQUEST_HAS_VALUE => return Ok(()),
                NO_REQUEST_HAS_VALUE => {
                    // Failure here means a cancellation won
                    if self
                        .state
                        .compare_exchange(
                            NO_REQUEST_HAS_VALUE,
                            HAS_REQUEST_HAS_VALUE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        // SAFETY: winning this transition grants the published value
                        if let Some(value) = unsafe { self.take_value() } {
                            trace!("emitting buffered value on demand");
                            self.downstream.on_next(value);
                            self.downstream.on_complete();
                        }
                    }
                    return Ok(());
                }
                _ => match self.state.compare_exchange(
                    NO_REQUEST_NO_VALUE,
                    HAS_REQUEST_NO_VALUE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        trace!("demand recorded before value");
                        return Ok(());
                    }
                    Err(actual) => state = actual,
                },
            }
        }
    }

    fn cancel(&self) {
        self.state.store(HAS_REQUEST_HAS_VALUE, Ordering::Release);
        trace!("cancellation latched");
    }
}

impl<S: Subscriber> QueueSubscription for DeferredScalar<S> {
    type Item = S::Item;

    /// Grants [`FusionMode::ASYNC`] when requested; never grants
    /// [`FusionMode::SYNC`] since the value is not known to be ready.
    /// Refuses once the pull side has been cleared or drained.
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if !requested.contains(FusionMode::ASYNC) {
            trace!(%requested, "fusion refused");
            return FusionMode::NONE;
        }
        // A repeated negotiation must not reset a value already offered
        match self.fusion.compare_exchange(
            FUSION_OFF,
            FUSION_NO_VALUE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Err(FUSION_CONSUMED) => {
                debug!(%requested, "fusion refused after the pull side was consumed");
                FusionMode::NONE
            }
            _ => FusionMode::ASYNC,
        }
    }

    fn poll(&self) -> Option<S::Item> {
        self.fusion
            .compare_exchange(
                FUSION_HAS_VALUE,
                FUSION_CONSUMED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            // SAFETY: winning HAS_VALUE -> CONSUMED grants the cell
            .and_then(|_| unsafe { self.take_value() })
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.fusion.load(Ordering::Acquire) != FUSION_HAS_VALUE
    }

    fn clear(&self) {
        if self.fusion.swap(FUSION_CONSUMED, Ordering::AcqRel) == FUSION_HAS_VALUE {
            // SAFETY: the swap won HAS_VALUE -> CONSUMED
            drop(unsafe { self.take_value() });
        }
    }

    #[inline]
    fn size(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            1
        }
    }
}

impl<S: Subscriber> Lifecycle for DeferredScalar<S> {
    #[inline]
    fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) != NO_REQUEST_NO_VALUE
    }

    #[inline]
    fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == HAS_REQUEST_HAS_VALUE
    }

    #[inline]
    fn is_terminated(&self) -> bool {
        self.is_cancelled()
    }
}

/// Upstream-facing side: elements are deposited, upstream completion emits the
/// last deposit (or completes empty), errors are forwarded.
/// The scalar channel holds no upstream subscription of its own.
impl<S: Subscriber> Subscriber for DeferredScalar<S> {
    type Item = S::Item;
    type Error = S::Error;

    #[inline]
    fn on_subscribe(&self, _subscription: Arc<dyn Subscription>) {}

    #[inline]
    fn on_next(&self, item: S::Item) {
        self.deposit_value(item);
    }

    #[inline]
    fn on_error(&self, error: S::Error) {
        self.signal_error(error);
    }

    #[inline]
    fn on_complete(&self) {
        self.finish();
    }
}

impl<S: Subscriber> fmt::Debug for DeferredScalar<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredScalar")
            .field("state", &self.state.load(Ordering::Acquire))
            .field("fusion", &self.fusion.load(Ordering::Acquire))
            .field("producer", &self.producer.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
