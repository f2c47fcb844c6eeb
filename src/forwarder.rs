//! Deferred binding forwarder.
//!
//! 延迟绑定转发器。

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::FlowError;
use crate::flow::{Subscriber, Subscription, SubscriptionHolder};

/// Forwards upstream signals to a downstream consumer while a
/// [`SubscriptionHolder`] arbitrates demand against the not-yet-known upstream
///
/// The forwarder keeps no state of its own. The upstream subscription received
/// through [`on_subscribe`](Subscriber::on_subscribe) goes to the holder's
/// `bind`; values, errors and completion go downstream unchanged. As a
/// [`Subscription`], it routes demand and cancellation to the holder, so it
/// can be handed downstream before the upstream exists.
///
/// 在 [`SubscriptionHolder`] 针对尚未知晓的上游仲裁需求的同时，
/// 将上游信号转发给下游消费者
///
/// 转发器自身不保存状态。通过 [`on_subscribe`](Subscriber::on_subscribe)
/// 收到的上游订阅交给持有者的 `bind`；值、错误和完成信号原样传给下游。
/// 作为 [`Subscription`]，它把需求和取消路由到持有者，
/// 因此可以在上游出现之前就交给下游。
pub struct DeferredForwarder<H, S> {
    holder: H,
    downstream: S,
}

impl<H: SubscriptionHolder, S: Subscriber> DeferredForwarder<H, S> {
    /// Create a forwarder over `holder` emitting to `downstream`
    ///
    /// 创建基于 `holder`、向 `downstream` 发射信号的转发器
    #[inline]
    pub fn new(holder: H, downstream: S) -> Self {
        Self { holder, downstream }
    }

    /// The holder arbitrating the upstream binding
    ///
    /// Operators translating demand (for example scaling or capping it) work
    /// against this holder directly.
    ///
    /// 仲裁上游绑定的持有者
    #[inline]
    pub fn holder(&self) -> &H {
        &self.holder
    }

    /// The consumer receiving forwarded signals
    #[inline]
    pub fn downstream(&self) -> &S {
        &self.downstream
    }
}

impl<H: SubscriptionHolder, S: Subscriber> Subscriber for DeferredForwarder<H, S> {
    type Item = S::Item;
    type Error = S::Error;

    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        trace!("binding upstream subscription");
        self.holder.bind(subscription);
    }

    #[inline]
    fn on_next(&self, item: S::Item) {
        self.downstream.on_next(item);
    }

    #[inline]
    fn on_error(&self, error: S::Error) {
        self.downstream.on_error(error);
    }

    #[inline]
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

/// Demand is not validated here; the holder forwards it as given.
impl<H: SubscriptionHolder, S: Subscriber> Subscription for DeferredForwarder<H, S> {
    #[inline]
    fn request(&self, n: u64) -> Result<(), FlowError> {
        self.holder.request_more(n);
        Ok(())
    }

    #[inline]
    fn cancel(&self) {
        self.holder.cancel();
    }
}

impl<H, S> fmt::Debug for DeferredForwarder<H, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredForwarder").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_utils::{CountingSubscription, Recorder, ReplayHolder, Signal};

    type Forwarder = DeferredForwarder<ReplayHolder, Arc<Recorder<u32>>>;

    fn forwarder() -> (Forwarder, Arc<Recorder<u32>>) {
        let recorder = Recorder::<u32>::new();
        (
            DeferredForwarder::new(ReplayHolder::default(), recorder.clone()),
            recorder,
        )
    }

    #[test]
    fn test_signals_forwarded_verbatim() {
        let (forwarder, recorder) = forwarder();

        forwarder.on_next(1);
        forwarder.on_next(2);
        forwarder.on_error("upstream failed".to_string());
        forwarder.on_complete();

        assert_eq!(
            recorder.signals(),
            vec![
                Signal::Next(1),
                Signal::Next(2),
                Signal::Error("upstream failed".to_string()),
                Signal::Complete,
            ]
        );
    }

    #[test]
    fn test_on_subscribe_binds_holder() {
        let (forwarder, recorder) = forwarder();
        let upstream = Arc::new(CountingSubscription::default());

        assert!(!forwarder.holder().is_bound());
        forwarder.on_subscribe(upstream.clone());

        assert!(forwarder.holder().is_bound());
        // Binding is not a downstream signal
        assert!(recorder.signals().is_empty());
    }

    #[test]
    fn test_demand_before_bind_is_replayed() {
        let (forwarder, _recorder) = forwarder();
        let upstream = Arc::new(CountingSubscription::default());

        forwarder.request(3).unwrap();
        forwarder.request(4).unwrap();
        assert_eq!(upstream.requested.load(Ordering::SeqCst), 0);

        forwarder.on_subscribe(upstream.clone());
        assert_eq!(upstream.requested.load(Ordering::SeqCst), 7);

        forwarder.request(1).unwrap();
        assert_eq!(upstream.requested.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_cancel_before_bind_cancels_upstream() {
        let (forwarder, _recorder) = forwarder();
        let upstream = Arc::new(CountingSubscription::default());

        forwarder.cancel();
        forwarder.on_subscribe(upstream.clone());

        assert!(upstream.cancelled.load(Ordering::SeqCst));
        assert!(!forwarder.holder().is_bound());
    }

    #[test]
    fn test_second_bind_is_cancelled() {
        let (forwarder, _recorder) = forwarder();
        let first = Arc::new(CountingSubscription::default());
        let second = Arc::new(CountingSubscription::default());

        forwarder.on_subscribe(first.clone());
        forwarder.on_subscribe(second.clone());

        assert!(!first.cancelled.load(Ordering::SeqCst));
        assert!(second.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_zero_demand_passes_through() {
        let (forwarder, _recorder) = forwarder();
        let upstream = Arc::new(CountingSubscription::default());
        forwarder.on_subscribe(upstream.clone());

        assert_eq!(forwarder.request(0), Ok(()));
    }
}
