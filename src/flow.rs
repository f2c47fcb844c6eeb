//! Capability traits shared by the flow primitives.
//!
//! Each surface of the protocol is its own narrow trait: the push receiver
//! ([`Subscriber`]), the demand-and-cancel surface ([`Subscription`]), the pull
//! surface ([`QueueSubscription`]), introspection ([`Lifecycle`]) and the
//! external binding holder ([`SubscriptionHolder`]). Concrete types compose
//! whichever surfaces they offer.
//!
//! 流原语共享的能力 trait。
//!
//! 协议的每个侧面都是独立的窄 trait：推送接收方（[`Subscriber`]）、
//! 需求与取消侧面（[`Subscription`]）、拉取侧面（[`QueueSubscription`]）、
//! 内省（[`Lifecycle`]）以及外部绑定持有者（[`SubscriptionHolder`]）。
//! 具体类型按需组合这些侧面。

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::error::FlowError;

/// Demand-and-cancel surface handed to a consumer
///
/// 交给消费者的需求与取消侧面
pub trait Subscription: Send + Sync {
    /// Signal demand for up to `n` more elements
    ///
    /// Returns [`FlowError::IllegalDemand`] when `n` is zero.
    ///
    /// 发出最多 `n` 个元素的需求信号
    ///
    /// 当 `n` 为零时返回 [`FlowError::IllegalDemand`]。
    fn request(&self, n: u64) -> Result<(), FlowError>;

    /// Stop any further emission
    ///
    /// 停止后续所有发射
    fn cancel(&self);
}

/// Push receiver of values, errors and completion
///
/// Calls may arrive from different threads, but an implementation following
/// the protocol never sees more than one terminal signal.
///
/// 值、错误与完成信号的推送接收方
///
/// 调用可能来自不同线程，但遵循协议的实现永远不会收到多于一个终止信号。
pub trait Subscriber: Send + Sync {
    /// Element type delivered through [`on_next`](Subscriber::on_next)
    type Item: Send;

    /// Opaque error payload delivered through [`on_error`](Subscriber::on_error)
    type Error: Send;

    /// Receive the subscription that drives this subscriber
    ///
    /// 接收驱动此订阅者的订阅
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Receive one element
    ///
    /// 接收一个元素
    fn on_next(&self, item: Self::Item);

    /// Receive a terminal error
    ///
    /// 接收终止错误
    fn on_error(&self, error: Self::Error);

    /// Receive terminal completion
    ///
    /// 接收终止完成信号
    fn on_complete(&self);
}

impl<S: Subscriber + ?Sized> Subscriber for Arc<S> {
    type Item = S::Item;
    type Error = S::Error;

    #[inline]
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        (**self).on_subscribe(subscription);
    }

    #[inline]
    fn on_next(&self, item: Self::Item) {
        (**self).on_next(item);
    }

    #[inline]
    fn on_error(&self, error: Self::Error) {
        (**self).on_error(error);
    }

    #[inline]
    fn on_complete(&self) {
        (**self).on_complete();
    }
}

/// Fusion modes a pull-capable consumer can ask for
///
/// Modes combine with `|`. A negotiation answers with exactly one granted mode,
/// or [`FusionMode::NONE`].
///
/// 可拉取消费者可以请求的融合模式
///
/// 模式可通过 `|` 组合。协商结果恰好是一个被授予的模式，或 [`FusionMode::NONE`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FusionMode(u8);

impl FusionMode {
    /// No fusion, values arrive through `on_next` only
    pub const NONE: Self = Self(0);
    /// Values are ready whenever polled; the producer never pushes
    pub const SYNC: Self = Self(0b01);
    /// Values become ready over time; `on_next` announces readiness
    pub const ASYNC: Self = Self(0b10);
    /// Either mode is acceptable
    pub const ANY: Self = Self(0b11);

    /// Whether every mode in `other` is part of this set
    ///
    /// 判断 `other` 中的每种模式是否都包含在此集合中
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for FusionMode {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Lower-case mode name, as it appears in trace events
///
/// 小写的模式名称，与跟踪事件中的写法一致
impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => write!(f, "none"),
            Self::SYNC => write!(f, "sync"),
            Self::ASYNC => write!(f, "async"),
            _ => write!(f, "any"),
        }
    }
}

/// Pull surface a consumer may negotiate before subscribing
///
/// Once a mode is granted the consumer drains values with
/// [`poll`](QueueSubscription::poll) instead of relying on the pushed element.
///
/// 消费者可在订阅前协商的拉取侧面
///
/// 一旦模式被授予，消费者使用 [`poll`](QueueSubscription::poll) 取值，
/// 而不依赖被推送的元素。
pub trait QueueSubscription: Subscription {
    /// Element type handed out by [`poll`](QueueSubscription::poll)
    type Item;

    /// Negotiate a fusion mode, returning the granted one
    ///
    /// 协商融合模式，返回被授予的模式
    fn request_fusion(&self, requested: FusionMode) -> FusionMode;

    /// Take the next ready value, if any
    ///
    /// 取出下一个已就绪的值（如果有）
    fn poll(&self) -> Option<Self::Item>;

    /// Whether no value is ready to be polled
    fn is_empty(&self) -> bool;

    /// Discard any ready value
    fn clear(&self);

    /// Number of values ready to be polled
    fn size(&self) -> usize;
}

/// Lifecycle introspection
///
/// 生命周期内省
pub trait Lifecycle {
    /// Whether any demand or value has reached the primitive
    fn is_started(&self) -> bool;

    /// Whether the primitive has been cancelled
    fn is_cancelled(&self) -> bool;

    /// Whether the primitive has reached a terminal state
    fn is_terminated(&self) -> bool;
}

/// One-time binding between a consumer's demand and a late upstream
///
/// Demand and cancellation issued before [`bind`](SubscriptionHolder::bind)
/// must be retained and replayed onto the upstream once it arrives; a bind that
/// loses to an earlier one or to a cancellation must cancel its argument.
/// Implementations live outside this crate.
///
/// 消费者需求与迟到上游之间的一次性绑定
///
/// 在 [`bind`](SubscriptionHolder::bind) 之前发出的需求与取消必须被保留，
/// 并在上游到达后重放；输给更早绑定或取消的绑定必须取消其参数。
/// 实现位于本 crate 之外。
pub trait SubscriptionHolder: Send + Sync {
    /// Bind the upstream subscription
    fn bind(&self, upstream: Arc<dyn Subscription>);

    /// Add demand, forwarded now or on bind
    fn request_more(&self, n: u64);

    /// Cancel the upstream, now or on bind
    fn cancel(&self);
}
