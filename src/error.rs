//! Error types surfaced at the channel's call boundaries.
//!
//! 在通道调用边界上暴露的错误类型。

use thiserror::Error;

/// Errors raised by the flow primitives themselves
///
/// Producer-supplied errors never appear here: they travel verbatim through
/// [`Subscriber::on_error`](crate::flow::Subscriber::on_error) as the
/// downstream's own error type.
///
/// 流原语自身产生的错误
///
/// 生产者提供的错误不会出现在这里：它们以下游自身的错误类型，
/// 通过 [`Subscriber::on_error`](crate::flow::Subscriber::on_error) 原样传递。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// Demand was signaled with a non-positive amount
    ///
    /// 以非正数量发出了需求信号
    #[error("illegal demand: {requested} (demand must be greater than zero)")]
    IllegalDemand {
        /// The rejected amount
        requested: u64,
    },

    /// An absent value was passed where a value is required
    ///
    /// 在需要值的地方传入了缺失的值
    #[error("value must not be absent")]
    NullValue,
}
