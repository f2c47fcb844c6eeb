//! # lite-deferred
//!
//! Lock-free deferred single-value primitives for backpressure-aware pipelines.
//!
//! 面向背压感知流水线的无锁延迟单值原语。
//!
//! ## Overview / 概述
//!
//! `lite-deferred` provides the two building blocks that single-result operators
//! ("reduce to one value", "first matching element", ...) are composed from.
//! Both are passive: they own no thread, never block and never wait. Every
//! state change is a compare-and-swap on an atomic, so producer and consumer
//! may call in from different threads at the same time.
//!
//! `lite-deferred` 提供单结果操作符（"归约为单个值"、"第一个匹配元素"等）
//! 所依赖的两个基础构件。两者都是被动的：不拥有线程、从不阻塞、从不等待。
//! 每次状态变更都是对原子量的比较交换，因此生产者和消费者可以同时从不同线程调用。
//!
//! ## Key Features / 主要特性
//!
//! - **Race-free hand-off**: demand and value may arrive in any order, on any thread
//! - **Exactly once**: one `on_next` and one `on_complete`, never more
//! - **Cancellation latch**: cancelling forecloses any later emission
//! - **Async fusion**: a pull-capable consumer may `poll` the value directly
//!
//! - **无竞争交接**：需求与值可以以任意顺序、在任意线程到达
//! - **恰好一次**：一次 `on_next` 和一次 `on_complete`，绝不更多
//! - **取消锁存**：取消将阻止之后的任何发射
//! - **异步融合**：可拉取的消费者可以直接 `poll` 取值
//!
//! ## Modules / 模块
//!
//! ### [`scalar`]
//!
//! [`DeferredScalar`](scalar::DeferredScalar), a channel holding at most one value
//! until downstream demand exists.
//!
//! [`DeferredScalar`](scalar::DeferredScalar)，在下游需求出现之前最多保存一个值的通道。
//!
//! ### [`forwarder`]
//!
//! [`DeferredForwarder`](forwarder::DeferredForwarder), which forwards signals
//! downstream while an external [`SubscriptionHolder`](flow::SubscriptionHolder)
//! arbitrates demand against an upstream that is bound later.
//!
//! [`DeferredForwarder`](forwarder::DeferredForwarder)，在外部
//! [`SubscriptionHolder`](flow::SubscriptionHolder) 针对稍后绑定的上游仲裁需求的同时，
//! 将信号转发给下游。
//!
//! ### [`flow`]
//!
//! The capability traits both primitives are written against.
//!
//! 两个原语所基于的能力 trait。
//!
//! ## Examples / 示例
//!
//! ### Demand arrives before the value
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::thread;
//! use lite_deferred::flow::{Subscriber, Subscription};
//! use lite_deferred::scalar::DeferredScalar;
//!
//! #[derive(Default)]
//! struct Last(Mutex<Option<String>>);
//!
//! impl Subscriber for Last {
//!     type Item = String;
//!     type Error = std::io::Error;
//!
//!     fn on_subscribe(&self, _subscription: Arc<dyn Subscription>) {}
//!     fn on_next(&self, item: String) {
//!         *self.0.lock().unwrap() = Some(item);
//!     }
//!     fn on_error(&self, _error: std::io::Error) {}
//!     fn on_complete(&self) {}
//! }
//!
//! let downstream = Arc::new(Last::default());
//! let channel = DeferredScalar::shared(downstream.clone());
//!
//! channel.request(1).unwrap();
//!
//! let producer = {
//!     let channel = channel.clone();
//!     thread::spawn(move || channel.complete("done".to_string()))
//! };
//! producer.join().unwrap();
//!
//! assert_eq!(downstream.0.lock().unwrap().as_deref(), Some("done"));
//! ```
//!
//! ## Safety / 安全性
//!
//! The value cell is an `UnsafeCell`; access to it is granted by the atomic
//! state machines and never by locks. The `loom` feature swaps the atomics for
//! loom's so every interleaving can be model-checked (`tests/loom_scalar.rs`).
//!
//! 值单元是一个 `UnsafeCell`；对它的访问由原子状态机授予，从不依赖锁。
//! `loom` 特性会将原子量替换为 loom 的实现，以便对每一种交错进行模型检查。

pub mod error;
pub mod flow;
pub mod forwarder;
pub mod scalar;

mod shim;

#[cfg(all(test, not(feature = "loom")))]
mod test_utils;

pub use error::FlowError;
