//!
//! # Process Framework
//!
//! Composable processes made of steps, sequential containers and an async decorator, with a
//! shared lifecycle state machine, automatic rollback on failure and listener notification.
//!
//! - A [`SequentialProcess`] runs its children strictly in insertion order;
//! - When a child fails, the children that already executed are rolled back in reverse order;
//! - An [`AsyncComponent`] runs the wrapped component on its own tokio task;
//! - Pause and cancel are cooperative, steps check their [`Interrupter`] at suspension points;
//! - Listeners attached after a component finished are called right away.
//!
//! ## Basic example
//!
//! ```
//! use hv_process::{Interrupter, IntoComponent, ProcessError, SequentialProcess, Step};
//! use async_trait::async_trait;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Step for Hello {
//!     async fn execute(&mut self, _interrupter: &Interrupter) -> Result<(), ProcessError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let process = SequentialProcess::new().with(Hello).with(Hello);
//!
//!     assert!(process.into_component().execute().await.is_ok());
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod async_component;
mod component;
mod error;
mod handle;
mod interrupter;
mod lifecycle;
mod sequential;

pub use async_component::AsyncComponent;
pub use component::{
	Component, ComponentId, IntoComponent, Step, StepComponent, CANCEL_GRACE_PERIOD,
};
pub use error::ProcessError;
pub use handle::ProcessHandle;
pub use interrupter::{Interrupter, InterruptionKind};
pub use lifecycle::{ProcessListener, ProcessState};
pub use sequential::{SequentialProcess, DEFAULT_ASYNC_AWAIT_TIMEOUT};
