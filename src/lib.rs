//! Single-threaded reactive state.
//!
//! - [`State`] holds a value and notifies dependents when it is written.
//! - [`Signal`] reads a state, a constant, or a derived value cached until its inputs change.
//! - [`effect`] runs a side effect whenever the values it read change.
//! - [`Resource`] exposes the result of an asynchronous fetch as a reactive value.
//! - [`records::RecordList`] is an ordered, id-indexed sequence built on `State`,
//!   and [`persist`] mirrors any serializable signal into a [`storage::KeyValueStore`].
//!
//! All of it is driven by a per-thread [`core::Runtime`]:
//!
//! ```
//! use sigstate::{core::Runtime, effect, Signal, State};
//!
//! let mut rt = Runtime::new();
//! let count = State::new(1);
//! let c = count.clone();
//! let doubled = Signal::new(move |sc| c.get(sc) * 2);
//!
//! let d = doubled.clone();
//! let _e = effect(move |sc| println!("doubled = {}", d.get(sc)));
//! rt.update();
//!
//! count.set(5, rt.ac());
//! assert_eq!(doubled.get(&mut rt.sc()), 10);
//! rt.update();
//! ```
pub mod core;
mod effect_fn;
pub mod error;
pub mod persist;
pub mod records;
mod resource;
mod signal;
mod state;
pub mod storage;
mod subscription;

pub use crate::core::{spawn_action, ActionContext, SignalContext, StateRef};
pub use effect_fn::*;
pub use persist::{persist, restore, PersistConfig, Persistence};
pub use resource::*;
pub use signal::*;
pub use state::*;
pub use subscription::*;
