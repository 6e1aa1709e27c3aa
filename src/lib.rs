//! Chainable groups of elements.
//!
//! A [`Group`] is an ordered, duplicate-free collection whose bulk
//! operations (`add`, `remove`, `map`, `for_each`) chain. A [`MethodGroup`]
//! also gives each member an identifier and lets callers attach group
//! methods that fan a call out to every member's own handler.
//!
//! ```
//! use ensemble::Group;
//!
//! let mut group = Group::create(vec![1, 2, 3]);
//! group.add(4).remove(&2).map(|x| x * 10);
//! assert_eq!(group.to_vec(), vec![10, 30, 40]);
//! ```
#![forbid(unsafe_code)]

pub mod arena;
pub mod error;
pub mod group;
pub mod id;

pub use error::{Error, Result};
pub use group::methods::handler;
pub use group::{ElementRecord, Group, GroupOptions, Handler, MethodGroup, VERSION};
pub use id::{generate_id, ElementId, IdScope, DEFAULT_ID_LEN};
