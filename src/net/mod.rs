//! # Petri 网核心定义（Place/Transition Net）
//!
//! 设库所集合 `P` 与迁移集合 `T`，输入/输出映射 `Pre, Post ∈ ℕ^{|P|×|T|}`，
//! 迁移效应 `C = Post - Pre`。对任意标识 `M ∈ ℕ^{|P|}`：
//!
//! * 迁移 `t ∈ T` **可发生** 当且仅当 `∀p ∈ P: M[p] ≥ Pre[p, t]`；
//!   无输入弧的迁移总是可发生；
//! * 迁移 **发生** 后得到新标识 `M' = M - Pre[:, t] + Post[:, t]`，原标识不变。
//!
//! 网只能通过 [`NetBuilder`] 构造并在构造时完成校验，之后不可变。
//!
//! ## 示例
//!
//! ```rust
//! use pn_reach::net::*;
//!
//! let mut builder = Net::builder();
//! builder
//!     .place("p0")
//!     .place("p1")
//!     .transition(Transition::new("t0"))
//!     .arc("p0", "t0", 1)
//!     .arc("t0", "p1", 1);
//! let net = builder.build().unwrap();
//!
//! let marking = net.marking([("p0", 1)]).unwrap();
//! let t0 = net.transition_id("t0").unwrap();
//! assert_eq!(net.enabled_transitions(&marking), vec![t0]);
//! let next = net.fire(&marking, t0).unwrap();
//! assert_eq!(next.tokens(net.place_id("p0").unwrap()), 0);
//! assert_eq!(next.tokens(net.place_id("p1").unwrap()), 1);
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod pnml;
pub mod structure;

pub use self::core::{DiagnosticReport, FireError, Net, NetBuilder, NetError};
pub use ids::{PlaceId, StateId, TransitionId};
pub use incidence::Incidence;
pub use index_vec::{Idx, IndexVec};
pub use io::{NetDocument, NetFormat, ParseError, ParsedNet, parse_net, read_net};
pub use structure::{
    Arc, ArcDirection, Marking, MarkingError, MarkingKey, Place, Transition, Weight,
};
