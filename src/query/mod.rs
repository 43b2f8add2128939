//! Boolean query compiler.
//!
//! Turns free-form include/exclude keyword text into a canonical boolean
//! expression and renders it into each backend's native query grammar:
//!
//! ```text
//! raw text ──▶ normalize ──▶ parse ──▶ Expr (canonical) ──▶ per-backend query
//! ```
//!
//! Precedence is NOT > AND > OR throughout. Quoted phrases survive as
//! single underscore-joined terms (`"machine learning"` → `machine_learning`).

pub mod normalize;
pub mod parser;
pub mod render;

pub use normalize::normalize_intent;
pub use parser::{parse, Expr, Op};
