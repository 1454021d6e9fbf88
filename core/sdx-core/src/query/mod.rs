//! Query model: specification types, builder, normalized boolean form and
//! in-memory evaluation.

pub mod builder;
pub mod context;
pub(crate) mod eval;
pub mod expr;
pub mod filter;
pub mod types;

pub use builder::QueryBuilder;
pub use context::QueryRuntimeContext;
pub use expr::BoolExpr;
pub use filter::QueryFilter;
pub use types::{
    DoubleBound, DoubleBounds, LongBounds, MatchType, Numeric, NumericRange, Occurrence, Query,
    QueryOption, QueryResult, QuerySpecification, QueryTask, QueryTerm, SortOrder, TaskStage,
};
