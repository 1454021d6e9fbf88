// SQL 모듈 진입점: 쿼리 축소, WHERE 생성, 정렬/페이지네이션
pub mod converter;
pub mod escape;
pub mod reducer;
pub mod sort;

#[cfg(test)]
mod tests;

pub use converter::{QueryConverter, kind_scope};
pub use reducer::{BooleanFoldingRule, QueryReducer, ReductionRule, TermReductionRule};
pub use sort::{SortField, group_field, order_by_clause, pagination_clause, sort_field, sort_fields};
